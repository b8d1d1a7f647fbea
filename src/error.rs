//! Error types shared by every front-end and formatter.
//!
//! All errors are programmer or input errors. Nothing here is transient and
//! nothing is retried: an error aborts the translation in progress.

use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range into the text being parsed.
pub type Span = Range<usize>;

/// Tokenizer and grammar violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    UnterminatedString,
    UnexpectedToken(String),
    ExpectedOperand,
    ExpectedIdentifier,
    UnknownSyntaxCharacter(char),
    InvalidLiteral(String),
}

impl std::fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxErrorKind::UnterminatedString => write!(f, "unterminated string literal"),
            SyntaxErrorKind::UnexpectedToken(token) => write!(f, "unexpected token '{}'", token),
            SyntaxErrorKind::ExpectedOperand => write!(f, "expected an operand"),
            SyntaxErrorKind::ExpectedIdentifier => write!(f, "expected an identifier"),
            SyntaxErrorKind::UnknownSyntaxCharacter(c) => {
                write!(f, "unknown syntax character '{}'", c)
            }
            SyntaxErrorKind::InvalidLiteral(text) => write!(f, "invalid literal '{}'", text),
        }
    }
}

/// A syntax error with the offending source offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {}", span.start)]
pub struct ParseError {
    pub kind: SyntaxErrorKind,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: SyntaxErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Offset of the first offending character.
    pub fn offset(&self) -> usize {
        self.span.start
    }

    /// Move the error into the coordinates of an enclosing text.
    pub(crate) fn shifted(mut self, base: usize) -> Self {
        self.span = (self.span.start + base)..(self.span.end + base);
        self
    }

    /// Render a caret diagnostic for `source` without terminal colors.
    pub fn report(&self, source: &str) -> String {
        let end = self.span.end.max(self.span.start + 1).min(source.len().max(1));
        let start = self.span.start.min(end);
        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, start..end)
            .with_config(Config::default().with_color(false))
            .with_message(self.kind.to_string())
            .with_label(Label::new(start..end).with_message(self.kind.to_string()))
            .finish()
            .write(Source::from(source), &mut out);
        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// Coarse classification of [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ParseSyntax,
    UnsupportedConstruct,
    Unresolved,
    BuilderState,
    UnsupportedStatementKind,
}

/// Any failure raised while building, parsing or formatting a query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ParseError),

    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    #[error("no resolver claimed method '{0}'")]
    UnresolvedMethod(String),

    #[error("no renderer for operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("comparison requires a pending left operand, call where_field/and_also/or_else first")]
    NoPendingOperand,

    #[error("on() requires a staged join()")]
    JoiningExpressionEmpty,

    #[error("then_by requires a preceding order_by")]
    OrderByNotInitialized,

    #[error("invalid collection name '{0}'")]
    InvalidCollectionName(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("invalid field expression: {0}")]
    InvalidFieldExpression(String),

    #[error("unsupported argument type: {0}")]
    UnsupportedArgumentType(String),

    #[error("{0} statement has nothing to write")]
    EmptyPayload(&'static str),

    #[error("unsupported statement kind: {0}")]
    UnsupportedStatementKind(String),
}

impl QueryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryError::Syntax(_) | QueryError::SqlSyntax(_) => ErrorCategory::ParseSyntax,
            QueryError::UnsupportedConstruct(_) => ErrorCategory::UnsupportedConstruct,
            QueryError::UnresolvedMethod(_)
            | QueryError::UnknownOperator(_)
            | QueryError::UnknownParameter(_) => ErrorCategory::Unresolved,
            QueryError::NoPendingOperand
            | QueryError::JoiningExpressionEmpty
            | QueryError::OrderByNotInitialized
            | QueryError::InvalidCollectionName(_)
            | QueryError::InvalidExpression(_)
            | QueryError::InvalidFieldExpression(_)
            | QueryError::UnsupportedArgumentType(_)
            | QueryError::EmptyPayload(_) => ErrorCategory::BuilderState,
            QueryError::UnsupportedStatementKind(_) => ErrorCategory::UnsupportedStatementKind,
        }
    }

    pub(crate) fn syntax(kind: SyntaxErrorKind, span: Span) -> Self {
        QueryError::Syntax(ParseError::new(kind, span))
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        QueryError::UnsupportedConstruct(what.into())
    }

    /// Shift a syntax error by `base` bytes; other errors pass through.
    pub(crate) fn shifted(self, base: usize) -> Self {
        match self {
            QueryError::Syntax(e) => QueryError::Syntax(e.shifted(base)),
            other => other,
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            QueryError::NoPendingOperand.category(),
            ErrorCategory::BuilderState
        );
        assert_eq!(
            QueryError::UnknownOperator("$foo".into()).category(),
            ErrorCategory::Unresolved
        );
        assert_eq!(
            QueryError::syntax(SyntaxErrorKind::ExpectedOperand, 3..4).category(),
            ErrorCategory::ParseSyntax
        );
    }

    #[test]
    fn test_offset_shift() {
        let err = ParseError::new(SyntaxErrorKind::UnterminatedString, 2..5).shifted(10);
        assert_eq!(err.offset(), 12);
        assert_eq!(err.span, 12..15);
    }

    #[test]
    fn test_display_includes_offset() {
        let err = ParseError::new(SyntaxErrorKind::UnknownSyntaxCharacter('#'), 7..8);
        assert_eq!(err.to_string(), "unknown syntax character '#' at offset 7");
    }

    #[test]
    fn test_report_mentions_message() {
        let err = ParseError::new(SyntaxErrorKind::UnknownSyntaxCharacter('#'), 6..7);
        let report = err.report("price # 10");
        assert!(report.contains("unknown syntax character"), "{}", report);
    }
}
