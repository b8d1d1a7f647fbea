//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use std::sync::LazyLock;

use regex::Regex;

use super::super::token::{Keyword, Token, TokenStream};
use crate::error::{QueryError, QueryResult};
use crate::query::{ArithmeticOperator, ComparisonOperator, Expr, Literal};

static BARE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, Generic (when not a bare word)
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL, SQLite
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Leave plain words bare, double-quote everything else.
pub fn quote_if_needed(ident: &str) -> String {
    if BARE_IDENT.is_match(ident) {
        ident.to_string()
    } else {
        quote_double(ident)
    }
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: SQLite, MySQL
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL). Zero means absent.
/// Used by: Generic, Postgres
pub fn emit_limit_offset_standard(limit: i64, offset: i64) -> TokenStream {
    let mut ts = TokenStream::new();

    if limit > 0 {
        ts.keyword(Keyword::Limit).space().push(Token::LitInt(limit));
    }

    if offset > 0 {
        if limit > 0 {
            ts.space();
        }
        ts.keyword(Keyword::Offset).space().push(Token::LitInt(offset));
    }

    ts
}

/// Dialects that reject a bare OFFSET get `LIMIT <unbounded> OFFSET n`.
/// Used by: SQLite (`-1`), MySQL (max unsigned as raw text)
pub fn emit_limit_offset_unbounded(limit: i64, offset: i64, unbounded: &'static str) -> TokenStream {
    if limit > 0 || offset <= 0 {
        return emit_limit_offset_standard(limit, offset);
    }
    let mut ts = TokenStream::new();
    ts.keyword(Keyword::Limit)
        .space()
        .push(Token::Raw(unbounded.into()))
        .space()
        .keyword(Keyword::Offset)
        .space()
        .push(Token::LitInt(offset));
    ts
}

// =============================================================================
// Leaves
// =============================================================================

/// `a.b.c` as `a`.`b`.`c` in the dialect's quoting.
pub fn qualified_path(path: &str) -> TokenStream {
    let mut ts = TokenStream::new();
    for (i, segment) in path.split('.').enumerate() {
        if i > 0 {
            ts.symbol(".");
        }
        ts.push(Token::Ident(segment.to_string()));
    }
    ts
}

pub fn literal_tokens(lit: &Literal) -> QueryResult<TokenStream> {
    let token = match lit {
        Literal::Null => Token::LitNull,
        Literal::Bool(b) => Token::LitBool(*b),
        Literal::Int(n) | Literal::Long(n) => Token::LitInt(*n),
        Literal::Single(f) => {
            // Shortest decimal form of the f32, not its widened f64 digits.
            let widened = f.to_string().parse::<f64>().unwrap_or(f64::from(*f));
            Token::LitFloat(finite(widened)?)
        }
        Literal::Double(f) => Token::LitFloat(finite(*f)?),
        Literal::Decimal(d) => Token::Raw(d.to_string()),
        Literal::String(s) => Token::LitString(s.clone()),
        Literal::Guid(g) => Token::LitString(g.to_string()),
        Literal::DateTime(s) | Literal::Time(s) | Literal::Binary(s) => Token::LitString(s.clone()),
    };
    Ok(token.into())
}

fn finite(f: f64) -> QueryResult<f64> {
    if f.is_finite() {
        Ok(f)
    } else {
        Err(QueryError::unsupported(format!("non-finite number {} in SQL", f)))
    }
}

// =============================================================================
// Operators
// =============================================================================

pub fn comparison_token(op: ComparisonOperator) -> Token {
    match op {
        ComparisonOperator::Eq => Token::Symbol("="),
        ComparisonOperator::Ne => Token::Symbol("<>"),
        ComparisonOperator::Gt => Token::Symbol(">"),
        ComparisonOperator::Gte => Token::Symbol(">="),
        ComparisonOperator::Lt => Token::Symbol("<"),
        ComparisonOperator::Lte => Token::Symbol("<="),
    }
}

pub fn arithmetic_token(op: ArithmeticOperator) -> Token {
    match op {
        ArithmeticOperator::Add => Token::Symbol("+"),
        ArithmeticOperator::Subtract => Token::Symbol("-"),
        ArithmeticOperator::Multiply => Token::Symbol("*"),
        ArithmeticOperator::Divide => Token::Symbol("/"),
        ArithmeticOperator::Modulo => Token::Symbol("%"),
    }
}

/// `(ts - 1)`, turning a one-based position into a zero-based one.
pub fn minus_one(ts: TokenStream) -> TokenStream {
    let mut out = ts;
    out.space()
        .symbol("-")
        .space()
        .push(Token::LitInt(1));
    out.parenthesized()
}

/// Zero-based IR offset as a one-based SQL offset.
pub fn one_based(start: &Expr) -> QueryResult<Expr> {
    let shifted = match start {
        Expr::Literal(Literal::Int(n)) => n.checked_add(1).map(Literal::Int),
        Expr::Literal(Literal::Long(n)) => n.checked_add(1).map(Literal::Long),
        other => {
            return Ok(Expr::arithmetic(ArithmeticOperator::Add, other.clone(), Expr::from(1)))
        }
    };
    shifted
        .map(Expr::Literal)
        .ok_or_else(|| QueryError::InvalidExpression(format!("substring start {:?} is out of range", start)))
}

/// Regex option letters understood by `REGEXP_LIKE`.
pub fn regexp_like_flags(options: &str) -> String {
    options.chars().filter(|c| matches!(c, 'i' | 'm')).collect()
}

// =============================================================================
// Arity Checks
// =============================================================================

pub fn exact<'a>(args: &'a [Expr], n: usize, tag: &str) -> QueryResult<&'a [Expr]> {
    between(args, n, n, tag)
}

pub fn at_least<'a>(args: &'a [Expr], n: usize, tag: &str) -> QueryResult<&'a [Expr]> {
    between(args, n, usize::MAX, tag)
}

pub fn between<'a>(args: &'a [Expr], min: usize, max: usize, tag: &str) -> QueryResult<&'a [Expr]> {
    if (min..=max).contains(&args.len()) {
        Ok(args)
    } else {
        Err(QueryError::InvalidExpression(format!(
            "{} received {} operand(s)",
            tag,
            args.len()
        )))
    }
}

/// `[input, start, length?]` of `$substr`.
pub fn substr_args(args: &[Expr]) -> QueryResult<(&Expr, &Expr, Option<&Expr>)> {
    match between(args, 2, 3, "$substr")? {
        [input, start] => Ok((input, start, None)),
        [input, start, length] => Ok((input, start, Some(length))),
        _ => Err(QueryError::InvalidExpression("$substr expects 2 or 3 operands".into())),
    }
}
