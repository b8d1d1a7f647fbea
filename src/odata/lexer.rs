//! Tokenizer for OData query options.
//!
//! Produces a flat token list. Every token keeps its byte span so callers
//! can slice the original text back out (the `$expand` grammar hands
//! nested option values to sub-parsers verbatim).

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{ParseError, Span, SyntaxErrorKind};
use crate::query::Literal;

static DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?(Z|[+-]\d{2}:\d{2})?$")
        .expect("valid regex")
});
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}(:\d{2}(\.\d+)?)?$").expect("valid regex"));
static BINARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").expect("valid regex"));

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    Slash,
    Comma,
    Equals,
    Semicolon,
    Colon,
    Star,
    /// Names, operator keywords (`eq`, `and`) and option names (`$top`).
    Identifier(String),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// The identifier text, if this is an identifier.
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Case-insensitive keyword check.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.ident().is_some_and(|name| name.eq_ignore_ascii_case(keyword))
    }
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer { source, pos: 0 }.run()
}

struct Lexer<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> Lexer<'src> {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }
            let start = self.pos;
            let punct = match c {
                '(' => Some(TokenKind::LParen),
                ')' => Some(TokenKind::RParen),
                '/' => Some(TokenKind::Slash),
                ',' => Some(TokenKind::Comma),
                '=' => Some(TokenKind::Equals),
                ';' => Some(TokenKind::Semicolon),
                ':' => Some(TokenKind::Colon),
                '*' => Some(TokenKind::Star),
                _ => None,
            };
            let kind = if let Some(kind) = punct {
                self.pos += 1;
                kind
            } else if c == '\'' {
                TokenKind::Literal(Literal::String(self.quoted()?))
            } else if c.is_ascii_digit() || (c == '-' && self.negative_number_ahead()) {
                TokenKind::Literal(self.number()?)
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                self.word()?
            } else {
                return Err(ParseError::new(
                    SyntaxErrorKind::UnknownSyntaxCharacter(c),
                    start..start + c.len_utf8(),
                ));
            };
            tokens.push(Token {
                kind,
                span: start..self.pos,
            });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset..)?.chars().next()
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    fn negative_number_ahead(&self) -> bool {
        self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) || self.rest().starts_with("-INF")
    }

    /// `'...'` with `''` standing for one quote. Starts at the opening quote.
    fn quoted(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        SyntaxErrorKind::UnterminatedString,
                        start..self.source.len(),
                    ))
                }
                Some('\'') if self.peek_at(1) == Some('\'') => {
                    text.push('\'');
                    self.pos += 2;
                }
                Some('\'') => {
                    self.pos += 1;
                    return Ok(text);
                }
                Some(c) => {
                    text.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    /// Digits, optional fraction and exponent, optional `F`/`D`/`M`/`L`.
    fn number(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        if self.rest().starts_with("-INF") {
            self.pos += 4;
            return Ok(Literal::Double(f64::NEG_INFINITY));
        }
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        self.digits();

        let mut fractional = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            fractional = true;
            self.pos += 1;
            self.digits();
        }

        let exponent_digit = |c: Option<char>| c.is_some_and(|c| c.is_ascii_digit());
        if matches!(self.peek(), Some('e' | 'E'))
            && (exponent_digit(self.peek_at(1))
                || (matches!(self.peek_at(1), Some('+' | '-')) && exponent_digit(self.peek_at(2))))
        {
            fractional = true;
            self.pos += 2;
            self.digits();
        }

        let text = &self.source[start..self.pos];
        let suffix = self.peek().filter(|c| matches!(c, 'F' | 'f' | 'D' | 'd' | 'M' | 'm' | 'L' | 'l'));
        if let Some(s) = suffix {
            self.pos += 1;
            if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                return Err(self.invalid(start));
            }
            return match s.to_ascii_uppercase() {
                'F' => text.parse::<f32>().map(Literal::Single).map_err(|_| self.invalid(start)),
                'D' => text.parse::<f64>().map(Literal::Double).map_err(|_| self.invalid(start)),
                'M' => Decimal::from_str(text)
                    .or_else(|_| Decimal::from_scientific(text))
                    .map(Literal::Decimal)
                    .map_err(|_| self.invalid(start)),
                _ if !fractional => text.parse::<i64>().map(Literal::Long).map_err(|_| self.invalid(start)),
                _ => Err(self.invalid(start)),
            };
        }

        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            self.pos += 1;
            return Err(self.invalid(start));
        }
        if fractional {
            text.parse::<f64>().map(Literal::Double).map_err(|_| self.invalid(start))
        } else {
            text.parse::<i64>().map(Literal::Int).map_err(|_| self.invalid(start))
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    /// Identifier, keyword literal, or typed literal such as `guid'...'`.
    fn word(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
        {
            self.pos += self.peek().map_or(1, char::len_utf8);
        }
        let word = &self.source[start..self.pos];

        if self.peek() == Some('\'') {
            let prefix = word.to_ascii_lowercase();
            if matches!(prefix.as_str(), "guid" | "datetime" | "time" | "binary") {
                let text = self.quoted()?;
                return self.typed_literal(&prefix, text, start).map(TokenKind::Literal);
            }
        }

        Ok(match word {
            "true" => TokenKind::Literal(Literal::Bool(true)),
            "false" => TokenKind::Literal(Literal::Bool(false)),
            "null" => TokenKind::Literal(Literal::Null),
            "INF" => TokenKind::Literal(Literal::Double(f64::INFINITY)),
            "NaN" => TokenKind::Literal(Literal::Double(f64::NAN)),
            other => TokenKind::Identifier(other.to_string()),
        })
    }

    fn typed_literal(&self, prefix: &str, text: String, start: usize) -> Result<Literal, ParseError> {
        let literal = match prefix {
            "guid" => Uuid::parse_str(&text).ok().map(Literal::Guid),
            "datetime" if DATETIME.is_match(&text) => Some(Literal::DateTime(text)),
            "time" if TIME.is_match(&text) => Some(Literal::Time(text)),
            "binary" if BINARY.is_match(&text) => Some(Literal::Binary(text)),
            _ => None,
        };
        literal.ok_or_else(|| self.invalid(start))
    }

    fn invalid(&self, start: usize) -> ParseError {
        ParseError::new(
            SyntaxErrorKind::InvalidLiteral(self.source[start..self.pos].to_string()),
            start..self.pos,
        )
    }
}
