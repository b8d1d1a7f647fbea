//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - `EXTRACT(part FROM x)` for date parts
//! - `STRPOS` for substring search
//! - POSIX regex operators `~` and `~*`

use super::helpers;
use super::SqlDialect;
use crate::error::QueryResult;
use crate::query::Expr;
use crate::sql::token::{Keyword, Token, TokenStream};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl Postgres {
    fn extract(&self, part: &'static str, args: &[Expr], tag: &str) -> QueryResult<TokenStream> {
        let args = helpers::exact(args, 1, tag)?;
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("EXTRACT".into()))
            .lparen()
            .push(Token::Raw(part.into()))
            .space()
            .keyword(Keyword::From)
            .space();
        for arg in args {
            ts.append(&self.escape(arg)?);
        }
        ts.rparen();
        Ok(ts)
    }
}

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn render_year(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.extract("YEAR", args, "$year")
    }

    fn render_month(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.extract("MONTH", args, "$month")
    }

    fn render_day_of_month(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.extract("DAY", args, "$dayOfMonth")
    }

    fn render_hour(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.extract("HOUR", args, "$hour")
    }

    fn render_minute(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.extract("MINUTE", args, "$minute")
    }

    fn render_second(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.extract("SECOND", args, "$second")
    }

    fn render_index_of_bytes(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        let located = self.render_function("STRPOS", helpers::exact(args, 2, "$indexOfBytes")?)?;
        Ok(helpers::minus_one(located))
    }

    fn render_regex_match(
        &self,
        input: &Expr,
        regex: &str,
        options: Option<&str>,
    ) -> QueryResult<TokenStream> {
        let operator = match options {
            Some(flags) if flags.contains('i') => "~*",
            _ => "~",
        };
        let mut ts = self.escape(input)?;
        ts.space()
            .symbol(operator)
            .space()
            .push(Token::LitString(regex.to_string()));
        Ok(ts)
    }
}
