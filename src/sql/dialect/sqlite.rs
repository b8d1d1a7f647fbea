//! SQLite SQL dialect.
//!
//! SQLite features:
//! - Backtick identifier quoting (double quotes also accepted)
//! - Booleans as 1/0
//! - Date parts through `STRFTIME`
//! - `SUBSTR` and `INSTR`
//! - No built-in regex: anchored literals become `SUBSTR`/`INSTR`, the rest `REGEXP`

use super::helpers;
use super::SqlDialect;
use crate::error::QueryResult;
use crate::query::{lit_int, lit_str, Expr, TextPattern};
use crate::sql::token::{Keyword, Token, TokenStream};

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl Sqlite {
    /// `CAST(STRFTIME('%Y', x) AS INTEGER)`
    fn strftime(&self, format: &str, args: &[Expr], tag: &str) -> QueryResult<TokenStream> {
        let args = helpers::exact(args, 1, tag)?;
        let mut ts = TokenStream::new();
        ts.keyword(Keyword::Cast)
            .lparen()
            .push(Token::FunctionName("STRFTIME".into()))
            .lparen()
            .push(Token::LitString(format.into()))
            .comma()
            .space();
        for arg in args {
            ts.append(&self.escape(arg)?);
        }
        ts.rparen()
            .space()
            .keyword(Keyword::As)
            .space()
            .push(Token::Raw("INTEGER".into()))
            .rparen();
        Ok(ts)
    }

    /// `SUBSTR(x, 1, n) = 'p'`, `SUBSTR(x, -n) = 'p'` or `INSTR(x, 'p') > 0`.
    fn literal_match(&self, input: &Expr, pattern: &TextPattern) -> QueryResult<TokenStream> {
        let text = pattern.text();
        let len = text.chars().count() as i64;
        let (mut ts, rhs) = match pattern {
            TextPattern::StartsWith(_) if len > 0 => (
                self.render_function("SUBSTR", &[input.clone(), lit_int(1), lit_int(len)])?,
                Token::LitString(text.to_string()),
            ),
            TextPattern::EndsWith(_) if len > 0 => (
                self.render_function("SUBSTR", &[input.clone(), lit_int(-len)])?,
                Token::LitString(text.to_string()),
            ),
            // INSTR(x, '') is 1, so an empty pattern matches every row.
            _ => {
                let mut located = self.render_function("INSTR", &[input.clone(), lit_str(text)])?;
                located.space().symbol(">").space().push(Token::LitInt(0));
                return Ok(located);
            }
        };
        ts.space().symbol("=").space().push(rhs);
        Ok(ts)
    }
}

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: i64, offset: i64) -> TokenStream {
        helpers::emit_limit_offset_unbounded(limit, offset, "-1")
    }

    fn render_year(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.strftime("%Y", args, "$year")
    }

    fn render_month(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.strftime("%m", args, "$month")
    }

    fn render_day_of_month(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.strftime("%d", args, "$dayOfMonth")
    }

    fn render_hour(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.strftime("%H", args, "$hour")
    }

    fn render_minute(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.strftime("%M", args, "$minute")
    }

    fn render_second(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.strftime("%S", args, "$second")
    }

    fn render_substr(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_substring_with("SUBSTR", args)
    }

    fn render_index_of_bytes(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        let located = self.render_function("INSTR", helpers::exact(args, 2, "$indexOfBytes")?)?;
        Ok(helpers::minus_one(located))
    }

    /// Anchored literal patterns become case-sensitive `SUBSTR`/`INSTR`
    /// comparisons, since SQLite's `LIKE` folds ASCII case. `LIKE` is only
    /// used for the `i` option. Everything else needs a `REGEXP` function.
    fn render_regex_match(
        &self,
        input: &Expr,
        regex: &str,
        options: Option<&str>,
    ) -> QueryResult<TokenStream> {
        let flags = options.unwrap_or("");
        match TextPattern::from_regex(regex) {
            Some(pattern) if flags.is_empty() => self.literal_match(input, &pattern),
            Some(pattern) if flags == "i" && !pattern.text().contains(['%', '_']) => {
                let text = match &pattern {
                    TextPattern::StartsWith(s) => format!("{}%", s),
                    TextPattern::EndsWith(s) => format!("%{}", s),
                    TextPattern::Contains(s) => format!("%{}%", s),
                };
                let mut ts = self.escape(input)?;
                ts.space()
                    .keyword(Keyword::Like)
                    .space()
                    .push(Token::LitString(text));
                Ok(ts)
            }
            _ => {
                let regex = if flags.contains('i') {
                    format!("(?i){}", regex)
                } else {
                    regex.to_string()
                };
                let mut ts = self.escape(input)?;
                ts.space()
                    .symbol("REGEXP")
                    .space()
                    .push(Token::LitString(regex));
                Ok(ts)
            }
        }
    }
}
