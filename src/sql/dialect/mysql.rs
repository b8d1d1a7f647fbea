//! MySQL SQL dialect.
//!
//! MySQL features:
//! - Backtick identifier quoting
//! - Booleans as 1/0
//! - `||` is logical OR unless PIPES_AS_CONCAT, so `CONCAT()` is used
//! - No bare OFFSET: an unbounded LIMIT is emitted instead

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_concat_operator(&self) -> bool {
        false
    }

    fn emit_limit_offset(&self, limit: i64, offset: i64) -> TokenStream {
        helpers::emit_limit_offset_unbounded(limit, offset, "18446744073709551615")
    }
}
