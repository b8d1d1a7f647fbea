//! Generic ANSI-flavoured SQL dialect.
//!
//! Used when no target database is named:
//! - Identifiers stay bare unless they need double quotes
//! - Upper-case `TRUE`/`FALSE`
//! - Every renderer keeps the trait default

use super::helpers;
use super::SqlDialect;

/// Generic SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Generic;

impl SqlDialect for Generic {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_if_needed(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        if b {
            "TRUE"
        } else {
            "FALSE"
        }
    }
}
