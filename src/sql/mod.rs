//! SQL front-end and back-end.
//!
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations and operator renderers
//! - [`formatter`] - SELECT/INSERT/UPDATE/DELETE assembly
//! - [`parser`] - SQL text to IR through sqlparser

pub mod dialect;
pub mod formatter;
pub mod parser;
pub mod token;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use formatter::SqlFormatter;
pub use parser::SqlParser;
pub use token::{Keyword, Token, TokenStream};
