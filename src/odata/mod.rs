//! OData query options: tokenizer, parser and formatter.
//!
//! ```
//! use queryshape::odata::{OpenDataFormatter, OpenDataParser};
//!
//! let parsed = OpenDataParser::new()
//!     .parse_query("Product", [("$filter", "price gt 100"), ("$top", "5")])
//!     .unwrap();
//! let options = OpenDataFormatter::default().format_expanded(&parsed).unwrap();
//! assert_eq!(options["$filter"], "(price gt 100)");
//! assert_eq!(options["$top"], 5);
//! ```

pub mod formatter;
pub mod lexer;
pub mod parser;
pub mod query;

pub use formatter::{query_string, OpenDataDialect, OpenDataFormatter, StandardDialect};
pub use parser::OpenDataParser;
pub use query::{Levels, OpenDataQueryExpression};
