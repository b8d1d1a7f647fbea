//! # queryshape
//!
//! A dialect-neutral query IR with several front-ends and formatters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ fluent calls │ │   closures   │ │ OData text   │ │   SQL text   │
//! └──────┬───────┘ └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!        │                │ [closure]      │ [odata]        │ [sql::parser]
//!        ▼                ▼                ▼                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 QueryExpression (query IR)                       │
//! └─────────────────────────────────────────────────────────────────┘
//!        │                                 │
//!        ▼ [sql::formatter]                ▼ [odata::formatter]
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │ SQL text, per dialect    │   │ OData query options ($filter...) │
//! └──────────────────────────┘   └──────────────────────────────────┘
//! ```
//!
//! Front-ends and formatters only meet in the IR, so any front-end can be
//! paired with any formatter:
//!
//! ```
//! use queryshape::odata::OpenDataFormatter;
//! use queryshape::sql::SqlParser;
//!
//! let query = SqlParser::new()
//!     .parse("SELECT id, name FROM Product WHERE name LIKE 'Len%'")
//!     .unwrap();
//! let options = OpenDataFormatter::default().format(&query).unwrap();
//! assert_eq!(options["$filter"], "startswith(name,'Len') eq true");
//! ```

pub mod adapter;
pub mod closure;
pub mod config;
pub mod error;
pub mod odata;
pub mod query;
pub mod resolve;
pub mod sql;

pub use error::{QueryError, QueryResult};
pub use query::QueryExpression;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::closure::{lambda, ClosureParser, Lambda, Params, Syntax};
    pub use crate::error::{ErrorCategory, QueryError, QueryResult};
    pub use crate::odata::{OpenDataFormatter, OpenDataParser, OpenDataQueryExpression};
    pub use crate::query::{
        field, lit_bool, lit_float, lit_int, lit_null, lit_str, Expr, ExprExt, JoinDirection,
        Literal, OrderByExpr, QueryEntity, QueryExpression, QueryField,
    };
    pub use crate::resolve::{MemberResolver, Resolvers};
    pub use crate::sql::{Dialect, SqlDialect, SqlFormatter, SqlParser};
}
