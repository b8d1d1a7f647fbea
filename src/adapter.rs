//! Storage adapter seam.
//!
//! The library never talks to a database. An adapter receives the IR and
//! decides how to run it, usually by formatting it with a
//! [`SqlFormatter`](crate::sql::SqlFormatter) for its engine.

use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::query::QueryExpression;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// Executes queries against a store.
///
/// # Example
///
/// ```
/// use queryshape::adapter::{DataAdapter, Row};
/// use queryshape::error::QueryError;
/// use queryshape::query::QueryExpression;
/// use queryshape::sql::{Dialect, SqlFormatter};
///
/// #[derive(Default)]
/// struct Recorder {
///     statements: Vec<String>,
/// }
///
/// impl DataAdapter for Recorder {
///     type Error = QueryError;
///
///     fn execute(&mut self, query: &QueryExpression) -> Result<Vec<Row>, QueryError> {
///         let sql = SqlFormatter::for_dialect(Dialect::Sqlite).format(query)?;
///         self.statements.push(sql);
///         Ok(Vec::new())
///     }
///
///     fn execute_in_transaction<F, T>(&mut self, f: F) -> Result<T, QueryError>
///     where
///         F: FnOnce(&mut Self) -> Result<T, QueryError>,
///     {
///         f(self)
///     }
/// }
///
/// let mut query = QueryExpression::new();
/// query.from_collection("Product");
/// let mut recorder = Recorder::default();
/// recorder.execute(&query).unwrap();
/// assert_eq!(recorder.statements, ["SELECT * FROM `Product`"]);
/// ```
pub trait DataAdapter {
    /// Must absorb translation failures.
    type Error: From<QueryError>;

    /// Run one statement; writes return no rows.
    fn execute(&mut self, query: &QueryExpression) -> Result<Vec<Row>, Self::Error>;

    /// Run `f` inside one transaction, committing on `Ok` and rolling
    /// back on `Err`.
    fn execute_in_transaction<F, T>(&mut self, f: F) -> Result<T, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Self::Error>,
        Self: Sized;

    /// Run every query in one transaction and collect the row sets.
    fn execute_all(&mut self, queries: &[QueryExpression]) -> Result<Vec<Vec<Row>>, Self::Error>
    where
        Self: Sized,
    {
        self.execute_in_transaction(|adapter| queries.iter().map(|q| adapter.execute(q)).collect())
    }
}
