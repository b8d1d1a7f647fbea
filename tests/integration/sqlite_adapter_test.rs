//! A `DataAdapter` over an in-memory SQLite database, running the SQL the
//! SQLite dialect writes.

use queryshape::adapter::{DataAdapter, Row};
use queryshape::closure::{lambda, Syntax};
use queryshape::odata::OpenDataParser;
use queryshape::query::{field, Expr, QueryExpression, StatementKind};
use queryshape::sql::{Dialect, SqlFormatter};
use queryshape::QueryError;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
enum AdapterError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

struct SqliteAdapter {
    conn: Connection,
}

impl SqliteAdapter {
    fn open() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Product (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL NOT NULL,
                active INTEGER NOT NULL,
                created TEXT NOT NULL
            );",
        )
        .unwrap();
        Self { conn }
    }

    fn count(&self) -> i64 {
        self.conn
            .query_row("SELECT COUNT(*) FROM Product", [], |row| row.get(0))
            .unwrap()
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

impl DataAdapter for SqliteAdapter {
    type Error = AdapterError;

    fn execute(&mut self, query: &QueryExpression) -> Result<Vec<Row>, AdapterError> {
        let sql = SqlFormatter::for_dialect(Dialect::Sqlite).format(query)?;
        if query.statement_kind() != StatementKind::Select {
            self.conn.execute(&sql, [])?;
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), json_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn execute_in_transaction<F, T>(&mut self, f: F) -> Result<T, AdapterError>
    where
        F: FnOnce(&mut Self) -> Result<T, AdapterError>,
    {
        self.conn.execute_batch("BEGIN")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                self.conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }
}

fn insert(data: Value) -> QueryExpression {
    let mut q = QueryExpression::new();
    q.insert(&data).unwrap().into("Product").unwrap();
    q
}

fn seeded() -> SqliteAdapter {
    let mut adapter = SqliteAdapter::open();
    let rows = [
        json!({"id": 1, "name": "Lenovo ThinkPad", "category": "Laptops", "price": 1200, "active": true, "created": "2024-03-01"}),
        json!({"id": 2, "name": "Lenovo IdeaPad", "category": "Laptops", "price": 650, "active": false, "created": "2023-11-20"}),
        json!({"id": 3, "name": "MacBook Pro", "category": "Laptops", "price": 2400, "active": true, "created": "2024-06-15"}),
        json!({"id": 4, "name": "USB Cable", "category": "Accessories", "price": 9.5, "active": true, "created": "2022-01-05"}),
    ];
    let inserts: Vec<QueryExpression> = rows.into_iter().map(insert).collect();
    adapter.execute_all(&inserts).unwrap();
    adapter
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(|r| r["id"].as_i64()).collect()
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_builder_query() {
    let mut adapter = seeded();
    let mut q = QueryExpression::new();
    q.from_collection("Product").select(["id", "name"]);
    q.where_field("name").starts_with("Lenovo").unwrap();
    q.and_also("active").equal(true).unwrap();

    let rows = adapter.execute(&q).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Lenovo ThinkPad");
}

#[test]
fn test_text_predicates_are_case_sensitive() {
    let mut adapter = seeded();
    adapter
        .execute(&insert(json!({"id": 9, "name": "lenovo pro cable", "category": "Accessories", "price": 3, "active": true, "created": "2024-02-02"})))
        .unwrap();

    let matching = |adapter: &mut SqliteAdapter, expr: Expr| {
        let mut q = QueryExpression::new();
        q.from_collection("Product").select(["id"]);
        q.where_expr(expr);
        q.order_by("id");
        ids(&adapter.execute(&q).unwrap())
    };

    let name = || field("name");
    assert_eq!(matching(&mut adapter, Expr::starts_with(name(), "Lenovo")), [1, 2]);
    assert_eq!(matching(&mut adapter, Expr::ends_with(name(), "Cable")), [4]);
    assert_eq!(matching(&mut adapter, Expr::contains(name(), "Pro")), [3]);
    assert_eq!(
        matching(&mut adapter, Expr::regex_match(name(), "^lenovo", Some("i".into()))),
        [1, 2, 9]
    );
}

#[test]
fn test_closure_query_with_paging() {
    let mut adapter = seeded();
    let mut q = QueryExpression::new();
    q.from_collection("Product").select(["id"]);
    q.where_closure(&lambda(["x"], |[x]| {
        x.attr("category")
            .eq("Laptops")
            .and(Syntax::call("year", [x.attr("created")]).eq(2024))
    }))
    .unwrap();
    q.order_by_descending("price").skip(1);

    // Only the offset is set, so SQLite needs its unbounded LIMIT.
    assert_eq!(ids(&adapter.execute(&q).unwrap()), [1]);
}

#[test]
fn test_odata_query() {
    let mut adapter = seeded();
    let parsed = OpenDataParser::new()
        .parse_query(
            "Product",
            [
                ("$select", "id,toupper(name) as label"),
                ("$filter", "price ge 500 and not contains(name,'Mac')"),
                ("$orderby", "price"),
            ],
        )
        .unwrap();

    let rows = adapter.execute(&parsed.query).unwrap();
    assert_eq!(ids(&rows), [2, 1]);
    assert_eq!(rows[0]["label"], "LENOVO IDEAPAD");
}

#[test]
fn test_substring_and_arithmetic() {
    let mut adapter = seeded();
    let mut q = QueryExpression::new();
    q.from_collection("Product").select(["id"]);
    q.where_expr(
        OpenDataParser::new()
            .parse("substring(name,0,3) eq 'Len' and price mul 2 gt 2000")
            .unwrap(),
    );
    assert_eq!(ids(&adapter.execute(&q).unwrap()), [1]);
}

// =============================================================================
// Writes
// =============================================================================

#[test]
fn test_update_and_delete() {
    let mut adapter = seeded();

    let mut update = QueryExpression::new();
    update.update("Product").unwrap().set(&json!({"price": 5})).unwrap();
    update.where_field("category").equal("Accessories").unwrap();
    adapter.execute(&update).unwrap();

    let mut delete = QueryExpression::new();
    delete.delete("Product").unwrap();
    delete.where_field("active").equal(false).unwrap();
    adapter.execute(&delete).unwrap();

    let mut read = QueryExpression::new();
    read.from_collection("Product").select(["id", "price"]);
    read.where_field("price").lower_than(10).unwrap();
    let rows = adapter.execute(&read).unwrap();
    assert_eq!(ids(&rows), [4]);
    assert_eq!(rows[0]["price"].as_f64(), Some(5.0));
    assert_eq!(adapter.count(), 3);
}

#[test]
fn test_failed_batch_rolls_back() {
    let mut adapter = seeded();
    let mut missing = QueryExpression::new();
    missing.delete("Missing").unwrap();

    let batch = [
        insert(json!({"id": 5, "name": "Dock", "category": "Accessories", "price": 120, "active": true, "created": "2024-01-01"})),
        missing,
    ];
    let err = adapter.execute_all(&batch).unwrap_err();
    assert!(matches!(err, AdapterError::Sqlite(_)));
    assert_eq!(adapter.count(), 4);
}

#[test]
fn test_translation_errors_surface() {
    let mut adapter = seeded();
    let mut q = QueryExpression::new();
    q.update("Product").unwrap();
    let err = adapter.execute(&q).unwrap_err();
    assert!(matches!(err, AdapterError::Query(QueryError::EmptyPayload("UPDATE"))));
}
