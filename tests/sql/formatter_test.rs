//! SQL formatter tests: per-dialect statements, joins and custom dialects.

use insta::assert_snapshot;
use queryshape::query::{
    field, Expr, ExprExt, Func, JoinDirection, QueryExpression, QueryField,
};
use queryshape::sql::{Dialect, SqlDialect, SqlFormatter, SqlParser};
use queryshape::QueryResult;
use sqlparser::parser::Parser;

fn assert_parses(sql: &str, dialect: Dialect) {
    if let Err(e) = Parser::parse_sql(&*dialect.parser_dialect(), sql) {
        panic!("invalid SQL for {}: {}\n{}", dialect, e, sql);
    }
}

fn paged_products() -> QueryExpression {
    let mut q = QueryExpression::new();
    q.from_collection("Product").select(["id", "name"]);
    q.where_field("active").equal(true).unwrap();
    q.and_also("name").starts_with("Len").unwrap();
    q.skip(5);
    q
}

// =============================================================================
// Dialects
// =============================================================================

#[test]
fn test_generic() {
    let sql = SqlFormatter::for_dialect(Dialect::Generic).format(&paged_products()).unwrap();
    assert_snapshot!(sql, @"SELECT id, name FROM Product WHERE active = TRUE AND REGEXP_LIKE(name, '^Len') OFFSET 5");
}

#[test]
fn test_sqlite() {
    let sql = SqlFormatter::for_dialect(Dialect::Sqlite).format(&paged_products()).unwrap();
    assert_snapshot!(sql, @"SELECT `id`, `name` FROM `Product` WHERE `active` = 1 AND SUBSTR(`name`, 1, 3) = 'Len' LIMIT -1 OFFSET 5");
}

#[test]
fn test_postgres() {
    let sql = SqlFormatter::for_dialect(Dialect::Postgres).format(&paged_products()).unwrap();
    assert_snapshot!(sql, @r#"SELECT "id", "name" FROM "Product" WHERE "active" = true AND "name" ~ '^Len' OFFSET 5"#);
}

#[test]
fn test_mysql() {
    let sql = SqlFormatter::for_dialect(Dialect::MySql).format(&paged_products()).unwrap();
    assert_snapshot!(sql, @"SELECT `id`, `name` FROM `Product` WHERE `active` = 1 AND REGEXP_LIKE(`name`, '^Len') LIMIT 18446744073709551615 OFFSET 5");
}

#[test]
fn test_every_dialect_reparses() {
    let mut q = QueryExpression::new();
    q.from_collection("Product").select([
        QueryField::new("name").to_upper().alias("label"),
        QueryField::new("price").round(Some(2)),
    ]);
    q.where_field("price").multiply(2).unwrap().lower_than(100).unwrap();
    q.or_else("category").equal("Laptops").unwrap();
    q.order_by_descending("price").take(10);

    for dialect in Dialect::ALL {
        let sql = SqlFormatter::for_dialect(dialect).format(&q).unwrap();
        assert_parses(&sql, dialect);
    }
}

#[test]
fn test_concat_per_dialect() {
    let expr = Expr::call(Func::Concat, vec![field("first"), " ".into(), field("last")]);
    let generic = SqlFormatter::for_dialect(Dialect::Generic).format_where(&expr).unwrap();
    let mysql = SqlFormatter::for_dialect(Dialect::MySql).format_where(&expr).unwrap();
    assert_eq!(generic, "(first || ' ' || last)");
    assert_eq!(mysql, "CONCAT(`first`, ' ', `last`)");
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn test_join_condition_matches_where_rendering() {
    let condition = field("Orders.customer_id")
        .eq(field("c.id"))
        .and(field("c.active").eq(true));
    let mut q = QueryExpression::new();
    q.from_collection("Orders");
    q.join_with("Customer", JoinDirection::Inner, Some("c"))
        .on_expr(condition.clone())
        .unwrap();

    let formatter = SqlFormatter::for_dialect(Dialect::Postgres);
    let sql = formatter.format(&q).unwrap();
    let on = formatter.format_where(&condition).unwrap();
    assert!(sql.ends_with(&format!(" ON {}", on)), "{}", sql);
}

#[test]
fn test_sub_select_join() {
    let mut payments = QueryExpression::new();
    payments.from_collection("Payments").select(["order_id"]);
    payments.where_field("amount").greater_than(0).unwrap();

    let mut q = QueryExpression::new();
    q.from_collection("Orders");
    q.join_with(payments, JoinDirection::Inner, Some("p"))
        .on_fields("id", "order_id")
        .unwrap();

    let sql = SqlFormatter::default().format(&q).unwrap();
    assert_snapshot!(sql, @"SELECT * FROM Orders INNER JOIN (SELECT order_id FROM Payments WHERE amount > 0) p ON Orders.id = p.order_id");
    assert_parses(&sql, Dialect::Generic);
}

#[test]
fn test_parsed_join_formats_back() {
    let text = "SELECT o.id, c.name FROM Orders o LEFT JOIN Customer c ON o.customer_id = c.id";
    let query = SqlParser::new().parse(text).unwrap();
    assert_eq!(SqlFormatter::default().format(&query).unwrap(), text);
}

// =============================================================================
// Custom Dialects
// =============================================================================

/// T-SQL spellings for two renderers; everything else keeps the defaults.
#[derive(Debug)]
struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn format_bool(&self, b: bool) -> &'static str {
        if b {
            "1"
        } else {
            "0"
        }
    }

    fn render_length(&self, args: &[Expr]) -> QueryResult<queryshape::sql::TokenStream> {
        self.render_function("LEN", args)
    }
}

#[test]
fn test_custom_dialect_override_is_used_at_depth() {
    let expr = field("a")
        .eq(true)
        .or(Expr::call(Func::Length, vec![field("name")]).gt(3));
    let sql = SqlFormatter::new(&TSql).format_where(&expr).unwrap();
    assert_eq!(sql, "[a] = 1 OR LEN([name]) > 3");
}
