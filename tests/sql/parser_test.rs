//! SQL parser tests: SELECT statements into the IR, and on to OData.

use queryshape::error::ErrorCategory;
use queryshape::odata::OpenDataFormatter;
use queryshape::query::{field, Expr, ExprExt, Func, JoinCondition, JoinDirection, OrderByExpr};
use queryshape::resolve::{MemberEvent, MemberResolver, Resolvers};
use queryshape::sql::{Dialect, SqlParser};
use queryshape::QueryError;
use serde_json::{json, Value};

fn odata(sql: &str) -> Value {
    odata_with(SqlParser::new(), sql)
}

fn odata_with(parser: SqlParser, sql: &str) -> Value {
    let query = parser
        .parse(sql)
        .unwrap_or_else(|e| panic!("{} failed: {}", sql, e));
    Value::Object(OpenDataFormatter::default().format(&query).unwrap())
}

// =============================================================================
// SQL to OData
// =============================================================================

#[test]
fn test_select_with_computed_column() {
    assert_eq!(
        odata("SELECT id,name,ROUND(price,2) as price FROM Product WHERE category='Laptops'"),
        json!({
            "$select": "id,name,round(price,2) as price",
            "$filter": "(category eq 'Laptops')"
        })
    );
}

#[test]
fn test_like_patterns() {
    assert_eq!(
        odata("SELECT * FROM Product WHERE name LIKE 'Len%'"),
        json!({"$filter": "startswith(name,'Len') eq true"})
    );
    assert_eq!(
        odata("SELECT * FROM Product WHERE name LIKE '%Pro%' AND price < 1000"),
        json!({"$filter": "(contains(name,'Pro') eq true) and (price lt 1000)"})
    );
    assert_eq!(
        odata("SELECT * FROM Product WHERE name NOT LIKE '%book'"),
        json!({"$filter": "endswith(name,'book') eq false"})
    );
}

#[test]
fn test_between() {
    assert_eq!(
        odata("SELECT * FROM Product WHERE price BETWEEN 500 AND 1000"),
        json!({"$filter": "(price ge 500) and (price le 1000)"})
    );
}

#[test]
fn test_mysql_limit_comma() {
    let parser = SqlParser::for_dialect(Dialect::MySql);
    assert_eq!(
        odata_with(parser, "SELECT * FROM Product LIMIT 20, 10"),
        json!({"$top": 10, "$skip": 20, "$count": true})
    );
}

#[test]
fn test_order_by() {
    assert_eq!(
        odata("SELECT * FROM Product ORDER BY price DESC, name"),
        json!({"$orderby": "price desc,name"})
    );
}

// =============================================================================
// IR Shape
// =============================================================================

#[test]
fn test_joins_keep_aliases() {
    let query = SqlParser::new()
        .parse("SELECT o.id, c.name FROM Orders o LEFT JOIN Customer c ON o.customer_id = c.id")
        .unwrap();

    let entity = query.collection().unwrap();
    assert_eq!((entity.collection(), entity.alias()), ("Orders", Some("o")));

    let [lookup] = query.lookups() else {
        panic!("expected one lookup, got {:?}", query.lookups());
    };
    assert_eq!(lookup.direction, JoinDirection::Left);
    assert_eq!(lookup.reference(), Some("c"));
    assert_eq!(
        lookup.condition,
        JoinCondition::Filter(field("o.customer_id").eq(field("c.id")))
    );
}

#[test]
fn test_grouping_and_distinct() {
    let query = SqlParser::new()
        .parse("SELECT DISTINCT category, COUNT(*) AS n FROM Product GROUP BY category")
        .unwrap();
    assert!(query.is_distinct());
    assert_eq!(query.grouping(), &[field("category")]);
    assert_eq!(query.fields()[1].name(), "n");
    assert_eq!(query.fields()[1].expr(), Some(&Expr::call(Func::Count, vec![])));
}

#[test]
fn test_case_expression() {
    let expr = SqlParser::new()
        .parse_expr("CASE WHEN price > 10 THEN 'high' ELSE 'low' END = 'high'")
        .unwrap();
    assert_eq!(
        expr,
        Expr::cond(field("price").gt(10), "high".into(), "low".into()).eq("high")
    );
}

#[test]
fn test_paging_and_ordering_in_ir() {
    let query = SqlParser::new()
        .parse("SELECT * FROM Product ORDER BY name LIMIT 5 OFFSET 15")
        .unwrap();
    assert!(query.fields().is_empty());
    assert_eq!(query.ordering(), &[OrderByExpr::asc(field("name"))]);
    assert_eq!((query.limit(), query.offset()), (5, 15));
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_non_select_statements() {
    let err = SqlParser::new()
        .parse("DELETE FROM Product WHERE id = 1")
        .unwrap_err();
    assert_eq!(err, QueryError::UnsupportedStatementKind("DELETE".into()));
    assert_eq!(err.category(), ErrorCategory::UnsupportedStatementKind);
}

#[test]
fn test_syntax_errors() {
    let err = SqlParser::new().parse("SELEC * FORM Product").unwrap_err();
    assert!(matches!(err, QueryError::SqlSyntax(_)));
}

#[test]
fn test_multiple_statements() {
    let err = SqlParser::new()
        .parse("SELECT * FROM a; SELECT * FROM b")
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnsupportedConstruct);
}

// =============================================================================
// Resolvers
// =============================================================================

/// Renames `price` to its physical column.
struct Columns;

impl MemberResolver for Columns {
    fn resolving_member(&self, event: &mut MemberEvent) {
        if event.member == "price" {
            event.resolved = Some("unit_price".into());
        }
    }
}

#[test]
fn test_columns_go_through_resolvers() {
    let parser = SqlParser::new().with_resolvers(Resolvers::new().with(Columns));
    assert_eq!(
        parser.parse_expr("price > 5 AND name = 'x'").unwrap(),
        field("unit_price").gt(5).and(field("name").eq("x"))
    );
}
