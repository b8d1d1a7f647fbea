//! Document form tests: tag-keyed JSON for expressions and whole queries.

use queryshape::query::{field, Expr, ExprExt, Func, JoinDirection, QueryExpression, QueryField};
use queryshape::QueryError;
use serde_json::json;

// =============================================================================
// Expressions
// =============================================================================

#[test]
fn test_operator_documents() {
    let expr = field("price")
        .gt(100)
        .and(Expr::call(Func::ToLower, vec![field("name")]).eq("pen"));
    assert_eq!(
        expr.to_document(),
        json!({"$and": [
            {"$gt": ["$price", 100]},
            {"$eq": [{"$toLower": ["$name"]}, "pen"]}
        ]})
    );
}

#[test]
fn test_documents_read_back() {
    let exprs = [
        Expr::cond(field("price").gt(10), "high".into(), "low".into()),
        Expr::regex_match(field("name"), "^a.c", Some("i".into())),
        Expr::call(Func::Day, vec![field("created")]),
        field("qty").modulo(2).eq(0).not(),
        Expr::Switch {
            branches: vec![(field("a").eq(1), "one".into())],
            default: None,
        },
    ];
    for expr in exprs {
        assert_eq!(Expr::from_document(&expr.to_document()).unwrap(), expr);
    }
}

#[test]
fn test_dollar_strings_are_fields() {
    assert_eq!(Expr::from_document(&json!("$price")).unwrap(), field("price"));
    assert_eq!(Expr::from_document(&json!("price")).unwrap(), Expr::from("price"));
    assert_eq!(Expr::from_document(&json!("$")).unwrap(), Expr::from("$"));
}

#[test]
fn test_malformed_documents() {
    assert!(matches!(
        Expr::from_document(&json!({"$gt": ["$a"]})).unwrap_err(),
        QueryError::InvalidExpression(_)
    ));
    assert!(matches!(
        Expr::from_document(&json!({"$and": ["$a"]})).unwrap_err(),
        QueryError::InvalidExpression(_)
    ));
    assert!(matches!(
        Expr::from_document(&json!({"$gt": [1, 2], "$lt": [1, 2]})).unwrap_err(),
        QueryError::InvalidExpression(_)
    ));
    assert_eq!(
        Expr::from_document(&json!({"$near": []})).unwrap_err(),
        QueryError::UnknownOperator("$near".into())
    );
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_query_document() {
    let mut q = QueryExpression::new();
    q.from_collection("Product")
        .select([QueryField::new("id"), QueryField::new("price").round(Some(2))]);
    q.where_field("price").greater_than(100).unwrap();
    q.order_by_descending("price").take(5);

    assert_eq!(
        q.to_document(),
        json!({
            "$collection": {"Product": 1},
            "$select": {"id": 1, "price": {"$round": ["$price", 2]}},
            "$where": {"$gt": ["$price", 100]},
            "$order": [{"$expr": "$price", "direction": -1}],
            "$limit": 5
        })
    );
}

#[test]
fn test_lookup_document() {
    let mut q = QueryExpression::new();
    q.from_collection("Order")
        .join_with("Customer", JoinDirection::Left, Some("c"))
        .on_fields("customer_id", "id")
        .unwrap();

    let doc = q.to_document();
    assert_eq!(
        doc["$lookup"],
        json!([{
            "from": "Customer",
            "direction": "left",
            "as": "c",
            "localField": "customer_id",
            "foreignField": "id"
        }])
    );
}

#[test]
fn test_select_document_fragments() {
    let mut q = QueryExpression::new();
    q.select_document(&json!(["id", {"total": {"$sum": ["$price"]}}]))
        .unwrap();
    let names: Vec<&str> = q.fields().iter().map(QueryField::name).collect();
    assert_eq!(names, ["id", "total"]);
    assert_eq!(
        q.fields()[1].expr(),
        Some(&Expr::call(Func::Sum, vec![field("price")]))
    );
}
