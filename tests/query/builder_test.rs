//! Builder tests: filter folding, pending-operand helpers, joins, ordering
//! and write payloads observed through the public API.

use queryshape::query::{
    field, Expr, ExprExt, Func, JoinCondition, JoinDirection, LogicalOperator, Payload,
    QueryExpression, QueryField, StatementKind,
};
use queryshape::QueryError;
use serde_json::json;

fn products() -> QueryExpression {
    let mut q = QueryExpression::new();
    q.from_collection("Product");
    q
}

// =============================================================================
// Filter Folding
// =============================================================================

#[test]
fn test_same_connective_builds_flat_list() {
    let mut q = products();
    q.where_field("a").equal(1).unwrap();
    q.and_also("b").equal(2).unwrap();
    q.and_also("c").equal(3).unwrap();

    let Some(Expr::Logical { op, args }) = q.filter() else {
        panic!("expected a logical filter, got {:?}", q.filter());
    };
    assert_eq!(*op, LogicalOperator::And);
    assert_eq!(
        args,
        &vec![field("a").eq(1), field("b").eq(2), field("c").eq(3)]
    );
}

#[test]
fn test_switching_connective_wraps_existing_filter() {
    let mut q = products();
    q.where_field("a").equal(1).unwrap();
    q.and_also("b").equal(2).unwrap();
    q.or_else("c").equal(3).unwrap();

    assert_eq!(
        q.filter(),
        Some(&field("a").eq(1).and(field("b").eq(2)).or(field("c").eq(3)))
    );
}

#[test]
fn test_where_field_restarts_the_chain() {
    let mut q = products();
    q.where_field("a").equal(1).unwrap();
    q.where_field("b").greater_than(2).unwrap();
    assert_eq!(q.filter(), Some(&field("b").gt(2)));
}

#[test]
fn test_failed_call_leaves_expression_untouched() {
    let mut q = products();
    q.where_field("a").equal(1).unwrap();
    let before = q.clone();

    // The operand was consumed by `equal`.
    assert_eq!(q.lower_than(5).unwrap_err(), QueryError::NoPendingOperand);
    assert_eq!(q.starts_with("x").unwrap_err(), QueryError::NoPendingOperand);
    assert_eq!(q.year().unwrap_err(), QueryError::NoPendingOperand);
    assert_eq!(q, before);
}

#[test]
fn test_text_and_range_helpers() {
    let mut q = products();
    q.where_field("name").starts_with("Len").unwrap();
    q.and_also("price").between(500, 1000).unwrap();

    assert_eq!(
        q.filter(),
        Some(
            &Expr::starts_with(field("name"), "Len")
                .and(Expr::between(field("price"), 500.into(), 1000.into()))
        )
    );
}

#[test]
fn test_pending_operand_functions_chain() {
    let mut q = products();
    q.where_field("name")
        .trim()
        .unwrap()
        .to_lower()
        .unwrap()
        .equal("pen")
        .unwrap();
    let expected = Expr::call(
        Func::ToLower,
        vec![Expr::call(Func::Trim, vec![field("name")])],
    )
    .eq("pen");
    assert_eq!(q.filter(), Some(&expected));

    let mut q = products();
    q.where_field("price").multiply(2).unwrap().add(1).unwrap().lower_than(10).unwrap();
    assert_eq!(q.filter(), Some(&field("price").mul(2).add(1).lt(10)));
}

#[test]
fn test_prepare_combines_with_current_filter() {
    let mut q = products();
    q.where_field("a").equal(1).unwrap();
    q.prepare(false);
    q.where_field("b").equal(2).unwrap();
    q.prepare(true);
    q.where_field("c").equal(3).unwrap();

    assert_eq!(q.prepared(), Some(&field("a").eq(1).or(field("b").eq(2))));
    assert_eq!(
        q.effective_filter(),
        Some(field("a").eq(1).or(field("b").eq(2)).and(field("c").eq(3)))
    );
}

// =============================================================================
// Projection
// =============================================================================

#[test]
fn test_field_primitives_keep_their_name() {
    let mut q = products();
    q.select([
        QueryField::new("price").round(Some(2)),
        QueryField::new("name").to_upper().alias("label"),
    ]);
    let names: Vec<&str> = q.fields().iter().map(QueryField::name).collect();
    assert_eq!(names, ["price", "label"]);
    assert_eq!(
        q.fields()[0].expr(),
        Some(&Expr::call(Func::Round, vec![field("price"), 2.into()]))
    );
}

#[test]
fn test_qualifying_a_field_twice_fails() {
    let qualified = QueryField::new("price").from_collection("Product").unwrap();
    assert_eq!(qualified.name(), "Product.price");
    assert!(matches!(
        qualified.from_collection("Other").unwrap_err(),
        QueryError::InvalidExpression(_)
    ));
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn test_join_copies_condition_filter() {
    let mut condition = QueryExpression::new();
    condition
        .where_field("Product.category_id")
        .equal(field("c.id"))
        .unwrap();

    let mut q = products();
    q.join_with("Category", JoinDirection::Left, Some("c"))
        .on(&condition)
        .unwrap();

    // Later edits to the condition builder do not leak into the join.
    condition.and_also("c.active").equal(true).unwrap();

    let [lookup] = q.lookups() else {
        panic!("expected exactly one lookup");
    };
    assert_eq!(lookup.direction, JoinDirection::Left);
    assert_eq!(lookup.reference(), Some("c"));
    assert_eq!(
        lookup.condition,
        JoinCondition::Filter(field("Product.category_id").eq(field("c.id")))
    );
}

#[test]
fn test_on_without_staged_join() {
    let mut q = products();
    assert_eq!(
        q.on_fields("a", "b").unwrap_err(),
        QueryError::JoiningExpressionEmpty
    );
}

// =============================================================================
// Ordering and Paging
// =============================================================================

#[test]
fn test_order_by_resets_then_by_appends() {
    let mut q = products();
    q.order_by("name");
    q.then_by_descending("price").unwrap();
    assert_eq!(q.ordering().len(), 2);

    q.order_by_descending("id");
    assert_eq!(q.ordering().len(), 1);
}

#[test]
fn test_paging_is_stored_as_given() {
    let mut q = products();
    q.take(10).skip(20);
    assert_eq!((q.limit(), q.offset()), (10, 20));
}

// =============================================================================
// Write Statements
// =============================================================================

#[test]
fn test_payload_switches_statement_kind() {
    let mut q = products();
    q.select(["id"]);
    q.insert(&json!({"name": "Pen"})).unwrap().into("Product").unwrap();
    assert_eq!(q.statement_kind(), StatementKind::Insert);
    assert!(q.fields().is_empty());

    q.update("Product")
        .unwrap()
        .set_values([("price", 3)]);
    assert!(matches!(q.payload(), Some(Payload::Update(values)) if values.len() == 1));

    q.select(["id"]);
    assert_eq!(q.statement_kind(), StatementKind::Select);
}

#[test]
fn test_write_targets_are_validated() {
    let mut q = QueryExpression::new();
    assert_eq!(
        q.delete("Product; DROP TABLE x").unwrap_err(),
        QueryError::InvalidCollectionName("Product; DROP TABLE x".into())
    );
    assert!(q.delete("shop.Product").is_ok());
}
