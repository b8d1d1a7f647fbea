//! Closure front-end tests: lambdas driven through the builder, parameter
//! binding for joins, and resolver hooks.

use queryshape::closure::{lambda, CmpOp, ClosureParser, Params, Syntax};
use queryshape::query::{
    field, ArithmeticOperator, Expr, ExprExt, Func, JoinCondition, JoinDirection, OrderByExpr,
    QueryExpression, QueryField,
};
use queryshape::resolve::{MemberEvent, MemberResolver, MethodEvent, Resolvers};
use queryshape::{QueryError, QueryResult};

fn no_args() -> Vec<Syntax> {
    Vec::new()
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_where_closure_replaces_filter() {
    let mut q = QueryExpression::new();
    q.from_collection("Product");
    q.where_field("stale").equal(1).unwrap();
    q.where_closure(&lambda(["x"], |[x]| {
        x.attr("category")
            .eq("Laptops")
            .and(x.attr("price").lt(1000))
    }))
    .unwrap();

    assert_eq!(
        q.filter(),
        Some(&field("category").eq("Laptops").and(field("price").lt(1000)))
    );
}

#[test]
fn test_named_parameters_are_substituted() {
    let l = lambda(["x"], |[x]| {
        Syntax::name("low")
            .le(x.attr("price"))
            .chain(CmpOp::LtE, Syntax::name("high"))
    });
    let params = Params::new().with("low", 500).with("high", 1000);

    let mut q = QueryExpression::new();
    q.from_collection("Product");
    q.where_closure_with(&l, &params).unwrap();
    assert_eq!(
        q.filter(),
        Some(&Expr::between(field("price"), 500.into(), 1000.into()))
    );
}

#[test]
fn test_string_methods_become_patterns() {
    let l = lambda(["x"], |[x]| {
        x.attr("name")
            .method("startswith", ["Len"])
            .or(x.attr("name").method("endswith", ["book"]))
            .or(x.attr("name").method("contains", ["Pro"]))
    });
    let filter = ClosureParser::new()
        .parse_filter(&l, &Params::default())
        .unwrap();
    assert_eq!(
        filter,
        Expr::starts_with(field("name"), "Len").or(Expr::ends_with(field("name"), "book")
            .or(Expr::contains(field("name"), "Pro")))
    );
}

#[test]
fn test_pattern_methods_need_constants() {
    let l = lambda(["x"], |[x]| x.attr("name").method("startswith", [x.attr("prefix")]));
    let err = ClosureParser::new()
        .parse_filter(&l, &Params::default())
        .unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedConstruct(_)));
}

#[test]
fn test_conditional_and_negation() {
    let l = lambda(["x"], |[x]| {
        x.attr("price")
            .if_else(x.attr("on_sale").not(), 0)
            .gt(Syntax::from(5).neg())
    });
    let filter = ClosureParser::new()
        .parse_filter(&l, &Params::default())
        .unwrap();
    assert_eq!(
        filter,
        Expr::cond(field("on_sale").not(), field("price"), 0.into()).gt(-5)
    );

    let l = lambda(["x"], |[x]| x.attr("delta").neg().lt(0));
    let filter = ClosureParser::new()
        .parse_filter(&l, &Params::default())
        .unwrap();
    assert_eq!(
        filter,
        Expr::arithmetic(ArithmeticOperator::Subtract, 0.into(), field("delta")).lt(0)
    );
}

#[test]
fn test_keyword_call_in_filter_is_rejected() {
    let l = lambda(["x"], |[x]| Syntax::call_kw("dict", [("a", x.attr("a"))]).eq(1));
    let err = ClosureParser::new()
        .parse_filter(&l, &Params::default())
        .unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedConstruct(_)));
}

// =============================================================================
// Projection, Ordering, Grouping
// =============================================================================

#[test]
fn test_select_closure_shapes() {
    let mut q = QueryExpression::new();
    q.from_collection("Product");
    q.select_closure(&lambda(["x"], |[x]| {
        Syntax::dict([
            ("label", x.attr("name").method("upper", no_args())),
            ("size", Syntax::call("len", [x.attr("name")])),
        ])
    }))
    .unwrap();

    assert_eq!(
        q.fields(),
        &[
            QueryField::computed("label", Expr::call(Func::ToUpper, vec![field("name")])),
            QueryField::computed("size", Expr::call(Func::Length, vec![field("name")])),
        ]
    );
}

#[test]
fn test_order_and_group_closures() {
    let mut q = QueryExpression::new();
    q.from_collection("Product");
    q.group_by_closure(&lambda(["x"], |[x]| Syntax::tuple([x.attr("category")])))
        .unwrap();
    q.order_by_descending_closure(&lambda(["x"], |[x]| x.attr("price")))
        .unwrap()
        .then_by_closure(&lambda(["x"], |[x]| x.attr("name")))
        .unwrap();

    assert_eq!(q.grouping(), &[field("category")]);
    assert_eq!(
        q.ordering(),
        &[OrderByExpr::desc(field("price")), OrderByExpr::asc(field("name"))]
    );
}

#[test]
fn test_then_by_closure_without_order() {
    let mut q = QueryExpression::new();
    let err = q
        .then_by_closure(&lambda(["x"], |[x]| x.attr("name")))
        .unwrap_err();
    assert_eq!(err, QueryError::OrderByNotInitialized);
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn test_on_closure_binds_both_sides() {
    let mut q = QueryExpression::new();
    q.from_collection("Order")
        .join_with("Customer", JoinDirection::Inner, Some("c"))
        .on_closure(&lambda(["o", "c"], |[o, c]| {
            o.attr("customer_id").eq(c.attr("id"))
        }))
        .unwrap();

    assert_eq!(
        q.lookups()[0].condition,
        JoinCondition::Filter(field("Order.customer_id").eq(field("c.id")))
    );
}

#[test]
fn test_multi_parameter_filter_after_join() {
    let mut q = QueryExpression::new();
    q.from_collection("Order")
        .join_with("Customer", JoinDirection::Left, Some("c"))
        .on_fields("customer_id", "id")
        .unwrap();
    q.where_closure(&lambda(["o", "c"], |[o, c]| {
        o.attr("total").gt(100).and(c.attr("country").eq("NO"))
    }))
    .unwrap();

    assert_eq!(
        q.filter(),
        Some(&field("Order.total").gt(100).and(field("c.country").eq("NO")))
    );
}

// =============================================================================
// Resolvers
// =============================================================================

/// Maps `price` to its column and claims an `is_expensive()` method.
struct Catalog;

impl MemberResolver for Catalog {
    fn resolving_member(&self, event: &mut MemberEvent) {
        if event.member == "price" {
            event.resolved = Some("unit_price".into());
        }
    }

    fn resolving_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
        if event.name == "is_expensive" {
            match event.args.as_slice() {
                [receiver] => event.resolved = Some(receiver.clone().gt(1000)),
                _ => return Err(QueryError::UnsupportedArgumentType("is_expensive".into())),
            }
        }
        Ok(())
    }
}

#[test]
fn test_resolvers_rename_members_and_claim_methods() {
    let mut q = QueryExpression::new();
    q.from_collection("Product")
        .with_resolvers(Resolvers::new().with(Catalog));
    q.where_closure(&lambda(["x"], |[x]| {
        x.attr("price").method("is_expensive", no_args())
    }))
    .unwrap();

    assert_eq!(q.filter(), Some(&field("unit_price").gt(1000)));
}

#[test]
fn test_resolver_errors_abort_the_parse() {
    let parser = ClosureParser::new().with_resolvers(Resolvers::new().with(Catalog));
    let l = lambda(["x"], |[x]| x.attr("price").method("is_expensive", [1]));
    let err = parser.parse_filter(&l, &Params::default()).unwrap_err();
    assert_eq!(err, QueryError::UnsupportedArgumentType("is_expensive".into()));
}
