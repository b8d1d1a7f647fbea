//! OData formatter tests: option assembly, expansions and dialect overrides.

use insta::assert_snapshot;
use queryshape::closure::{lambda, Syntax};
use queryshape::config::ODataSettings;
use queryshape::odata::{
    query_string, Levels, OpenDataDialect, OpenDataFormatter, OpenDataParser,
    OpenDataQueryExpression,
};
use queryshape::query::{
    field, Expr, ExprExt, Func, JoinDirection, QueryExpression, QueryField, TextPattern,
};
use queryshape::{QueryError, QueryResult};
use serde_json::{json, Value};

fn products() -> QueryExpression {
    let mut q = QueryExpression::new();
    q.from_collection("Product");
    q
}

fn filter_text(expr: &Expr) -> String {
    OpenDataFormatter::default().format_filter(expr).unwrap()
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_builder_filter() {
    let mut q = products();
    q.where_field("category").equal("Laptops").unwrap();
    q.and_also("price").between(500, 1000).unwrap();
    q.or_else("name").starts_with("Len").unwrap();

    let options = OpenDataFormatter::default().format(&q).unwrap();
    assert_snapshot!(
        options["$filter"].as_str().unwrap(),
        @"((category eq 'Laptops') and ((price ge 500) and (price le 1000))) or (startswith(name,'Len') eq true)"
    );
}

#[test]
fn test_arithmetic_and_functions() {
    let expr = field("price")
        .mul(2)
        .add(1)
        .lt(10)
        .and(Expr::call(Func::Year, vec![field("created")]).eq(2024));
    assert_snapshot!(filter_text(&expr), @"(((price mul 2) add 1) lt 10) and (year(created) eq 2024)");
}

#[test]
fn test_negations() {
    assert_eq!(filter_text(&field("a").eq(1).not()), "not (a eq 1)");
    assert_eq!(
        filter_text(&field("a").eq(1).or(field("b").eq(2)).not()),
        "not ((a eq 1) or (b eq 2))"
    );
}

#[test]
fn test_joins_are_not_expressible() {
    let mut q = products();
    q.join_with("Category", JoinDirection::Inner, None)
        .on_fields("category_id", "id")
        .unwrap();
    let err = OpenDataFormatter::default().format(&q).unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedConstruct(_)));
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn test_option_order() {
    let mut q = products();
    q.select([QueryField::new("id"), QueryField::new("price").round(Some(2))]);
    q.where_field("price").greater_than(100).unwrap();
    q.order_by_descending("price");
    q.group_by(["category"]);
    q.take(10).skip(20);

    let options = OpenDataFormatter::default().format(&q).unwrap();
    let keys: Vec<&str> = options.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["$select", "$filter", "$orderby", "$groupby", "$top", "$skip", "$count"]
    );
    assert_eq!(options["$select"], "id,round(price,2) as price");
    assert_eq!(options["$orderby"], "price desc");
    assert_eq!(options["$groupby"], "category");
}

#[test]
fn test_prepared_filter_is_included() {
    let mut q = products();
    q.where_field("active").equal(true).unwrap();
    q.prepare(false);
    q.where_field("price").greater_than(5).unwrap();

    let options = OpenDataFormatter::with_settings(&ODataSettings {
        count_on_paging: false,
        ..ODataSettings::default()
    })
    .format(&q)
    .unwrap();
    assert_eq!(
        Value::Object(options),
        json!({"$filter": "(active eq true) and (price gt 5)"})
    );
}

#[test]
fn test_query_string_encoding() {
    let mut q = products();
    q.where_field("price").greater_than(100).unwrap();
    let options = OpenDataFormatter::default().format(&q).unwrap();
    assert_eq!(query_string(&options).unwrap(), "%24filter=%28price+gt+100%29");
}

// =============================================================================
// Expand
// =============================================================================

#[test]
fn test_expand_from_closure() {
    let mut root = OpenDataQueryExpression::navigation("Order");
    root.expand_closure(&lambda(["x"], |[x]| {
        Syntax::list([x.attr("customer").attr("address"), x.attr("lines")])
    }))
    .unwrap();

    let options = OpenDataFormatter::default().format_expanded(&root).unwrap();
    assert_snapshot!(options["$expand"].as_str().unwrap(), @"customer($expand=address),lines");
}

#[test]
fn test_expand_item_options() {
    let mut lines = OpenDataQueryExpression::navigation("lines");
    lines.query.select(["sku", "qty"]).take(5);
    lines.levels = Some(Levels::Max);

    // Nested items never add an implicit `$count`.
    let text = OpenDataFormatter::default().format_expand_item(&lines).unwrap();
    assert_eq!(text, "lines($select=sku,qty;$top=5;$levels=max)");
}

#[test]
fn test_parsed_expand_formats_back() {
    let parsed = OpenDataParser::new()
        .parse_query(
            "Order",
            [("$expand", "lines($select=sku,qty;$top=5),customer")],
        )
        .unwrap();
    let options = OpenDataFormatter::default().format_expanded(&parsed).unwrap();
    assert_eq!(options["$expand"], "lines($select=sku,qty;$top=5),customer");
}

// =============================================================================
// Dialects
// =============================================================================

/// Spells `contains` the OData v3 way.
#[derive(Debug)]
struct SubstringOf;

impl OpenDataDialect for SubstringOf {
    fn render_regex_match(&self, input: &Expr, regex: &str, options: Option<&str>) -> QueryResult<String> {
        match (TextPattern::from_regex(regex), options) {
            (Some(TextPattern::Contains(text)), None) => Ok(format!("substringof('{}',{})", text, self.escape(input)?)),
            _ => Err(QueryError::UnsupportedConstruct(format!("regex {}", regex))),
        }
    }
}

#[test]
fn test_dialect_override_applies_at_depth() {
    let expr = field("a").eq(1).and(Expr::contains(field("name"), "Pro"));
    let text = OpenDataFormatter::new(&SubstringOf).format_filter(&expr).unwrap();
    assert_eq!(text, "(a eq 1) and (substringof('Pro',name))");
}
