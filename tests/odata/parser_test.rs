//! OData parser tests: `$filter` grammar, literal typing, option parsing
//! and `$expand` nesting.

use queryshape::error::{ParseError, SyntaxErrorKind};
use queryshape::odata::{Levels, OpenDataFormatter, OpenDataParser};
use queryshape::query::{
    field, Expr, ExprExt, Func, Literal, OrderByExpr, QueryField,
};
use queryshape::resolve::{JoinMemberEvent, MemberResolver, Resolvers};
use queryshape::QueryError;
use rust_decimal::Decimal;

fn parse(text: &str) -> Expr {
    OpenDataParser::new()
        .parse(text)
        .unwrap_or_else(|e| panic!("{} failed: {}", text, e))
}

fn syntax_error(text: &str) -> ParseError {
    match OpenDataParser::new().parse(text) {
        Err(QueryError::Syntax(e)) => e,
        other => panic!("expected a syntax error for {:?}, got {:?}", text, other),
    }
}

// =============================================================================
// Grammar
// =============================================================================

#[test]
fn test_arithmetic_binds_tighter_than_comparison() {
    assert_eq!(parse("price add 50 gt 100"), field("price").add(50).gt(100));
    assert_eq!(
        parse("price sub 10 sub 5 eq 0"),
        field("price").sub(10).sub(5).eq(0)
    );
    assert_eq!(
        parse("(price add 1) mul 2 le 10"),
        field("price").add(1).mul(2).lte(10)
    );
}

#[test]
fn test_not_and_grouping() {
    assert_eq!(
        parse("not (a eq 1 or b eq 2) and c eq 3"),
        field("a").eq(1).or(field("b").eq(2)).not().and(field("c").eq(3))
    );
}

#[test]
fn test_connectives_are_case_insensitive() {
    assert_eq!(
        parse("price gt 5 AND NOT name eq 'x'"),
        field("price").gt(5).and(field("name").eq("x").not())
    );
}

#[test]
fn test_functions() {
    assert_eq!(
        parse("year(created) eq 2024"),
        Expr::call(Func::Year, vec![field("created")]).eq(2024)
    );
    assert_eq!(
        parse("substring(name,1,3) eq 'eno'"),
        Expr::call(Func::Substr, vec![field("name"), 1.into(), 3.into()]).eq("eno")
    );
    assert_eq!(
        parse("concat(concat(first,' '),last) eq 'Ada Lovelace'"),
        Expr::call(
            Func::Concat,
            vec![Expr::call(Func::Concat, vec![field("first"), " ".into()]), field("last")]
        )
        .eq("Ada Lovelace")
    );
    assert_eq!(
        parse("indexof(toupper(name),'X') ge 0"),
        Expr::call(
            Func::IndexOf,
            vec![Expr::call(Func::ToUpper, vec![field("name")]), "X".into()]
        )
        .gte(0)
    );
}

#[test]
fn test_pattern_functions_need_constants() {
    let err = OpenDataParser::new().parse("startswith(name,code)").unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedArgumentType(_)));
}

// =============================================================================
// Literals
// =============================================================================

#[test]
fn test_literal_typing() {
    let literal = |text: &str| match parse(&format!("x eq {}", text)) {
        Expr::Compare { right, .. } => match *right {
            Expr::Literal(lit) => lit,
            other => panic!("not a literal: {:?}", other),
        },
        other => panic!("not a comparison: {:?}", other),
    };
    assert_eq!(literal("900"), Literal::Int(900));
    assert_eq!(literal("900L"), Literal::Long(900));
    assert_eq!(literal("900.5"), Literal::Double(900.5));
    assert_eq!(literal("900.5M"), Literal::Decimal(Decimal::new(9005, 1)));
    assert_eq!(literal("2.5F"), Literal::Single(2.5));
    assert_eq!(literal("2D"), Literal::Double(2.0));
    assert_eq!(literal("-7"), Literal::Int(-7));
    assert_eq!(literal("'it''s'"), Literal::String("it's".into()));
    assert_eq!(literal("null"), Literal::Null);
    assert_eq!(
        literal("datetime'2024-01-31'"),
        Literal::DateTime("2024-01-31".into())
    );
    assert_eq!(literal("time'10:30'"), Literal::Time("10:30".into()));
}

#[test]
fn test_invalid_literals() {
    let err = syntax_error("x eq 12abc");
    assert!(matches!(err.kind, SyntaxErrorKind::InvalidLiteral(_)));
    assert_eq!(err.offset(), 5);

    let err = syntax_error("x eq datetime'yesterday'");
    assert!(matches!(err.kind, SyntaxErrorKind::InvalidLiteral(_)));
}

// =============================================================================
// Syntax Errors
// =============================================================================

#[test]
fn test_error_offsets() {
    let err = syntax_error("name eq 'abc");
    assert_eq!(err.kind, SyntaxErrorKind::UnterminatedString);
    assert_eq!(err.offset(), 8);

    let err = syntax_error("price # 10");
    assert_eq!(err.kind, SyntaxErrorKind::UnknownSyntaxCharacter('#'));
    assert_eq!(err.offset(), 6);

    let err = syntax_error("price gt eq 5");
    assert_eq!(err.kind, SyntaxErrorKind::ExpectedOperand);
    assert_eq!(err.offset(), 9);

    let err = syntax_error("(price gt 5");
    assert_eq!(err.offset(), 11);
}

#[test]
fn test_report_points_at_offset() {
    let source = "price gt 5 )";
    let err = syntax_error(source);
    let report = err.report(source);
    assert!(report.contains("unexpected token"), "{}", report);
}

// =============================================================================
// Sequences
// =============================================================================

#[test]
fn test_select_sequence() {
    let fields = OpenDataParser::new()
        .parse_select_sequence("id,customer/name,tolower(name) as lname")
        .unwrap();
    assert_eq!(
        fields,
        vec![
            QueryField::new("id"),
            QueryField::new("customer.name"),
            QueryField::computed("lname", Expr::call(Func::ToLower, vec![field("name")])),
        ]
    );
}

#[test]
fn test_order_and_group_sequences() {
    let parser = OpenDataParser::new();
    assert_eq!(
        parser.parse_order_by_sequence("year(created) desc,name asc").unwrap(),
        vec![
            OrderByExpr::desc(Expr::call(Func::Year, vec![field("created")])),
            OrderByExpr::asc(field("name")),
        ]
    );
    assert_eq!(
        parser.parse_group_by_sequence("category,brand").unwrap(),
        vec![field("category"), field("brand")]
    );
}

// =============================================================================
// Query Options
// =============================================================================

#[test]
fn test_parse_query_applies_options() {
    let parsed = OpenDataParser::new()
        .parse_query(
            "Product",
            [
                ("$select", "id,name"),
                ("$filter", "price gt 100"),
                ("$orderby", "price desc"),
                ("$top", "10"),
                ("$skip", "20"),
                ("$count", "true"),
                ("api-version", "2"),
            ],
        )
        .unwrap();

    let q = &parsed.query;
    assert_eq!(q.collection().unwrap().collection(), "Product");
    assert_eq!(q.fields().len(), 2);
    assert_eq!(q.filter(), Some(&field("price").gt(100)));
    assert_eq!(q.ordering(), &[OrderByExpr::desc(field("price"))]);
    assert_eq!((q.limit(), q.offset()), (10, 20));
    assert!(parsed.count);
}

#[test]
fn test_unknown_option_is_reported_not_applied() {
    let parser = OpenDataParser::new();
    let mut parsed = parser.parse_query("Product", [("$top", "5")]).unwrap();
    let before = parsed.clone();
    assert!(!parser.apply_query_option(&mut parsed, "$format", "json").unwrap());
    assert_eq!(parsed, before);
    assert!(parser.apply_query_option(&mut parsed, " $skip ", "3").unwrap());
    assert_eq!(parsed.query.offset(), 3);
}

#[test]
fn test_paging_values_must_be_integers() {
    let err = OpenDataParser::new()
        .parse_query("Product", [("$top", "ten")])
        .unwrap_err();
    assert!(matches!(err, QueryError::Syntax(_)));
}

// =============================================================================
// Expand
// =============================================================================

#[test]
fn test_expand_paths_and_options() {
    let items = OpenDataParser::new()
        .parse_expand_sequence("customer/address,lines($select=sku,qty;$top=5;$expand=product)")
        .unwrap();
    assert_eq!(items.len(), 2);

    let customer = &items[0];
    assert_eq!(customer.name(), Some("customer"));
    assert_eq!(customer.expand.len(), 1);
    assert_eq!(customer.expand[0].name(), Some("address"));

    let lines = &items[1];
    assert_eq!(lines.name(), Some("lines"));
    let names: Vec<&str> = lines.query.fields().iter().map(QueryField::name).collect();
    assert_eq!(names, ["sku", "qty"]);
    assert_eq!(lines.query.limit(), 5);
    assert_eq!(lines.expand[0].name(), Some("product"));
}

#[test]
fn test_expand_filter_and_levels() {
    let items = OpenDataParser::new()
        .parse_expand_sequence("reports($filter=active eq true and level gt 1;$levels=max),manager($levels=2)")
        .unwrap();
    assert_eq!(
        items[0].query.filter(),
        Some(&field("active").eq(true).and(field("level").gt(1)))
    );
    assert_eq!(items[0].levels, Some(Levels::Max));
    assert_eq!(items[1].levels, Some(Levels::Count(2)));
}

#[test]
fn test_repeated_expand_merges() {
    let parsed = OpenDataParser::new()
        .parse_query("Order", [("$expand", "customer/address,customer/orders")])
        .unwrap();
    assert_eq!(parsed.expand.len(), 1);
    let nested: Vec<_> = parsed.expand[0].expand.iter().filter_map(|e| e.name()).collect();
    assert_eq!(nested, ["address", "orders"]);
}

#[test]
fn test_repeated_expand_keeps_item_options() {
    let parsed = OpenDataParser::new()
        .parse_query("Order", [("$expand", "items/product,items($top=5;$select=sku)")])
        .unwrap();
    let options = OpenDataFormatter::default().format_expanded(&parsed).unwrap();
    assert_eq!(options["$expand"], "items($select=sku;$expand=product;$top=5)");
}

#[test]
fn test_repeated_expand_with_conflicting_options() {
    let err = OpenDataParser::new()
        .parse_query("Order", [("$expand", "items($top=5),items($top=10)")])
        .unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedConstruct(_)), "{:?}", err);
}

#[test]
fn test_unknown_expand_option() {
    let err = OpenDataParser::new()
        .parse_expand_sequence("lines($frobnicate=1)")
        .unwrap_err();
    let QueryError::Syntax(err) = err else {
        panic!("expected a syntax error, got {:?}", err);
    };
    assert_eq!(err.kind, SyntaxErrorKind::UnexpectedToken("$frobnicate".into()));
    assert_eq!(err.offset(), 6);
}

// =============================================================================
// Resolvers
// =============================================================================

/// Maps navigation paths onto joined column names.
struct Navigation;

impl MemberResolver for Navigation {
    fn resolving_join_member(&self, event: &mut JoinMemberEvent) {
        event.resolved = Some(format!("{}_{}", event.fully_qualified_name, event.member));
    }
}

#[test]
fn test_member_paths_go_through_resolvers() {
    let parser = OpenDataParser::new().with_resolvers(Resolvers::new().with(Navigation));
    assert_eq!(
        parser.parse("customer/city eq 'Oslo'").unwrap(),
        field("customer_city").eq("Oslo")
    );
}
