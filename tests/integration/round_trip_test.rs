//! Every front-end meets every formatter in the same IR.

use queryshape::closure::{lambda, ClosureParser, Params, Syntax};
use queryshape::odata::{OpenDataFormatter, OpenDataParser};
use queryshape::query::{field, Expr, ExprExt, Func, QueryExpression};
use queryshape::sql::{Dialect, SqlFormatter, SqlParser};

fn from_closure(l: &queryshape::closure::Lambda) -> Expr {
    ClosureParser::new().parse_filter(l, &Params::default()).unwrap()
}

fn from_odata(text: &str) -> Expr {
    OpenDataParser::new().parse(text).unwrap()
}

fn from_sql(text: &str) -> Expr {
    SqlParser::new().parse_expr(text).unwrap()
}

// =============================================================================
// Front-ends Agree
// =============================================================================

#[test]
fn test_comparison_and_prefix() {
    let mut built = QueryExpression::new();
    built.from_collection("Product");
    built.where_field("price").greater_than(100).unwrap();
    built.and_also("name").starts_with("Len").unwrap();
    let expected = built.filter().cloned().unwrap();

    let closure = from_closure(&lambda(["x"], |[x]| {
        x.attr("price")
            .gt(100)
            .and(x.attr("name").method("startswith", ["Len"]))
    }));
    let odata = from_odata("price gt 100 and startswith(name,'Len')");
    let sql = from_sql("price > 100 AND name LIKE 'Len%'");

    assert_eq!(closure, expected);
    assert_eq!(odata, expected);
    assert_eq!(sql, expected);
}

#[test]
fn test_date_parts() {
    let expected = Expr::call(Func::Year, vec![field("created")]).eq(2024);
    let closure = from_closure(&lambda(["x"], |[x]| {
        Syntax::call("year", [x.attr("created")]).eq(2024)
    }));
    assert_eq!(closure, expected);
    assert_eq!(from_odata("year(created) eq 2024"), expected);
    assert_eq!(from_sql("EXTRACT(YEAR FROM created) = 2024"), expected);
}

#[test]
fn test_substring_offsets() {
    // OData counts from zero, SQL from one.
    let odata = from_odata("substring(name,1,3) eq 'eno'");
    let sql = from_sql("SUBSTRING(name, 2, 3) = 'eno'");
    assert_eq!(odata, sql);
    assert_eq!(
        SqlFormatter::for_dialect(Dialect::Sqlite).format_where(&odata).unwrap(),
        "SUBSTR(`name`, 2, 3) = 'eno'"
    );
}

// =============================================================================
// Text Round Trips
// =============================================================================

#[test]
fn test_odata_filter_round_trip() {
    let source = "price gt 100 and (startswith(name,'Len') or category eq 'Laptops')";
    let expr = from_odata(source);
    let formatted = OpenDataFormatter::default().format_filter(&expr).unwrap();
    assert_eq!(
        formatted,
        "(price gt 100) and ((startswith(name,'Len') eq true) or (category eq 'Laptops'))"
    );
    assert_eq!(from_odata(&formatted), expr);
}

#[test]
fn test_sql_to_odata_to_sql() {
    let query = SqlParser::new()
        .parse("SELECT id, name FROM Product WHERE price > 100 ORDER BY name ASC LIMIT 10 OFFSET 20")
        .unwrap();
    let options = OpenDataFormatter::default().format(&query).unwrap();
    let pairs: Vec<(String, String)> = options
        .iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();

    let parsed = OpenDataParser::new().parse_query("Product", pairs).unwrap();
    assert!(parsed.count);
    assert_eq!(
        SqlFormatter::default().format(&parsed.query).unwrap(),
        "SELECT id, name FROM Product WHERE price > 100 ORDER BY name ASC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_document_round_trip_of_parsed_filter() {
    let expr = from_sql("price * 2 < 100 OR NOT (category = 'Laptops' AND name LIKE '%Pro%')");
    assert_eq!(Expr::from_document(&expr.to_document()).unwrap(), expr);
}
