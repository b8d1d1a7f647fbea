//! IR to OData query options.
//!
//! [`OpenDataDialect`] renders expressions as `$filter` text, one
//! `render_*` method per operator tag. [`OpenDataFormatter`] assembles the
//! options of a query into an ordered key/value map:
//!
//! ```
//! use queryshape::odata::OpenDataFormatter;
//! use queryshape::query::{field, ExprExt, QueryExpression};
//!
//! let mut query = QueryExpression::new();
//! query.from_collection("Product").where_expr(field("category").eq("Laptops"));
//! let options = OpenDataFormatter::default().format(&query).unwrap();
//! assert_eq!(options["$filter"], "(category eq 'Laptops')");
//! ```

use serde_json::{Map, Value};
use tracing::debug;

use super::query::{Levels, OpenDataQueryExpression};
use crate::config::ODataSettings;
use crate::error::{QueryError, QueryResult};
use crate::query::{
    ArithmeticOperator, ComparisonOperator, Expr, Func, Literal, LogicalOperator, QueryExpression,
    QueryField, SortDir, StatementKind, TextPattern,
};

/// OData rendering of the operator tags.
///
/// Renderers recurse through [`OpenDataDialect::escape`], so an override
/// is honored at any depth.
pub trait OpenDataDialect: std::fmt::Debug + Send + Sync {
    fn escape(&self, expr: &Expr) -> QueryResult<String> {
        match expr {
            Expr::Field(path) => Ok(self.render_field(path)),
            Expr::Literal(lit) => self.render_literal(lit),
            Expr::Compare { op, left, right } => match op {
                ComparisonOperator::Eq => self.render_eq(left, right),
                ComparisonOperator::Ne => self.render_ne(left, right),
                ComparisonOperator::Gt => self.render_gt(left, right),
                ComparisonOperator::Gte => self.render_gte(left, right),
                ComparisonOperator::Lt => self.render_lt(left, right),
                ComparisonOperator::Lte => self.render_lte(left, right),
            },
            Expr::Logical { op, args } => match op {
                LogicalOperator::And => self.render_and(args),
                LogicalOperator::Or => self.render_or(args),
            },
            Expr::Not(inner) => self.render_not(inner),
            Expr::Arithmetic { op, left, right } => self.render_arithmetic(*op, left, right),
            Expr::Call { func, args } => self.render_call(*func, args),
            Expr::RegexMatch {
                input,
                regex,
                options,
            } => self.render_regex_match(input, regex, options.as_deref()),
            Expr::Cond {
                condition,
                then,
                otherwise,
            } => self.render_cond(condition, then, otherwise),
            Expr::Switch { branches, default } => self.render_switch(branches, default.as_deref()),
            Expr::Custom { name, args } => self.render_custom(name, args),
        }
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    /// Dotted paths become `/`-separated member paths.
    fn render_field(&self, path: &str) -> String {
        path.replace('.', "/")
    }

    fn render_literal(&self, lit: &Literal) -> QueryResult<String> {
        Ok(match lit {
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(n) => n.to_string(),
            Literal::Long(n) => format!("{}L", n),
            Literal::Single(f) => format!("{}F", f),
            Literal::Double(f) => render_double(*f),
            Literal::Decimal(d) => format!("{}M", d),
            Literal::String(s) => quote(s),
            Literal::Guid(g) => format!("guid{}", quote(&g.to_string())),
            Literal::DateTime(s) => format!("datetime{}", quote(s)),
            Literal::Time(s) => format!("time{}", quote(s)),
            Literal::Binary(s) => format!("binary{}", quote(s)),
        })
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// `(left op right)`.
    fn render_comparison(&self, op: &str, left: &Expr, right: &Expr) -> QueryResult<String> {
        Ok(format!("({} {} {})", self.escape(left)?, op, self.escape(right)?))
    }

    fn render_eq(&self, left: &Expr, right: &Expr) -> QueryResult<String> {
        self.render_comparison("eq", left, right)
    }

    fn render_ne(&self, left: &Expr, right: &Expr) -> QueryResult<String> {
        self.render_comparison("ne", left, right)
    }

    fn render_gt(&self, left: &Expr, right: &Expr) -> QueryResult<String> {
        self.render_comparison("gt", left, right)
    }

    fn render_gte(&self, left: &Expr, right: &Expr) -> QueryResult<String> {
        self.render_comparison("ge", left, right)
    }

    fn render_lt(&self, left: &Expr, right: &Expr) -> QueryResult<String> {
        self.render_comparison("lt", left, right)
    }

    fn render_lte(&self, left: &Expr, right: &Expr) -> QueryResult<String> {
        self.render_comparison("le", left, right)
    }

    // =========================================================================
    // Logical
    // =========================================================================

    /// Operands joined by ` op `; compound operands are parenthesized.
    fn render_logical(&self, op: &str, args: &[Expr]) -> QueryResult<String> {
        let parts = args
            .iter()
            .map(|arg| {
                let text = self.escape(arg)?;
                Ok(match arg {
                    Expr::Logical { .. } | Expr::RegexMatch { .. } | Expr::Not(_) => {
                        format!("({})", text)
                    }
                    _ => text,
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(parts.join(&format!(" {} ", op)))
    }

    fn render_and(&self, args: &[Expr]) -> QueryResult<String> {
        self.render_logical("and", args)
    }

    fn render_or(&self, args: &[Expr]) -> QueryResult<String> {
        self.render_logical("or", args)
    }

    /// A negated match becomes `... eq false`; comparisons keep their own
    /// parentheses.
    fn render_not(&self, inner: &Expr) -> QueryResult<String> {
        match inner {
            Expr::RegexMatch {
                input,
                regex,
                options,
            } => Ok(format!(
                "{} eq false",
                self.render_text_match(input, regex, options.as_deref())?
            )),
            Expr::Compare { .. } => Ok(format!("not {}", self.escape(inner)?)),
            _ => Ok(format!("not ({})", self.escape(inner)?)),
        }
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    fn render_arithmetic(&self, op: ArithmeticOperator, left: &Expr, right: &Expr) -> QueryResult<String> {
        let word = match op {
            ArithmeticOperator::Add => "add",
            ArithmeticOperator::Subtract => "sub",
            ArithmeticOperator::Multiply => "mul",
            ArithmeticOperator::Divide => "div",
            ArithmeticOperator::Modulo => "mod",
        };
        Ok(format!("({} {} {})", self.escape(left)?, word, self.escape(right)?))
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn render_call(&self, func: Func, args: &[Expr]) -> QueryResult<String> {
        match func {
            Func::Concat => self.render_concat(args),
            other => self.render_function(function_name(other), args),
        }
    }

    /// `name(a,b)`.
    fn render_function(&self, name: &str, args: &[Expr]) -> QueryResult<String> {
        let args = args
            .iter()
            .map(|arg| self.escape(arg))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(format!("{}({})", name, args.join(",")))
    }

    /// OData `concat` is binary; longer lists nest to the right.
    fn render_concat(&self, args: &[Expr]) -> QueryResult<String> {
        match args {
            [] | [_] => Err(QueryError::InvalidExpression(format!(
                "$concat received {} operand(s)",
                args.len()
            ))),
            [a, b] => self.render_function("concat", &[a.clone(), b.clone()]),
            [first, rest @ ..] => Ok(format!(
                "concat({},{})",
                self.escape(first)?,
                self.render_concat(rest)?
            )),
        }
    }

    // =========================================================================
    // Pattern Matching
    // =========================================================================

    fn render_regex_match(&self, input: &Expr, regex: &str, options: Option<&str>) -> QueryResult<String> {
        let text = self.render_text_match(input, regex, options)?;
        Ok(if text.starts_with("matchesPattern(") {
            text
        } else {
            format!("{} eq true", text)
        })
    }

    /// `startswith`/`endswith`/`contains` for literal patterns, otherwise
    /// `matchesPattern` with inline flags.
    fn render_text_match(&self, input: &Expr, regex: &str, options: Option<&str>) -> QueryResult<String> {
        let input = self.escape(input)?;
        let plain = options.is_none_or(str::is_empty);
        match TextPattern::from_regex(regex).filter(|_| plain) {
            Some(TextPattern::StartsWith(text)) => Ok(format!("startswith({},{})", input, quote(&text))),
            Some(TextPattern::EndsWith(text)) => Ok(format!("endswith({},{})", input, quote(&text))),
            Some(TextPattern::Contains(text)) => Ok(format!("contains({},{})", input, quote(&text))),
            None => {
                let flags: String = options
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| matches!(c, 'i' | 'm' | 's'))
                    .collect();
                let pattern = if flags.is_empty() {
                    regex.to_string()
                } else {
                    format!("(?{}){}", flags, regex)
                };
                Ok(format!("matchesPattern({},{})", input, quote(&pattern)))
            }
        }
    }

    // =========================================================================
    // Conditionals
    // =========================================================================

    fn render_cond(&self, condition: &Expr, then: &Expr, otherwise: &Expr) -> QueryResult<String> {
        Ok(format!(
            "case({}:{},true:{})",
            self.escape(condition)?,
            self.escape(then)?,
            self.escape(otherwise)?
        ))
    }

    /// `case(c1:v1,...,true:default)`.
    fn render_switch(&self, branches: &[(Expr, Expr)], default: Option<&Expr>) -> QueryResult<String> {
        let mut parts = branches
            .iter()
            .map(|(condition, value)| Ok(format!("{}:{}", self.escape(condition)?, self.escape(value)?)))
            .collect::<QueryResult<Vec<_>>>()?;
        if let Some(default) = default {
            parts.push(format!("true:{}", self.escape(default)?));
        }
        Ok(format!("case({})", parts.join(",")))
    }

    /// Operators outside the built-in set have no OData spelling.
    fn render_custom(&self, name: &str, args: &[Expr]) -> QueryResult<String> {
        let _ = args;
        Err(QueryError::UnknownOperator(name.to_string()))
    }
}

/// OData v4 rendering with no overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl OpenDataDialect for StandardDialect {}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn render_double(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "INF".to_string()
    } else if f == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        ryu::Buffer::new().format_finite(f).to_string()
    }
}

fn function_name(func: Func) -> &'static str {
    match func {
        Func::Year => "year",
        Func::Month => "month",
        Func::Day => "day",
        Func::Hour => "hour",
        Func::Minute => "minute",
        Func::Second => "second",
        Func::ToLower => "tolower",
        Func::ToUpper => "toupper",
        Func::Trim => "trim",
        Func::Length => "length",
        Func::Concat => "concat",
        Func::Substr => "substring",
        Func::IndexOf => "indexof",
        Func::Round => "round",
        Func::Ceil => "ceiling",
        Func::Floor => "floor",
        Func::Min => "min",
        Func::Max => "max",
        Func::Count => "count",
        Func::Sum => "sum",
        Func::Avg => "avg",
    }
}

// =============================================================================
// Formatter
// =============================================================================

/// Renders a query as OData query options.
#[derive(Debug, Clone, Copy)]
pub struct OpenDataFormatter<'d> {
    dialect: &'d dyn OpenDataDialect,
    count_on_paging: bool,
}

impl Default for OpenDataFormatter<'static> {
    fn default() -> Self {
        Self::with_settings(&ODataSettings::default())
    }
}

impl OpenDataFormatter<'static> {
    pub fn with_settings(settings: &ODataSettings) -> Self {
        Self {
            dialect: &StandardDialect,
            count_on_paging: settings.count_on_paging,
        }
    }
}

impl<'d> OpenDataFormatter<'d> {
    pub fn new(dialect: &'d dyn OpenDataDialect) -> Self {
        Self {
            dialect,
            count_on_paging: ODataSettings::default().count_on_paging,
        }
    }

    pub fn dialect(&self) -> &'d dyn OpenDataDialect {
        self.dialect
    }

    /// Options of a plain query: `$select`, `$filter`, `$orderby`,
    /// `$groupby`, `$top`, `$skip` and `$count`, each only when present.
    pub fn format(&self, query: &QueryExpression) -> QueryResult<Map<String, Value>> {
        let options = self.options(query, &[], None, false, true)?;
        debug!(options = options.len(), "formatted OData options");
        Ok(options.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Like [`format`](Self::format), with `$expand` and `$levels`.
    pub fn format_expanded(&self, query: &OpenDataQueryExpression) -> QueryResult<Map<String, Value>> {
        let options = self.options(&query.query, &query.expand, query.levels, query.count, true)?;
        debug!(options = options.len(), "formatted OData options");
        Ok(options.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// A `$filter` expression on its own.
    pub fn format_filter(&self, filter: &Expr) -> QueryResult<String> {
        self.dialect.escape(filter)
    }

    /// `name($select=...;$top=...)` for one expanded navigation.
    pub fn format_expand_item(&self, item: &OpenDataQueryExpression) -> QueryResult<String> {
        let name = item.name().ok_or_else(|| {
            QueryError::InvalidExpression("expanded navigation has no name".into())
        })?;
        let options = self.options(&item.query, &item.expand, item.levels, item.count, false)?;
        if options.is_empty() {
            return Ok(self.dialect.render_field(name));
        }
        let inner: Vec<String> = options
            .iter()
            .map(|(key, value)| format!("{}={}", key, value_text(value)))
            .collect();
        Ok(format!("{}({})", self.dialect.render_field(name), inner.join(";")))
    }

    fn options(
        &self,
        query: &QueryExpression,
        expand: &[OpenDataQueryExpression],
        levels: Option<Levels>,
        count: bool,
        top_level: bool,
    ) -> QueryResult<Vec<(&'static str, Value)>> {
        if query.statement_kind() != StatementKind::Select {
            return Err(QueryError::UnsupportedStatementKind(format!(
                "OData options cannot express {:?} statements",
                query.statement_kind()
            )));
        }
        if !query.lookups().is_empty() {
            return Err(QueryError::unsupported("joins have no OData query option"));
        }

        let mut options = Vec::new();
        if !query.fields().is_empty() {
            let items = query
                .fields()
                .iter()
                .map(|f| self.select_item(f))
                .collect::<QueryResult<Vec<_>>>()?;
            options.push(("$select", Value::from(items.join(","))));
        }
        if let Some(filter) = query.effective_filter() {
            options.push(("$filter", Value::from(self.dialect.escape(&filter)?)));
        }
        if !query.ordering().is_empty() {
            let terms = query
                .ordering()
                .iter()
                .map(|term| {
                    let expr = self.dialect.escape(&term.expr)?;
                    Ok(match term.dir {
                        SortDir::Asc => expr,
                        SortDir::Desc => format!("{} desc", expr),
                    })
                })
                .collect::<QueryResult<Vec<_>>>()?;
            options.push(("$orderby", Value::from(terms.join(","))));
        }
        if !query.grouping().is_empty() {
            let keys = query
                .grouping()
                .iter()
                .map(|key| self.dialect.escape(key))
                .collect::<QueryResult<Vec<_>>>()?;
            options.push(("$groupby", Value::from(keys.join(","))));
        }
        if !expand.is_empty() {
            let items = expand
                .iter()
                .map(|item| self.format_expand_item(item))
                .collect::<QueryResult<Vec<_>>>()?;
            options.push(("$expand", Value::from(items.join(","))));
        }
        if query.limit() > 0 {
            options.push(("$top", Value::from(query.limit())));
        }
        if query.offset() > 0 {
            options.push(("$skip", Value::from(query.offset())));
        }
        if count || (top_level && self.count_on_paging && query.limit() > 0) {
            options.push(("$count", Value::Bool(true)));
        }
        if let Some(levels) = levels {
            options.push(("$levels", Value::from(levels.to_string())));
        }
        Ok(options)
    }

    fn select_item(&self, field: &QueryField) -> QueryResult<String> {
        match field.expr() {
            None => Ok(self.dialect.render_field(field.name())),
            Some(expr) => Ok(format!("{} as {}", self.dialect.escape(expr)?, field.name())),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode formatted options as an `application/x-www-form-urlencoded`
/// query string.
pub fn query_string(options: &Map<String, Value>) -> QueryResult<String> {
    let pairs: Vec<(&str, String)> = options
        .iter()
        .map(|(key, value)| (key.as_str(), value_text(value)))
        .collect();
    serde_urlencoded::to_string(pairs).map_err(|e| QueryError::InvalidExpression(e.to_string()))
}
