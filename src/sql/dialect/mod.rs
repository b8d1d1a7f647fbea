//! SQL dialect definitions and operator renderers.
//!
//! Each dialect implements [`SqlDialect`]. Every operator tag of the IR has
//! one `render_*` method with an ANSI-ish default; a dialect overrides only
//! the renderers that differ:
//!
//! | Concern | Generic | SQLite | PostgreSQL | MySQL |
//! |---------|---------|--------|------------|-------|
//! | Identifiers | bare | `` `x` `` | `"x"` | `` `x` `` |
//! | Booleans | `TRUE`/`FALSE` | `1`/`0` | `true`/`false` | `1`/`0` |
//! | Date parts | `YEAR(x)` | `strftime` | `EXTRACT` | `YEAR(x)` |
//! | Substring | `SUBSTRING` | `SUBSTR` | `SUBSTRING` | `SUBSTRING` |
//! | Index of | `LOCATE` | `INSTR` | `STRPOS` | `LOCATE` |
//! | Regex | `REGEXP_LIKE` | `LIKE`/`REGEXP` | `~`/`~*` | `REGEXP_LIKE` |
//!
//! # Usage
//!
//! ```
//! use queryshape::query::{field, ExprExt};
//! use queryshape::sql::dialect::Dialect;
//!
//! let dialect = Dialect::Sqlite.dialect();
//! let sql = dialect.escape_sql(&field("price").gt(100)).unwrap();
//! assert_eq!(sql, "`price` > 100");
//! ```
//!
//! Renderers recurse through [`SqlDialect::escape`], so an override is
//! honored at any depth of the tree.

mod generic;
pub mod helpers;
mod mysql;
mod postgres;
mod sqlite;

use std::str::FromStr;

pub use generic::Generic;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use super::token::{Keyword, Token, TokenStream};
use crate::error::{QueryError, QueryResult};
use crate::query::{ArithmeticOperator, ComparisonOperator, Expr, Func, Literal, LogicalOperator};

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal with `''` escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit `LIMIT n OFFSET m`; zero values are omitted.
    fn emit_limit_offset(&self, limit: i64, offset: i64) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether `||` concatenates. When false, `CONCAT()` is emitted.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Render any expression by dispatching on its operator tag.
    fn escape(&self, expr: &Expr) -> QueryResult<TokenStream> {
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
            Expr::Arithmetic { op, left, right } => match op {
                ArithmeticOperator::Add => self.render_add(left, right),
                ArithmeticOperator::Subtract => self.render_subtract(left, right),
                ArithmeticOperator::Multiply => self.render_multiply(left, right),
                ArithmeticOperator::Divide => self.render_divide(left, right),
                ArithmeticOperator::Modulo => self.render_mod(left, right),
            },
            Expr::Call { func, args } => match func {
                Func::Year => self.render_year(args),
                Func::Month => self.render_month(args),
                Func::Day => self.render_day_of_month(args),
                Func::Hour => self.render_hour(args),
                Func::Minute => self.render_minute(args),
                Func::Second => self.render_second(args),
                Func::ToLower => self.render_to_lower(args),
                Func::ToUpper => self.render_to_upper(args),
                Func::Trim => self.render_trim(args),
                Func::Length => self.render_length(args),
                Func::Concat => self.render_concat(args),
                Func::Substr => self.render_substr(args),
                Func::IndexOf => self.render_index_of_bytes(args),
                Func::Round => self.render_round(args),
                Func::Ceil => self.render_ceil(args),
                Func::Floor => self.render_floor(args),
                Func::Min => self.render_min(args),
                Func::Max => self.render_max(args),
                Func::Count => self.render_count(args),
                Func::Sum => self.render_sum(args),
                Func::Avg => self.render_avg(args),
            },
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

    /// Dotted paths become qualified identifiers.
    fn render_field(&self, path: &str) -> TokenStream {
        helpers::qualified_path(path)
    }

    fn render_literal(&self, lit: &Literal) -> QueryResult<TokenStream> {
        helpers::literal_tokens(lit)
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    /// Infix comparison. Equality against NULL becomes `IS NULL`.
    fn render_comparison(
        &self,
        op: ComparisonOperator,
        left: &Expr,
        right: &Expr,
    ) -> QueryResult<TokenStream> {
        let mut ts = TokenStream::new();
        match op {
            ComparisonOperator::Eq if right.is_null() => {
                ts.append(&self.escape(left)?)
                    .space()
                    .keyword(Keyword::Is)
                    .space()
                    .push(Token::LitNull);
            }
            ComparisonOperator::Ne if right.is_null() => {
                ts.keyword(Keyword::Not)
                    .space()
                    .append(&self.escape(left)?)
                    .space()
                    .keyword(Keyword::Is)
                    .space()
                    .push(Token::LitNull);
            }
            _ => {
                ts.append(&self.escape(left)?)
                    .space()
                    .push(helpers::comparison_token(op))
                    .space()
                    .append(&self.escape(right)?);
            }
        }
        Ok(ts)
    }

    fn render_eq(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_comparison(ComparisonOperator::Eq, left, right)
    }

    fn render_ne(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_comparison(ComparisonOperator::Ne, left, right)
    }

    fn render_gt(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_comparison(ComparisonOperator::Gt, left, right)
    }

    fn render_gte(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_comparison(ComparisonOperator::Gte, left, right)
    }

    fn render_lt(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_comparison(ComparisonOperator::Lt, left, right)
    }

    fn render_lte(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_comparison(ComparisonOperator::Lte, left, right)
    }

    // =========================================================================
    // Logical
    // =========================================================================

    /// Operands joined by AND/OR; nested logical operands are parenthesized.
    fn render_logical(&self, op: LogicalOperator, args: &[Expr]) -> QueryResult<TokenStream> {
        let keyword = match op {
            LogicalOperator::And => Keyword::And,
            LogicalOperator::Or => Keyword::Or,
        };
        let mut ts = TokenStream::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                ts.space().keyword(keyword).space();
            }
            let rendered = self.escape(arg)?;
            if matches!(arg, Expr::Logical { .. }) {
                ts.append(&rendered.parenthesized());
            } else {
                ts.append(&rendered);
            }
        }
        Ok(ts)
    }

    fn render_and(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_logical(LogicalOperator::And, args)
    }

    fn render_or(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_logical(LogicalOperator::Or, args)
    }

    fn render_not(&self, inner: &Expr) -> QueryResult<TokenStream> {
        let rendered = self.escape(inner)?;
        let mut ts = TokenStream::new();
        ts.keyword(Keyword::Not).space();
        if matches!(inner, Expr::Logical { .. }) {
            ts.append(&rendered.parenthesized());
        } else {
            ts.append(&rendered);
        }
        Ok(ts)
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    /// Parenthesized infix: `(a + b)`.
    fn render_arithmetic(
        &self,
        op: ArithmeticOperator,
        left: &Expr,
        right: &Expr,
    ) -> QueryResult<TokenStream> {
        let mut ts = TokenStream::new();
        ts.append(&self.escape(left)?)
            .space()
            .push(helpers::arithmetic_token(op))
            .space()
            .append(&self.escape(right)?);
        Ok(ts.parenthesized())
    }

    fn render_add(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_arithmetic(ArithmeticOperator::Add, left, right)
    }

    fn render_subtract(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_arithmetic(ArithmeticOperator::Subtract, left, right)
    }

    fn render_multiply(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_arithmetic(ArithmeticOperator::Multiply, left, right)
    }

    fn render_divide(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_arithmetic(ArithmeticOperator::Divide, left, right)
    }

    fn render_mod(&self, left: &Expr, right: &Expr) -> QueryResult<TokenStream> {
        self.render_arithmetic(ArithmeticOperator::Modulo, left, right)
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// `NAME(arg, ...)`
    fn render_function(&self, name: &str, args: &[Expr]) -> QueryResult<TokenStream> {
        let rendered = args
            .iter()
            .map(|a| self.escape(a))
            .collect::<QueryResult<Vec<_>>>()?;
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName(name.to_string()))
            .lparen()
            .comma_separated(&rendered)
            .rparen();
        Ok(ts)
    }

    // Date parts

    fn render_year(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("YEAR", helpers::exact(args, 1, "$year")?)
    }

    fn render_month(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("MONTH", helpers::exact(args, 1, "$month")?)
    }

    fn render_day_of_month(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("DAY", helpers::exact(args, 1, "$dayOfMonth")?)
    }

    fn render_hour(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("HOUR", helpers::exact(args, 1, "$hour")?)
    }

    fn render_minute(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("MINUTE", helpers::exact(args, 1, "$minute")?)
    }

    fn render_second(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("SECOND", helpers::exact(args, 1, "$second")?)
    }

    // Strings

    fn render_to_lower(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("LOWER", helpers::exact(args, 1, "$toLower")?)
    }

    fn render_to_upper(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("UPPER", helpers::exact(args, 1, "$toUpper")?)
    }

    fn render_trim(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("TRIM", helpers::exact(args, 1, "$trim")?)
    }

    fn render_length(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("LENGTH", helpers::exact(args, 1, "$length")?)
    }

    /// `(a || b)`, or `CONCAT(a, b)` without the operator.
    fn render_concat(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        helpers::at_least(args, 2, "$concat")?;
        if !self.supports_concat_operator() {
            return self.render_function("CONCAT", args);
        }
        let mut ts = TokenStream::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                ts.space().push(Token::Concat).space();
            }
            ts.append(&self.escape(arg)?);
        }
        Ok(ts.parenthesized())
    }

    /// Zero-based IR start becomes the one-based SQL start.
    fn render_substr(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_substring_with("SUBSTRING", args)
    }

    fn render_substring_with(&self, name: &str, args: &[Expr]) -> QueryResult<TokenStream> {
        let (input, start, length) = helpers::substr_args(args)?;
        let mut call = vec![input.clone(), helpers::one_based(start)?];
        call.extend(length.cloned());
        self.render_function(name, &call)
    }

    /// `(LOCATE(needle, haystack) - 1)`, -1 when absent.
    fn render_index_of_bytes(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        let [haystack, needle] = helpers::exact(args, 2, "$indexOfBytes")? else {
            return Err(QueryError::InvalidExpression("$indexOfBytes expects 2 operands".into()));
        };
        let located = self.render_function("LOCATE", &[needle.clone(), haystack.clone()])?;
        Ok(helpers::minus_one(located))
    }

    // Numbers

    fn render_round(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        helpers::between(args, 1, 2, "$round")?;
        self.render_function("ROUND", args)
    }

    fn render_ceil(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("CEIL", helpers::exact(args, 1, "$ceil")?)
    }

    fn render_floor(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("FLOOR", helpers::exact(args, 1, "$floor")?)
    }

    // Aggregates

    fn render_min(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("MIN", helpers::exact(args, 1, "$min")?)
    }

    fn render_max(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("MAX", helpers::exact(args, 1, "$max")?)
    }

    /// `COUNT(*)` when called without operands.
    fn render_count(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        if args.is_empty() {
            let mut ts = TokenStream::new();
            ts.push(Token::FunctionName("COUNT".into()))
                .lparen()
                .symbol("*")
                .rparen();
            return Ok(ts);
        }
        self.render_function("COUNT", helpers::exact(args, 1, "$count")?)
    }

    fn render_sum(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("SUM", helpers::exact(args, 1, "$sum")?)
    }

    fn render_avg(&self, args: &[Expr]) -> QueryResult<TokenStream> {
        self.render_function("AVG", helpers::exact(args, 1, "$avg")?)
    }

    // =========================================================================
    // Patterns and Conditionals
    // =========================================================================

    /// `REGEXP_LIKE(input, 'regex'[, 'flags'])`
    fn render_regex_match(
        &self,
        input: &Expr,
        regex: &str,
        options: Option<&str>,
    ) -> QueryResult<TokenStream> {
        let mut args = vec![input.clone(), Expr::Literal(Literal::String(regex.to_string()))];
        if let Some(flags) = options.map(helpers::regexp_like_flags).filter(|f| !f.is_empty()) {
            args.push(Expr::Literal(Literal::String(flags)));
        }
        self.render_function("REGEXP_LIKE", &args)
    }

    /// `CASE WHEN c THEN a ELSE b END`
    fn render_cond(&self, condition: &Expr, then: &Expr, otherwise: &Expr) -> QueryResult<TokenStream> {
        let branch = [(condition.clone(), then.clone())];
        self.render_switch(&branch, Some(otherwise))
    }

    fn render_switch(&self, branches: &[(Expr, Expr)], default: Option<&Expr>) -> QueryResult<TokenStream> {
        // `CASE ELSE x END` is not valid SQL.
        if branches.is_empty() {
            return match default {
                Some(default) => self.escape(default),
                None => Err(QueryError::InvalidExpression(
                    "switch has neither branches nor a default".into(),
                )),
            };
        }
        let mut ts = TokenStream::new();
        ts.keyword(Keyword::Case);
        for (case, then) in branches {
            ts.space()
                .keyword(Keyword::When)
                .space()
                .append(&self.escape(case)?)
                .space()
                .keyword(Keyword::Then)
                .space()
                .append(&self.escape(then)?);
        }
        if let Some(default) = default {
            ts.space()
                .keyword(Keyword::Else)
                .space()
                .append(&self.escape(default)?);
        }
        ts.space().keyword(Keyword::End);
        Ok(ts)
    }

    /// Operators introduced by resolvers have no default rendering.
    fn render_custom(&self, name: &str, args: &[Expr]) -> QueryResult<TokenStream> {
        let _ = args;
        Err(QueryError::UnknownOperator(name.to_string()))
    }
}

impl<'a> dyn SqlDialect + 'a {
    /// Render and serialize with this dialect.
    pub fn escape_sql(&self, expr: &Expr) -> QueryResult<String> {
        Ok(self.escape(expr)?.serialize(self))
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Dialect::Generic, Dialect::Sqlite, Dialect::Postgres, Dialect::MySql];

    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Generic => &Generic,
            Dialect::Sqlite => &Sqlite,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
        }
    }

    /// The sqlparser dialect that reads this dialect's SQL.
    pub fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
        match self {
            Dialect::Generic => Box::new(GenericDialect {}),
            Dialect::Sqlite => Box::new(SQLiteDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl FromStr for Dialect {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.dialect().name().eq_ignore_ascii_case(s))
            .ok_or_else(|| QueryError::unsupported(format!("SQL dialect '{}'", s)))
    }
}
