//! Expression tree - the dialect-neutral filter/projection language.
//!
//! Every operator of the document form (`{"$eq": [a, b]}`) is a variant
//! here, so renderers match exhaustively instead of looking up tags.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

// =============================================================================
// Expression Tree
// =============================================================================

/// A node of the IR filter/projection tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field reference. Qualified paths use dots: `Order.customer`.
    Field(String),

    /// Literal value.
    Literal(Literal),

    /// `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
    Compare {
        op: ComparisonOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `$and`, `$or` over two or more operands.
    Logical {
        op: LogicalOperator,
        args: Vec<Expr>,
    },

    /// `$not`
    Not(Box<Expr>),

    /// `$add`, `$subtract`, `$multiply`, `$divide`, `$mod`
    Arithmetic {
        op: ArithmeticOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Scalar or aggregate function with positional operands.
    Call { func: Func, args: Vec<Expr> },

    /// `$regexMatch` with named operands.
    RegexMatch {
        input: Box<Expr>,
        regex: String,
        options: Option<String>,
    },

    /// `$cond`: `then` when `condition` holds, `otherwise` else.
    Cond {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// `$switch`: first matching branch wins.
    Switch {
        branches: Vec<(Expr, Expr)>,
        default: Option<Box<Expr>>,
    },

    /// Operator introduced by a resolver that no built-in renderer knows.
    Custom { name: String, args: Vec<Expr> },
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Integer without a type suffix.
    Int(i64),
    /// `L` suffix.
    Long(i64),
    /// `F` suffix.
    Single(f32),
    /// `D` suffix, or any fractional/exponent literal.
    Double(f64),
    /// `M` suffix.
    Decimal(Decimal),
    String(String),
    Guid(Uuid),
    DateTime(String),
    Time(String),
    Binary(String),
}

impl Literal {
    /// Unary minus on a numeric literal. `-i64::MIN` has no `i64` value and
    /// is reported rather than wrapped.
    pub fn checked_neg(self) -> QueryResult<Literal> {
        let overflow = |n: i64| QueryError::InvalidExpression(format!("-({}) overflows a 64-bit integer", n));
        match self {
            Literal::Int(n) => n.checked_neg().map(Literal::Int).ok_or_else(|| overflow(n)),
            Literal::Long(n) => n.checked_neg().map(Literal::Long).ok_or_else(|| overflow(n)),
            Literal::Single(f) => Ok(Literal::Single(-f)),
            Literal::Double(f) => Ok(Literal::Double(-f)),
            Literal::Decimal(d) => Ok(Literal::Decimal(-d)),
            other => Err(QueryError::unsupported(format!("negation of {:?}", other))),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Functions with positional operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    // Date parts
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    // Strings
    ToLower,
    ToUpper,
    Trim,
    Length,
    Concat,
    /// Zero-based start, optional length.
    Substr,
    /// Zero-based position, -1 when absent.
    IndexOf,
    // Numbers
    Round,
    Ceil,
    Floor,
    // Aggregates
    Min,
    Max,
    Count,
    Sum,
    Avg,
}

// =============================================================================
// Operator Tags
// =============================================================================

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 6] = [
        ComparisonOperator::Eq,
        ComparisonOperator::Ne,
        ComparisonOperator::Gt,
        ComparisonOperator::Gte,
        ComparisonOperator::Lt,
        ComparisonOperator::Lte,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "$eq",
            ComparisonOperator::Ne => "$ne",
            ComparisonOperator::Gt => "$gt",
            ComparisonOperator::Gte => "$gte",
            ComparisonOperator::Lt => "$lt",
            ComparisonOperator::Lte => "$lte",
        }
    }

    /// Operator with its operands swapped (`a < b` is `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            ComparisonOperator::Eq => ComparisonOperator::Eq,
            ComparisonOperator::Ne => ComparisonOperator::Ne,
            ComparisonOperator::Gt => ComparisonOperator::Lt,
            ComparisonOperator::Gte => ComparisonOperator::Lte,
            ComparisonOperator::Lt => ComparisonOperator::Gt,
            ComparisonOperator::Lte => ComparisonOperator::Gte,
        }
    }
}

impl LogicalOperator {
    pub fn tag(self) -> &'static str {
        match self {
            LogicalOperator::And => "$and",
            LogicalOperator::Or => "$or",
        }
    }
}

impl ArithmeticOperator {
    pub const ALL: [ArithmeticOperator; 5] = [
        ArithmeticOperator::Add,
        ArithmeticOperator::Subtract,
        ArithmeticOperator::Multiply,
        ArithmeticOperator::Divide,
        ArithmeticOperator::Modulo,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "$add",
            ArithmeticOperator::Subtract => "$subtract",
            ArithmeticOperator::Multiply => "$multiply",
            ArithmeticOperator::Divide => "$divide",
            ArithmeticOperator::Modulo => "$mod",
        }
    }
}

impl Func {
    pub const ALL: [Func; 21] = [
        Func::Year,
        Func::Month,
        Func::Day,
        Func::Hour,
        Func::Minute,
        Func::Second,
        Func::ToLower,
        Func::ToUpper,
        Func::Trim,
        Func::Length,
        Func::Concat,
        Func::Substr,
        Func::IndexOf,
        Func::Round,
        Func::Ceil,
        Func::Floor,
        Func::Min,
        Func::Max,
        Func::Count,
        Func::Sum,
        Func::Avg,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Func::Year => "$year",
            Func::Month => "$month",
            Func::Day => "$dayOfMonth",
            Func::Hour => "$hour",
            Func::Minute => "$minute",
            Func::Second => "$second",
            Func::ToLower => "$toLower",
            Func::ToUpper => "$toUpper",
            Func::Trim => "$trim",
            Func::Length => "$length",
            Func::Concat => "$concat",
            Func::Substr => "$substr",
            Func::IndexOf => "$indexOfBytes",
            Func::Round => "$round",
            Func::Ceil => "$ceil",
            Func::Floor => "$floor",
            Func::Min => "$min",
            Func::Max => "$max",
            Func::Count => "$count",
            Func::Sum => "$sum",
            Func::Avg => "$avg",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Func> {
        Func::ALL.into_iter().find(|f| f.tag() == tag)
    }

    /// Aggregates collapse rows; everything else is per-row.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Func::Min | Func::Max | Func::Count | Func::Sum | Func::Avg
        )
    }
}

// =============================================================================
// Tree Helpers
// =============================================================================

impl Expr {
    /// Operator tag of this node, `None` for fields and literals.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Expr::Field(_) | Expr::Literal(_) => None,
            Expr::Compare { op, .. } => Some(op.tag()),
            Expr::Logical { op, .. } => Some(op.tag()),
            Expr::Not(_) => Some("$not"),
            Expr::Arithmetic { op, .. } => Some(op.tag()),
            Expr::Call { func, .. } => Some(func.tag()),
            Expr::RegexMatch { .. } => Some("$regexMatch"),
            Expr::Cond { .. } => Some("$cond"),
            Expr::Switch { .. } => Some("$switch"),
            Expr::Custom { name, .. } => Some(name),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Expr::Literal(Literal::Null))
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            Expr::Field(name) => Some(name),
            _ => None,
        }
    }

    /// Right-nested binary chain: `[a, b, c]` becomes `op[a, op[b, c]]`.
    ///
    /// Returns `None` for an empty operand list.
    pub fn fold_logical(op: LogicalOperator, operands: Vec<Expr>) -> Option<Expr> {
        let mut iter = operands.into_iter().rev();
        let last = iter.next()?;
        Some(iter.fold(last, |acc, next| Expr::Logical {
            op,
            args: vec![next, acc],
        }))
    }

    pub fn compare(op: ComparisonOperator, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn arithmetic(op: ArithmeticOperator, left: Expr, right: Expr) -> Expr {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(func: Func, args: Vec<Expr>) -> Expr {
        Expr::Call { func, args }
    }

    pub fn regex_match(input: Expr, regex: impl Into<String>, options: Option<String>) -> Expr {
        Expr::RegexMatch {
            input: Box::new(input),
            regex: regex.into(),
            options,
        }
    }

    /// `input` starts with the literal `prefix`.
    pub fn starts_with(input: Expr, prefix: &str) -> Expr {
        Expr::regex_match(input, format!("^{}", regex::escape(prefix)), None)
    }

    /// `input` ends with the literal `suffix`.
    pub fn ends_with(input: Expr, suffix: &str) -> Expr {
        Expr::regex_match(input, format!("{}$", regex::escape(suffix)), None)
    }

    /// `input` contains the literal `needle`.
    pub fn contains(input: Expr, needle: &str) -> Expr {
        Expr::regex_match(input, regex::escape(needle), None)
    }

    /// `low <= input <= high` as `$and[$gte, $lte]`.
    pub fn between(input: Expr, low: Expr, high: Expr) -> Expr {
        Expr::Logical {
            op: LogicalOperator::And,
            args: vec![
                Expr::compare(ComparisonOperator::Gte, input.clone(), low),
                Expr::compare(ComparisonOperator::Lte, input, high),
            ],
        }
    }

    pub fn cond(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Cond {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }
}

/// Shape of a regex produced by `starts_with`/`ends_with`/`contains`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPattern {
    StartsWith(String),
    EndsWith(String),
    Contains(String),
}

impl TextPattern {
    /// Recover the literal text of a simple anchored/unanchored pattern.
    ///
    /// Returns `None` when the regex uses real regex syntax.
    pub fn from_regex(regex: &str) -> Option<TextPattern> {
        if let Some(rest) = regex.strip_prefix('^') {
            if rest.ends_with('$') && !rest.ends_with("\\$") {
                return None;
            }
            return unescape_literal(rest).map(TextPattern::StartsWith);
        }
        if let Some(rest) = regex.strip_suffix('$') {
            if !rest.ends_with('\\') {
                return unescape_literal(rest).map(TextPattern::EndsWith);
            }
        }
        unescape_literal(regex).map(TextPattern::Contains)
    }

    pub fn text(&self) -> &str {
        match self {
            TextPattern::StartsWith(s) | TextPattern::EndsWith(s) | TextPattern::Contains(s) => s,
        }
    }
}

/// Inverse of `regex::escape` for patterns without live metacharacters.
fn unescape_literal(pattern: &str) -> Option<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if !escaped.is_alphanumeric() => out.push(escaped),
                _ => return None,
            },
            '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' => {
                return None
            }
            other => out.push(other),
        }
    }
    Some(out)
}

// =============================================================================
// Constructor Helpers
// =============================================================================

/// Field reference.
pub fn field(name: &str) -> Expr {
    Expr::Field(name.into())
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Double(f))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

// =============================================================================
// Fluent Combinators
// =============================================================================

/// Chainable operators over anything convertible into an [`Expr`].
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::compare(ComparisonOperator::Eq, self.into_expr(), other.into())
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        Expr::compare(ComparisonOperator::Ne, self.into_expr(), other.into())
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::compare(ComparisonOperator::Gt, self.into_expr(), other.into())
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        Expr::compare(ComparisonOperator::Gte, self.into_expr(), other.into())
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::compare(ComparisonOperator::Lt, self.into_expr(), other.into())
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        Expr::compare(ComparisonOperator::Lte, self.into_expr(), other.into())
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        Expr::Logical {
            op: LogicalOperator::And,
            args: vec![self.into_expr(), other.into()],
        }
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        Expr::Logical {
            op: LogicalOperator::Or,
            args: vec![self.into_expr(), other.into()],
        }
    }

    fn not(self) -> Expr {
        Expr::Not(Box::new(self.into_expr()))
    }

    fn add(self, other: impl Into<Expr>) -> Expr {
        Expr::arithmetic(ArithmeticOperator::Add, self.into_expr(), other.into())
    }

    fn sub(self, other: impl Into<Expr>) -> Expr {
        Expr::arithmetic(ArithmeticOperator::Subtract, self.into_expr(), other.into())
    }

    fn mul(self, other: impl Into<Expr>) -> Expr {
        Expr::arithmetic(ArithmeticOperator::Multiply, self.into_expr(), other.into())
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        Expr::arithmetic(ArithmeticOperator::Divide, self.into_expr(), other.into())
    }

    fn modulo(self, other: impl Into<Expr>) -> Expr {
        Expr::arithmetic(ArithmeticOperator::Modulo, self.into_expr(), other.into())
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Expr::Literal(lit)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        lit_int(n as i64)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        lit_float(f)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Literal::String(s))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}

impl From<Decimal> for Expr {
    fn from(d: Decimal) -> Self {
        Expr::Literal(Literal::Decimal(d))
    }
}

impl From<Uuid> for Expr {
    fn from(u: Uuid) -> Self {
        Expr::Literal(Literal::Guid(u))
    }
}

impl<T: Into<Expr>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => lit_null(),
        }
    }
}
