//! Field and collection references.

use serde_json::Value;

use super::expr::{ArithmeticOperator, Expr, Func};
use crate::error::{QueryError, QueryResult};

/// A projected field: an output name plus either pass-through or an expression.
///
/// A pass-through field (`{"name": 1}` in document form) selects the
/// field verbatim; wrapping it in a function turns it into `{"name": {...}}`
/// while the output name stays the same.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryField {
    name: String,
    expr: Option<Expr>,
}

impl QueryField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: None,
        }
    }

    /// Computed field `name` holding `expr`.
    pub fn computed(name: impl Into<String>, expr: Expr) -> Self {
        let name = name.into();
        match expr {
            Expr::Field(ref path) if *path == name => Self { name, expr: None },
            expr => Self {
                name,
                expr: Some(expr),
            },
        }
    }

    /// Output name (the alias when aliased).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression, `None` for pass-through fields.
    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    pub fn is_pass_through(&self) -> bool {
        self.expr.is_none()
    }

    /// Current value as an expression operand.
    pub fn value(&self) -> Expr {
        match &self.expr {
            Some(expr) => expr.clone(),
            None => Expr::Field(self.name.clone()),
        }
    }

    pub fn into_value(self) -> Expr {
        match self.expr {
            Some(expr) => expr,
            None => Expr::Field(self.name),
        }
    }

    /// Prefix the field with `collection.`.
    ///
    /// Fails for already-qualified fields and for wrapped fields.
    pub fn from_collection(self, collection: &str) -> QueryResult<Self> {
        if self.expr.is_some() {
            return Err(QueryError::InvalidExpression(format!(
                "cannot qualify computed field '{}'",
                self.name
            )));
        }
        if self.name.contains('.') {
            return Err(QueryError::InvalidExpression(format!(
                "field '{}' is already qualified",
                self.name
            )));
        }
        Ok(Self::new(format!("{}.{}", collection, self.name)))
    }

    /// Rename the output while keeping the current value.
    pub fn alias(self, alias: &str) -> Self {
        let value = self.into_value();
        Self::computed(alias, value)
    }

    fn wrap(self, func: Func, extra: Vec<Expr>) -> Self {
        let name = self.name.clone();
        let mut args = vec![self.into_value()];
        args.extend(extra);
        Self {
            name,
            expr: Some(Expr::call(func, args)),
        }
    }

    fn arithmetic(self, op: ArithmeticOperator, operand: Expr) -> Self {
        let name = self.name.clone();
        Self {
            name,
            expr: Some(Expr::arithmetic(op, self.into_value(), operand)),
        }
    }

    // Date parts

    pub fn year(self) -> Self {
        self.wrap(Func::Year, vec![])
    }

    pub fn month(self) -> Self {
        self.wrap(Func::Month, vec![])
    }

    pub fn day(self) -> Self {
        self.wrap(Func::Day, vec![])
    }

    pub fn hour(self) -> Self {
        self.wrap(Func::Hour, vec![])
    }

    pub fn minute(self) -> Self {
        self.wrap(Func::Minute, vec![])
    }

    pub fn second(self) -> Self {
        self.wrap(Func::Second, vec![])
    }

    // Arithmetic

    pub fn add(self, operand: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOperator::Add, operand.into())
    }

    pub fn subtract(self, operand: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOperator::Subtract, operand.into())
    }

    pub fn multiply(self, operand: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOperator::Multiply, operand.into())
    }

    pub fn divide(self, operand: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOperator::Divide, operand.into())
    }

    pub fn modulo(self, operand: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOperator::Modulo, operand.into())
    }

    // Strings

    pub fn to_upper(self) -> Self {
        self.wrap(Func::ToUpper, vec![])
    }

    pub fn to_lower(self) -> Self {
        self.wrap(Func::ToLower, vec![])
    }

    pub fn trim(self) -> Self {
        self.wrap(Func::Trim, vec![])
    }

    pub fn length(self) -> Self {
        self.wrap(Func::Length, vec![])
    }

    /// Zero-based `start`, optional `length`.
    pub fn substr(self, start: i64, length: Option<i64>) -> Self {
        let mut extra = vec![Expr::from(start)];
        if let Some(length) = length {
            extra.push(Expr::from(length));
        }
        self.wrap(Func::Substr, extra)
    }

    pub fn concat(self, others: impl IntoIterator<Item = Expr>) -> Self {
        self.wrap(Func::Concat, others.into_iter().collect())
    }

    pub fn index_of(self, needle: impl Into<Expr>) -> Self {
        self.wrap(Func::IndexOf, vec![needle.into()])
    }

    // Aggregates

    pub fn min(self) -> Self {
        self.wrap(Func::Min, vec![])
    }

    pub fn max(self) -> Self {
        self.wrap(Func::Max, vec![])
    }

    pub fn count(self) -> Self {
        self.wrap(Func::Count, vec![])
    }

    pub fn sum(self) -> Self {
        self.wrap(Func::Sum, vec![])
    }

    pub fn average(self) -> Self {
        self.wrap(Func::Avg, vec![])
    }

    // Numbers

    pub fn ceil(self) -> Self {
        self.wrap(Func::Ceil, vec![])
    }

    pub fn floor(self) -> Self {
        self.wrap(Func::Floor, vec![])
    }

    pub fn round(self, digits: Option<i64>) -> Self {
        self.wrap(Func::Round, digits.map(Expr::from).into_iter().collect())
    }

    /// Document form: `{"name": 1}` or `{"name": <expr>}`.
    pub fn to_document(&self) -> Value {
        let mut map = serde_json::Map::new();
        let value = match &self.expr {
            Some(expr) => expr.to_document(),
            None => Value::from(1),
        };
        map.insert(self.name.clone(), value);
        Value::Object(map)
    }
}

impl From<&str> for QueryField {
    fn from(name: &str) -> Self {
        QueryField::new(name)
    }
}

impl From<String> for QueryField {
    fn from(name: String) -> Self {
        QueryField::new(name)
    }
}

/// Fields keep their path; other expressions are named after their tag.
impl From<Expr> for QueryField {
    fn from(expr: Expr) -> Self {
        match expr {
            Expr::Field(name) => QueryField::new(name),
            other => {
                let name = other.tag().unwrap_or("value").trim_start_matches('$').to_string();
                QueryField::computed(name, other)
            }
        }
    }
}

impl TryFrom<&Value> for QueryField {
    type Error = QueryError;

    /// Accepts `"name"`, `{"name": 1}` and `{"alias": <expr>}`.
    fn try_from(value: &Value) -> QueryResult<Self> {
        match value {
            Value::String(name) => Ok(QueryField::new(name.as_str())),
            Value::Object(map) if map.len() == 1 => {
                let Some((name, spec)) = map.iter().next() else {
                    return Err(QueryError::InvalidFieldExpression("empty field".into()));
                };
                if spec.as_i64() == Some(1) {
                    Ok(QueryField::new(name.as_str()))
                } else {
                    Ok(QueryField::computed(name.as_str(), Expr::from_document(spec)?))
                }
            }
            other => Err(QueryError::InvalidFieldExpression(format!(
                "expected a single-key field document, found {}",
                other
            ))),
        }
    }
}

/// A collection reference, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEntity {
    name: String,
    alias: Option<String>,
}

impl QueryEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Underlying collection name.
    pub fn collection(&self) -> &str {
        &self.name
    }

    /// Alias, `None` if unaliased.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Name other clauses use to refer to this entity.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Document form: `{"Product": 1}` or `{"p": "$Product"}`.
    pub fn to_document(&self) -> Value {
        let mut map = serde_json::Map::new();
        match &self.alias {
            Some(alias) => map.insert(alias.clone(), Value::String(format!("${}", self.name))),
            None => map.insert(self.name.clone(), Value::from(1)),
        };
        Value::Object(map)
    }
}

impl From<&str> for QueryEntity {
    fn from(name: &str) -> Self {
        QueryEntity::new(name)
    }
}

impl From<String> for QueryEntity {
    fn from(name: String) -> Self {
        QueryEntity::new(name)
    }
}
