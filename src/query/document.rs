//! Tag-keyed JSON document form of the IR.
//!
//! Fields are `"$name"` strings, literals are plain JSON values and every
//! operator node is a single-key object: `{"$gt": ["$price", 100]}`.
//! `$regexMatch` uses named operands, `$switch` uses `branches`/`default`.

use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Map, Value};

use super::expr::{ArithmeticOperator, ComparisonOperator, Expr, Func, Literal, LogicalOperator};
use crate::error::{QueryError, QueryResult};

impl Expr {
    /// Convert to the document form.
    pub fn to_document(&self) -> Value {
        match self {
            Expr::Field(name) => Value::String(format!("${}", name)),
            Expr::Literal(lit) => literal_to_value(lit),
            Expr::Compare { op, left, right } => {
                tagged(op.tag(), json!([left.to_document(), right.to_document()]))
            }
            Expr::Logical { op, args } => tagged(
                op.tag(),
                Value::Array(args.iter().map(Expr::to_document).collect()),
            ),
            Expr::Not(inner) => tagged("$not", json!([inner.to_document()])),
            Expr::Arithmetic { op, left, right } => {
                tagged(op.tag(), json!([left.to_document(), right.to_document()]))
            }
            Expr::Call { func, args } => tagged(
                func.tag(),
                Value::Array(args.iter().map(Expr::to_document).collect()),
            ),
            Expr::RegexMatch {
                input,
                regex,
                options,
            } => {
                let mut operands = Map::new();
                operands.insert("input".into(), input.to_document());
                operands.insert("regex".into(), Value::String(regex.clone()));
                if let Some(options) = options {
                    operands.insert("options".into(), Value::String(options.clone()));
                }
                tagged("$regexMatch", Value::Object(operands))
            }
            Expr::Cond {
                condition,
                then,
                otherwise,
            } => tagged(
                "$cond",
                json!([
                    condition.to_document(),
                    then.to_document(),
                    otherwise.to_document()
                ]),
            ),
            Expr::Switch { branches, default } => {
                let branches: Vec<Value> = branches
                    .iter()
                    .map(|(case, then)| json!({"case": case.to_document(), "then": then.to_document()}))
                    .collect();
                let mut operands = Map::new();
                operands.insert("branches".into(), Value::Array(branches));
                if let Some(default) = default {
                    operands.insert("default".into(), default.to_document());
                }
                tagged("$switch", Value::Object(operands))
            }
            Expr::Custom { name, args } => tagged(
                name,
                Value::Array(args.iter().map(Expr::to_document).collect()),
            ),
        }
    }

    /// Parse the document form.
    ///
    /// Unknown operator tags fail with [`QueryError::UnknownOperator`].
    pub fn from_document(value: &Value) -> QueryResult<Expr> {
        match value {
            Value::Null => Ok(Expr::Literal(Literal::Null)),
            Value::Bool(b) => Ok(Expr::Literal(Literal::Bool(*b))),
            Value::Number(n) => Ok(Expr::Literal(number_to_literal(n))),
            Value::String(s) => match s.strip_prefix('$') {
                Some(name) if !name.is_empty() => Ok(Expr::Field(name.into())),
                _ => Ok(Expr::Literal(Literal::String(s.clone()))),
            },
            Value::Array(_) => Err(QueryError::InvalidExpression(
                "arrays are only valid as operator operands".into(),
            )),
            Value::Object(map) => {
                let mut entries = map.iter();
                let (Some((tag, operands)), None) = (entries.next(), entries.next()) else {
                    return Err(QueryError::InvalidExpression(format!(
                        "operator documents have exactly one key, found {}",
                        map.len()
                    )));
                };
                operator_from_document(tag, operands)
            }
        }
    }
}

fn tagged(tag: &str, operands: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), operands);
    Value::Object(map)
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) | Literal::Long(n) => json!(n),
        Literal::Single(f) => json!(f),
        Literal::Double(f) => json!(f),
        Literal::Decimal(d) => match d.to_f64() {
            Some(f) => json!(f),
            None => Value::String(d.to_string()),
        },
        Literal::String(s) => Value::String(s.clone()),
        Literal::Guid(u) => Value::String(u.to_string()),
        Literal::DateTime(s) | Literal::Time(s) | Literal::Binary(s) => Value::String(s.clone()),
    }
}

fn number_to_literal(n: &serde_json::Number) -> Literal {
    match n.as_i64() {
        Some(i) => Literal::Int(i),
        None => Literal::Double(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn operands(tag: &str, value: &Value) -> QueryResult<Vec<Expr>> {
    match value {
        Value::Array(items) => items.iter().map(Expr::from_document).collect(),
        _ => Err(QueryError::InvalidExpression(format!(
            "{} expects an operand list",
            tag
        ))),
    }
}

fn binary(tag: &str, value: &Value) -> QueryResult<(Expr, Expr)> {
    let mut items = operands(tag, value)?;
    if items.len() != 2 {
        return Err(QueryError::InvalidExpression(format!(
            "{} expects 2 operands, found {}",
            tag,
            items.len()
        )));
    }
    let right = items.pop();
    let left = items.pop();
    match (left, right) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(QueryError::InvalidExpression(format!("{} expects 2 operands", tag))),
    }
}

fn operator_from_document(tag: &str, value: &Value) -> QueryResult<Expr> {
    if let Some(op) = ComparisonOperator::ALL.into_iter().find(|op| op.tag() == tag) {
        let (left, right) = binary(tag, value)?;
        return Ok(Expr::compare(op, left, right));
    }
    if let Some(op) = ArithmeticOperator::ALL.into_iter().find(|op| op.tag() == tag) {
        let (left, right) = binary(tag, value)?;
        return Ok(Expr::arithmetic(op, left, right));
    }
    if let Some(func) = Func::from_tag(tag) {
        return Ok(Expr::call(func, operands(tag, value)?));
    }
    match tag {
        "$and" | "$or" => {
            let op = if tag == "$and" {
                LogicalOperator::And
            } else {
                LogicalOperator::Or
            };
            let args = operands(tag, value)?;
            if args.len() < 2 {
                return Err(QueryError::InvalidExpression(format!(
                    "{} expects at least 2 operands",
                    tag
                )));
            }
            Ok(Expr::Logical { op, args })
        }
        "$not" => {
            let mut args = operands(tag, value)?;
            match (args.pop(), args.is_empty()) {
                (Some(inner), true) => Ok(Expr::Not(Box::new(inner))),
                _ => Err(QueryError::InvalidExpression("$not expects 1 operand".into())),
            }
        }
        "$regexMatch" => {
            let Value::Object(named) = value else {
                return Err(QueryError::InvalidExpression(
                    "$regexMatch expects named operands".into(),
                ));
            };
            let input = named
                .get("input")
                .ok_or_else(|| QueryError::InvalidExpression("$regexMatch needs input".into()))?;
            let Some(Value::String(regex)) = named.get("regex") else {
                return Err(QueryError::InvalidExpression(
                    "$regexMatch needs a string regex".into(),
                ));
            };
            let options = match named.get("options") {
                Some(Value::String(o)) => Some(o.clone()),
                _ => None,
            };
            Ok(Expr::regex_match(Expr::from_document(input)?, regex.clone(), options))
        }
        "$cond" => {
            let mut args = operands(tag, value)?;
            if args.len() != 3 {
                return Err(QueryError::InvalidExpression("$cond expects 3 operands".into()));
            }
            let otherwise = args.remove(2);
            let then = args.remove(1);
            let condition = args.remove(0);
            Ok(Expr::cond(condition, then, otherwise))
        }
        "$switch" => {
            let Some(Value::Array(raw_branches)) = value.get("branches") else {
                return Err(QueryError::InvalidExpression(
                    "$switch needs a branches list".into(),
                ));
            };
            let mut branches = Vec::with_capacity(raw_branches.len());
            for branch in raw_branches {
                let (Some(case), Some(then)) = (branch.get("case"), branch.get("then")) else {
                    return Err(QueryError::InvalidExpression(
                        "$switch branches need case and then".into(),
                    ));
                };
                branches.push((Expr::from_document(case)?, Expr::from_document(then)?));
            }
            let default = match value.get("default") {
                Some(d) => Some(Box::new(Expr::from_document(d)?)),
                None => None,
            };
            Ok(Expr::Switch { branches, default })
        }
        other => Err(QueryError::UnknownOperator(other.into())),
    }
}
