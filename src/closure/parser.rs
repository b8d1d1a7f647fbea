//! Translation of closure syntax trees into IR fragments.

use super::{BinOp, BoolOp, CmpOp, Lambda, Params, Subscript, Syntax, UnaryOp};
use crate::error::{QueryError, QueryResult};
use crate::query::{
    ArithmeticOperator, ComparisonOperator, Expr, Func, Literal, LogicalOperator, QueryField,
};
use crate::resolve::{expect_args, MemberResolver, MethodEvent, Resolvers};

/// Closure-to-IR translator.
///
/// Parameter `i` of a closure may be bound to a collection reference with
/// [`ClosureParser::bind`]: members of parameter 0 are then qualified with
/// that reference, members of later parameters are join members.
#[derive(Debug, Clone, Default)]
pub struct ClosureParser {
    resolvers: Resolvers,
    bindings: Vec<Option<String>>,
}

/// A member path rooted at a lambda parameter.
struct MemberPath<'a> {
    param: usize,
    param_name: &'a str,
    segments: Vec<&'a str>,
}

impl ClosureParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Bind parameter `index` to `reference`.
    pub fn bind(mut self, index: usize, reference: &str) -> Self {
        if self.bindings.len() <= index {
            self.bindings.resize(index + 1, None);
        }
        self.bindings[index] = Some(reference.to_string());
        self
    }

    /// Parse a predicate closure.
    pub fn parse_filter(&self, lambda: &Lambda, params: &Params) -> QueryResult<Expr> {
        let expr = Translation::new(self, lambda, params).expr(lambda.body())?;
        tracing::debug!(params = ?lambda.params(), "closure filter parsed");
        Ok(expr)
    }

    /// Parse a projection closure: a single expression, a list/tuple of
    /// expressions, a dict literal or a `dict(name=expr, ...)` call.
    ///
    /// Plain members keep their resolved path as name. Other unnamed
    /// expressions are named `field1`, `field2`, ... in source order.
    pub fn parse_projection(&self, lambda: &Lambda, params: &Params) -> QueryResult<Vec<QueryField>> {
        let translation = Translation::new(self, lambda, params);
        let mut counter = 0;
        let fields = match lambda.body() {
            Syntax::List(items) | Syntax::Tuple(items) => items
                .iter()
                .map(|item| translation.unnamed_field(item, &mut counter))
                .collect::<QueryResult<Vec<_>>>()?,
            Syntax::Dict(entries) => entries
                .iter()
                .map(|(key, value)| match key {
                    Syntax::Constant(Literal::String(name)) => {
                        Ok(QueryField::computed(name.as_str(), translation.expr(value)?))
                    }
                    other => Err(QueryError::unsupported(format!(
                        "projection keys must be string constants, found {:?}",
                        other
                    ))),
                })
                .collect::<QueryResult<Vec<_>>>()?,
            Syntax::Call { func, args, keywords }
                if args.is_empty() && matches!(func.as_ref(), Syntax::Name(n) if n == "dict") =>
            {
                keywords
                    .iter()
                    .map(|(name, value)| Ok(QueryField::computed(name.as_str(), translation.expr(value)?)))
                    .collect::<QueryResult<Vec<_>>>()?
            }
            single => vec![translation.unnamed_field(single, &mut counter)?],
        };
        tracing::debug!(fields = fields.len(), "closure projection parsed");
        Ok(fields)
    }

    fn binding(&self, index: usize) -> Option<&str> {
        self.bindings.get(index).and_then(|b| b.as_deref())
    }
}

// =============================================================================
// Translation
// =============================================================================

struct Translation<'p> {
    parser: &'p ClosureParser,
    lambda: &'p Lambda,
    params: &'p Params,
}

impl<'p> Translation<'p> {
    fn new(parser: &'p ClosureParser, lambda: &'p Lambda, params: &'p Params) -> Self {
        Self {
            parser,
            lambda,
            params,
        }
    }

    fn unnamed_field(&self, node: &Syntax, counter: &mut usize) -> QueryResult<QueryField> {
        let expr = self.expr(node)?;
        match expr {
            Expr::Field(path) => Ok(QueryField::new(path)),
            computed => {
                *counter += 1;
                Ok(QueryField::computed(format!("field{}", counter), computed))
            }
        }
    }

    fn expr(&self, node: &Syntax) -> QueryResult<Expr> {
        match node {
            Syntax::Constant(lit) => Ok(Expr::Literal(lit.clone())),
            Syntax::Name(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::UnknownParameter(name.clone())),
            Syntax::Param(name) => Err(QueryError::unsupported(format!(
                "bare parameter '{}' has no IR mapping",
                name
            ))),
            Syntax::Attribute { .. } => self.member(node),
            Syntax::Compare { left, comparators } => self.comparison(left, comparators),
            Syntax::BoolOp { op, values } => {
                let op = match op {
                    BoolOp::And => LogicalOperator::And,
                    BoolOp::Or => LogicalOperator::Or,
                };
                let operands = values
                    .iter()
                    .map(|v| self.expr(v))
                    .collect::<QueryResult<Vec<_>>>()?;
                Expr::fold_logical(op, operands)
                    .ok_or_else(|| QueryError::unsupported("empty boolean operation"))
            }
            Syntax::BinOp { op, left, right } => {
                let op = match op {
                    BinOp::Add => ArithmeticOperator::Add,
                    BinOp::Sub => ArithmeticOperator::Subtract,
                    BinOp::Mult => ArithmeticOperator::Multiply,
                    BinOp::Div => ArithmeticOperator::Divide,
                    BinOp::Mod => ArithmeticOperator::Modulo,
                };
                Ok(Expr::arithmetic(op, self.expr(left)?, self.expr(right)?))
            }
            Syntax::UnaryOp { op, operand } => match (op, self.expr(operand)?) {
                (UnaryOp::Not, inner) => Ok(Expr::Not(Box::new(inner))),
                (UnaryOp::USub, Expr::Literal(lit)) => lit.checked_neg().map(Expr::Literal),
                (UnaryOp::USub, inner) => Ok(Expr::arithmetic(
                    ArithmeticOperator::Subtract,
                    Expr::Literal(Literal::Int(0)),
                    inner,
                )),
            },
            Syntax::Call {
                func,
                args,
                keywords,
            } => {
                if !keywords.is_empty() {
                    return Err(QueryError::unsupported(
                        "keyword arguments are only valid in projections",
                    ));
                }
                self.call(func, args)
            }
            Syntax::Subscript { value, slice } => self.subscript(value, slice),
            Syntax::IfExp { test, body, orelse } => Ok(Expr::cond(
                self.expr(test)?,
                self.expr(body)?,
                self.expr(orelse)?,
            )),
            Syntax::List(_) | Syntax::Tuple(_) | Syntax::Dict(_) => Err(QueryError::unsupported(
                "collection literals are only valid as a projection body",
            )),
            Syntax::Lambda(_) => Err(QueryError::unsupported("nested lambdas")),
        }
    }

    // -------------------------------------------------------------------------
    // Members
    // -------------------------------------------------------------------------

    fn member(&self, node: &Syntax) -> QueryResult<Expr> {
        let path = self.member_path(node)?.ok_or_else(|| {
            QueryError::unsupported("attribute access must start at a lambda parameter")
        })?;
        let resolvers = &self.parser.resolvers;
        let resolved = match (path.param, path.segments.as_slice()) {
            (0, [member]) => resolvers.resolve_member(member, self.parser.binding(0)),
            (index, segments) => {
                let (member, parents) = segments
                    .split_last()
                    .ok_or_else(|| QueryError::unsupported("empty member path"))?;
                let mut qualifier: Vec<&str> = Vec::with_capacity(parents.len() + 1);
                match (index, self.parser.binding(index)) {
                    (_, Some(reference)) => qualifier.push(reference),
                    (0, None) => {}
                    (_, None) => qualifier.push(path.param_name),
                }
                qualifier.extend_from_slice(parents);
                resolvers.resolve_join_member(&qualifier.join("."), member)
            }
        };
        Ok(Expr::Field(resolved))
    }

    /// `Some` when `node` is an attribute chain rooted at a parameter.
    fn member_path<'n>(&self, node: &'n Syntax) -> QueryResult<Option<MemberPath<'n>>> {
        match node {
            Syntax::Attribute { value, attr } => match value.as_ref() {
                Syntax::Param(name) => {
                    let param = self
                        .lambda
                        .param_index(name)
                        .ok_or_else(|| QueryError::UnknownParameter(name.clone()))?;
                    Ok(Some(MemberPath {
                        param,
                        param_name: name.as_str(),
                        segments: vec![attr.as_str()],
                    }))
                }
                inner => Ok(self.member_path(inner)?.map(|mut path| {
                    path.segments.push(attr.as_str());
                    path
                })),
            },
            _ => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Comparisons
    // -------------------------------------------------------------------------

    /// `a < b < c` becomes `(a < b) and (b < c)`. Inside a chain, a
    /// constant on the left is moved to the right (`500 <= x` is `x >= 500`).
    fn comparison(&self, left: &Syntax, comparators: &[(CmpOp, Syntax)]) -> QueryResult<Expr> {
        let chained = comparators.len() > 1;
        let mut terms = Vec::with_capacity(comparators.len());
        let mut lhs = self.expr(left)?;
        for (op, right) in comparators {
            let rhs = self.expr(right)?;
            let op = match op {
                CmpOp::Eq | CmpOp::Is => ComparisonOperator::Eq,
                CmpOp::NotEq | CmpOp::IsNot => ComparisonOperator::Ne,
                CmpOp::Lt => ComparisonOperator::Lt,
                CmpOp::LtE => ComparisonOperator::Lte,
                CmpOp::Gt => ComparisonOperator::Gt,
                CmpOp::GtE => ComparisonOperator::Gte,
            };
            let term = if chained
                && matches!(lhs, Expr::Literal(_))
                && !matches!(rhs, Expr::Literal(_))
            {
                Expr::compare(op.flipped(), rhs.clone(), lhs)
            } else {
                Expr::compare(op, lhs, rhs.clone())
            };
            terms.push(term);
            lhs = rhs;
        }
        Expr::fold_logical(LogicalOperator::And, terms)
            .ok_or_else(|| QueryError::unsupported("comparison without comparators"))
    }

    // -------------------------------------------------------------------------
    // Calls and Subscripts
    // -------------------------------------------------------------------------

    fn call(&self, func: &Syntax, args: &[Syntax]) -> QueryResult<Expr> {
        let args = args
            .iter()
            .map(|a| self.expr(a))
            .collect::<QueryResult<Vec<_>>>()?;
        let event = match func {
            Syntax::Name(name) => MethodEvent::new(name.as_str(), args, false),
            Syntax::Attribute { value, attr } => {
                let mut full = vec![self.expr(value)?];
                full.extend(args);
                MethodEvent::new(attr.as_str(), full, true)
            }
            other => {
                return Err(QueryError::unsupported(format!(
                    "call target {:?}",
                    other
                )))
            }
        };
        self.parser.resolvers.resolve_method(event, &BuiltinMethods)
    }

    fn subscript(&self, value: &Syntax, slice: &Subscript) -> QueryResult<Expr> {
        let Subscript::Slice { lower, upper, step } = slice else {
            return Err(QueryError::unsupported("index subscripts"));
        };
        if step.is_some() {
            return Err(QueryError::unsupported("stepped slices"));
        }
        let bound = |node: &Option<Box<Syntax>>| -> QueryResult<Option<i64>> {
            match node.as_deref() {
                None => Ok(None),
                Some(Syntax::Constant(Literal::Int(n))) if *n >= 0 => Ok(Some(*n)),
                Some(other) => Err(QueryError::unsupported(format!(
                    "slice bounds must be non-negative integer constants, found {:?}",
                    other
                ))),
            }
        };
        let start = bound(lower)?.unwrap_or(0);
        let mut args = vec![self.expr(value)?, Expr::from(start)];
        if let Some(end) = bound(upper)? {
            args.push(Expr::from((end - start).max(0)));
        }
        Ok(Expr::call(Func::Substr, args))
    }
}

// =============================================================================
// Built-in Methods
// =============================================================================

/// Default method table consulted after the resolver chain.
struct BuiltinMethods;

impl MemberResolver for BuiltinMethods {
    fn resolving_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
        let resolved = if event.instance {
            instance_method(event)?
        } else {
            free_function(event)?
        };
        if resolved.is_some() {
            event.resolved = resolved;
        }
        Ok(())
    }
}

fn free_function(event: &MethodEvent) -> QueryResult<Option<Expr>> {
    let func = match event.name.as_str() {
        "length" | "len" => Func::Length,
        "count" => Func::Count,
        "min" => Func::Min,
        "max" => Func::Max,
        "mean" => Func::Avg,
        "sum" => Func::Sum,
        "round" => {
            expect_args(event, 1..=2)?;
            return Ok(Some(Expr::call(Func::Round, event.args.clone())));
        }
        "ceil" => Func::Ceil,
        "floor" => Func::Floor,
        "year" => Func::Year,
        "month" => Func::Month,
        "day" => Func::Day,
        "hour" => Func::Hour,
        "minute" => Func::Minute,
        "second" => Func::Second,
        _ => return Ok(None),
    };
    expect_args(event, 1..=1)?;
    Ok(Some(Expr::call(func, event.args.clone())))
}

fn instance_method(event: &MethodEvent) -> QueryResult<Option<Expr>> {
    let func = match event.name.as_str() {
        "upper" => Func::ToUpper,
        "lower" => Func::ToLower,
        "strip" => Func::Trim,
        "index" => {
            expect_args(event, 2..=2)?;
            return Ok(Some(Expr::call(Func::IndexOf, event.args.clone())));
        }
        "startswith" | "endswith" | "contains" => {
            expect_args(event, 2..=2)?;
            let [input, Expr::Literal(Literal::String(text))] = event.args.as_slice() else {
                return Err(QueryError::unsupported(format!(
                    "{}() needs a string constant",
                    event.name
                )));
            };
            let input = input.clone();
            return Ok(Some(match event.name.as_str() {
                "startswith" => Expr::starts_with(input, text),
                "endswith" => Expr::ends_with(input, text),
                _ => Expr::contains(input, text),
            }));
        }
        _ => return Ok(None),
    };
    expect_args(event, 1..=1)?;
    Ok(Some(Expr::call(func, event.args.clone())))
}
