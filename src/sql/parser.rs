//! SQL text to IR.
//!
//! Parses a single SELECT with sqlparser and converts its AST into a
//! [`QueryExpression`]. Column references go through the member resolver
//! chain and function calls through the method chain, then through the
//! default SQL function table.
//!
//! ```
//! use queryshape::sql::SqlParser;
//!
//! let query = SqlParser::new()
//!     .parse("SELECT id, name FROM Product WHERE name LIKE 'Len%'")
//!     .unwrap();
//! assert_eq!(query.collection().unwrap().collection(), "Product");
//! ```

use sqlparser::ast::{
    self as sql, BinaryOperator as SqlBinaryOp, Expr as SqlExpr, UnaryOperator as SqlUnaryOp,
    Value as SqlValue,
};
use sqlparser::parser::Parser;
use tracing::debug;

use super::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::query::{
    ArithmeticOperator, ComparisonOperator, Expr, Func, JoinDirection, JoinTarget, Literal,
    LogicalOperator, OrderByExpr, QueryEntity, QueryExpression, QueryField,
};
use crate::resolve::{expect_args, MemberResolver, MethodEvent, Resolvers};

/// Converts SQL SELECT statements into [`QueryExpression`]s.
#[derive(Debug, Clone, Default)]
pub struct SqlParser {
    dialect: Dialect,
    resolvers: Resolvers,
}

impl SqlParser {
    /// Parser reading the generic SQL grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser reading `dialect`'s grammar (e.g. MySQL `LIMIT offset, count`).
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            resolvers: Resolvers::new(),
        }
    }

    pub fn with_resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Parse exactly one SELECT statement.
    pub fn parse(&self, text: &str) -> QueryResult<QueryExpression> {
        let dialect = self.dialect.parser_dialect();
        let statements = Parser::parse_sql(&*dialect, text)
            .map_err(|e| QueryError::SqlSyntax(e.to_string()))?;

        let [statement] = statements.as_slice() else {
            return Err(QueryError::unsupported(format!(
                "expected one statement, found {}",
                statements.len()
            )));
        };
        let sql::Statement::Query(query) = statement else {
            return Err(QueryError::UnsupportedStatementKind(statement_kind(statement)));
        };

        let result = self.query(query)?;
        debug!(dialect = %self.dialect, sql = text, "parsed SQL statement");
        Ok(result)
    }

    /// Parse a bare expression such as a WHERE condition.
    pub fn parse_expr(&self, text: &str) -> QueryResult<Expr> {
        let dialect = self.dialect.parser_dialect();
        let parsed = Parser::new(&*dialect)
            .try_with_sql(text)
            .and_then(|mut parser| parser.parse_expr())
            .map_err(|e| QueryError::SqlSyntax(e.to_string()))?;
        self.expr(&parsed)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn query(&self, query: &sql::Query) -> QueryResult<QueryExpression> {
        if query.with.is_some() {
            return Err(QueryError::unsupported("WITH clauses"));
        }
        let sql::SetExpr::Select(select) = query.body.as_ref() else {
            return Err(QueryError::unsupported(format!(
                "query body '{}'",
                query.body
            )));
        };

        let mut result = QueryExpression::new();
        result.with_resolvers(self.resolvers.clone());
        self.select(&mut result, select)?;

        if let Some(order_by) = &query.order_by {
            let terms = order_by
                .exprs
                .iter()
                .map(|term| {
                    let expr = self.expr(&term.expr)?;
                    Ok(match term.asc {
                        Some(false) => OrderByExpr::desc(expr),
                        _ => OrderByExpr::asc(expr),
                    })
                })
                .collect::<QueryResult<Vec<_>>>()?;
            result.order_by_exprs(terms);
        }

        if let Some(limit) = &query.limit {
            result.take(integer(limit, "LIMIT")?);
        }
        if let Some(offset) = &query.offset {
            result.skip(integer(&offset.value, "OFFSET")?);
        }

        Ok(result)
    }

    fn select(&self, result: &mut QueryExpression, select: &sql::Select) -> QueryResult<()> {
        let [from] = select.from.as_slice() else {
            return Err(QueryError::unsupported(format!(
                "SELECT needs exactly one FROM source, found {}",
                select.from.len()
            )));
        };
        result.from_collection(base_table(&from.relation)?);

        for join in &from.joins {
            self.join(result, join)?;
        }

        match &select.distinct {
            None => {}
            Some(sql::Distinct::Distinct) => {
                result.distinct(true);
            }
            Some(sql::Distinct::On(_)) => return Err(QueryError::unsupported("DISTINCT ON")),
        }

        let fields = self.projection(&select.projection)?;
        if !fields.is_empty() {
            result.select(fields);
        }

        if let Some(selection) = &select.selection {
            result.where_expr(self.expr(selection)?);
        }

        match &select.group_by {
            sql::GroupByExpr::Expressions(exprs, _) => {
                if !exprs.is_empty() {
                    let groups = exprs
                        .iter()
                        .map(|e| self.expr(e))
                        .collect::<QueryResult<Vec<_>>>()?;
                    result.group_by(groups);
                }
            }
            sql::GroupByExpr::All(_) => return Err(QueryError::unsupported("GROUP BY ALL")),
        }

        if select.having.is_some() {
            return Err(QueryError::unsupported("HAVING"));
        }
        Ok(())
    }

    /// SELECT list. A lone `*` yields no fields.
    fn projection(&self, items: &[sql::SelectItem]) -> QueryResult<Vec<QueryField>> {
        let mut fields = Vec::new();
        let mut unnamed = 0;
        for item in items {
            match item {
                sql::SelectItem::UnnamedExpr(expr) => {
                    let value = self.expr(expr)?;
                    fields.push(match value {
                        Expr::Field(name) => QueryField::new(name),
                        other => {
                            unnamed += 1;
                            QueryField::computed(format!("field{}", unnamed), other)
                        }
                    });
                }
                sql::SelectItem::ExprWithAlias { expr, alias } => {
                    let value = self.expr(expr)?;
                    fields.push(QueryField::computed(alias.value.clone(), value));
                }
                sql::SelectItem::Wildcard(_) => {}
                sql::SelectItem::QualifiedWildcard(name, _) => {
                    return Err(QueryError::unsupported(format!("qualified wildcard {}.*", name)));
                }
            }
        }
        Ok(fields)
    }

    fn join(&self, result: &mut QueryExpression, join: &sql::Join) -> QueryResult<()> {
        let (direction, constraint) = match &join.join_operator {
            sql::JoinOperator::Inner(c) => (JoinDirection::Inner, c),
            sql::JoinOperator::LeftOuter(c) => (JoinDirection::Left, c),
            sql::JoinOperator::RightOuter(c) => (JoinDirection::Right, c),
            other => return Err(QueryError::unsupported(format!("join operator {:?}", other))),
        };
        let sql::JoinConstraint::On(on) = constraint else {
            return Err(QueryError::unsupported("joins without an ON condition"));
        };

        let (target, alias): (JoinTarget, Option<String>) = match &join.relation {
            sql::TableFactor::Table { name, alias, .. } => (
                QueryEntity::new(object_name(name)).into(),
                alias.as_ref().map(|a| a.name.value.clone()),
            ),
            sql::TableFactor::Derived {
                subquery, alias, ..
            } => (
                self.query(subquery)?.into(),
                alias.as_ref().map(|a| a.name.value.clone()),
            ),
            other => return Err(QueryError::unsupported(format!("join source {}", other))),
        };

        let condition = self.expr(on)?;
        result.join_with(target, direction, alias.as_deref());
        result.on_expr(condition)?;
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expr(&self, expr: &SqlExpr) -> QueryResult<Expr> {
        match expr {
            SqlExpr::Identifier(ident) => Ok(Expr::Field(
                self.resolvers.resolve_member(&ident.value, None),
            )),

            SqlExpr::CompoundIdentifier(idents) => {
                let Some((member, qualifier)) = idents.split_last() else {
                    return Err(QueryError::InvalidFieldExpression("empty identifier".into()));
                };
                let qualifier = qualifier
                    .iter()
                    .map(|i| i.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                Ok(Expr::Field(
                    self.resolvers.resolve_join_member(&qualifier, &member.value),
                ))
            }

            SqlExpr::Value(value) => Ok(Expr::Literal(literal(value)?)),

            SqlExpr::Nested(inner) => self.expr(inner),

            SqlExpr::BinaryOp { left, op, right } => self.binary(left, op, right),

            SqlExpr::UnaryOp { op, expr } => match op {
                SqlUnaryOp::Not => Ok(Expr::Not(Box::new(self.expr(expr)?))),
                SqlUnaryOp::Plus => self.expr(expr),
                SqlUnaryOp::Minus => match self.expr(expr)? {
                    Expr::Literal(lit) => Ok(Expr::Literal(lit.checked_neg()?)),
                    other => Ok(Expr::arithmetic(
                        ArithmeticOperator::Subtract,
                        Expr::from(0),
                        other,
                    )),
                },
                other => Err(QueryError::unsupported(format!("unary operator {}", other))),
            },

            SqlExpr::IsNull(inner) => Ok(Expr::compare(
                ComparisonOperator::Eq,
                self.expr(inner)?,
                Expr::Literal(Literal::Null),
            )),

            SqlExpr::IsNotNull(inner) => Ok(Expr::compare(
                ComparisonOperator::Ne,
                self.expr(inner)?,
                Expr::Literal(Literal::Null),
            )),

            SqlExpr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let between = Expr::between(self.expr(expr)?, self.expr(low)?, self.expr(high)?);
                Ok(negated_if(*negated, between))
            }

            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let input = self.expr(expr)?;
                let terms = list
                    .iter()
                    .map(|item| {
                        Ok(Expr::compare(
                            ComparisonOperator::Eq,
                            input.clone(),
                            self.expr(item)?,
                        ))
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                let any = Expr::fold_logical(LogicalOperator::Or, terms)
                    .ok_or_else(|| QueryError::unsupported("empty IN list"))?;
                Ok(negated_if(*negated, any))
            }

            SqlExpr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => self.like(expr, pattern, escape_char.as_deref(), *negated, None),

            SqlExpr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => self.like(expr, pattern, escape_char.as_deref(), *negated, Some("i".into())),

            SqlExpr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let operand = operand.as_deref().map(|o| self.expr(o)).transpose()?;
                let mut branches = Vec::with_capacity(conditions.len());
                for (condition, result) in conditions.iter().zip(results) {
                    let condition = self.expr(condition)?;
                    let condition = match &operand {
                        Some(o) => Expr::compare(ComparisonOperator::Eq, o.clone(), condition),
                        None => condition,
                    };
                    branches.push((condition, self.expr(result)?));
                }
                let default = else_result.as_deref().map(|e| self.expr(e)).transpose()?;
                Ok(match (branches.len(), default) {
                    (1, Some(otherwise)) => {
                        let (condition, then) = branches.remove(0);
                        Expr::cond(condition, then, otherwise)
                    }
                    (_, default) => Expr::Switch {
                        branches,
                        default: default.map(Box::new),
                    },
                })
            }

            SqlExpr::Extract { field, expr, .. } => {
                let func = match field {
                    sql::DateTimeField::Year => Func::Year,
                    sql::DateTimeField::Month => Func::Month,
                    sql::DateTimeField::Day => Func::Day,
                    sql::DateTimeField::Hour => Func::Hour,
                    sql::DateTimeField::Minute => Func::Minute,
                    sql::DateTimeField::Second => Func::Second,
                    other => {
                        return Err(QueryError::unsupported(format!("EXTRACT({})", other)))
                    }
                };
                Ok(Expr::call(func, vec![self.expr(expr)?]))
            }

            // SUBSTRING(x FROM a FOR b) and SUBSTRING(x, a, b) share this node.
            SqlExpr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                let mut args = vec![self.expr(expr)?];
                match substring_from {
                    Some(from) => args.push(self.expr(from)?),
                    None => args.push(Expr::from(1)),
                }
                if let Some(length) = substring_for {
                    args.push(self.expr(length)?);
                }
                self.call("substring", args)
            }

            SqlExpr::Trim {
                expr,
                trim_where: None,
                trim_what: None,
                ..
            } => self.call("trim", vec![self.expr(expr)?]),

            SqlExpr::Ceil { expr, .. } => self.call("ceil", vec![self.expr(expr)?]),

            SqlExpr::Floor { expr, .. } => self.call("floor", vec![self.expr(expr)?]),

            SqlExpr::Function(function) => self.function(function),

            other => Err(QueryError::unsupported(format!("SQL expression {}", other))),
        }
    }

    fn binary(&self, left: &SqlExpr, op: &SqlBinaryOp, right: &SqlExpr) -> QueryResult<Expr> {
        let logical = match op {
            SqlBinaryOp::And => Some(LogicalOperator::And),
            SqlBinaryOp::Or => Some(LogicalOperator::Or),
            _ => None,
        };
        if let Some(logical) = logical {
            let mut operands = Vec::new();
            self.flatten(left, op, &mut operands)?;
            self.flatten(right, op, &mut operands)?;
            return Expr::fold_logical(logical, operands)
                .ok_or_else(|| QueryError::InvalidExpression("empty logical chain".into()));
        }

        if let SqlBinaryOp::StringConcat = op {
            let mut operands = Vec::new();
            self.flatten(left, op, &mut operands)?;
            self.flatten(right, op, &mut operands)?;
            return Ok(Expr::call(Func::Concat, operands));
        }

        let (l, r) = (self.expr(left)?, self.expr(right)?);
        let comparison = match op {
            SqlBinaryOp::Eq => Some(ComparisonOperator::Eq),
            SqlBinaryOp::NotEq => Some(ComparisonOperator::Ne),
            SqlBinaryOp::Gt => Some(ComparisonOperator::Gt),
            SqlBinaryOp::GtEq => Some(ComparisonOperator::Gte),
            SqlBinaryOp::Lt => Some(ComparisonOperator::Lt),
            SqlBinaryOp::LtEq => Some(ComparisonOperator::Lte),
            _ => None,
        };
        if let Some(comparison) = comparison {
            return Ok(Expr::compare(comparison, l, r));
        }
        let arithmetic = match op {
            SqlBinaryOp::Plus => ArithmeticOperator::Add,
            SqlBinaryOp::Minus => ArithmeticOperator::Subtract,
            SqlBinaryOp::Multiply => ArithmeticOperator::Multiply,
            SqlBinaryOp::Divide => ArithmeticOperator::Divide,
            SqlBinaryOp::Modulo => ArithmeticOperator::Modulo,
            other => return Err(QueryError::unsupported(format!("binary operator {}", other))),
        };
        Ok(Expr::arithmetic(arithmetic, l, r))
    }

    /// Collect the operands of a same-operator chain in source order.
    fn flatten(&self, expr: &SqlExpr, op: &SqlBinaryOp, out: &mut Vec<Expr>) -> QueryResult<()> {
        match expr {
            SqlExpr::BinaryOp {
                left,
                op: inner,
                right,
            } if inner == op => {
                self.flatten(left, op, out)?;
                self.flatten(right, op, out)
            }
            other => {
                out.push(self.expr(other)?);
                Ok(())
            }
        }
    }

    fn like(
        &self,
        input: &SqlExpr,
        pattern: &SqlExpr,
        escape: Option<&str>,
        negated: bool,
        options: Option<String>,
    ) -> QueryResult<Expr> {
        let SqlExpr::Value(SqlValue::SingleQuotedString(pattern)) = pattern else {
            return Err(QueryError::unsupported(format!(
                "LIKE pattern must be a string literal, found {}",
                pattern
            )));
        };
        let escape = match escape {
            None => None,
            Some(e) if e.chars().count() == 1 => e.chars().next(),
            Some(e) => {
                return Err(QueryError::unsupported(format!(
                    "LIKE escape '{}' must be a single character",
                    e
                )))
            }
        };
        let regex = like_to_regex(pattern, escape)?;
        Ok(negated_if(
            negated,
            Expr::regex_match(self.expr(input)?, regex, options),
        ))
    }

    fn function(&self, function: &sql::Function) -> QueryResult<Expr> {
        if function.over.is_some() {
            return Err(QueryError::unsupported("window functions"));
        }
        let name = function.name.to_string().to_lowercase();
        let args = match &function.args {
            sql::FunctionArguments::None => Vec::new(),
            sql::FunctionArguments::Subquery(_) => {
                return Err(QueryError::unsupported("sub-query function arguments"))
            }
            sql::FunctionArguments::List(list) => {
                if list.duplicate_treatment.is_some() {
                    return Err(QueryError::unsupported(format!("{}(DISTINCT ...)", name)));
                }
                let mut args = Vec::with_capacity(list.args.len());
                for arg in &list.args {
                    match arg {
                        sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(e)) => {
                            args.push(self.expr(e)?)
                        }
                        // COUNT(*)
                        sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Wildcard) => {}
                        other => {
                            return Err(QueryError::unsupported(format!(
                                "function argument {}",
                                other
                            )))
                        }
                    }
                }
                args
            }
        };
        self.call(&name, args)
    }

    fn call(&self, name: &str, args: Vec<Expr>) -> QueryResult<Expr> {
        self.resolvers
            .resolve_method(MethodEvent::new(name, args, false), &SqlFunctions)
    }
}

// =============================================================================
// Default Function Table
// =============================================================================

/// SQL function names understood without a resolver.
struct SqlFunctions;

impl MemberResolver for SqlFunctions {
    fn resolving_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
        let func = match event.name.as_str() {
            "count" => {
                expect_args(event, 0..=1)?;
                Func::Count
            }
            "min" => Func::Min,
            "max" => Func::Max,
            "avg" => Func::Avg,
            "sum" => Func::Sum,
            "year" => Func::Year,
            "month" => Func::Month,
            "day" | "dayofmonth" => Func::Day,
            "hour" => Func::Hour,
            "minute" => Func::Minute,
            "second" => Func::Second,
            "lower" => Func::ToLower,
            "upper" => Func::ToUpper,
            "trim" => Func::Trim,
            "length" | "len" | "char_length" => Func::Length,
            "ceil" | "ceiling" => Func::Ceil,
            "floor" => Func::Floor,
            "round" => {
                expect_args(event, 1..=2)?;
                event.resolved = Some(Expr::call(Func::Round, event.args.clone()));
                return Ok(());
            }
            "concat" => {
                expect_args(event, 2..=usize::MAX)?;
                event.resolved = Some(Expr::call(Func::Concat, event.args.clone()));
                return Ok(());
            }
            "substring" | "substr" => {
                expect_args(event, 2..=3)?;
                let mut args = event.args.clone();
                args[1] = zero_based(&args[1])?;
                event.resolved = Some(Expr::call(Func::Substr, args));
                return Ok(());
            }
            "regexp_like" => {
                expect_args(event, 2..=3)?;
                let text = |e: &Expr| match e {
                    Expr::Literal(Literal::String(s)) => Ok(s.clone()),
                    other => Err(QueryError::UnsupportedArgumentType(format!(
                        "regexp_like() needs string constants, found {:?}",
                        other
                    ))),
                };
                let regex = text(&event.args[1])?;
                let options = event.args.get(2).map(text).transpose()?;
                event.resolved = Some(Expr::regex_match(event.args[0].clone(), regex, options));
                return Ok(());
            }
            _ => return Ok(()),
        };
        if func != Func::Count {
            expect_args(event, 1..=1)?;
        }
        event.resolved = Some(Expr::call(func, event.args.clone()));
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn statement_kind(statement: &sql::Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn object_name(name: &sql::ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn base_table(relation: &sql::TableFactor) -> QueryResult<QueryEntity> {
    match relation {
        sql::TableFactor::Table { name, alias, .. } => Ok(match alias {
            Some(alias) => QueryEntity::aliased(object_name(name), alias.name.value.clone()),
            None => QueryEntity::new(object_name(name)),
        }),
        other => Err(QueryError::unsupported(format!("FROM source {}", other))),
    }
}

fn literal(value: &SqlValue) -> QueryResult<Literal> {
    match value {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Literal::Int(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Literal::Double(f))
            } else {
                Err(QueryError::SqlSyntax(format!("invalid number: {}", n)))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Literal::String(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Literal::Bool(*b)),
        SqlValue::Null => Ok(Literal::Null),
        other => Err(QueryError::unsupported(format!("SQL value {}", other))),
    }
}

fn integer(expr: &SqlExpr, clause: &str) -> QueryResult<i64> {
    match expr {
        SqlExpr::Value(SqlValue::Number(n, _)) => n
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidExpression(format!("{} must be an integer, found {}", clause, n))),
        other => Err(QueryError::unsupported(format!("{} {}", clause, other))),
    }
}

fn negated_if(negated: bool, expr: Expr) -> Expr {
    if negated {
        Expr::Not(Box::new(expr))
    } else {
        expr
    }
}

/// One-based SQL position as a zero-based IR offset.
fn zero_based(start: &Expr) -> QueryResult<Expr> {
    match start {
        Expr::Literal(Literal::Int(n)) => n.checked_sub(1).map(Expr::from).ok_or_else(|| {
            QueryError::InvalidExpression(format!("SUBSTRING start {} is out of range", n))
        }),
        other => Ok(Expr::arithmetic(ArithmeticOperator::Subtract, other.clone(), Expr::from(1))),
    }
}

enum LikePiece {
    Literal(char),
    Any,
    One,
}

/// `%` and `_` wildcards as a regex. A pattern not starting with `%` is
/// anchored with `^`, one not ending with `%` with `$`. A character after
/// `escape` is taken literally.
pub(crate) fn like_to_regex(pattern: &str, escape: Option<char>) -> QueryResult<String> {
    let mut pieces = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let piece = match c {
            c if Some(c) == escape => chars.next().map(LikePiece::Literal).ok_or_else(|| {
                QueryError::InvalidExpression(format!(
                    "LIKE pattern '{}' ends with its escape character",
                    pattern
                ))
            })?,
            '%' => LikePiece::Any,
            '_' => LikePiece::One,
            other => LikePiece::Literal(other),
        };
        pieces.push(piece);
    }

    let leading = matches!(pieces.first(), Some(LikePiece::Any));
    let rest = if leading { &pieces[1..] } else { &pieces[..] };
    let trailing = matches!(rest.last(), Some(LikePiece::Any));
    let body = if trailing { &rest[..rest.len() - 1] } else { rest };

    let mut regex = String::new();
    if !leading {
        regex.push('^');
    }
    let mut literal = String::new();
    for piece in body {
        match piece {
            LikePiece::Literal(c) => literal.push(*c),
            wildcard => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                regex.push_str(if matches!(wildcard, LikePiece::Any) { ".*" } else { "." });
            }
        }
    }
    regex.push_str(&regex::escape(&literal));
    if !trailing {
        regex.push('$');
    }
    Ok(regex)
}
