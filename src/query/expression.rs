//! `QueryExpression` - the IR every front-end builds and every formatter reads.
//!
//! # Building a filter
//!
//! ```
//! use queryshape::query::QueryExpression;
//!
//! let mut q = QueryExpression::new();
//! q.from_collection("Product").select(["id", "name"]);
//! q.where_field("category").equal("Laptops").unwrap();
//! q.and_also("price").lower_than(1000).unwrap();
//! ```
//!
//! Comparison methods fold into the filter with the fold rule: a new term
//! is appended when the current filter's top-level operator equals the
//! connective set by `and_also`/`or_else`, and wrapped together with the
//! current filter otherwise.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use super::expr::{ArithmeticOperator, ComparisonOperator, Expr, Func, Literal, LogicalOperator};
use super::field::{QueryEntity, QueryField};
use super::lookup::{JoinCondition, JoinDirection, JoinTarget, Lookup, StagedJoin};
use crate::closure::{ClosureParser, Lambda, Params};
use crate::error::{QueryError, QueryResult};
use crate::resolve::Resolvers;

static COLLECTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

// =============================================================================
// Supporting Types
// =============================================================================

/// Sort direction, `1` ascending and `-1` descending in document form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_i32(self) -> i32 {
        match self {
            SortDir::Asc => 1,
            SortDir::Desc => -1,
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
        }
    }
}

/// Statement kind, derived from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A `column = value` pair of an INSERT or UPDATE.
pub type Assignment = (String, Expr);

/// Write payload; at most one per expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Insert(Vec<Assignment>),
    Update(Vec<Assignment>),
    Delete,
}

// =============================================================================
// QueryExpression
// =============================================================================

/// The query IR and its fluent builder.
///
/// Mutating methods take `&mut self`. Fallible ones return
/// `QueryResult<&mut Self>` and leave the expression untouched on error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExpression {
    collection: Option<QueryEntity>,
    select: Vec<QueryField>,
    filter: Option<Expr>,
    prepared: Option<Expr>,
    order_by: Vec<OrderByExpr>,
    group_by: Vec<Expr>,
    lookup: Vec<Lookup>,
    limit: i64,
    skip: i64,
    distinct: bool,
    payload: Option<Payload>,

    // builder state
    left: Option<Expr>,
    connective: Option<LogicalOperator>,
    staged_join: Option<StagedJoin>,
    resolvers: Resolvers,
}

impl QueryExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolvers consulted by the closure forms.
    pub fn with_resolvers(&mut self, resolvers: Resolvers) -> &mut Self {
        self.resolvers = resolvers;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn collection(&self) -> Option<&QueryEntity> {
        self.collection.as_ref()
    }

    pub fn fields(&self) -> &[QueryField] {
        &self.select
    }

    /// Current (unprepared) filter.
    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn prepared(&self) -> Option<&Expr> {
        self.prepared.as_ref()
    }

    /// Prepared and current filter combined with `$and`.
    pub fn effective_filter(&self) -> Option<Expr> {
        match (&self.prepared, &self.filter) {
            (Some(prepared), Some(filter)) => Some(Expr::Logical {
                op: LogicalOperator::And,
                args: vec![prepared.clone(), filter.clone()],
            }),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        }
    }

    pub fn ordering(&self) -> &[OrderByExpr] {
        &self.order_by
    }

    pub fn grouping(&self) -> &[Expr] {
        &self.group_by
    }

    pub fn lookups(&self) -> &[Lookup] {
        &self.lookup
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.skip
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn resolvers(&self) -> &Resolvers {
        &self.resolvers
    }

    /// Statement kind derived from the write payload.
    pub fn statement_kind(&self) -> StatementKind {
        match self.payload {
            Some(Payload::Insert(_)) => StatementKind::Insert,
            Some(Payload::Update(_)) => StatementKind::Update,
            Some(Payload::Delete) => StatementKind::Delete,
            None => StatementKind::Select,
        }
    }

    // =========================================================================
    // Collection and Projection
    // =========================================================================

    pub fn from_collection(&mut self, entity: impl Into<QueryEntity>) -> &mut Self {
        self.collection = Some(entity.into());
        self
    }

    /// Merge fields into the projection in call order.
    ///
    /// A field whose name is already projected replaces the earlier entry.
    pub fn select<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<QueryField>,
    {
        self.payload = None;
        for field in fields {
            self.merge_select(field.into());
        }
        self
    }

    /// Merge raw document fragments: `"name"`, `{"name": 1}`,
    /// `{"alias": <expr>}` or an array of those.
    ///
    /// A `0` marker stops processing of the fragment it appears in.
    pub fn select_document(&mut self, fragment: &Value) -> QueryResult<&mut Self> {
        let mut fields = Vec::new();
        collect_select_fragment(fragment, &mut fields)?;
        self.select(fields);
        Ok(self)
    }

    pub fn select_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        self.select_closure_with(lambda, &Params::default())
    }

    pub fn select_closure_with(&mut self, lambda: &Lambda, params: &Params) -> QueryResult<&mut Self> {
        let fields = self.closure_parser(lambda).parse_projection(lambda, params)?;
        self.select(fields);
        Ok(self)
    }

    /// Drop the projection (select everything).
    pub fn select_all(&mut self) -> &mut Self {
        self.select.clear();
        self.payload = None;
        self
    }

    fn merge_select(&mut self, field: QueryField) {
        match self.select.iter_mut().find(|f| f.name() == field.name()) {
            Some(existing) => *existing = field,
            None => self.select.push(field),
        }
    }

    pub fn distinct(&mut self, flag: bool) -> &mut Self {
        self.distinct = flag;
        self
    }

    // =========================================================================
    // Filter
    // =========================================================================

    /// Start a new filter chain with `field` as the pending left operand.
    pub fn where_field(&mut self, field: impl Into<QueryField>) -> &mut Self {
        self.filter = None;
        self.connective = None;
        self.left = Some(field.into().into_value());
        self
    }

    /// Replace the filter with a parsed closure.
    pub fn where_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        self.where_closure_with(lambda, &Params::default())
    }

    pub fn where_closure_with(&mut self, lambda: &Lambda, params: &Params) -> QueryResult<&mut Self> {
        let filter = self.closure_parser(lambda).parse_filter(lambda, params)?;
        Ok(self.where_expr(filter))
    }

    /// Replace the filter with a prebuilt expression.
    pub fn where_expr(&mut self, filter: Expr) -> &mut Self {
        self.filter = Some(filter);
        self.connective = None;
        self.left = None;
        self
    }

    pub fn and_also(&mut self, field: impl Into<QueryField>) -> &mut Self {
        self.connective = Some(LogicalOperator::And);
        self.left = Some(field.into().into_value());
        self
    }

    pub fn or_else(&mut self, field: impl Into<QueryField>) -> &mut Self {
        self.connective = Some(LogicalOperator::Or);
        self.left = Some(field.into().into_value());
        self
    }

    pub fn equal(&mut self, value: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Eq, value.into())
    }

    pub fn not_equal(&mut self, value: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Ne, value.into())
    }

    pub fn greater_than(&mut self, value: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Gt, value.into())
    }

    pub fn greater_or_equal(&mut self, value: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Gte, value.into())
    }

    pub fn lower_than(&mut self, value: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Lt, value.into())
    }

    pub fn lower_or_equal(&mut self, value: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Lte, value.into())
    }

    pub fn is_null(&mut self) -> QueryResult<&mut Self> {
        self.compare_pending(ComparisonOperator::Eq, Expr::Literal(Literal::Null))
    }

    pub fn between(&mut self, low: impl Into<Expr>, high: impl Into<Expr>) -> QueryResult<&mut Self> {
        let left = self.pending()?;
        self.append_filter(Expr::between(left, low.into(), high.into()));
        Ok(self)
    }

    pub fn starts_with(&mut self, prefix: &str) -> QueryResult<&mut Self> {
        let left = self.pending()?;
        self.append_filter(Expr::starts_with(left, prefix));
        Ok(self)
    }

    pub fn ends_with(&mut self, suffix: &str) -> QueryResult<&mut Self> {
        let left = self.pending()?;
        self.append_filter(Expr::ends_with(left, suffix));
        Ok(self)
    }

    pub fn contains(&mut self, needle: &str) -> QueryResult<&mut Self> {
        let left = self.pending()?;
        self.append_filter(Expr::contains(left, needle));
        Ok(self)
    }

    /// Fold the current filter into the prepared accumulator.
    ///
    /// Repeated calls combine with `$and` (or `$or` when `use_or`).
    pub fn prepare(&mut self, use_or: bool) -> &mut Self {
        if let Some(filter) = self.filter.take() {
            self.prepared = Some(match self.prepared.take() {
                None => filter,
                Some(previous) => Expr::Logical {
                    op: if use_or {
                        LogicalOperator::Or
                    } else {
                        LogicalOperator::And
                    },
                    args: vec![previous, filter],
                },
            });
        }
        self.connective = None;
        self.left = None;
        self
    }

    fn pending(&self) -> QueryResult<Expr> {
        self.left.clone().ok_or(QueryError::NoPendingOperand)
    }

    fn compare_pending(&mut self, op: ComparisonOperator, value: Expr) -> QueryResult<&mut Self> {
        let left = self.pending()?;
        self.append_filter(Expr::compare(op, left, value));
        Ok(self)
    }

    fn append_filter(&mut self, expr: Expr) {
        self.left = None;
        self.filter = Some(match (self.filter.take(), self.connective) {
            (None, _) => expr,
            (Some(Expr::Logical { op, mut args }), Some(connective)) if op == connective => {
                args.push(expr);
                Expr::Logical { op, args }
            }
            (Some(existing), connective) => Expr::Logical {
                op: connective.unwrap_or(LogicalOperator::And),
                args: vec![existing, expr],
            },
        });
    }

    // =========================================================================
    // Pending Operand Helpers
    // =========================================================================

    fn wrap_pending(&mut self, wrap: impl FnOnce(Expr) -> Expr) -> QueryResult<&mut Self> {
        let left = self.pending()?;
        self.left = Some(wrap(left));
        Ok(self)
    }

    fn call_pending(&mut self, func: Func, extra: Vec<Expr>) -> QueryResult<&mut Self> {
        self.wrap_pending(|left| {
            let mut args = vec![left];
            args.extend(extra);
            Expr::call(func, args)
        })
    }

    pub fn year(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Year, vec![])
    }

    pub fn month(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Month, vec![])
    }

    pub fn day(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Day, vec![])
    }

    pub fn hour(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Hour, vec![])
    }

    pub fn minute(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Minute, vec![])
    }

    pub fn second(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Second, vec![])
    }

    pub fn to_lower(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::ToLower, vec![])
    }

    pub fn to_upper(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::ToUpper, vec![])
    }

    pub fn trim(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Trim, vec![])
    }

    pub fn length(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Length, vec![])
    }

    pub fn substr(&mut self, start: i64, length: Option<i64>) -> QueryResult<&mut Self> {
        let mut extra = vec![Expr::from(start)];
        extra.extend(length.map(Expr::from));
        self.call_pending(Func::Substr, extra)
    }

    pub fn index_of(&mut self, needle: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.call_pending(Func::IndexOf, vec![needle.into()])
    }

    pub fn concat(&mut self, other: impl Into<Expr>) -> QueryResult<&mut Self> {
        self.call_pending(Func::Concat, vec![other.into()])
    }

    pub fn round(&mut self, digits: Option<i64>) -> QueryResult<&mut Self> {
        self.call_pending(Func::Round, digits.map(Expr::from).into_iter().collect())
    }

    pub fn ceil(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Ceil, vec![])
    }

    pub fn floor(&mut self) -> QueryResult<&mut Self> {
        self.call_pending(Func::Floor, vec![])
    }

    pub fn add(&mut self, operand: impl Into<Expr>) -> QueryResult<&mut Self> {
        let operand = operand.into();
        self.wrap_pending(|left| Expr::arithmetic(ArithmeticOperator::Add, left, operand))
    }

    pub fn subtract(&mut self, operand: impl Into<Expr>) -> QueryResult<&mut Self> {
        let operand = operand.into();
        self.wrap_pending(|left| Expr::arithmetic(ArithmeticOperator::Subtract, left, operand))
    }

    pub fn multiply(&mut self, operand: impl Into<Expr>) -> QueryResult<&mut Self> {
        let operand = operand.into();
        self.wrap_pending(|left| Expr::arithmetic(ArithmeticOperator::Multiply, left, operand))
    }

    pub fn divide(&mut self, operand: impl Into<Expr>) -> QueryResult<&mut Self> {
        let operand = operand.into();
        self.wrap_pending(|left| Expr::arithmetic(ArithmeticOperator::Divide, left, operand))
    }

    pub fn modulo(&mut self, operand: impl Into<Expr>) -> QueryResult<&mut Self> {
        let operand = operand.into();
        self.wrap_pending(|left| Expr::arithmetic(ArithmeticOperator::Modulo, left, operand))
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Stage an inner join; `on*` finalizes it.
    pub fn join(&mut self, target: impl Into<JoinTarget>) -> &mut Self {
        self.join_with(target, JoinDirection::Inner, None)
    }

    pub fn join_with(
        &mut self,
        target: impl Into<JoinTarget>,
        direction: JoinDirection,
        alias: Option<&str>,
    ) -> &mut Self {
        let target = target.into();
        let alias = alias.map(str::to_string).or_else(|| match &target {
            JoinTarget::Collection(entity) => entity.alias().map(str::to_string),
            JoinTarget::Query(_) => None,
        });
        self.staged_join = Some(StagedJoin {
            target,
            direction,
            alias,
        });
        self
    }

    /// Finalize the staged join with the effective filter of `condition`.
    ///
    /// The filter is copied; later changes to `condition` are not seen.
    pub fn on(&mut self, condition: &QueryExpression) -> QueryResult<&mut Self> {
        if self.staged_join.is_none() {
            return Err(QueryError::JoiningExpressionEmpty);
        }
        let filter = condition.effective_filter().ok_or_else(|| {
            QueryError::InvalidExpression("join condition has no filter".into())
        })?;
        self.on_expr(filter)
    }

    pub fn on_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        self.on_closure_with(lambda, &Params::default())
    }

    /// Parse a two-parameter closure: the first parameter is the base
    /// collection, the second the staged join target.
    pub fn on_closure_with(&mut self, lambda: &Lambda, params: &Params) -> QueryResult<&mut Self> {
        let staged = self
            .staged_join
            .as_ref()
            .ok_or(QueryError::JoiningExpressionEmpty)?;
        let mut parser = ClosureParser::new().with_resolvers(self.resolvers.clone());
        if let Some(base) = self.collection.as_ref() {
            parser = parser.bind(0, base.reference());
        }
        if let Some(joined) = staged.reference() {
            parser = parser.bind(1, joined);
        }
        let filter = parser.parse_filter(lambda, params)?;
        self.on_expr(filter)
    }

    /// Equality join on `local = foreign`.
    pub fn on_fields(&mut self, local: &str, foreign: &str) -> QueryResult<&mut Self> {
        self.finish_join(JoinCondition::Fields {
            local: local.to_string(),
            foreign: foreign.to_string(),
        })
    }

    pub fn on_expr(&mut self, filter: Expr) -> QueryResult<&mut Self> {
        self.finish_join(JoinCondition::Filter(filter))
    }

    fn finish_join(&mut self, condition: JoinCondition) -> QueryResult<&mut Self> {
        let staged = self
            .staged_join
            .take()
            .ok_or(QueryError::JoiningExpressionEmpty)?;
        self.payload = None;
        self.lookup.push(staged.finish(condition));
        Ok(self)
    }

    // =========================================================================
    // Ordering and Grouping
    // =========================================================================

    pub fn order_by(&mut self, field: impl Into<QueryField>) -> &mut Self {
        self.order_by = vec![OrderByExpr::asc(field.into().into_value())];
        self
    }

    pub fn order_by_descending(&mut self, field: impl Into<QueryField>) -> &mut Self {
        self.order_by = vec![OrderByExpr::desc(field.into().into_value())];
        self
    }

    pub fn then_by(&mut self, field: impl Into<QueryField>) -> QueryResult<&mut Self> {
        self.push_order(vec![OrderByExpr::asc(field.into().into_value())])
    }

    pub fn then_by_descending(&mut self, field: impl Into<QueryField>) -> QueryResult<&mut Self> {
        self.push_order(vec![OrderByExpr::desc(field.into().into_value())])
    }

    /// Replace the ordering with prebuilt terms.
    pub fn order_by_exprs(&mut self, terms: impl IntoIterator<Item = OrderByExpr>) -> &mut Self {
        self.order_by = terms.into_iter().collect();
        self
    }

    pub fn order_by_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        let terms = self.closure_order(lambda, SortDir::Asc)?;
        self.order_by = terms;
        Ok(self)
    }

    pub fn order_by_descending_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        let terms = self.closure_order(lambda, SortDir::Desc)?;
        self.order_by = terms;
        Ok(self)
    }

    pub fn then_by_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        if self.order_by.is_empty() {
            return Err(QueryError::OrderByNotInitialized);
        }
        let terms = self.closure_order(lambda, SortDir::Asc)?;
        self.push_order(terms)
    }

    pub fn then_by_descending_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        if self.order_by.is_empty() {
            return Err(QueryError::OrderByNotInitialized);
        }
        let terms = self.closure_order(lambda, SortDir::Desc)?;
        self.push_order(terms)
    }

    fn push_order(&mut self, terms: Vec<OrderByExpr>) -> QueryResult<&mut Self> {
        if self.order_by.is_empty() {
            return Err(QueryError::OrderByNotInitialized);
        }
        self.order_by.extend(terms);
        Ok(self)
    }

    /// Every field the closure yields, in source order, with `dir`.
    fn closure_order(&self, lambda: &Lambda, dir: SortDir) -> QueryResult<Vec<OrderByExpr>> {
        let fields = self
            .closure_parser(lambda)
            .parse_projection(lambda, &Params::default())?;
        Ok(fields
            .into_iter()
            .map(|f| OrderByExpr {
                expr: f.into_value(),
                dir,
            })
            .collect())
    }

    /// Replace the grouping.
    pub fn group_by<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<QueryField>,
    {
        self.group_by = fields.into_iter().map(|f| f.into().into_value()).collect();
        self
    }

    pub fn group_by_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        let fields = self
            .closure_parser(lambda)
            .parse_projection(lambda, &Params::default())?;
        Ok(self.group_by(fields))
    }

    // =========================================================================
    // Paging
    // =========================================================================

    /// Row limit; `0` is unlimited. Not validated.
    pub fn take(&mut self, n: i64) -> &mut Self {
        self.limit = n;
        self
    }

    /// Rows to skip; `0` skips nothing. Not validated.
    pub fn skip(&mut self, n: i64) -> &mut Self {
        self.skip = n;
        self
    }

    // =========================================================================
    // Write Statements
    // =========================================================================

    /// INSERT payload from a JSON object.
    pub fn insert(&mut self, data: &Value) -> QueryResult<&mut Self> {
        let assignments = assignments_from_document(data)?;
        Ok(self.insert_values(assignments))
    }

    pub fn insert_values<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Expr>,
    {
        self.payload = Some(Payload::Insert(
            values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ));
        self.clear_read_state();
        self
    }

    /// Target collection of an INSERT.
    pub fn into(&mut self, collection: &str) -> QueryResult<&mut Self> {
        let entity = validated_collection(collection)?;
        self.collection = Some(entity);
        Ok(self)
    }

    /// Start an UPDATE of `collection`.
    pub fn update(&mut self, collection: &str) -> QueryResult<&mut Self> {
        let entity = validated_collection(collection)?;
        self.collection = Some(entity);
        if !matches!(self.payload, Some(Payload::Update(_))) {
            self.payload = Some(Payload::Update(Vec::new()));
        }
        self.clear_read_state();
        Ok(self)
    }

    /// UPDATE assignments from a JSON object. Values may be operator documents.
    pub fn set(&mut self, data: &Value) -> QueryResult<&mut Self> {
        let assignments = assignments_from_document(data)?;
        Ok(self.set_values(assignments))
    }

    pub fn set_values<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Expr>,
    {
        self.payload = Some(Payload::Update(
            values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ));
        self.clear_read_state();
        self
    }

    /// Start a DELETE from `collection`.
    pub fn delete(&mut self, collection: &str) -> QueryResult<&mut Self> {
        let entity = validated_collection(collection)?;
        self.collection = Some(entity);
        self.payload = Some(Payload::Delete);
        self.clear_read_state();
        Ok(self)
    }

    fn clear_read_state(&mut self) {
        self.select.clear();
        self.lookup.clear();
        self.staged_join = None;
    }

    // =========================================================================
    // Closure Support
    // =========================================================================

    /// Parser bound for `lambda`: one parameter stays unqualified, more
    /// parameters bind to the base collection and the lookups in order.
    fn closure_parser(&self, lambda: &Lambda) -> ClosureParser {
        let mut parser = ClosureParser::new().with_resolvers(self.resolvers.clone());
        if lambda.params().len() > 1 {
            if let Some(base) = &self.collection {
                parser = parser.bind(0, base.reference());
            }
            for (index, lookup) in self.lookup.iter().enumerate() {
                if let Some(reference) = lookup.reference() {
                    parser = parser.bind(index + 1, reference);
                }
            }
        }
        parser
    }

    // =========================================================================
    // Document Form
    // =========================================================================

    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        if let Some(collection) = &self.collection {
            doc.insert("$collection".into(), collection.to_document());
        }
        if !self.select.is_empty() {
            let mut select = Map::new();
            for field in &self.select {
                if let Value::Object(entry) = field.to_document() {
                    select.extend(entry);
                }
            }
            doc.insert("$select".into(), Value::Object(select));
        }
        if let Some(filter) = &self.filter {
            doc.insert("$where".into(), filter.to_document());
        }
        if let Some(prepared) = &self.prepared {
            doc.insert("$prepared".into(), prepared.to_document());
        }
        if !self.order_by.is_empty() {
            let order: Vec<Value> = self
                .order_by
                .iter()
                .map(|o| json!({"$expr": o.expr.to_document(), "direction": o.dir.as_i32()}))
                .collect();
            doc.insert("$order".into(), Value::Array(order));
        }
        if !self.group_by.is_empty() {
            let group: Vec<Value> = self.group_by.iter().map(Expr::to_document).collect();
            doc.insert("$group".into(), Value::Array(group));
        }
        if !self.lookup.is_empty() {
            let lookups: Vec<Value> = self.lookup.iter().map(Lookup::to_document).collect();
            doc.insert("$lookup".into(), Value::Array(lookups));
        }
        if self.limit != 0 {
            doc.insert("$limit".into(), json!(self.limit));
        }
        if self.skip != 0 {
            doc.insert("$skip".into(), json!(self.skip));
        }
        if self.distinct {
            doc.insert("$distinct".into(), Value::Bool(true));
        }
        match &self.payload {
            Some(Payload::Insert(values)) => {
                doc.insert("$insert".into(), assignments_to_document(values));
            }
            Some(Payload::Update(values)) => {
                doc.insert("$update".into(), assignments_to_document(values));
            }
            Some(Payload::Delete) => {
                doc.insert("$delete".into(), Value::Bool(true));
            }
            None => {}
        }
        Value::Object(doc)
    }
}

fn validated_collection(name: &str) -> QueryResult<QueryEntity> {
    if COLLECTION_NAME.is_match(name) {
        Ok(QueryEntity::new(name))
    } else {
        Err(QueryError::InvalidCollectionName(name.to_string()))
    }
}

fn collect_select_fragment(fragment: &Value, out: &mut Vec<QueryField>) -> QueryResult<()> {
    match fragment {
        Value::String(name) => out.push(QueryField::new(name.as_str())),
        Value::Array(items) => {
            for item in items {
                collect_select_fragment(item, out)?;
            }
        }
        Value::Object(map) => {
            for (name, spec) in map {
                match spec.as_i64() {
                    Some(0) => {
                        tracing::warn!(field = %name, "exclusion marker ends select fragment");
                        break;
                    }
                    Some(1) => out.push(QueryField::new(name.as_str())),
                    _ => out.push(QueryField::computed(name.as_str(), Expr::from_document(spec)?)),
                }
            }
        }
        other => {
            return Err(QueryError::UnsupportedArgumentType(format!(
                "select expects names or field documents, found {}",
                other
            )))
        }
    }
    Ok(())
}

fn assignments_from_document(data: &Value) -> QueryResult<Vec<Assignment>> {
    let Value::Object(map) = data else {
        return Err(QueryError::UnsupportedArgumentType(format!(
            "expected an object of column values, found {}",
            data
        )));
    };
    map.iter()
        .map(|(column, value)| {
            let expr = match value {
                Value::String(s) => Expr::Literal(Literal::String(s.clone())),
                Value::Array(_) => {
                    return Err(QueryError::UnsupportedArgumentType(format!(
                        "column '{}' cannot hold an array",
                        column
                    )))
                }
                other => Expr::from_document(other)?,
            };
            Ok((column.clone(), expr))
        })
        .collect()
}

fn assignments_to_document(values: &[Assignment]) -> Value {
    let mut map = Map::new();
    for (column, value) in values {
        let doc = match value {
            Expr::Literal(Literal::String(s)) => Value::String(s.clone()),
            other => other.to_document(),
        };
        map.insert(column.clone(), doc);
    }
    Value::Object(map)
}
