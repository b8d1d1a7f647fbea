//! A [`QueryExpression`] plus the OData-only options that have no SQL
//! counterpart.

use crate::closure::{ClosureParser, Lambda, Params};
use crate::error::{QueryError, QueryResult};
use crate::query::QueryExpression;

/// `$levels` of an expanded navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Levels {
    Count(u32),
    Max,
}

impl std::fmt::Display for Levels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Levels::Count(n) => write!(f, "{}", n),
            Levels::Max => write!(f, "max"),
        }
    }
}

/// Query with nested expansions.
///
/// For an expanded navigation, `query.collection()` names the navigation
/// property rather than a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenDataQueryExpression {
    pub query: QueryExpression,
    pub expand: Vec<OpenDataQueryExpression>,
    pub levels: Option<Levels>,
    /// Explicit `$count=true`.
    pub count: bool,
}

impl OpenDataQueryExpression {
    pub fn new(query: QueryExpression) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Expansion of a single navigation property.
    pub fn navigation(name: &str) -> Self {
        let mut query = QueryExpression::new();
        query.from_collection(name);
        Self::new(query)
    }

    /// Name of the navigation or collection this node reads.
    pub fn name(&self) -> Option<&str> {
        self.query.collection().map(|c| c.collection())
    }

    /// Append an expansion, merging it into an existing one of the same name.
    ///
    /// Selections and nested expansions are unioned. Any other option set
    /// on both nodes must agree, otherwise nothing changes and the merge
    /// fails with `UnsupportedConstruct`.
    pub fn expand_with(&mut self, child: OpenDataQueryExpression) -> QueryResult<&mut Self> {
        let existing = self
            .expand
            .iter_mut()
            .find(|e| e.name().is_some() && e.name() == child.name());
        match existing {
            Some(existing) => existing.merge(child)?,
            None => self.expand.push(child),
        }
        Ok(self)
    }

    fn merge(&mut self, other: OpenDataQueryExpression) -> QueryResult<()> {
        let name = self.name().unwrap_or_default().to_string();
        let conflict = |option: &str| {
            QueryError::unsupported(format!("conflicting {} for expanded '{}'", option, name))
        };
        fn clash<T: PartialEq>(ours: Option<T>, theirs: Option<T>) -> bool {
            matches!((ours, theirs), (Some(a), Some(b)) if a != b)
        }
        let (ours, theirs) = (&self.query, &other.query);
        if clash(ours.filter(), theirs.filter()) {
            return Err(conflict("$filter"));
        }
        if !ours.ordering().is_empty() && !theirs.ordering().is_empty() && ours.ordering() != theirs.ordering() {
            return Err(conflict("$orderby"));
        }
        if !ours.grouping().is_empty() && !theirs.grouping().is_empty() && ours.grouping() != theirs.grouping() {
            return Err(conflict("$groupby"));
        }
        let positive = |n: i64| (n > 0).then_some(n);
        if clash(positive(ours.limit()), positive(theirs.limit())) {
            return Err(conflict("$top"));
        }
        if clash(positive(ours.offset()), positive(theirs.offset())) {
            return Err(conflict("$skip"));
        }
        if clash(self.levels, other.levels) {
            return Err(conflict("$levels"));
        }

        // Validate nested merges on a copy so a late conflict leaves `self` untouched.
        let mut merged = self.clone();
        for grandchild in other.expand {
            merged.expand_with(grandchild)?;
        }
        let theirs = other.query;
        merged.query.select(theirs.fields().to_vec());
        if let Some(filter) = theirs.filter() {
            merged.query.where_expr(filter.clone());
        }
        if !theirs.ordering().is_empty() {
            merged.query.order_by_exprs(theirs.ordering().to_vec());
        }
        if !theirs.grouping().is_empty() {
            merged.query.group_by(theirs.grouping().to_vec());
        }
        if theirs.limit() > 0 {
            merged.query.take(theirs.limit());
        }
        if theirs.offset() > 0 {
            merged.query.skip(theirs.offset());
        }
        merged.levels = merged.levels.or(other.levels);
        merged.count |= other.count;
        *self = merged;
        Ok(())
    }

    /// Expand a dotted navigation path: `customer.address` expands
    /// `customer` and, inside it, `address`.
    pub fn expand_path(&mut self, path: &str) -> QueryResult<&mut Self> {
        let mut segments = path.split('.').rev();
        let leaf = segments.next().filter(|s| !s.is_empty());
        let Some(leaf) = leaf else {
            return Err(QueryError::InvalidFieldExpression(path.to_string()));
        };
        let mut node = OpenDataQueryExpression::navigation(leaf);
        for parent in segments {
            if parent.is_empty() {
                return Err(QueryError::InvalidFieldExpression(path.to_string()));
            }
            let mut wrapper = OpenDataQueryExpression::navigation(parent);
            wrapper.expand_with(node)?;
            node = wrapper;
        }
        self.expand_with(node)
    }

    /// Expand every member path a projection closure names.
    pub fn expand_closure(&mut self, lambda: &Lambda) -> QueryResult<&mut Self> {
        let parser = ClosureParser::new().with_resolvers(self.query.resolvers().clone());
        let fields = parser.parse_projection(lambda, &Params::default())?;
        let paths = fields
            .iter()
            .map(|f| {
                if f.is_pass_through() {
                    Ok(f.name().to_string())
                } else {
                    Err(QueryError::InvalidFieldExpression(format!(
                        "expand needs member paths, found {:?}",
                        f.value()
                    )))
                }
            })
            .collect::<QueryResult<Vec<_>>>()?;
        for path in paths {
            self.expand_path(&path)?;
        }
        Ok(self)
    }
}

impl From<QueryExpression> for OpenDataQueryExpression {
    fn from(query: QueryExpression) -> Self {
        Self::new(query)
    }
}
