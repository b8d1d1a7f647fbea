//! Join descriptors.

use serde_json::{json, Value};

use super::expr::Expr;
use super::expression::QueryExpression;
use super::field::QueryEntity;

/// Join direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinDirection {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinDirection::Inner => "inner",
            JoinDirection::Left => "left",
            JoinDirection::Right => "right",
        }
    }
}

/// What a lookup joins: a collection or a sub-select.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    Collection(QueryEntity),
    Query(Box<QueryExpression>),
}

impl JoinTarget {
    /// Default name used to qualify the target's members.
    pub fn reference(&self) -> Option<&str> {
        match self {
            JoinTarget::Collection(entity) => Some(entity.reference()),
            JoinTarget::Query(query) => query.collection().map(QueryEntity::reference),
        }
    }
}

impl From<&str> for JoinTarget {
    fn from(name: &str) -> Self {
        JoinTarget::Collection(QueryEntity::new(name))
    }
}

impl From<QueryEntity> for JoinTarget {
    fn from(entity: QueryEntity) -> Self {
        JoinTarget::Collection(entity)
    }
}

impl From<QueryExpression> for JoinTarget {
    fn from(query: QueryExpression) -> Self {
        JoinTarget::Query(Box::new(query))
    }
}

/// Borrowed sub-selects are copied at attach time.
impl From<&QueryExpression> for JoinTarget {
    fn from(query: &QueryExpression) -> Self {
        JoinTarget::Query(Box::new(query.clone()))
    }
}

/// Join condition.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// `local = foreign`; unqualified names bind to the base and joined
    /// collection respectively.
    Fields { local: String, foreign: String },
    /// Arbitrary filter carried in the lookup pipeline.
    Filter(Expr),
}

/// A finalized join.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub target: JoinTarget,
    pub direction: JoinDirection,
    pub alias: Option<String>,
    pub condition: JoinCondition,
}

impl Lookup {
    /// Name used to qualify the joined members: the alias, else the target.
    pub fn reference(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.target.reference())
    }

    pub fn to_document(&self) -> Value {
        let from = match &self.target {
            JoinTarget::Collection(entity) => Value::String(entity.collection().to_string()),
            JoinTarget::Query(query) => query.to_document(),
        };
        let mut doc = json!({
            "from": from,
            "direction": self.direction.as_str(),
        });
        if let Some(alias) = self.reference() {
            doc["as"] = Value::String(alias.to_string());
        }
        match &self.condition {
            JoinCondition::Fields { local, foreign } => {
                doc["localField"] = Value::String(local.clone());
                doc["foreignField"] = Value::String(foreign.clone());
            }
            JoinCondition::Filter(expr) => {
                doc["pipeline"] = json!([{ "$match": { "$expr": expr.to_document() } }]);
            }
        }
        doc
    }
}

/// A `join()` waiting for its `on()`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StagedJoin {
    pub target: JoinTarget,
    pub direction: JoinDirection,
    pub alias: Option<String>,
}

impl StagedJoin {
    pub fn reference(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.target.reference())
    }

    pub fn finish(self, condition: JoinCondition) -> Lookup {
        Lookup {
            target: self.target,
            direction: self.direction,
            alias: self.alias,
            condition,
        }
    }
}
