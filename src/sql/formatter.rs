//! SQL statement formatter.
//!
//! Assembles statements from a [`QueryExpression`] token by token. Every
//! expression inside a clause goes through [`SqlDialect::escape`], so the
//! formatter itself knows nothing about operators.
//!
//! SELECT clauses are emitted in a fixed order:
//!
//! ```text
//! SELECT [DISTINCT] list FROM t [alias] JOIN* [WHERE] [GROUP BY] [ORDER BY] [LIMIT/OFFSET]
//! ```

use tracing::debug;

use super::dialect::{helpers, Dialect, SqlDialect};
use super::token::{Keyword, Token, TokenStream};
use crate::error::{QueryError, QueryResult};
use crate::query::{
    Assignment, Expr, JoinCondition, JoinDirection, JoinTarget, Lookup, Payload, QueryEntity,
    QueryExpression, QueryField, SortDir, StatementKind,
};

/// Renders a [`QueryExpression`] as SQL text for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlFormatter<'d> {
    dialect: &'d dyn SqlDialect,
}

impl SqlFormatter<'static> {
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(dialect.dialect())
    }
}

impl Default for SqlFormatter<'static> {
    fn default() -> Self {
        Self::for_dialect(Dialect::Generic)
    }
}

impl<'d> SqlFormatter<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &'d dyn SqlDialect {
        self.dialect
    }

    /// Format any statement kind; SELECTs include LIMIT/OFFSET.
    pub fn format(&self, query: &QueryExpression) -> QueryResult<String> {
        let sql = match query.statement_kind() {
            StatementKind::Select => self.format_limit_select(query)?,
            StatementKind::Insert => self.format_insert(query)?,
            StatementKind::Update => self.format_update(query)?,
            StatementKind::Delete => self.format_delete(query)?,
        };
        debug!(dialect = self.dialect.name(), %sql, "formatted statement");
        Ok(sql)
    }

    /// SELECT without the paging clause.
    pub fn format_select(&self, query: &QueryExpression) -> QueryResult<String> {
        Ok(self.select_tokens(query)?.serialize(self.dialect))
    }

    /// SELECT followed by the dialect's LIMIT/OFFSET clause.
    pub fn format_limit_select(&self, query: &QueryExpression) -> QueryResult<String> {
        let mut ts = self.select_tokens(query)?;
        let paging = self.dialect.emit_limit_offset(query.limit(), query.offset());
        if !paging.is_empty() {
            ts.space().append(&paging);
        }
        Ok(ts.serialize(self.dialect))
    }

    /// A filter tree on its own, as it appears after `WHERE`.
    pub fn format_where(&self, filter: &Expr) -> QueryResult<String> {
        Ok(self.dialect.escape(filter)?.serialize(self.dialect))
    }

    pub fn format_insert(&self, query: &QueryExpression) -> QueryResult<String> {
        let Some(Payload::Insert(values)) = query.payload() else {
            return Err(kind_mismatch("INSERT", query));
        };
        if values.is_empty() {
            return Err(QueryError::EmptyPayload("INSERT"));
        }
        let table = target_table(query)?;

        let columns: Vec<TokenStream> = values
            .iter()
            .map(|(column, _)| Token::Ident(column.clone()).into())
            .collect();
        let rendered = values
            .iter()
            .map(|(_, value)| self.dialect.escape(value))
            .collect::<QueryResult<Vec<_>>>()?;

        let mut ts = TokenStream::new();
        ts.keywords([Keyword::Insert, Keyword::Into])
            .space()
            .append(&helpers::qualified_path(table.collection()))
            .space()
            .lparen()
            .comma_separated(&columns)
            .rparen()
            .space()
            .keyword(Keyword::Values)
            .space()
            .lparen()
            .comma_separated(&rendered)
            .rparen();
        Ok(ts.serialize(self.dialect))
    }

    pub fn format_update(&self, query: &QueryExpression) -> QueryResult<String> {
        let Some(Payload::Update(values)) = query.payload() else {
            return Err(kind_mismatch("UPDATE", query));
        };
        if values.is_empty() {
            return Err(QueryError::EmptyPayload("UPDATE"));
        }
        let table = target_table(query)?;

        let mut ts = TokenStream::new();
        ts.keyword(Keyword::Update)
            .space()
            .append(&helpers::qualified_path(table.collection()))
            .space()
            .keyword(Keyword::Set)
            .space()
            .comma_separated(&self.assignments(values)?);
        self.push_where(&mut ts, query)?;
        Ok(ts.serialize(self.dialect))
    }

    pub fn format_delete(&self, query: &QueryExpression) -> QueryResult<String> {
        if !matches!(query.payload(), Some(Payload::Delete)) {
            return Err(kind_mismatch("DELETE", query));
        }
        let table = target_table(query)?;

        let mut ts = TokenStream::new();
        ts.keywords([Keyword::Delete, Keyword::From])
            .space()
            .append(&helpers::qualified_path(table.collection()));
        self.push_where(&mut ts, query)?;
        Ok(ts.serialize(self.dialect))
    }

    // =========================================================================
    // SELECT assembly
    // =========================================================================

    fn select_tokens(&self, query: &QueryExpression) -> QueryResult<TokenStream> {
        if query.statement_kind() != StatementKind::Select {
            return Err(QueryError::UnsupportedStatementKind(
                kind_name(query.statement_kind()).into(),
            ));
        }
        let entity = query
            .collection()
            .ok_or_else(|| QueryError::InvalidExpression("SELECT without a collection".into()))?;

        let mut ts = TokenStream::new();
        ts.keyword(Keyword::Select).space();
        if query.is_distinct() {
            ts.keyword(Keyword::Distinct).space();
        }
        if query.fields().is_empty() {
            ts.symbol("*");
        } else {
            let items = query
                .fields()
                .iter()
                .map(|f| self.select_item(f))
                .collect::<QueryResult<Vec<_>>>()?;
            ts.comma_separated(&items);
        }

        ts.space()
            .keyword(Keyword::From)
            .space()
            .append(&self.entity_tokens(entity));

        for lookup in query.lookups() {
            ts.space().append(&self.join_tokens(entity, lookup)?);
        }

        self.push_where(&mut ts, query)?;

        if !query.grouping().is_empty() {
            let groups = query
                .grouping()
                .iter()
                .map(|g| self.dialect.escape(g))
                .collect::<QueryResult<Vec<_>>>()?;
            ts.space().keyword(Keyword::GroupBy).space().comma_separated(&groups);
        }

        if !query.ordering().is_empty() {
            let mut terms = Vec::with_capacity(query.ordering().len());
            for term in query.ordering() {
                let mut t = self.dialect.escape(&term.expr)?;
                t.space().keyword(match term.dir {
                    SortDir::Asc => Keyword::Asc,
                    SortDir::Desc => Keyword::Desc,
                });
                terms.push(t);
            }
            ts.space().keyword(Keyword::OrderBy).space().comma_separated(&terms);
        }

        Ok(ts)
    }

    fn select_item(&self, field: &QueryField) -> QueryResult<TokenStream> {
        match field.expr() {
            None => Ok(self.dialect.render_field(field.name())),
            Some(expr) => {
                let mut ts = self.dialect.escape(expr)?;
                ts.space()
                    .keyword(Keyword::As)
                    .space()
                    .push(Token::Ident(field.name().to_string()));
                Ok(ts)
            }
        }
    }

    fn entity_tokens(&self, entity: &QueryEntity) -> TokenStream {
        let mut ts = helpers::qualified_path(entity.collection());
        if let Some(alias) = entity.alias() {
            ts.space().push(Token::Ident(alias.to_string()));
        }
        ts
    }

    /// `<DIR> JOIN <target> [alias] ON <condition>`
    fn join_tokens(&self, base: &QueryEntity, lookup: &Lookup) -> QueryResult<TokenStream> {
        let mut ts = TokenStream::new();
        let direction = match lookup.direction {
            JoinDirection::Inner => Keyword::Inner,
            JoinDirection::Left => Keyword::Left,
            JoinDirection::Right => Keyword::Right,
        };
        ts.keywords([direction, Keyword::Join]).space();

        match &lookup.target {
            JoinTarget::Collection(entity) => {
                ts.append(&helpers::qualified_path(entity.collection()));
                let alias = lookup.alias.as_deref().or(entity.alias());
                if let Some(alias) = alias.filter(|a| *a != entity.collection()) {
                    ts.space().push(Token::Ident(alias.to_string()));
                }
            }
            JoinTarget::Query(sub) => {
                ts.append(&self.sub_select_tokens(sub)?.parenthesized());
                if let Some(alias) = lookup.reference() {
                    ts.space().push(Token::Ident(alias.to_string()));
                }
            }
        }

        ts.space().keyword(Keyword::On).space();
        match &lookup.condition {
            JoinCondition::Fields { local, foreign } => {
                let joined = lookup.reference().unwrap_or(base.reference());
                let condition = Expr::compare(
                    crate::query::ComparisonOperator::Eq,
                    Expr::Field(qualify(local, base.reference())),
                    Expr::Field(qualify(foreign, joined)),
                );
                ts.append(&self.dialect.escape(&condition)?);
            }
            JoinCondition::Filter(filter) => {
                ts.append(&self.dialect.escape(filter)?);
            }
        }
        Ok(ts)
    }

    /// A joined sub-select keeps its own paging clause.
    fn sub_select_tokens(&self, query: &QueryExpression) -> QueryResult<TokenStream> {
        let mut ts = self.select_tokens(query)?;
        let paging = self.dialect.emit_limit_offset(query.limit(), query.offset());
        if !paging.is_empty() {
            ts.space().append(&paging);
        }
        Ok(ts)
    }

    fn push_where(&self, ts: &mut TokenStream, query: &QueryExpression) -> QueryResult<()> {
        if let Some(filter) = query.effective_filter() {
            ts.space()
                .keyword(Keyword::Where)
                .space()
                .append(&self.dialect.escape(&filter)?);
        }
        Ok(())
    }

    fn assignments(&self, values: &[Assignment]) -> QueryResult<Vec<TokenStream>> {
        values
            .iter()
            .map(|(column, value)| {
                let mut ts = TokenStream::new();
                ts.push(Token::Ident(column.clone()))
                    .space()
                    .symbol("=")
                    .space()
                    .append(&self.dialect.escape(value)?);
                Ok(ts)
            })
            .collect()
    }
}

fn qualify(name: &str, reference: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{}.{}", reference, name)
    }
}

fn target_table(query: &QueryExpression) -> QueryResult<&QueryEntity> {
    query
        .collection()
        .ok_or_else(|| QueryError::InvalidExpression("write statement without a collection".into()))
}

fn kind_name(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Select => "SELECT",
        StatementKind::Insert => "INSERT",
        StatementKind::Update => "UPDATE",
        StatementKind::Delete => "DELETE",
    }
}

fn kind_mismatch(expected: &str, query: &QueryExpression) -> QueryError {
    QueryError::UnsupportedStatementKind(format!(
        "{} formatter called on {}",
        expected,
        kind_name(query.statement_kind())
    ))
}
