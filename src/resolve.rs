//! Member and method resolution hooks.
//!
//! Every front-end reports the members and methods it meets to a chain of
//! [`MemberResolver`]s. Resolvers run in registration order on the calling
//! thread; each one sees the event as left by the previous ones, and the
//! parser reads the event back once the chain has run.

use std::fmt;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::query::Expr;

/// A plain member reference (`x.category`).
#[derive(Debug, Clone, PartialEq)]
pub struct MemberEvent {
    pub member: String,
    /// Collection the member is qualified with, if any.
    pub target: Option<String>,
    /// Replacement field path set by a resolver.
    pub resolved: Option<String>,
}

/// A member of a joined collection or a nested path (`c.address.city`).
#[derive(Debug, Clone, PartialEq)]
pub struct JoinMemberEvent {
    /// Everything before the last segment, dotted.
    pub fully_qualified_name: String,
    pub member: String,
    pub resolved: Option<String>,
}

/// A function or method call awaiting translation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEvent {
    pub name: String,
    /// Translated arguments. For instance calls the receiver comes first.
    pub args: Vec<Expr>,
    pub instance: bool,
    pub resolved: Option<Expr>,
}

impl MethodEvent {
    pub fn new(name: impl Into<String>, args: Vec<Expr>, instance: bool) -> Self {
        Self {
            name: name.into(),
            args,
            instance,
            resolved: None,
        }
    }
}

/// Hooks a model layer implements to rename members or translate methods.
///
/// All methods default to leaving the event untouched.
pub trait MemberResolver {
    fn resolving_member(&self, event: &mut MemberEvent) {
        let _ = event;
    }

    fn resolving_join_member(&self, event: &mut JoinMemberEvent) {
        let _ = event;
    }

    /// Set `event.resolved` to claim the call. Returning an error aborts
    /// the parse.
    fn resolving_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
        let _ = event;
        Ok(())
    }
}

/// Ordered chain of resolvers.
#[derive(Clone, Default)]
pub struct Resolvers {
    listeners: Vec<Arc<dyn MemberResolver>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, resolver: impl MemberResolver + 'static) -> &mut Self {
        self.listeners.push(Arc::new(resolver));
        self
    }

    pub fn with(mut self, resolver: impl MemberResolver + 'static) -> Self {
        self.subscribe(resolver);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit_member(&self, event: &mut MemberEvent) {
        for listener in &self.listeners {
            listener.resolving_member(event);
        }
    }

    pub fn emit_join_member(&self, event: &mut JoinMemberEvent) {
        for listener in &self.listeners {
            listener.resolving_join_member(event);
        }
    }

    pub fn emit_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
        for listener in &self.listeners {
            listener.resolving_method(event)?;
        }
        Ok(())
    }

    /// Resolved path of `member`, qualified with `target` by default.
    pub fn resolve_member(&self, member: &str, target: Option<&str>) -> String {
        let mut event = MemberEvent {
            member: member.to_string(),
            target: target.map(str::to_string),
            resolved: None,
        };
        self.emit_member(&mut event);
        match event.resolved {
            Some(resolved) => resolved,
            None => match event.target {
                Some(target) => format!("{}.{}", target, event.member),
                None => event.member,
            },
        }
    }

    /// Resolved path of `fully_qualified_name.member`.
    pub fn resolve_join_member(&self, fully_qualified_name: &str, member: &str) -> String {
        let mut event = JoinMemberEvent {
            fully_qualified_name: fully_qualified_name.to_string(),
            member: member.to_string(),
            resolved: None,
        };
        self.emit_join_member(&mut event);
        event
            .resolved
            .unwrap_or_else(|| format!("{}.{}", event.fully_qualified_name, event.member))
    }

    /// Run the chain, then `defaults` if nobody claimed the call.
    pub fn resolve_method(
        &self,
        mut event: MethodEvent,
        defaults: &dyn MemberResolver,
    ) -> QueryResult<Expr> {
        self.emit_method(&mut event)?;
        if event.resolved.is_none() {
            defaults.resolving_method(&mut event)?;
        }
        tracing::trace!(method = %event.name, resolved = event.resolved.is_some(), "method resolution");
        event
            .resolved
            .ok_or(QueryError::UnresolvedMethod(event.name))
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl PartialEq for Resolvers {
    fn eq(&self, other: &Self) -> bool {
        self.listeners.len() == other.listeners.len()
            && self
                .listeners
                .iter()
                .zip(&other.listeners)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// Argument count check shared by the built-in method tables.
pub(crate) fn expect_args(event: &MethodEvent, range: std::ops::RangeInclusive<usize>) -> QueryResult<()> {
    if range.contains(&event.args.len()) {
        Ok(())
    } else {
        Err(QueryError::unsupported(format!(
            "{}() takes {} to {} arguments, found {}",
            event.name,
            range.start(),
            range.end(),
            event.args.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{field, Func};

    struct Rename;

    impl MemberResolver for Rename {
        fn resolving_member(&self, event: &mut MemberEvent) {
            if event.member == "title" {
                event.resolved = Some("name".into());
            }
        }

        fn resolving_join_member(&self, event: &mut JoinMemberEvent) {
            if event.member == "town" {
                event.resolved = Some(format!("{}.city", event.fully_qualified_name));
            }
        }
    }

    struct DayOfMonth;

    impl MemberResolver for DayOfMonth {
        fn resolving_method(&self, event: &mut MethodEvent) -> QueryResult<()> {
            if event.name == "dayofmonth" {
                event.resolved = Some(Expr::call(Func::Day, event.args.clone()));
            }
            Ok(())
        }
    }

    struct Nothing;

    impl MemberResolver for Nothing {}

    #[test]
    fn test_member_defaults_and_rename() {
        let chain = Resolvers::new().with(Rename);
        assert_eq!(chain.resolve_member("title", None), "name");
        assert_eq!(chain.resolve_member("price", None), "price");
        assert_eq!(chain.resolve_member("price", Some("Product")), "Product.price");
        assert_eq!(chain.resolve_join_member("c.address", "town"), "c.address.city");
        assert_eq!(chain.resolve_join_member("c", "name"), "c.name");
    }

    #[test]
    fn test_method_chain_then_defaults() {
        let chain = Resolvers::new().with(DayOfMonth);
        let resolved = chain
            .resolve_method(
                MethodEvent::new("dayofmonth", vec![field("d")], false),
                &Nothing,
            )
            .unwrap();
        assert_eq!(resolved, Expr::call(Func::Day, vec![field("d")]));

        let err = chain
            .resolve_method(MethodEvent::new("nope", vec![], false), &Nothing)
            .unwrap_err();
        assert_eq!(err, QueryError::UnresolvedMethod("nope".into()));
    }

    #[test]
    fn test_later_listener_sees_earlier_result() {
        struct Override;
        impl MemberResolver for Override {
            fn resolving_member(&self, event: &mut MemberEvent) {
                if let Some(prev) = &event.resolved {
                    event.resolved = Some(format!("{}_v2", prev));
                }
            }
        }
        let chain = Resolvers::new().with(Rename).with(Override);
        assert_eq!(chain.resolve_member("title", None), "name_v2");
    }
}
