//! Ancestor resolution
//!
//! Walks the enclosing components of a component to find a method, prop or
//! event method it does not define itself.

use super::arena::{BoundMethod, ComponentArena, ComponentId};
use serde_json::Value;

/// What is being looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Method,
    Prop,
    EventMethod,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Capability::Method => "method",
            Capability::Prop => "prop",
            Capability::EventMethod => "event method",
        })
    }
}

/// Upward lookup request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorQuery {
    pub name: String,
    pub capability: Capability,
    /// Matches to pass over before accepting one
    pub skip_match: usize,
    /// Component a found method is bound to; the ancestor defining it by default
    pub context: Option<ComponentId>,
}

impl AncestorQuery {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            skip_match: 0,
            context: None,
        }
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self::new(name, Capability::Method)
    }

    pub fn prop(name: impl Into<String>) -> Self {
        Self::new(name, Capability::Prop)
    }

    pub fn event_method(name: impl Into<String>) -> Self {
        Self::new(name, Capability::EventMethod)
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip_match = count;
        self
    }

    pub fn bind_to(mut self, context: ComponentId) -> Self {
        self.context = Some(context);
        self
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Method(BoundMethod),
    Prop(Value),
}

impl Resolved {
    pub fn into_method(self) -> Option<BoundMethod> {
        match self {
            Resolved::Method(m) => Some(m),
            Resolved::Prop(_) => None,
        }
    }

    pub fn into_prop(self) -> Option<Value> {
        match self {
            Resolved::Prop(v) => Some(v),
            Resolved::Method(_) => None,
        }
    }
}

impl ComponentArena {
    /// Resolve `query` on the ancestors of `from`, nearest first.
    ///
    /// Names compare case-insensitively. Reaching the outermost component
    /// without a match logs an error and yields `None`.
    pub fn resolve_ancestor(&self, from: ComponentId, query: &AncestorQuery) -> Option<Resolved> {
        let mut skip = query.skip_match;
        for ancestor in self.ancestors(from) {
            let Some(component) = self.get(ancestor) else {
                continue;
            };
            let found = match query.capability {
                Capability::Method => component.method(&query.name).cloned().map(|function| {
                    Resolved::Method(BoundMethod {
                        function,
                        owner: ancestor,
                        this: query.context.unwrap_or(ancestor),
                    })
                }),
                Capability::EventMethod => component.event_method(&query.name).cloned().map(|function| {
                    Resolved::Method(BoundMethod {
                        function,
                        owner: ancestor,
                        this: query.context.unwrap_or(ancestor),
                    })
                }),
                Capability::Prop => component.prop(&query.name).cloned().map(Resolved::Prop),
            };
            match found {
                Some(resolved) if skip == 0 => return Some(resolved),
                Some(_) => skip -= 1,
                None => {}
            }
        }
        log::error!(
            target: "lonewolf::component",
            "{} {:?} not found in the ancestors of {from}",
            query.capability,
            query.name
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::script::ScriptFunction;
    use crate::dom::Document;
    use serde_json::{Map, json};

    /// grandparent -> parent -> child; only the elders define `whoami`
    fn family() -> (ComponentArena, [ComponentId; 3]) {
        let mut doc = Document::new();
        let mut arena = ComponentArena::new();
        let grandparent = arena.insert(doc.create_element("div"), None, Map::new());
        let parent = arena.insert(doc.create_element("div"), Some(grandparent), Map::new());
        let child = arena.insert(doc.create_element("div"), Some(parent), Map::new());
        for (id, label) in [(grandparent, "grandparent"), (parent, "parent")] {
            let c = arena.get_mut(id).unwrap();
            c.methods.insert(
                "whoami".into(),
                ScriptFunction::parse(&format!("() => '{label}:' + this.tag")).unwrap(),
            );
            c.event_methods
                .insert("onpick".into(), ScriptFunction::parse("(e) => e.type").unwrap());
            c.props.insert("tag".into(), json!(label));
        }
        arena.get_mut(child).unwrap().props.insert("tag".into(), json!("child"));
        (arena, [grandparent, parent, child])
    }

    #[test]
    fn test_method_from_direct_parent_bound_to_parent() {
        let (mut arena, [_, parent, child]) = family();
        let method = arena
            .resolve_ancestor(child, &AncestorQuery::method("WhoAmI"))
            .and_then(Resolved::into_method)
            .unwrap();
        assert_eq!(method.owner, parent);
        assert_eq!(method.this, parent);
        assert_eq!(arena.invoke(&method, vec![]).unwrap(), json!("parent:parent"));
    }

    #[test]
    fn test_skip_match_and_explicit_context() {
        let (mut arena, [grandparent, _, child]) = family();
        let method = arena
            .resolve_ancestor(child, &AncestorQuery::method("whoami").skip(1).bind_to(child))
            .and_then(Resolved::into_method)
            .unwrap();
        assert_eq!(method.owner, grandparent);
        assert_eq!(arena.invoke(&method, vec![]).unwrap(), json!("grandparent:child"));
    }

    #[test]
    fn test_props_and_event_methods() {
        let (arena, [_, _, child]) = family();
        assert_eq!(
            arena.resolve_ancestor(child, &AncestorQuery::prop("TAG")),
            Some(Resolved::Prop(json!("parent")))
        );
        assert!(
            arena
                .resolve_ancestor(child, &AncestorQuery::event_method("ONPICK"))
                .and_then(Resolved::into_method)
                .is_some()
        );
    }

    #[test]
    fn test_not_found_yields_none() {
        let (arena, [grandparent, _, child]) = family();
        assert!(arena.resolve_ancestor(child, &AncestorQuery::method("missing")).is_none());
        assert!(arena.resolve_ancestor(child, &AncestorQuery::method("whoami").skip(2)).is_none());
        assert!(arena.resolve_ancestor(grandparent, &AncestorQuery::method("whoami")).is_none());
    }

    #[test]
    fn test_lookup_prefers_own_definition() {
        let (arena, [_, parent, child]) = family();
        let own = arena.lookup(parent, "whoami", Capability::Method).and_then(Resolved::into_method);
        assert_eq!(own.map(|m| m.owner), Some(parent));
        assert_eq!(
            arena.lookup(child, "tag", Capability::Prop),
            Some(Resolved::Prop(json!("child")))
        );
    }
}
