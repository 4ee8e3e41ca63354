//! Component arena
//!
//! Components live in a flat arena indexed by [`ComponentId`]; each records
//! the id of its enclosing component. Nodes map to at most one component.

use super::ancestry::{AncestorQuery, Capability, Resolved};
use super::script::{Frame, Scope, ScriptContext, ScriptFunction, ScriptResult};
use crate::dom::NodeId;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(usize);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// A built component
#[derive(Debug, Clone)]
pub struct Component {
    pub id: ComponentId,
    pub node: NodeId,
    pub parent: Option<ComponentId>,
    pub props: Map<String, Value>,
    /// Keys are lowercase
    pub methods: HashMap<String, ScriptFunction>,
    /// Keys are lowercase
    pub event_methods: HashMap<String, ScriptFunction>,
    /// Delegated bindings per event type: `(target node, handler name)`
    pub(crate) delegated: HashMap<String, Vec<(NodeId, String)>>,
}

impl Component {
    /// Case-insensitive prop lookup, exact name first
    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name).or_else(|| {
            self.props
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    pub fn method(&self, name: &str) -> Option<&ScriptFunction> {
        self.methods.get(&name.to_lowercase())
    }

    pub fn event_method(&self, name: &str) -> Option<&ScriptFunction> {
        self.event_methods.get(&name.to_lowercase())
    }
}

#[derive(Debug, Default)]
pub struct ComponentArena {
    components: Vec<Component>,
    owners: HashMap<NodeId, ComponentId>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component for `node`. A node already owned keeps its component.
    pub fn insert(&mut self, node: NodeId, parent: Option<ComponentId>, props: Map<String, Value>) -> ComponentId {
        if let Some(existing) = self.owners.get(&node) {
            return *existing;
        }
        let id = ComponentId(self.components.len());
        self.components.push(Component {
            id,
            node,
            parent,
            props,
            methods: HashMap::new(),
            event_methods: HashMap::new(),
            delegated: HashMap::new(),
        });
        self.owners.insert(node, id);
        id
    }

    /// Component owning `node`
    pub fn owner_of(&self, node: NodeId) -> Option<ComponentId> {
        self.owners.get(&node).copied()
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0)
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.0)
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.get(id).and_then(|c| c.parent)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Enclosing components, nearest first
    pub fn ancestors(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(c) = current {
            if out.contains(&c) {
                break;
            }
            out.push(c);
            current = self.parent(c);
        }
        out
    }

    /// Look a capability up on the component itself, then on its ancestors
    pub fn lookup(&self, from: ComponentId, name: &str, capability: Capability) -> Option<Resolved> {
        let own = self.get(from).and_then(|c| match capability {
            Capability::Method => c.method(name).cloned().map(|f| (f, from)),
            Capability::EventMethod => c.event_method(name).cloned().map(|f| (f, from)),
            Capability::Prop => None,
        });
        if let Some((function, owner)) = own {
            return Some(Resolved::Method(BoundMethod {
                function,
                owner,
                this: owner,
            }));
        }
        if capability == Capability::Prop {
            if let Some(value) = self.get(from).and_then(|c| c.prop(name)) {
                return Some(Resolved::Prop(value.clone()));
            }
        }
        self.resolve_ancestor(from, &AncestorQuery::new(name, capability))
    }

    /// Run a bound method
    pub fn invoke(&mut self, method: &BoundMethod, args: Vec<Value>) -> ScriptResult<Value> {
        method.call(self, args)
    }

    /// Script frames for `this` and its ancestors, nearest first
    pub fn frames(&self, this: ComponentId) -> Vec<Frame> {
        std::iter::once(this)
            .chain(self.ancestors(this))
            .filter_map(|id| self.get(id))
            .map(|c| Frame {
                id: c.id.0,
                parent: c.parent.map(|p| p.0),
                props: c.props.clone(),
                methods: c
                    .methods
                    .iter()
                    .map(|(name, f)| (name.clone(), f.source().to_string()))
                    .collect(),
            })
            .collect()
    }

    /// Write back props read from a script context
    pub fn store_props(&mut self, written: BTreeMap<usize, Map<String, Value>>) {
        for (index, props) in written {
            if let Some(component) = self.components.get_mut(index) {
                component.props = props;
            }
        }
    }
}

/// A method together with the component it runs against
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    pub function: ScriptFunction,
    /// Component the method was found on
    pub owner: ComponentId,
    /// Component `this` refers to
    pub this: ComponentId,
}

impl BoundMethod {
    /// Call with `args`. A call without arguments hands the props of `this`
    /// to the first parameter.
    pub fn call(&self, arena: &mut ComponentArena, args: Vec<Value>) -> ScriptResult<Value> {
        let mut script = ScriptContext::new(arena.frames(self.this), self.this.0)?;
        let result = script.invoke(&self.function, args);
        arena.store_props(script.take_props());
        result
    }
}

/// Evaluation scope of a component: its props as variables, methods of it
/// and its ancestors as calls
pub struct ComponentScope<'a> {
    arena: &'a mut ComponentArena,
    script: ScriptContext,
}

impl<'a> ComponentScope<'a> {
    pub fn new(arena: &'a mut ComponentArena, this: ComponentId) -> ScriptResult<Self> {
        let script = ScriptContext::new(arena.frames(this), this.0)?;
        Ok(Self { arena, script })
    }
}

impl Scope for ComponentScope<'_> {
    fn eval(&mut self, source: &str) -> ScriptResult<Value> {
        let result = self.script.eval(source);
        self.arena.store_props(self.script.take_props());
        result
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Option<ScriptResult<Value>> {
        let result = self.script.call(name, args);
        self.arena.store_props(self.script.take_props());
        result
    }
}
