//! Stand-alone components
//!
//! A route payload is mounted in a container that is itself a component.
//! Building a component configures it from its `<children>` section, resolves
//! `<getComponent>` includes, interpolates placeholders, binds pseudo-events
//! and finally builds the stand-alone components nested inside it.

pub mod ancestry;
pub mod arena;
pub mod attribute;
pub mod binding;
pub mod include;
pub mod placeholder;
pub mod script;

pub use ancestry::{AncestorQuery, Capability, Resolved};
pub use arena::{BoundMethod, Component, ComponentArena, ComponentId, ComponentScope};
pub use attribute::{AttributeValue, parse_attribute_value};
pub use binding::{PseudoEvent, bind_events, parse_event_attribute};
pub use include::resolve_includes;
pub use placeholder::{evaluate_placeholder, interpolate};
pub use script::{Scope, ScriptContext, ScriptFunction};

use crate::config::Keywords;
use crate::dom::{Document, EventDispatcher, HtmlParser, NodeId, SharedDocument};
use crate::network::Fetcher;
use crate::router::Route;
use crate::utils::{RenderError, Result, lock};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CHILDREN_TAG: &str = "children";
const PROPS_TAG: &str = "props";
const METHODS_TAG: &str = "methods";
const EVENT_METHODS_TAG: &str = "eventmethods";
/// Attribute of a `<props>` tag whose object value is spread into the props
const DATA_ATTRIBUTE: &str = "data";
/// Attribute naming the route a container holds
pub const VIEW_CONTAINER: &str = "view-container";

/// What the `<children>` section of a component declares
#[derive(Debug, Default)]
struct Declared {
    props: Map<String, Value>,
    methods: HashMap<String, ScriptFunction>,
    event_methods: HashMap<String, ScriptFunction>,
}

fn declared_value(tag: &str, name: &str, raw: &str) -> Option<AttributeValue> {
    match parse_attribute_value(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!(
                target: "lonewolf::component",
                "could not parse <{tag} {name}>: {e}"
            );
            None
        }
    }
}

fn declare(doc: &Document, section: NodeId) -> Declared {
    let mut declared = Declared::default();
    for child in doc.element_children(section) {
        let Some(element) = doc.element(child) else {
            continue;
        };
        let tag = element.tag_name.as_str();
        if !matches!(tag, PROPS_TAG | METHODS_TAG | EVENT_METHODS_TAG) {
            continue;
        }
        for (name, raw) in &element.attributes {
            let value = declared_value(tag, name, raw);
            match tag {
                PROPS_TAG => match value.and_then(AttributeValue::into_value) {
                    Some(Value::Object(map)) if name == DATA_ATTRIBUTE => declared.props.extend(map),
                    Some(value) => {
                        declared.props.insert(name.clone(), value);
                    }
                    None => {
                        declared.props.insert(name.clone(), Value::Null);
                    }
                },
                _ => {
                    let Some(AttributeValue::Function(function)) = value else {
                        log::error!(
                            target: "lonewolf::component",
                            "<{tag} {name}> is not a function"
                        );
                        continue;
                    };
                    let key = name.to_ascii_lowercase();
                    if tag == METHODS_TAG {
                        declared.methods.insert(key, function);
                    } else {
                        declared.event_methods.insert(key, function);
                    }
                }
            }
        }
    }
    declared
}

/// Builds components inside one document
pub struct ComponentTree {
    document: SharedDocument,
    dispatcher: EventDispatcher,
    fetcher: Arc<dyn Fetcher>,
    arena: Arc<Mutex<ComponentArena>>,
    parser: HtmlParser,
    keywords: Keywords,
    nested_delay: Duration,
}

impl ComponentTree {
    pub fn new(
        document: SharedDocument,
        dispatcher: EventDispatcher,
        fetcher: Arc<dyn Fetcher>,
        keywords: Keywords,
        nested_delay: Duration,
    ) -> Self {
        Self {
            document,
            dispatcher,
            fetcher,
            arena: Arc::new(Mutex::new(ComponentArena::new())),
            parser: HtmlParser::new(),
            keywords,
            nested_delay,
        }
    }

    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.document)
    }

    pub fn arena(&self) -> Arc<Mutex<ComponentArena>> {
        Arc::clone(&self.arena)
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    fn is_boundary(&self, doc: &Document, id: NodeId) -> bool {
        doc.has_attribute(id, &self.keywords.component)
    }

    /// Nodes belonging to the component at `root` (root excluded) and the
    /// outermost nested components, which are left out of the walk
    fn partition(&self, doc: &Document, root: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut own = Vec::new();
        let mut boundaries = Vec::new();
        let mut stack: Vec<NodeId> = doc.children(root).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.is_boundary(doc, current) {
                boundaries.push(current);
                continue;
            }
            own.push(current);
            stack.extend(doc.children(current).iter().rev().copied());
        }
        (own, boundaries)
    }

    /// Apply the `<children>` section: record its declarations and replace
    /// the component content with the section content.
    fn configure(&self, doc: &mut Document, id: ComponentId, root: NodeId, is_view: bool) -> Result<()> {
        let (own, _) = self.partition(doc, root);
        let Some(section) = own.into_iter().find(|n| doc.tag_name(*n) == Some(CHILDREN_TAG)) else {
            if is_view {
                log::debug!(target: "lonewolf::component", "view without <children>, using it as is");
                return Ok(());
            }
            return Err(RenderError::MissingChildren.into());
        };

        let declared = declare(doc, section);
        if let Some(component) = lock(&self.arena).get_mut(id) {
            component.props.extend(declared.props);
            component.methods.extend(declared.methods);
            component.event_methods.extend(declared.event_methods);
        }

        let content: Vec<NodeId> = doc
            .children(section)
            .iter()
            .copied()
            .filter(|n| !matches!(doc.tag_name(*n), Some(PROPS_TAG | METHODS_TAG | EVENT_METHODS_TAG)))
            .collect();
        doc.clear_children(root);
        for node in content {
            doc.append_child(root, node);
        }
        Ok(())
    }

    /// Fetch a route's payload and build it into its view container.
    ///
    /// The container is cached on the route, so later calls return the same
    /// node without fetching.
    pub async fn render_route(&self, route: &Route) -> Result<NodeId> {
        route
            .rendered_or_init(|| async {
                let payload = route.fetch(self.fetcher.as_ref()).await?;
                let container = {
                    let mut doc = lock(&self.document);
                    let container = doc.create_element("div");
                    doc.set_attribute(container, &self.keywords.component, "");
                    doc.set_attribute(container, VIEW_CONTAINER, route.key());
                    for node in self.parser.parse_fragment(&mut doc, &payload)? {
                        doc.append_child(container, node);
                    }
                    container
                };
                self.build(container, None, route.props().clone(), true).await?;
                Ok(container)
            })
            .await
    }

    /// Build the component rooted at `root`.
    ///
    /// A node that already owns a component is left alone. `props` seed the
    /// component props before its own declarations are applied.
    pub fn build<'a>(
        &'a self,
        root: NodeId,
        parent: Option<ComponentId>,
        props: Map<String, Value>,
        is_view: bool,
    ) -> BoxFuture<'a, Result<ComponentId>> {
        Box::pin(async move {
            let id = {
                let mut doc = lock(&self.document);
                if !doc.contains_id(root) {
                    return Err(RenderError::Detached(root.index()).into());
                }
                if let Some(existing) = lock(&self.arena).owner_of(root) {
                    log::debug!(target: "lonewolf::component", "{existing} already built");
                    return Ok(existing);
                }
                let id = lock(&self.arena).insert(root, parent, props);
                log::debug!(
                    target: "lonewolf::component",
                    "building {id} on <{}>",
                    doc.tag_name(root).unwrap_or_default()
                );
                self.configure(&mut doc, id, root, is_view)?;
                id
            };

            resolve_includes(&self.document, &self.parser, self.fetcher.as_ref(), root).await;

            let boundaries = {
                let mut doc = lock(&self.document);
                let (_, boundaries) = self.partition(&doc, root);
                {
                    let mut arena = lock(&self.arena);
                    let interpolated = ComponentScope::new(&mut arena, id)
                        .map_err(Into::into)
                        .and_then(|mut scope| {
                            placeholder::interpolate_component(&mut doc, &self.parser, root, &boundaries, &mut scope)
                        });
                    if let Err(e) = interpolated {
                        log::error!(target: "lonewolf::component", "interpolating {id} failed: {e}");
                    }
                }
                let (own, boundaries) = self.partition(&doc, root);
                let nodes: Vec<NodeId> = std::iter::once(root).chain(own).collect();
                bind_events(
                    &mut doc,
                    &self.arena,
                    &self.dispatcher,
                    &self.keywords.event_handler,
                    id,
                    &nodes,
                );
                boundaries
            };

            if !boundaries.is_empty() && !self.nested_delay.is_zero() {
                tokio::time::sleep(self.nested_delay).await;
            }
            for child in boundaries {
                if let Err(e) = self.build(child, Some(id), Map::new(), false).await {
                    log::error!(target: "lonewolf::component", "nested component of {id} failed: {e}");
                }
            }
            Ok(id)
        })
    }
}

impl std::fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentTree")
            .field("components", &lock(&self.arena).len())
            .field("keywords", &self.keywords)
            .field("nested_delay", &self.nested_delay)
            .finish()
    }
}
