//! Event handling for document nodes
//!
//! Listeners are attached to nodes by id. Dispatch walks from the target up
//! through its ancestors when the event bubbles, then runs global listeners.
//! No lock is held while a handler runs, so handlers may mutate the document
//! or register new listeners.

use super::node::{NodeId, SharedDocument};
use crate::utils::lock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Event types that never bubble
pub const NON_BUBBLING: &[&str] = &[
    "mouseenter",
    "mouseleave",
    "focus",
    "blur",
    "dragenter",
    "dragleave",
];

/// Custom event fired on the mount after every view swap
pub const VIEW_CHANGED: &str = "app:viewChanged";

#[derive(Debug, Default)]
struct EventFlags {
    propagation_stopped: AtomicBool,
    default_prevented: AtomicBool,
}

/// A dispatched event
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub target: Option<NodeId>,
    /// Node whose listener is currently running
    pub current_target: Option<NodeId>,
    pub bubbles: bool,
    pub detail: Value,
    pub timestamp: u64,
    flags: Arc<EventFlags>,
}

impl Event {
    /// Create a new event; bubbling follows the DOM defaults for the type
    pub fn new(event_type: impl Into<String>) -> Self {
        let event_type = event_type.into();
        let bubbles = !NON_BUBBLING.contains(&event_type.as_str());
        Self {
            event_type,
            target: None,
            current_target: None,
            bubbles,
            detail: Value::Null,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            flags: Arc::default(),
        }
    }

    /// Create a click event
    pub fn click() -> Self {
        Self::new("click")
    }

    /// Create a custom event carrying a detail payload
    pub fn custom(event_type: impl Into<String>, detail: Value) -> Self {
        let mut event = Self::new(event_type);
        event.bubbles = true;
        event.detail = detail;
        event
    }

    /// Set the target node
    pub fn with_target(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    /// Prevent the default action
    pub fn prevent_default(&self) {
        self.flags.default_prevented.store(true, Ordering::SeqCst);
    }

    /// Whether a handler prevented the default action
    pub fn default_prevented(&self) -> bool {
        self.flags.default_prevented.load(Ordering::SeqCst)
    }

    /// Stop event propagation
    pub fn stop_propagation(&self) {
        self.flags.propagation_stopped.store(true, Ordering::SeqCst);
    }

    /// Whether propagation was stopped
    pub fn propagation_stopped(&self) -> bool {
        self.flags.propagation_stopped.load(Ordering::SeqCst)
    }

    /// JSON view of the event, handed to event methods
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "type": self.event_type,
            "target": self.target.map(|t| t.index()),
            "currentTarget": self.current_target.map(|t| t.index()),
            "bubbles": self.bubbles,
            "detail": self.detail,
            "timeStamp": self.timestamp,
        })
    }
}

/// Event handler callback type
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    global: HashMap<String, Vec<EventHandler>>,
    targets: HashMap<NodeId, HashMap<String, Vec<EventHandler>>>,
}

/// Event dispatcher; clones share the same listener table
#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<Mutex<Listeners>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global listener, run after the bubbling phase
    pub fn add_listener(&self, event_type: &str, handler: EventHandler) {
        lock(&self.inner)
            .global
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Add a listener on a specific node
    pub fn add_target_listener(&self, target: NodeId, event_type: &str, handler: EventHandler) {
        lock(&self.inner)
            .targets
            .entry(target)
            .or_default()
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Number of listeners attached to a node for an event type
    pub fn target_listener_count(&self, target: NodeId, event_type: &str) -> usize {
        lock(&self.inner)
            .targets
            .get(&target)
            .and_then(|m| m.get(event_type))
            .map_or(0, Vec::len)
    }

    fn handlers_for(&self, target: NodeId, event_type: &str) -> Vec<EventHandler> {
        lock(&self.inner)
            .targets
            .get(&target)
            .and_then(|m| m.get(event_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Dispatch an event at its target
    pub fn dispatch(&self, doc: &SharedDocument, event: &Event) {
        let path = match event.target {
            Some(target) => {
                let doc = lock(doc);
                let mut path = vec![target];
                if event.bubbles {
                    path.extend(doc.ancestors(target));
                }
                path
            }
            None => Vec::new(),
        };

        for node in path {
            let handlers = self.handlers_for(node, &event.event_type);
            if handlers.is_empty() {
                continue;
            }
            let mut current = event.clone();
            current.current_target = Some(node);
            for handler in handlers {
                handler(&current);
            }
            if event.propagation_stopped() {
                return;
            }
        }

        if event.bubbles || event.target.is_none() {
            let handlers = lock(&self.inner)
                .global
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default();
            for handler in handlers {
                if event.propagation_stopped() {
                    return;
                }
                handler(event);
            }
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = lock(&self.inner);
        f.debug_struct("EventDispatcher")
            .field("global", &listeners.global.len())
            .field("targets", &listeners.targets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::Document;
    use std::sync::atomic::AtomicUsize;

    fn tree() -> (SharedDocument, NodeId, NodeId) {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("button");
        doc.append_child(doc.root(), outer);
        doc.append_child(outer, inner);
        (doc.into_shared(), outer, inner)
    }

    #[test]
    fn test_event_bubbles_to_ancestors() {
        let (doc, outer, inner) = tree();
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        dispatcher.add_target_listener(
            outer,
            "click",
            Arc::new(move |e: &Event| lock(&log).push((e.target, e.current_target))),
        );

        dispatcher.dispatch(&doc, &Event::click().with_target(inner));
        assert_eq!(*lock(&seen), vec![(Some(inner), Some(outer))]);
    }

    #[test]
    fn test_non_bubbling_events_stay_on_target() {
        let (doc, outer, inner) = tree();
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        dispatcher.add_target_listener(
            outer,
            "mouseenter",
            Arc::new(move |_e: &Event| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatcher.dispatch(&doc, &Event::new("mouseenter").with_target(inner));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        dispatcher.dispatch(&doc, &Event::new("mouseenter").with_target(outer));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_propagation() {
        let (doc, outer, inner) = tree();
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        dispatcher.add_target_listener(inner, "click", Arc::new(|e: &Event| e.stop_propagation()));
        let c = Arc::clone(&count);
        dispatcher.add_target_listener(
            outer,
            "click",
            Arc::new(move |_e: &Event| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatcher.dispatch(&doc, &Event::click().with_target(inner));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_can_register_during_dispatch() {
        let (doc, _outer, inner) = tree();
        let dispatcher = EventDispatcher::new();
        let inner_dispatcher = dispatcher.clone();
        dispatcher.add_target_listener(
            inner,
            "click",
            Arc::new(move |_e: &Event| {
                inner_dispatcher.add_listener("click", Arc::new(|_e: &Event| {}));
            }),
        );
        dispatcher.dispatch(&doc, &Event::click().with_target(inner));
        assert_eq!(dispatcher.target_listener_count(inner, "click"), 1);
    }

    #[test]
    fn test_custom_event_detail() {
        let event = Event::custom(VIEW_CHANGED, serde_json::json!({"route": "/home"}));
        assert!(event.bubbles);
        assert_eq!(event.to_json()["detail"]["route"], "/home");
    }
}
