//! Pseudo-event binding
//!
//! An element declares handlers with `lone-event="click:save;focus:track"`.
//! Non-bubbling events get a listener on the element itself; bubbling ones
//! share one delegated listener per event type on the component root, which
//! picks the binding whose element is the event target.

use super::ancestry::{Capability, Resolved};
use super::arena::{ComponentArena, ComponentId};
use crate::dom::{Document, Event, EventDispatcher, NON_BUBBLING, NodeId};
use crate::utils::lock;
use std::sync::{Arc, Mutex};

/// One `event:handler` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoEvent {
    pub event_type: String,
    pub handler: String,
}

/// Parse an event-binding attribute; malformed pairs are logged and skipped
pub fn parse_event_attribute(raw: &str) -> Vec<PseudoEvent> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| match pair.split_once(':') {
            Some((event_type, handler)) if !event_type.trim().is_empty() && !handler.trim().is_empty() => {
                Some(PseudoEvent {
                    event_type: event_type.trim().to_string(),
                    handler: handler.trim().to_string(),
                })
            }
            _ => {
                log::error!(
                    target: "lonewolf::component",
                    "invalid event format {pair:?}, expected \"event:handlerName\""
                );
                None
            }
        })
        .collect()
}

/// Run the event method `handler` of `component` (or of an ancestor)
pub(crate) fn fire(arena: &Mutex<ComponentArena>, component: ComponentId, handler: &str, event: &Event) {
    let mut arena = lock(arena);
    match arena.lookup(component, handler, Capability::EventMethod) {
        Some(Resolved::Method(method)) => {
            if let Err(e) = arena.invoke(&method, vec![event.to_json()]) {
                log::error!(
                    target: "lonewolf::component",
                    "event method {handler:?} failed on {}: {e}",
                    event.event_type
                );
            }
        }
        _ => log::error!(
            target: "lonewolf::component",
            "handler function {handler:?} not found for {component}"
        ),
    }
}

/// Bind the pseudo-events declared on `nodes` and strip the attribute.
///
/// `doc` must be the locked document; the arena is locked briefly per node.
/// Returns the number of bindings made.
pub fn bind_events(
    doc: &mut Document,
    arena: &Arc<Mutex<ComponentArena>>,
    dispatcher: &EventDispatcher,
    attribute: &str,
    component: ComponentId,
    nodes: &[NodeId],
) -> usize {
    let Some(root) = lock(arena).get(component).map(|c| c.node) else {
        return 0;
    };
    let mut bound = 0;
    for &node in nodes {
        let Some(raw) = doc.remove_attribute(node, attribute) else {
            continue;
        };
        log::debug!(
            target: "lonewolf::component",
            "binding {raw:?} on <{}>",
            doc.tag_name(node).unwrap_or_default()
        );
        for PseudoEvent { event_type, handler } in parse_event_attribute(&raw) {
            bound += 1;
            if NON_BUBBLING.contains(&event_type.as_str()) {
                let arena = Arc::clone(arena);
                dispatcher.add_target_listener(
                    node,
                    &event_type,
                    Arc::new(move |event: &Event| fire(&arena, component, &handler, event)),
                );
                continue;
            }

            let first_of_type = {
                let mut guard = lock(arena);
                let Some(owner) = guard.get_mut(component) else {
                    continue;
                };
                let bindings = owner.delegated.entry(event_type.clone()).or_default();
                bindings.push((node, handler));
                bindings.len() == 1
            };
            if first_of_type {
                let arena = Arc::clone(arena);
                let delegated_type = event_type.clone();
                dispatcher.add_target_listener(
                    root,
                    &event_type,
                    Arc::new(move |event: &Event| {
                        let Some(target) = event.target else {
                            return;
                        };
                        let handlers: Vec<String> = lock(&arena)
                            .get(component)
                            .and_then(|c| c.delegated.get(&delegated_type))
                            .map(|bindings| {
                                bindings
                                    .iter()
                                    .filter(|(node, _)| *node == target)
                                    .map(|(_, handler)| handler.clone())
                                    .collect()
                            })
                            .unwrap_or_default();
                        for handler in handlers {
                            fire(&arena, component, &handler, event);
                        }
                    }),
                );
            }
        }
    }
    bound
}
