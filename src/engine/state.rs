//! Application state
//!
//! A key/value store of JSON values. Elements bound with `bind-state="key"`
//! show the current value of their key as text, or the value of their
//! `<key>-default` attribute while the key is unset.

use crate::component::script::display;
use crate::dom::{Event, EventDispatcher, Selector, SharedDocument, VIEW_CHANGED};
use crate::utils::{Result, lock, read, write};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Attribute naming the state key an element shows
pub const BIND_STATE: &str = "bind-state";

pub struct AppState {
    document: SharedDocument,
    values: RwLock<Map<String, Value>>,
}

impl AppState {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            values: RwLock::new(Map::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        read(&self.values).get(key).cloned()
    }

    /// Store `value` under `key` and refresh bound elements
    pub fn set(&self, key: &str, value: Value) {
        write(&self.values).insert(key.to_string(), value);
        self.refresh();
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = write(&self.values).shift_remove(key);
        if removed.is_some() {
            self.refresh();
        }
        removed
    }

    /// Copy of every stored value
    pub fn values(&self) -> Map<String, Value> {
        read(&self.values).clone()
    }

    /// Bind every element matching `selector` to `key`. Returns the number of
    /// elements bound.
    pub fn bind(&self, selector: &str, key: &str) -> Result<usize> {
        let selector = Selector::parse(selector)?;
        let count = {
            let mut doc = lock(&self.document);
            let root = doc.root();
            let nodes = selector.query_all(&doc, root);
            for node in &nodes {
                doc.set_attribute(*node, BIND_STATE, key);
            }
            nodes.len()
        };
        if count == 0 {
            log::warn!(target: "lonewolf::state", "nothing matches {:?} to bind {key:?}", selector.as_str());
        }
        self.refresh();
        Ok(count)
    }

    /// Rewrite the text of every bound element. Returns the number updated.
    pub fn refresh(&self) -> usize {
        let values = read(&self.values).clone();
        let mut doc = lock(&self.document);
        let root = doc.root();
        let bound: Vec<_> = doc
            .descendants(root)
            .into_iter()
            .filter_map(|node| doc.get_attribute(node, BIND_STATE).map(|key| (node, key.to_string())))
            .collect();
        for (node, key) in &bound {
            let text = match values.get(key) {
                Some(value) => display(value),
                None => doc
                    .get_attribute(*node, &format!("{key}-default"))
                    .unwrap_or_default()
                    .to_string(),
            };
            doc.set_text_content(*node, text);
        }
        bound.len()
    }

    /// Refresh bound elements whenever a new view is mounted
    pub fn watch_view_changes(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        let state = Arc::downgrade(self);
        dispatcher.add_listener(
            VIEW_CHANGED,
            Arc::new(move |_: &Event| {
                if let Some(state) = state.upgrade() {
                    let count = state.refresh();
                    log::debug!(target: "lonewolf::state", "view changed, {count} bound elements refreshed");
                }
            }),
        );
    }

    /// Write every value to `path` as a JSON object
    pub async fn snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&*read(&self.values))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Replace every value with the JSON object stored at `path`
    pub async fn restore(&self, path: impl AsRef<Path>) -> Result<()> {
        let source = tokio::fs::read_to_string(path).await?;
        let values: Map<String, Value> = serde_json::from_str(&source)?;
        *write(&self.values) = values;
        self.refresh();
        Ok(())
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("values", &*read(&self.values))
            .finish()
    }
}
