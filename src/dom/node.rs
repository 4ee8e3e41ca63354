//! Arena-backed document tree
//!
//! Nodes live in a flat arena and refer to each other through [`NodeId`].
//! Detached nodes stay in the arena, so cached views can be mounted again;
//! [`Document::remove`] releases a subtree for good and its slots are reused
//! by later allocations.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Index of a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node types in the document
#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    /// Document root
    Document,
    /// Element node (e.g., <div>)
    Element(ElementData),
    /// Text node
    Text(String),
    /// Comment node
    Comment(String),
}

/// Data for element nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Tag name, lowercase
    pub tag_name: String,
    /// Attributes in source order
    pub attributes: Vec<(String, String)>,
}

impl ElementData {
    /// Create a new element
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            attributes: Vec::new(),
        }
    }

    /// Get an attribute value
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check whether an attribute is present
    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Set an attribute value, keeping its position if it already exists
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self
            .attributes
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.attributes.remove(pos).1)
    }

    /// Get the ID attribute
    pub fn id(&self) -> Option<&str> {
        self.get_attribute("id")
    }

    /// Get class names
    pub fn classes(&self) -> Vec<&str> {
        self.get_attribute("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node_type: NodeType,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    live: bool,
}

impl Slot {
    fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            parent: None,
            children: Vec::new(),
            live: true,
        }
    }
}

/// The document: an arena of nodes rooted at a document node
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Slot>,
    /// Released slots, reused before the arena grows
    free: Vec<NodeId>,
    root: NodeId,
    /// Current document title
    pub title: String,
}

/// Document shared between the shell, the router tasks and component builders
pub type SharedDocument = Arc<Mutex<Document>>;

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self {
            nodes: vec![Slot::new(NodeType::Document)],
            free: Vec::new(),
            root: NodeId(0),
            title: String::new(),
        }
    }

    /// Wrap the document for sharing across tasks
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// True when only the document node exists
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    fn alloc(&mut self, node_type: NodeType) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = Slot::new(node_type);
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot::new(node_type));
        id
    }

    /// Detach a node and release it with its whole subtree.
    ///
    /// The ids become invalid and may be handed out again by later
    /// allocations. The document node cannot be removed.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root || !self.contains_id(id) {
            return;
        }
        self.detach(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let slot = &mut self.nodes[current.0];
            stack.append(&mut slot.children);
            *slot = Slot {
                live: false,
                ..Slot::new(NodeType::Comment(String::new()))
            };
            self.free.push(current);
        }
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.alloc(NodeType::Element(ElementData::new(tag_name)))
    }

    /// Create a detached element from parsed data
    pub fn create_element_with(&mut self, data: ElementData) -> NodeId {
        self.alloc(NodeType::Element(data))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeType::Text(text.into()))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeType::Comment(text.into()))
    }

    /// Check that the id belongs to this arena
    pub fn contains_id(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|s| s.live)
    }

    /// Node data
    pub fn node_type(&self, id: NodeId) -> Option<&NodeType> {
        self.nodes.get(id.0).filter(|s| s.live).map(|s| &s.node_type)
    }

    /// Element data if the node is an element
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.node_type(id)? {
            NodeType::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable element data if the node is an element
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).filter(|s| s.live).map(|s| &mut s.node_type)? {
            NodeType::Element(data) => Some(data),
            _ => None,
        }
    }

    /// Check if the node is an element
    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Tag name of an element node
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag_name.as_str())
    }

    /// Attribute value of an element node
    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.get_attribute(name)
    }

    /// Check an attribute on an element node
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_attribute(name))
    }

    /// Set an attribute; ignored for non-elements
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(element) = self.element_mut(id) {
            element.set_attribute(name, value);
        }
    }

    /// Remove an attribute from an element
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)?.remove_attribute(name)
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    /// Children of a node, empty for unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
    }

    /// Element children only
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// True if `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Ancestors from the parent up to the document node
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// True if the node is reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains_id(id) && self.is_inclusive_ancestor(self.root, id)
    }

    /// Remove a node from its parent; the node and its subtree stay in the arena
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(slot) = self.nodes.get_mut(parent.0) {
            slot.children.retain(|c| *c != id);
        }
        if let Some(slot) = self.nodes.get_mut(id.0) {
            slot.parent = None;
        }
    }

    /// Append a child, moving it out of its previous parent.
    /// Returns false if the move would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.contains_id(parent) || !self.contains_id(child) {
            return false;
        }
        if self.is_inclusive_ancestor(child, parent) {
            return false;
        }
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    /// Insert `child` right before `reference` under the reference's parent
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) -> bool {
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        if !self.contains_id(child) || self.is_inclusive_ancestor(child, parent) {
            return false;
        }
        self.detach(child);
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == reference)
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.insert(pos, child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    /// Replace `old` with the given nodes, in order
    pub fn replace_with(&mut self, old: NodeId, replacements: &[NodeId]) {
        for node in replacements {
            self.insert_before(old, *node);
        }
        self.detach(old);
    }

    /// Detach every child of a node
    pub fn clear_children(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.detach(child);
        }
    }

    /// Descendants in document (pre-)order, excluding the node itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        match self.node_type(id) {
            Some(NodeType::Text(text)) | Some(NodeType::Comment(text)) => text.clone(),
            _ => self
                .descendants(id)
                .into_iter()
                .filter_map(|d| match self.node_type(d) {
                    Some(NodeType::Text(text)) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Replace the content of a node with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        let text = text.into();
        match self.nodes.get_mut(id.0).filter(|s| s.live).map(|s| &mut s.node_type) {
            Some(NodeType::Text(current)) | Some(NodeType::Comment(current)) => *current = text,
            Some(_) => {
                self.clear_children(id);
                if !text.is_empty() {
                    let node = self.create_text(text);
                    self.append_child(id, node);
                }
            }
            None => {}
        }
    }

    /// The `<body>` element if the document has one, otherwise the root
    pub fn body(&self) -> NodeId {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.tag_name(*id) == Some("body"))
            .unwrap_or(self.root)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let div = doc.create_element("DIV");
        let span = doc.create_element("span");
        let text = doc.create_text("hello");
        doc.append_child(doc.root(), div);
        doc.append_child(div, span);
        doc.append_child(span, text);
        (doc, div, span, text)
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        let (doc, div, _, _) = sample();
        assert_eq!(doc.tag_name(div), Some("div"));
    }

    #[test]
    fn test_text_content_and_attachment() {
        let (mut doc, div, span, _) = sample();
        assert_eq!(doc.text_content(div), "hello");
        assert!(doc.is_attached(span));

        doc.detach(span);
        assert!(!doc.is_attached(span));
        assert_eq!(doc.text_content(div), "");
    }

    #[test]
    fn test_append_rejects_cycles() {
        let (mut doc, div, span, _) = sample();
        assert!(!doc.append_child(span, div));
        assert_eq!(doc.parent(span), Some(div));
    }

    #[test]
    fn test_replace_with_keeps_position() {
        let mut doc = Document::new();
        let parent = doc.create_element("ul");
        let a = doc.create_element("li");
        let b = doc.create_element("li");
        let c = doc.create_element("li");
        for id in [a, b, c] {
            doc.append_child(parent, id);
        }
        let x = doc.create_text("x");
        let y = doc.create_text("y");
        doc.replace_with(b, &[x, y]);
        assert_eq!(doc.children(parent), &[a, x, y, c]);
        assert_eq!(doc.parent(b), None);
    }

    #[test]
    fn test_attributes_preserve_order() {
        let mut data = ElementData::new("a");
        data.set_attribute("href", "/x");
        data.set_attribute("class", "one two");
        data.set_attribute("HREF", "/y");
        assert_eq!(data.attributes[0], ("href".to_string(), "/y".to_string()));
        assert_eq!(data.classes(), vec!["one", "two"]);
        assert_eq!(data.remove_attribute("class").as_deref(), Some("one two"));
        assert!(!data.has_attribute("class"));
    }

    #[test]
    fn test_descendants_preorder() {
        let (doc, div, span, text) = sample();
        assert_eq!(doc.descendants(doc.root()), vec![div, span, text]);
    }

    #[test]
    fn test_remove_releases_subtree_for_reuse() {
        let (mut doc, div, span, text) = sample();
        let live = doc.len();
        doc.remove(span);
        assert_eq!(doc.len(), live - 2);
        assert!(doc.children(div).is_empty());
        assert!(!doc.contains_id(text));
        assert_eq!(doc.node_type(span), None);

        let fresh = doc.create_element("p");
        let other = doc.create_text("x");
        assert!([span, text].contains(&fresh) && [span, text].contains(&other));
        assert_eq!(doc.tag_name(fresh), Some("p"));
        assert_eq!(doc.len(), live);

        doc.remove(doc.root());
        assert!(doc.contains_id(doc.root()));
    }
}
