//! HTML parsing and serialisation using html5ever
//!
//! Parsing goes through `markup5ever_rcdom` and the resulting tree is copied
//! into the document arena, so every fragment shares node ids with the page.

use super::node::{Document, ElementData, NodeId, NodeType};
use crate::utils::Result;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// HTML parser producing nodes inside an existing [`Document`]
#[derive(Clone)]
pub struct HtmlParser {
    opts: ParseOpts,
}

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self {
            opts: ParseOpts {
                tree_builder: TreeBuilderOpts {
                    drop_doctype: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    fn parse_rcdom(&self, content: &str) -> Result<RcDom> {
        let dom = parse_document(RcDom::default(), self.opts.clone())
            .from_utf8()
            .read_from(&mut content.as_bytes())?;
        Ok(dom)
    }

    /// Parse a markup fragment into detached nodes owned by `doc`.
    ///
    /// Content the HTML tree builder hoists into `<head>` (such as `<title>`)
    /// is returned ahead of body content.
    pub fn parse_fragment(&self, doc: &mut Document, content: &str) -> Result<Vec<NodeId>> {
        if content.is_empty() {
            return Ok(Vec::new());
        }
        let dom = self.parse_rcdom(content)?;
        let mut out = Vec::new();
        for child in dom.document.children.borrow().iter() {
            match &child.data {
                NodeData::Element { name, .. } if name.local.as_ref() == "html" => {
                    for section in child.children.borrow().iter() {
                        match &section.data {
                            NodeData::Element { name, .. }
                                if matches!(name.local.as_ref(), "head" | "body") =>
                            {
                                for node in section.children.borrow().iter() {
                                    out.extend(import(doc, node));
                                }
                            }
                            _ => out.extend(import(doc, section)),
                        }
                    }
                }
                _ => out.extend(import(doc, child)),
            }
        }
        Ok(out)
    }

    /// Parse a complete page and attach it under the document root
    pub fn parse_into(&self, doc: &mut Document, content: &str) -> Result<()> {
        let dom = self.parse_rcdom(content)?;
        let root = doc.root();
        for child in dom.document.children.borrow().iter() {
            if let Some(id) = import(doc, child) {
                doc.append_child(root, id);
            }
        }
        if let Some(title) = doc
            .descendants(root)
            .into_iter()
            .find(|id| doc.tag_name(*id) == Some("title"))
        {
            doc.title = doc.text_content(title).trim().to_string();
        }
        Ok(())
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a standalone page into a fresh document
pub fn parse_page(content: &str) -> Result<Document> {
    let mut doc = Document::new();
    HtmlParser::new().parse_into(&mut doc, content)?;
    Ok(doc)
}

fn import(doc: &mut Document, handle: &Handle) -> Option<NodeId> {
    let id = match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let mut data = ElementData::new(name.local.as_ref());
            for attr in attrs.borrow().iter() {
                data.set_attribute(attr.name.local.as_ref(), attr.value.to_string());
            }
            doc.create_element_with(data)
        }
        NodeData::Text { contents } => doc.create_text(contents.borrow().to_string()),
        NodeData::Comment { contents } => doc.create_comment(contents.to_string()),
        _ => return None,
    };
    for child in handle.children.borrow().iter() {
        if let Some(child_id) = import(doc, child) {
            doc.append_child(id, child_id);
        }
    }
    Some(id)
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn write_node(doc: &Document, id: NodeId, raw_text: bool, out: &mut String) {
    match doc.node_type(id) {
        Some(NodeType::Element(element)) => {
            out.push('<');
            out.push_str(&element.tag_name);
            for (name, value) in &element.attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attribute(value, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&element.tag_name.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&element.tag_name.as_str());
            for child in doc.children(id) {
                write_node(doc, *child, raw, out);
            }
            out.push_str("</");
            out.push_str(&element.tag_name);
            out.push('>');
        }
        Some(NodeType::Text(text)) => {
            if raw_text {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        Some(NodeType::Comment(text)) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Some(NodeType::Document) => {
            for child in doc.children(id) {
                write_node(doc, *child, false, out);
            }
        }
        None => {}
    }
}

/// Serialise a node including its own tag
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, false, &mut out);
    out
}

/// Serialise the children of a node
pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let raw = doc
        .tag_name(id)
        .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
    let mut out = String::new();
    for child in doc.children(id) {
        write_node(doc, *child, raw, &mut out);
    }
    out
}

/// Replace the children of a node with parsed markup
pub fn set_inner_html(doc: &mut Document, id: NodeId, content: &str) -> Result<Vec<NodeId>> {
    let nodes = HtmlParser::new().parse_fragment(doc, content)?;
    doc.clear_children(id);
    for node in &nodes {
        doc.append_child(id, *node);
    }
    Ok(nodes)
}
