//! Minimal CSS selector support: tag, `#id`, `.class`, `[attr]`,
//! `[attr="value"]` and compounds of those. Combinators are not supported.

use super::node::{Document, NodeId};
use crate::utils::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Tag(String),
    Id(String),
    Class(String),
    Attr(String, Option<String>),
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    compound: Vec<Simple>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == ':'
}

fn parse_compound(source: &str, input: &str) -> Result<Vec<Simple>> {
    let invalid = || ConfigError::InvalidSelector(source.to_string());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();
    let ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };
    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                let name = ident(&mut i);
                if name.is_empty() {
                    return Err(invalid().into());
                }
                out.push(Simple::Id(name));
            }
            '.' => {
                i += 1;
                let name = ident(&mut i);
                if name.is_empty() {
                    return Err(invalid().into());
                }
                out.push(Simple::Class(name));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| p + i)
                    .ok_or_else(invalid)?;
                let body: String = chars[i + 1..close].iter().collect();
                let attr = match body.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                        Simple::Attr(name.trim().to_ascii_lowercase(), Some(value.to_string()))
                    }
                    None => Simple::Attr(body.trim().to_ascii_lowercase(), None),
                };
                if matches!(&attr, Simple::Attr(name, _) if name.is_empty()) {
                    return Err(invalid().into());
                }
                out.push(attr);
                i = close + 1;
            }
            '*' => i += 1,
            c if is_ident_char(c) => {
                let name = ident(&mut i);
                out.push(Simple::Tag(name.to_ascii_lowercase()));
            }
            _ => return Err(invalid().into()),
        }
    }
    Ok(out)
}

impl Selector {
    /// Parse a selector string
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidSelector(source.to_string()).into());
        }
        Ok(Self {
            source: trimmed.to_string(),
            compound: parse_compound(source, trimmed)?,
        })
    }

    /// Original selector text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether an element matches the selector
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(element) = doc.element(id) else {
            return false;
        };
        self.compound.iter().all(|simple| match simple {
            Simple::Tag(tag) => element.tag_name == *tag,
            Simple::Id(value) => element.id() == Some(value.as_str()),
            Simple::Class(class) => element.classes().contains(&class.as_str()),
            Simple::Attr(name, None) => element.has_attribute(name),
            Simple::Attr(name, Some(value)) => element.get_attribute(name) == Some(value.as_str()),
        })
    }

    /// First matching descendant of `scope`
    pub fn query(&self, doc: &Document, scope: NodeId) -> Option<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .find(|id| self.matches(doc, *id))
    }

    /// Every matching descendant of `scope`, in document order
    pub fn query_all(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(doc, *id))
            .collect()
    }
}

/// Convenience: parse and query in one step
pub fn query_selector(doc: &Document, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
    Ok(Selector::parse(selector)?.query(doc, scope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html::HtmlParser;

    fn doc_with(html: &str) -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        for node in HtmlParser::new().parse_fragment(&mut doc, html).unwrap() {
            doc.append_child(root, node);
        }
        doc
    }

    #[test]
    fn test_simple_selectors() {
        let doc = doc_with(r#"<div id="app" class="shell main"><a app-link href="/x">x</a></div>"#);
        let root = doc.root();
        let app = query_selector(&doc, root, "#app").unwrap().unwrap();
        assert_eq!(doc.tag_name(app), Some("div"));
        assert_eq!(query_selector(&doc, root, ".main").unwrap(), Some(app));
        assert_eq!(query_selector(&doc, root, "div.shell#app").unwrap(), Some(app));
        let link = query_selector(&doc, root, "[app-link]").unwrap().unwrap();
        assert_eq!(doc.tag_name(link), Some("a"));
        assert_eq!(query_selector(&doc, root, "a[href=\"/x\"]").unwrap(), Some(link));
        assert_eq!(query_selector(&doc, root, "#missing").unwrap(), None);
    }

    #[test]
    fn test_query_all_in_document_order() {
        let doc = doc_with(r#"<b class="x">1</b><p><b class="x">2</b></p><b>3</b>"#);
        let all = Selector::parse("b.x").unwrap().query_all(&doc, doc.root());
        assert_eq!(all.len(), 2);
        assert_eq!(doc.text_content(all[1]), "2");
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("#").is_err());
        assert!(Selector::parse("[unterminated").is_err());
        assert!(Selector::parse("div > p").is_err());
        assert!(Selector::parse("section b").is_err());
    }
}
