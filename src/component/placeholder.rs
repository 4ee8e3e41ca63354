//! `{{ expression }}` placeholders
//!
//! Recognised forms, tried in order:
//!
//! 1. `a || b`: `a` when truthy, otherwise `b`
//! 2. `cond ? a : b`
//! 3. `name(args)`: a component method, name compared case-insensitively
//! 4. `forDataIn(items, 'template')`: the template once per item, with
//!    `value.key` replaced by the item's field
//! 5. anything else is evaluated against the component props
//!
//! A placeholder that fails to evaluate renders as an empty string.

use super::script::{Scope, display, truthy};
use crate::dom::{Document, HtmlParser, NodeId, NodeType, inner_html};
use crate::utils::{Result, ScriptError};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{\{\s*(.*?)\s*\}\}").ok());
static METHOD_CALL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)^(\w+)\((.*)\)$").ok());
static FOR_DATA_IN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)^forDataIn\((.+?),\s*['"`](.*?)['"`]\s*\)$"#).ok());
static VALUE_KEY: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"value\.(\w+)").ok());

/// Whether `text` contains a placeholder opening
pub fn has_placeholder(text: &str) -> bool {
    text.contains("{{")
}

/// Byte offsets of top-level characters: outside quotes and brackets
fn top_level(expr: &str) -> Vec<(usize, char)> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in expr.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push((i, c)),
            _ => {}
        }
    }
    out
}

/// Split at the first top-level `||`
fn split_or(expr: &str) -> Option<(&str, &str)> {
    let chars = top_level(expr);
    chars
        .windows(2)
        .find(|w| w[0].1 == '|' && w[1].1 == '|' && w[1].0 == w[0].0 + 1)
        .map(|w| (&expr[..w[0].0], &expr[w[0].0 + 2..]))
}

/// Split `cond ? a : b` at its top-level `?` and matching `:`
fn split_ternary(expr: &str) -> Option<(&str, &str, &str)> {
    let chars = top_level(expr);
    let next_is = |i: usize, c: char| expr[i + 1..].starts_with(c);
    let prev_is = |i: usize, c: char| expr[..i].ends_with(c);
    let question = chars
        .iter()
        .find(|(i, c)| *c == '?' && !next_is(*i, '?') && !next_is(*i, '.') && !prev_is(*i, '?'))?
        .0;
    let mut nested = 0usize;
    for (i, c) in chars.iter().filter(|(i, _)| *i > question) {
        match c {
            '?' => nested += 1,
            ':' if nested == 0 => {
                return Some((&expr[..question], &expr[question + 1..*i], &expr[*i + 1..]));
            }
            ':' => nested -= 1,
            _ => {}
        }
    }
    None
}

/// Split call arguments at top-level commas
fn split_args(args: &str) -> Vec<&str> {
    if args.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in top_level(args) {
        if c == ',' {
            out.push(&args[start..i]);
            start = i + 1;
        }
    }
    out.push(&args[start..]);
    out
}

/// Evaluate, logging and swallowing failures as `null`
fn eval_or_null(expr: &str, scope: &mut dyn Scope) -> Value {
    match scope.eval(expr.trim()) {
        Ok(value) => value,
        Err(e) => {
            log::warn!(target: "lonewolf::component", "error evaluating {:?}: {e}", expr.trim());
            Value::Null
        }
    }
}

fn capture<'t>(re: &LazyLock<Option<Regex>>, text: &'t str) -> Option<Captures<'t>> {
    re.as_ref().and_then(|re| re.captures(text))
}

fn for_data_in(items: &Value, template: &str) -> std::result::Result<String, ScriptError> {
    let Value::Array(items) = items else {
        return Err(ScriptError::Type("forDataIn expects an array".into()));
    };
    let Some(value_key) = VALUE_KEY.as_ref() else {
        return Ok(String::new());
    };
    Ok(items
        .iter()
        .map(|item| {
            value_key
                .replace_all(template, |caps: &Captures<'_>| {
                    item.get(&caps[1])
                        .filter(|v| truthy(v))
                        .map(display)
                        .unwrap_or_default()
                })
                .into_owned()
        })
        .collect())
}

/// Evaluate the inside of one placeholder
pub fn evaluate_placeholder(expr: &str, scope: &mut dyn Scope) -> std::result::Result<Value, ScriptError> {
    let expr = expr.trim();

    if let Some((value, fallback)) = split_or(expr) {
        let value = eval_or_null(value, scope);
        return Ok(if truthy(&value) {
            value
        } else {
            eval_or_null(fallback, scope)
        });
    }

    if let Some((cond, then, otherwise)) = split_ternary(expr) {
        let branch = if truthy(&eval_or_null(cond, scope)) { then } else { otherwise };
        return Ok(eval_or_null(branch, scope));
    }

    if !expr.starts_with("forDataIn(") {
        if let Some(caps) = capture(&METHOD_CALL, expr) {
            let name = &caps[1];
            let open = caps.get(2).map_or(0, |m| m.start());
            // `f(a) + g(b)` also fits the shape; only a single call qualifies
            if top_level(expr).iter().all(|(i, _)| *i < open) {
                let args = split_args(&caps[2])
                    .into_iter()
                    .map(|arg| eval_or_null(arg, scope))
                    .collect();
                return scope
                    .call(name, args)
                    .unwrap_or_else(|| Err(ScriptError::NotCallable(name.to_string())));
            }
        }
    } else {
        let caps = capture(&FOR_DATA_IN, expr)
            .ok_or_else(|| ScriptError::Syntax(format!("malformed forDataIn: {expr}")))?;
        let items = scope.eval(caps[1].trim())?;
        return for_data_in(&items, &caps[2]).map(Value::String);
    }

    scope.eval(expr)
}

fn unescape(expr: &str) -> String {
    expr.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn replace_placeholders(template: &str, scope: &mut dyn Scope, decode: bool) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures<'_>| {
        let source = if decode { unescape(&caps[1]) } else { caps[1].to_string() };
        match evaluate_placeholder(&source, scope) {
            Ok(value) => display(&value),
            Err(e) => {
                log::warn!(target: "lonewolf::component", "placeholder {:?} failed: {e}", &caps[0]);
                String::new()
            }
        }
    })
    .into_owned()
}

/// Replace every placeholder of a plain-text template
pub fn interpolate(template: &str, scope: &mut dyn Scope) -> String {
    replace_placeholders(template, scope, false)
}

/// Replace every placeholder of serialised markup.
///
/// Expressions are entity-decoded before evaluation; values are inserted
/// verbatim, so a value may contribute tags.
pub fn interpolate_markup(markup: &str, scope: &mut dyn Scope) -> String {
    replace_placeholders(markup, scope, true)
}

const SLOT_PREFIX: &str = "lonewolf-slot:";

/// Interpolate the content of `root` as markup and re-parse it.
///
/// `boundaries` (nested components) are lifted out beforehand and put back
/// afterwards, untouched and with their identity kept. The replaced content
/// is released from the document. Returns whether the content held any
/// placeholder.
pub fn interpolate_component(
    doc: &mut Document,
    parser: &HtmlParser,
    root: NodeId,
    boundaries: &[NodeId],
    scope: &mut dyn Scope,
) -> Result<bool> {
    for (i, boundary) in boundaries.iter().enumerate() {
        let slot = doc.create_comment(format!("{SLOT_PREFIX}{i}"));
        if doc.insert_before(*boundary, slot) {
            doc.detach(*boundary);
        }
    }

    let markup = inner_html(doc, root);
    let result = if has_placeholder(&markup) {
        let interpolated = interpolate_markup(&markup, scope);
        parser.parse_fragment(doc, &interpolated).map(|nodes| {
            for old in doc.children(root).to_vec() {
                doc.remove(old);
            }
            for node in nodes {
                doc.append_child(root, node);
            }
            true
        })
    } else {
        Ok(false)
    };

    let placed: Vec<(NodeId, usize)> = doc
        .descendants(root)
        .into_iter()
        .filter_map(|id| match doc.node_type(id) {
            Some(NodeType::Comment(text)) => text
                .strip_prefix(SLOT_PREFIX)
                .and_then(|i| i.parse().ok())
                .map(|i| (id, i)),
            _ => None,
        })
        .collect();
    for (comment, i) in placed {
        if let Some(boundary) = boundaries.get(i) {
            doc.replace_with(comment, &[*boundary]);
        }
        doc.remove(comment);
    }
    if boundaries.iter().any(|b| doc.parent(*b).is_none()) {
        log::warn!(target: "lonewolf::component", "a nested component was lost during interpolation");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::script::ScriptContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope(vars: Value) -> ScriptContext {
        ScriptContext::detached(vars.as_object().cloned().unwrap_or_default()).unwrap()
    }

    #[test]
    fn test_simple_and_fallback_forms() {
        let mut s = scope(json!({"x": 1, "name": "Ada"}));
        assert_eq!(interpolate("<{{ x }}>", &mut s), "<1>");
        assert_eq!(interpolate("{{ a || 'fallback' }}", &mut s), "fallback");
        assert_eq!(interpolate("{{name||'anon'}}", &mut s), "Ada");
        assert_eq!(interpolate("hi {{ name }}, {{ x + 1 }}", &mut s), "hi Ada, 2");
    }

    #[test]
    fn test_ternary_form() {
        let mut s = scope(json!({"on": true, "n": 0}));
        assert_eq!(interpolate("{{ on ? 'yes' : 'no' }}", &mut s), "yes");
        assert_eq!(interpolate("{{ n ? 'yes' : 'no' }}", &mut s), "no");
        assert_eq!(interpolate("{{ missing ? 'yes' : 'no' }}", &mut s), "no");
        assert_eq!(interpolate("{{ n ?? 'none' }}", &mut s), "0");
        assert_eq!(interpolate("{{ on ? n ? 'a' : 'b' : 'c' }}", &mut s), "b");
    }

    #[test]
    fn test_for_data_in() {
        let mut s = scope(json!({"users": [{"name": "a", "age": 1}, {"name": "b"}]}));
        assert_eq!(
            interpolate("{{ forDataIn(users, '<li>value.name value.age</li>') }}", &mut s),
            "<li>a 1</li><li>b </li>"
        );
        assert_eq!(interpolate("{{ forDataIn(users.length, 'x') }}", &mut s), "");
        assert_eq!(interpolate("{{ forDataIn(users) }}", &mut s), "");
    }

    #[test]
    fn test_errors_render_empty() {
        let mut s = scope(json!({"user": null}));
        assert_eq!(interpolate("[{{ user.name }}]", &mut s), "[]");
        assert_eq!(interpolate("[{{ 1 + }}]", &mut s), "[]");
        assert_eq!(interpolate("[{{ nothing }}]", &mut s), "[]");
    }

    #[test]
    fn test_split_helpers_respect_quotes() {
        assert_eq!(split_or("a || 'b||c'"), Some(("a ", " 'b||c'")));
        assert_eq!(split_or("f('a||b')"), None);
        assert_eq!(split_ternary("'?' + x"), None);
        assert_eq!(split_args("1, 'a,b', [2, 3]"), vec!["1", " 'a,b'", " [2, 3]"]);
        assert!(split_args("  ").is_empty());
    }

    #[test]
    fn test_method_call_form() {
        let mut s = scope(json!({}));
        // Plain data has no methods, so the call form fails and renders nothing
        assert_eq!(interpolate("[{{ shout('a') }}]", &mut s), "[]");
        // Two calls joined by an operator go to the evaluator instead
        assert_eq!(interpolate("{{ String(1) + String(2) }}", &mut s), "12");
    }

    #[test]
    fn test_markup_expressions_are_decoded() {
        let mut s = scope(json!({"n": 2}));
        assert_eq!(interpolate_markup("<b>{{ n &lt; 3 ? &quot;low&quot; : 'high' }}</b>", &mut s), "<b>low</b>");
    }

    #[test]
    fn test_interpolate_component_keeps_nested_components() {
        let parser = HtmlParser::new();
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let nodes = parser
            .parse_fragment(
                &mut doc,
                r#"<ul title="{{ title }}">{{ forDataIn(items, '<li>value.v</li>') }}</ul><section stand-alone="">{{ inner }}</section>"#,
            )
            .unwrap();
        for node in &nodes {
            doc.append_child(root, *node);
        }
        let nested = nodes[1];
        let mut s = scope(json!({"title": "T", "items": [{"v": 1}, {"v": 2}]}));
        let changed = interpolate_component(&mut doc, &parser, root, &[nested], &mut s).unwrap();
        assert!(changed);
        assert_eq!(
            inner_html(&doc, root),
            r#"<ul title="T"><li>1</li><li>2</li></ul><section stand-alone="">{{ inner }}</section>"#
        );
        assert_eq!(doc.parent(nested), Some(root));
    }

    #[test]
    fn test_interpolate_component_without_placeholders() {
        let parser = HtmlParser::new();
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let p = doc.create_element("p");
        doc.append_child(root, p);
        let changed = interpolate_component(&mut doc, &parser, root, &[], &mut scope(json!({}))).unwrap();
        assert!(!changed);
        assert_eq!(doc.children(root), &[p]);
    }

    #[test]
    fn test_replaced_content_is_released() {
        let parser = HtmlParser::new();
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let nested = doc.create_element("section");
        doc.set_attribute(nested, "stand-alone", "");
        for node in parser.parse_fragment(&mut doc, "<p>{{ n }}</p><ul><li>a</li></ul>").unwrap() {
            doc.append_child(root, node);
        }
        doc.append_child(root, nested);
        let before = doc.len();

        let mut s = scope(json!({"n": 1}));
        for _ in 0..3 {
            interpolate_component(&mut doc, &parser, root, &[nested], &mut s).unwrap();
        }
        assert_eq!(inner_html(&doc, root), r#"<p>1</p><ul><li>a</li></ul><section stand-alone=""></section>"#);
        assert_eq!(doc.len(), before);
        assert_eq!(doc.parent(nested), Some(root));
    }
}
