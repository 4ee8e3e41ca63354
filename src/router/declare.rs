//! Route declarations: flattening nested definitions and the enhanced
//! `key -> declaration` syntax.

use super::route::{Route, RouteDef};
use crate::utils::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Join a parent key and a child key with exactly one `/`
pub fn join_keys(parent: &str, child: &str) -> String {
    format!(
        "{}/{}",
        parent.strip_suffix('/').unwrap_or(parent),
        child.strip_prefix('/').unwrap_or(child)
    )
}

/// Flatten definitions depth-first, parents before their children.
///
/// A child's key is appended to its parent's, a child without a path reuses
/// the parent's, and the child's props are layered over the parent's.
/// Definitions without a key or path are skipped with a warning.
pub fn flatten_routes(defs: &[RouteDef]) -> Vec<Route> {
    let mut out = Vec::new();
    for def in defs {
        flatten_into(def, def.key.clone(), def.path.clone(), def.props.clone(), &mut out);
    }
    out
}

fn flatten_into(
    def: &RouteDef,
    key: String,
    path: Option<String>,
    props: Map<String, Value>,
    out: &mut Vec<Route>,
) {
    match (&path, key.is_empty()) {
        (Some(p), false) if !p.is_empty() => {
            out.push(Route::from_def(key.clone(), p.clone(), def, props.clone()));
        }
        _ => log::warn!(target: "lonewolf::router", "Invalid route: {def:?}"),
    }

    for child in &def.children {
        if child.key.is_empty() {
            log::warn!(
                target: "lonewolf::router",
                "Invalid children of {key:?}: {child:?}, skipped in execution"
            );
            continue;
        }
        let child_path = child.path.clone().filter(|p| !p.is_empty()).or_else(|| path.clone());
        let mut child_props = props.clone();
        for (name, value) in &child.props {
            child_props.insert(name.clone(), value.clone());
        }
        flatten_into(child, join_keys(&key, &child.key), child_path, child_props, out);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeclarationOption {
    method: Option<String>,
    #[serde(alias = "header")]
    headers: BTreeMap<String, String>,
    props: Map<String, Value>,
    body: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Declaration {
    title: Option<String>,
    content: Option<String>,
    path: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    props: Map<String, Value>,
    option: DeclarationOption,
    children: Map<String, Value>,
}

/// Turn the enhanced declaration map into route definitions, keeping order.
///
/// ```text
/// { "/home": { "title": "Home", "content": "/home.html",
///              "option": { "method": "get", "props": {...} },
///              "children": { "/:id": { "type": "number" } } } }
/// ```
///
/// `type` is appended to the key as ` type:<kind>`, `content` becomes the
/// path and `option` is merged into the definition.
pub fn transform_declarations(declarations: &Map<String, Value>) -> Result<Vec<RouteDef>> {
    declarations
        .iter()
        .map(|(key, value)| {
            let declaration = Declaration::deserialize(value)?;
            let key = match &declaration.kind {
                Some(kind) => format!("{key} type:{kind}"),
                None => key.clone(),
            };
            let mut props = declaration.props;
            for (name, value) in declaration.option.props {
                props.insert(name, value);
            }
            Ok(RouteDef {
                key,
                path: declaration.content.or(declaration.path),
                title: declaration.title,
                props,
                headers: declaration.option.headers,
                method: declaration.option.method,
                body: declaration.option.body,
                children: transform_declarations(&declaration.children)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_keys() {
        assert_eq!(join_keys("/home/", "/u"), "/home/u");
        assert_eq!(join_keys("/home", "u"), "/home/u");
    }

    #[test]
    fn test_children_inherit_key_path_and_props() {
        let defs = vec![
            RouteDef::new("/home", "/home.html")
                .prop("theme", json!("dark"))
                .prop("size", json!(1))
                .child(RouteDef {
                    key: "/:id type:number".into(),
                    props: [("size".to_string(), json!(2))].into_iter().collect(),
                    ..Default::default()
                })
                .child(RouteDef::new("about", "/about.html")),
        ];
        let routes = flatten_routes(&defs);
        let keys: Vec<_> = routes.iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["/home", "/home/:id type:number", "/home/about"]);

        let child = &routes[1];
        assert_eq!(child.path(), "/home.html");
        assert_eq!(child.props()["theme"], json!("dark"));
        assert_eq!(child.props()["size"], json!(2));
        assert!(child.matches("/home/12"));
        assert_eq!(routes[2].path(), "/about.html");
    }

    #[test]
    fn test_invalid_definitions_are_skipped() {
        let defs = vec![
            RouteDef {
                key: "/nopath".into(),
                ..Default::default()
            },
            RouteDef::new("/ok", "/ok.html").child(RouteDef::default()),
        ];
        let routes = flatten_routes(&defs);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].key(), "/ok");
    }

    #[test]
    fn test_enhanced_declarations() {
        let declarations = json!({
            "/home": {
                "title": "Home",
                "content": "/doc/home.html",
                "option": {
                    "method": "post",
                    "header": { "token": "Bearer x" },
                    "props": { "state": {} }
                },
                "children": {
                    "/u": { "title": "U", "content": "/doc/u.html" },
                    "/:articleId": { "type": "number", "title": "Article" }
                }
            },
            "/404": { "content": "/doc/404.html" }
        });
        let defs = transform_declarations(declarations.as_object().unwrap()).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].key, "/home");
        assert_eq!(defs[0].method.as_deref(), Some("post"));
        assert_eq!(defs[0].headers["token"], "Bearer x");
        assert_eq!(defs[0].children[1].key, "/:articleId type:number");
        assert_eq!(defs[1].key, "/404");

        let routes = flatten_routes(&defs);
        let article = routes
            .iter()
            .find(|r| r.key() == "/home/:articleId type:number")
            .unwrap();
        assert_eq!(article.path(), "/doc/home.html");
        assert_eq!(article.title(), Some("Article"));
        assert_eq!(article.method(), crate::network::Method::Get);
        assert_eq!(routes[0].method(), crate::network::Method::Post);
    }
}
