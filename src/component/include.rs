//! `<getComponent src="...">` includes
//!
//! Includes are resolved breadth-first: every include reachable from the
//! current frontier is fetched concurrently, its markup spliced in place of
//! the tag, and the spliced nodes form the next frontier so nested includes
//! resolve as well. A failed fetch leaves a comment in place of the tag.
//!
//! Each spliced node remembers the chain of sources it came from. An include
//! whose source already appears on that chain, or that sits deeper than
//! [`MAX_INCLUDE_DEPTH`], is replaced by a comment instead of being fetched.

use crate::dom::{Document, HtmlParser, NodeId, SharedDocument};
use crate::network::{Fetcher, Request, fetch_all};
use crate::utils::lock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Tag name of an include, as the HTML parser reports it
pub const INCLUDE_TAG: &str = "getcomponent";

/// Nesting depth at which includes stop being expanded
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Sources an include was reached through, outermost first
type Chain = Arc<[String]>;

/// Includes reachable from `frontier` without descending into other includes
fn collect_includes(doc: &Document, frontier: &[(NodeId, Chain)]) -> Vec<(NodeId, String, Chain)> {
    let mut found = Vec::new();
    let mut queue: VecDeque<(NodeId, &Chain)> = frontier.iter().map(|(node, chain)| (*node, chain)).collect();
    while let Some((current, chain)) = queue.pop_front() {
        if doc.tag_name(current) == Some(INCLUDE_TAG) {
            let src = doc.get_attribute(current, "src").unwrap_or_default().to_string();
            found.push((current, src, Arc::clone(chain)));
        } else {
            queue.extend(doc.children(current).iter().map(|child| (*child, chain)));
        }
    }
    found
}

fn fail(doc: &mut Document, tag: NodeId, src: &str) {
    let comment = doc.create_comment(format!("failed to get component at src \"{src}\""));
    doc.replace_with(tag, &[comment]);
}

fn extend(chain: &Chain, src: &str) -> Chain {
    chain.iter().cloned().chain(std::iter::once(src.to_string())).collect()
}

/// Resolve every include under `root`. Returns the number of includes replaced
/// by fetched content.
pub async fn resolve_includes(
    doc: &SharedDocument,
    parser: &HtmlParser,
    fetcher: &dyn Fetcher,
    root: NodeId,
) -> usize {
    let mut replaced = 0;
    let mut frontier: Vec<(NodeId, Chain)> = vec![(root, Arc::from(Vec::new()))];
    loop {
        let includes = collect_includes(&lock(doc), &frontier);
        if includes.is_empty() {
            return replaced;
        }

        let mut pending = Vec::new();
        let mut requests = Vec::new();
        for (tag, src, chain) in includes {
            if chain.iter().any(|seen| *seen == src) || chain.len() >= MAX_INCLUDE_DEPTH {
                log::error!(
                    target: "lonewolf::component",
                    "recursive <getComponent> at src {src:?} (through {})",
                    chain.join(" -> ")
                );
                fail(&mut lock(doc), tag, &src);
                continue;
            }
            log::debug!(target: "lonewolf::component", "<getComponent> found, fetching {src:?}");
            match Request::get(src.clone()) {
                Ok(request) => {
                    requests.push(request);
                    pending.push((tag, src, chain));
                }
                Err(e) => {
                    log::error!(target: "lonewolf::component", "bad include source {src:?}: {e}");
                    fail(&mut lock(doc), tag, &src);
                }
            }
        }

        let bodies = fetch_all(fetcher, &requests).await;

        let mut doc = lock(doc);
        frontier.clear();
        for ((tag, src, chain), body) in pending.into_iter().zip(bodies) {
            match body.and_then(|html| parser.parse_fragment(&mut doc, &html)) {
                Ok(nodes) => {
                    doc.replace_with(tag, &nodes);
                    let chain = extend(&chain, &src);
                    frontier.extend(nodes.into_iter().map(|node| (node, Arc::clone(&chain))));
                    replaced += 1;
                }
                Err(e) => {
                    log::error!(target: "lonewolf::component", "failed to load component {src:?}: {e}");
                    fail(&mut doc, tag, &src);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::inner_html;
    use crate::network::StaticFetcher;
    use pretty_assertions::assert_eq;

    fn page(markup: &str) -> (SharedDocument, NodeId) {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        for node in HtmlParser::new().parse_fragment(&mut doc, markup).unwrap() {
            doc.append_child(root, node);
        }
        (doc.into_shared(), root)
    }

    #[tokio::test]
    async fn test_nested_includes_resolve() {
        let fetcher = StaticFetcher::new()
            .with("/card.html", r#"<p>card</p><getComponent src="/badge.html"></getComponent>"#)
            .with("/badge.html", "<b>badge</b>");
        let (doc, root) = page(r#"<section><getComponent src="/card.html"></getComponent></section>"#);

        let replaced = resolve_includes(&doc, &HtmlParser::new(), &fetcher, root).await;
        assert_eq!(replaced, 2);
        assert_eq!(
            inner_html(&lock(&doc), root),
            "<section><p>card</p><b>badge</b></section>"
        );
    }

    #[tokio::test]
    async fn test_failed_include_leaves_comment() {
        let fetcher = StaticFetcher::new();
        let (doc, root) = page(r#"<getComponent src="/missing.html"></getComponent><getComponent></getComponent>"#);

        let replaced = resolve_includes(&doc, &HtmlParser::new(), &fetcher, root).await;
        assert_eq!(replaced, 0);
        assert_eq!(
            inner_html(&lock(&doc), root),
            r#"<!--failed to get component at src "/missing.html"--><!--failed to get component at src ""-->"#
        );
        assert_eq!(fetcher.hits("/missing.html"), 1);
    }

    #[tokio::test]
    async fn test_siblings_fetch_in_one_round() {
        let fetcher = StaticFetcher::new().with("/a.html", "A").with("/b.html", "B");
        let (doc, root) = page(r#"<getComponent src="/a.html"></getComponent>-<getComponent src="/b.html"></getComponent>"#);
        assert_eq!(resolve_includes(&doc, &HtmlParser::new(), &fetcher, root).await, 2);
        assert_eq!(inner_html(&lock(&doc), root), "A-B");
    }

    #[tokio::test]
    async fn test_self_include_stops_with_comment() {
        let fetcher = StaticFetcher::new()
            .with("/loop.html", r#"<i>loop</i><getComponent src="/loop.html"></getComponent>"#);
        let (doc, root) = page(r#"<getComponent src="/loop.html"></getComponent>"#);

        let replaced = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            resolve_includes(&doc, &HtmlParser::new(), &fetcher, root),
        )
        .await
        .unwrap();
        assert_eq!(replaced, 1);
        assert_eq!(
            inner_html(&lock(&doc), root),
            r#"<i>loop</i><!--failed to get component at src "/loop.html"-->"#
        );
        assert_eq!(fetcher.hits("/loop.html"), 1);
    }

    #[tokio::test]
    async fn test_include_cycle_and_depth_limit() {
        let fetcher = StaticFetcher::new()
            .with("/a.html", r#"a<getComponent src="/b.html"></getComponent>"#)
            .with("/b.html", r#"b<getComponent src="/a.html"></getComponent>"#);
        let (doc, root) = page(r#"<getComponent src="/a.html"></getComponent>"#);
        assert_eq!(resolve_includes(&doc, &HtmlParser::new(), &fetcher, root).await, 2);
        assert_eq!(
            inner_html(&lock(&doc), root),
            r#"ab<!--failed to get component at src "/a.html"-->"#
        );

        // Distinct sources all the way down still stop at the depth limit
        let fetcher = StaticFetcher::new();
        for level in 0..=MAX_INCLUDE_DEPTH {
            fetcher.insert(
                format!("/level{level}.html"),
                format!(r#"<getComponent src="/level{}.html"></getComponent>"#, level + 1),
            );
        }
        let (doc, root) = page(r#"<getComponent src="/level0.html"></getComponent>"#);
        let replaced = resolve_includes(&doc, &HtmlParser::new(), &fetcher, root).await;
        assert_eq!(replaced, MAX_INCLUDE_DEPTH);
        assert_eq!(fetcher.hits(&format!("/level{MAX_INCLUDE_DEPTH}.html")), 0);
    }
}
