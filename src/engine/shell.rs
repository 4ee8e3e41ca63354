//! Application shell
//!
//! Owns the mount point and swaps rendered route views into it.

use crate::component::ComponentTree;
use crate::dom::{Event, EventDispatcher, NodeId, VIEW_CHANGED, query_selector};
use crate::router::lifecycle::{HookScope, ON_AFTER_RENDERING, ON_BEFORE_RENDERING};
use crate::router::{HookContext, LifecycleBus, NavState, Route, StageReport};
use crate::utils::{RenderError, Result, lock, read, write};
use serde_json::json;
use std::sync::{Arc, RwLock};

/// What a render request led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The view of `route` now fills the mount
    Rendered { route: String, view: NodeId },
    /// A newer navigation started before this render could be applied
    Superseded,
    /// A handler requested a halt
    Halted,
    /// `onBeforeRendering` stopped the render
    Blocked,
    /// No mount point was resolved
    NoMount,
}

impl RenderOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }
}

/// Navigation a render belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Unguarded,
    Target(u64),
    Loading(u64),
}

impl Guard {
    /// Whether the render must be dropped. With `commit`, a target render
    /// records that its generation is mounted.
    fn is_stale(self, nav: &mut NavState, commit: bool) -> bool {
        match self {
            Guard::Unguarded => false,
            Guard::Target(g) if nav.generation != g => true,
            Guard::Target(g) => {
                if commit {
                    nav.committed = g;
                }
                false
            }
            Guard::Loading(g) => nav.generation != g || nav.committed == g,
        }
    }
}

pub struct AppShell {
    scope: HookScope,
    bus: LifecycleBus,
    tree: Arc<ComponentTree>,
    dispatcher: EventDispatcher,
    mount: RwLock<Option<NodeId>>,
    default_title: Option<String>,
}

impl AppShell {
    pub(crate) fn new(
        scope: HookScope,
        bus: LifecycleBus,
        tree: Arc<ComponentTree>,
        dispatcher: EventDispatcher,
        default_title: Option<String>,
    ) -> Self {
        Self {
            scope,
            bus,
            tree,
            dispatcher,
            mount: RwLock::new(None),
            default_title,
        }
    }

    /// Resolve and store the mount point. An unresolved selector is logged
    /// and leaves the shell without a mount.
    pub fn set_mount(&self, selector: &str) -> Option<NodeId> {
        let found = {
            let doc = lock(&self.scope.document);
            query_selector(&doc, doc.root(), selector)
        };
        match found {
            Ok(Some(node)) => {
                self.set_mount_node(node);
                Some(node)
            }
            Ok(None) => {
                log::error!(target: "lonewolf::shell", "no mount point matches {selector:?}");
                None
            }
            Err(e) => {
                log::error!(target: "lonewolf::shell", "cannot resolve mount point {selector:?}: {e}");
                None
            }
        }
    }

    /// Use `node` as the mount point
    pub fn set_mount_node(&self, node: NodeId) {
        *write(&self.mount) = Some(node);
    }

    pub fn mount(&self) -> Option<NodeId> {
        *read(&self.mount)
    }

    pub fn tree(&self) -> &Arc<ComponentTree> {
        &self.tree
    }

    pub fn default_title(&self) -> Option<&str> {
        self.default_title.as_deref()
    }

    /// Render `route` into the mount regardless of navigation state
    pub async fn render(&self, route: Arc<Route>) -> Result<RenderOutcome> {
        self.render_inner(route, Guard::Unguarded).await
    }

    /// Render `route` unless navigation moved past `generation`
    pub async fn render_guarded(&self, route: Arc<Route>, generation: u64) -> Result<RenderOutcome> {
        self.render_inner(route, Guard::Target(generation)).await
    }

    /// Render the loading view of `generation`. It is dropped once the
    /// target view of the same navigation has been mounted.
    pub async fn render_loading(&self, route: Arc<Route>, generation: u64) -> Result<RenderOutcome> {
        self.render_inner(route, Guard::Loading(generation)).await
    }

    async fn stage(&self, stage: &str, route: &Arc<Route>) -> Result<StageReport> {
        let ctx = HookContext::new(stage, self.scope.clone(), Some(Arc::clone(route)));
        self.bus.execute(stage, ctx).await
    }

    async fn render_inner(&self, route: Arc<Route>, guard: Guard) -> Result<RenderOutcome> {
        let Some(mount) = self.mount() else {
            log::error!(target: "lonewolf::shell", "cannot render {}: no mount point", route.key());
            return Ok(RenderOutcome::NoMount);
        };
        if guard.is_stale(&mut lock(&self.scope.nav), false) {
            return Ok(RenderOutcome::Superseded);
        }

        match self.stage(ON_BEFORE_RENDERING, &route).await {
            Ok(StageReport::Blocked { handler }) => {
                log::info!(target: "lonewolf::shell", "rendering of {} blocked by {handler}", route.key());
                return Ok(RenderOutcome::Blocked);
            }
            Err(e) if e.is_halt() => return Ok(RenderOutcome::Halted),
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        let view = match self.tree.render_route(&route).await {
            Ok(view) => view,
            Err(e) if e.is_halt() => return Ok(RenderOutcome::Halted),
            Err(e) => {
                log::error!(target: "lonewolf::shell", "rendering {} failed: {e}", route.key());
                return Err(RenderError::RouteRender {
                    key: route.key().to_string(),
                }
                .into());
            }
        };

        {
            // Checked and committed under the document lock so a loading view
            // can never land on top of the target view it precedes.
            let mut doc = lock(&self.scope.document);
            if guard.is_stale(&mut lock(&self.scope.nav), true) {
                log::debug!(target: "lonewolf::shell", "render of {} superseded", route.key());
                return Ok(RenderOutcome::Superseded);
            }
            doc.clear_children(mount);
            doc.append_child(mount, view);
            if let Some(title) = route.title().or(self.default_title.as_deref()) {
                doc.title = title.to_string();
            }
        }
        log::info!(target: "lonewolf::shell", "view {} mounted", route.key());

        let location = lock(&self.scope.nav).location.clone();
        let event = Event::custom(VIEW_CHANGED, json!({ "route": route.key(), "location": location }))
            .with_target(mount);
        self.dispatcher.dispatch(&self.scope.document, &event);

        match self.stage(ON_AFTER_RENDERING, &route).await {
            Err(e) if e.is_halt() => log::debug!(target: "lonewolf::shell", "onAfterRendering halted"),
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        Ok(RenderOutcome::Rendered {
            route: route.key().to_string(),
            view,
        })
    }
}

impl std::fmt::Debug for AppShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppShell")
            .field("mount", &self.mount())
            .field("default_title", &self.default_title)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Keywords;
    use crate::dom::{Document, HtmlParser, inner_html};
    use crate::network::StaticFetcher;
    use crate::router::lifecycle::{ROUTER_STAGES, SHELL_STAGES};
    use crate::router::{Flow, RouteTable, hook};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn shell(fetcher: StaticFetcher) -> AppShell {
        let mut doc = Document::new();
        HtmlParser::new()
            .parse_into(&mut doc, r#"<html><body><main id="app"></main></body></html>"#)
            .unwrap();
        let document = doc.into_shared();
        let scope = HookScope {
            nav: Arc::new(Mutex::new(NavState::default())),
            routes: Arc::new(RwLock::new(RouteTable::new())),
            document: Arc::clone(&document),
        };
        let bus = LifecycleBus::with_stages(ROUTER_STAGES).unwrap();
        for stage in SHELL_STAGES {
            bus.extend(stage).unwrap();
        }
        let dispatcher = EventDispatcher::new();
        let tree = Arc::new(ComponentTree::new(
            document,
            dispatcher.clone(),
            Arc::new(fetcher),
            Keywords::default(),
            Duration::ZERO,
        ));
        AppShell::new(scope, bus, tree, dispatcher, Some("Lonewolf".into()))
    }

    fn mounted(shell: &AppShell) -> String {
        let doc = lock(&shell.scope.document);
        inner_html(&doc, shell.mount().unwrap())
    }

    #[tokio::test]
    async fn test_render_swaps_view_and_title() {
        let shell = shell(StaticFetcher::new().with("/a.html", "<p>a</p>").with("/b.html", "<p>b</p>"));
        assert!(shell.set_mount("#app").is_some());

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        shell.dispatcher.add_listener(
            VIEW_CHANGED,
            Arc::new(move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let a = Arc::new(Route::new("/a", "/a.html").with_title("Page A"));
        let outcome = shell.render(Arc::clone(&a)).await.unwrap();
        assert!(outcome.is_rendered());
        assert_eq!(mounted(&shell), r#"<div stand-alone="" view-container="/a"><p>a</p></div>"#);
        assert_eq!(lock(&shell.scope.document).title, "Page A");

        shell.render(Arc::new(Route::new("/b", "/b.html"))).await.unwrap();
        assert_eq!(mounted(&shell), r#"<div stand-alone="" view-container="/b"><p>b</p></div>"#);
        assert_eq!(lock(&shell.scope.document).title, "Lonewolf");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_mount_is_a_no_op() {
        let shell = shell(StaticFetcher::new().with("/a.html", "<p>a</p>"));
        assert!(shell.set_mount("#nowhere").is_none());
        let outcome = shell.render(Arc::new(Route::new("/a", "/a.html"))).await.unwrap();
        assert_eq!(outcome, RenderOutcome::NoMount);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_a_route_render_error() {
        let shell = shell(StaticFetcher::new());
        shell.set_mount("#app");
        let err = shell.render(Arc::new(Route::new("/a", "/a.html"))).await.unwrap_err();
        assert!(!err.is_halt());
        assert!(err.to_string().contains("\"/a\""));
        assert_eq!(mounted(&shell), "");
    }

    #[tokio::test]
    async fn test_before_rendering_can_block_or_halt() {
        let shell = shell(StaticFetcher::new().with("/a.html", "<p>a</p>"));
        shell.set_mount("#app");
        let route = Arc::new(Route::new("/a", "/a.html"));

        shell
            .bus
            .register(ON_BEFORE_RENDERING, "guard", hook(|_ctx| async { Ok(Flow::Stop) }));
        assert_eq!(shell.render(Arc::clone(&route)).await.unwrap(), RenderOutcome::Blocked);

        shell
            .bus
            .register(ON_BEFORE_RENDERING, "guard", hook(|ctx| async move { Err(ctx.halt()) }));
        assert_eq!(shell.render(Arc::clone(&route)).await.unwrap(), RenderOutcome::Halted);
        assert_eq!(mounted(&shell), "");
    }

    #[tokio::test]
    async fn test_stale_generation_is_superseded() {
        let shell = shell(StaticFetcher::new().with("/a.html", "<p>a</p>"));
        shell.set_mount("#app");
        lock(&shell.scope.nav).generation = 3;
        let route = Arc::new(Route::new("/a", "/a.html"));
        assert_eq!(
            shell.render_guarded(Arc::clone(&route), 2).await.unwrap(),
            RenderOutcome::Superseded
        );
        assert!(shell.render_guarded(route, 3).await.unwrap().is_rendered());
    }

    #[tokio::test]
    async fn test_loading_view_never_replaces_mounted_target() {
        let shell = shell(
            StaticFetcher::new()
                .with("/page.html", "<p>page</p>")
                .with("/loading.html", "<p>loading</p>"),
        );
        shell.set_mount("#app");
        lock(&shell.scope.nav).generation = 1;

        let page = Arc::new(Route::new("/page", "/page.html"));
        assert!(shell.render_guarded(page, 1).await.unwrap().is_rendered());
        assert_eq!(lock(&shell.scope.nav).committed, 1);

        let loading = Arc::new(Route::new("/loading", "/loading.html"));
        assert_eq!(
            shell.render_loading(Arc::clone(&loading), 1).await.unwrap(),
            RenderOutcome::Superseded
        );
        assert_eq!(mounted(&shell), r#"<div stand-alone="" view-container="/page"><p>page</p></div>"#);

        lock(&shell.scope.nav).generation = 2;
        assert!(shell.render_loading(loading, 2).await.unwrap().is_rendered());
    }
}
