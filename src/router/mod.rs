//! Client-side router
//!
//! Resolves a location against the route table, runs the lifecycle stages
//! and middlewares, then schedules a deferred render on the app shell.

pub mod declare;
pub mod lifecycle;
pub mod pattern;
pub mod route;
pub mod table;

pub use declare::{flatten_routes, join_keys, transform_declarations};
pub use lifecycle::{Flow, Hook, HookContext, LifecycleBus, StageReport, hook};
pub use pattern::{CompiledPattern, ParamKind, Params};
pub use route::{Route, RouteDef};
pub use table::RouteTable;

use crate::config::PagesRef;
use crate::dom::{Event, EventDispatcher};
use crate::engine::shell::{AppShell, RenderOutcome};
use crate::utils::{ConfigError, LoneWolfError, Result, lock, read};
use futures::future::BoxFuture;
use lifecycle::{HookScope, ON_CURRENT_ROUTE_FOUND, ON_ERROR, ON_LOADING, ON_URL_CHANGE};
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

static FILE_LIKE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\w+\.\w+").ok());

/// Attribute marking links the router handles itself
pub const APP_LINK: &str = "app-link";

/// Router state read live by lifecycle handlers
#[derive(Debug, Clone, Default)]
pub struct NavState {
    pub location: String,
    pub current: Option<Arc<Route>>,
    pub loading: Option<Arc<Route>>,
    pub error: Option<Arc<Route>>,
    /// Bumped on every navigation; deferred renders compare against it
    pub generation: u64,
    /// Latest generation whose target view is mounted
    pub committed: u64,
}

/// Result of a middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Blocked(String),
}

impl From<bool> for Verdict {
    fn from(proceed: bool) -> Self {
        if proceed {
            Verdict::Proceed
        } else {
            Verdict::Blocked("middleware returned false".to_string())
        }
    }
}

/// Navigation guard run before `onCurrentRouteFound`
pub type Middleware = Arc<dyn Fn(Option<Arc<Route>>) -> BoxFuture<'static, Verdict> + Send + Sync>;

/// Wrap an async closure as a [`Middleware`]
pub fn middleware<F, Fut>(f: F) -> Middleware
where
    F: Fn(Option<Arc<Route>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Verdict> + Send + 'static,
{
    Arc::new(move |route| -> BoxFuture<'static, Verdict> { Box::pin(f(route)) })
}

/// Location source and sink
pub trait History: Send + Sync {
    /// Current location
    fn current(&self) -> String;
    /// Record a new location without triggering navigation
    fn push(&self, location: &str);
}

/// History kept in memory
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<String>>,
}

impl MemoryHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(vec![initial.into()]),
        }
    }

    /// Every location visited, oldest first
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

impl History for MemoryHistory {
    fn current(&self) -> String {
        lock(&self.entries).last().cloned().unwrap_or_default()
    }

    fn push(&self, location: &str) {
        lock(&self.entries).push(location.to_string());
    }
}

/// Renders started by a navigation
#[derive(Debug)]
pub struct ScheduledRender {
    pub generation: u64,
    pub loading: Option<JoinHandle<Result<RenderOutcome>>>,
    pub main: JoinHandle<Result<RenderOutcome>>,
}

fn joined(result: std::result::Result<Result<RenderOutcome>, tokio::task::JoinError>) -> Result<RenderOutcome> {
    result.map_err(|e| LoneWolfError::Other(format!("render task failed: {e}")))?
}

impl ScheduledRender {
    /// Wait for the loading render (if any) and then the main render
    pub async fn wait(self) -> Result<RenderOutcome> {
        if let Some(loading) = self.loading {
            if let Err(e) = joined(loading.await) {
                log::warn!(target: "lonewolf::router", "loading view failed: {e}");
            }
        }
        joined(self.main.await)
    }
}

/// What a call to [`Router::navigate`] led to
#[derive(Debug)]
pub enum NavigationOutcome {
    /// A render was scheduled
    Scheduled(ScheduledRender),
    /// A stage handler or middleware stopped the navigation
    Blocked { by: String },
    /// A handler requested a halt
    Halted,
    /// Neither the location nor an error route resolved
    NotFound,
}

impl NavigationOutcome {
    /// Wait for the scheduled render; other outcomes resolve immediately
    pub async fn settle(self) -> Result<Option<RenderOutcome>> {
        match self {
            NavigationOutcome::Scheduled(render) => render.wait().await.map(Some),
            _ => Ok(None),
        }
    }
}

/// Location-driven navigation over a route table
pub struct Router {
    scope: HookScope,
    bus: LifecycleBus,
    shell: Arc<AppShell>,
    middlewares: RwLock<Vec<Middleware>>,
    history: Arc<dyn History>,
    pages: PagesRef,
    load_delay: Duration,
}

/// Lifecycle outcome folded into navigation control flow
enum Step {
    Go,
    Stop(NavigationOutcome),
}

impl Router {
    pub(crate) fn new(
        scope: HookScope,
        bus: LifecycleBus,
        shell: Arc<AppShell>,
        history: Arc<dyn History>,
        pages: PagesRef,
        load_delay: Duration,
    ) -> Self {
        Self {
            scope,
            bus,
            shell,
            middlewares: RwLock::new(Vec::new()),
            history,
            pages,
            load_delay,
        }
    }

    /// Append a middleware
    pub fn use_middleware(&self, middleware: Middleware) {
        crate::utils::write(&self.middlewares).push(middleware);
    }

    /// The history collaborator
    pub fn history(&self) -> Arc<dyn History> {
        Arc::clone(&self.history)
    }

    /// Snapshot of the navigation state
    pub fn state(&self) -> NavState {
        lock(&self.scope.nav).clone()
    }

    fn context(&self, stage: &str) -> HookContext {
        HookContext::new(stage, self.scope.clone(), None)
    }

    async fn run_stage(&self, stage: &str) -> Result<Step> {
        match self.bus.execute(stage, self.context(stage)).await {
            Ok(StageReport::Blocked { handler }) => Ok(Step::Stop(NavigationOutcome::Blocked {
                by: format!("{stage}:{handler}"),
            })),
            Ok(_) => Ok(Step::Go),
            Err(e) if e.is_halt() => Ok(Step::Stop(NavigationOutcome::Halted)),
            Err(e) => Err(e),
        }
    }

    /// Map file-like or empty locations to the root page
    fn normalize(&self, location: &str) -> Result<String> {
        let trimmed = location.trim();
        if !trimmed.is_empty() && !is_file_like(trimmed) {
            return Ok(trimmed.to_string());
        }
        let root = self.pages.root.trim();
        if root.is_empty() || is_file_like(root) {
            return Err(ConfigError::InvalidRoot(self.pages.root.clone()).into());
        }
        log::debug!(target: "lonewolf::router", "{location:?} redirected to {root:?}");
        self.history.push(root);
        Ok(root.to_string())
    }

    /// Navigate to the location currently held by the history collaborator
    pub async fn on_location_change(&self) -> Result<NavigationOutcome> {
        let location = self.history.current();
        self.navigate(&location).await
    }

    /// Resolve `location`, run the stages and schedule the render
    pub async fn navigate(&self, location: &str) -> Result<NavigationOutcome> {
        let location = self.normalize(location)?;

        let (generation, current, loading, error) = {
            let routes = read(&self.scope.routes);
            let current = routes.find_by_location(&location);
            let loading = routes.find_by_key(&self.pages.load);
            let error = routes.find_by_key(&self.pages.err);
            let mut nav = lock(&self.scope.nav);
            nav.generation += 1;
            nav.location = location.clone();
            nav.current = current.clone();
            nav.loading = loading.clone();
            nav.error = error.clone();
            (nav.generation, current, loading, error)
        };
        log::info!(
            target: "lonewolf::router",
            "navigating to {location} (route: {:?})",
            current.as_ref().map(|r| r.key())
        );

        if let Step::Stop(outcome) = self.run_stage(ON_URL_CHANGE).await? {
            return Ok(outcome);
        }

        let mut loading_render = None;
        if let Some(loading) = loading.filter(|_| !self.load_delay.is_zero()) {
            match self.run_stage(ON_LOADING).await? {
                Step::Go => {
                    let shell = Arc::clone(&self.shell);
                    loading_render = Some(tokio::spawn(async move {
                        shell.render_loading(loading, generation).await
                    }));
                }
                Step::Stop(NavigationOutcome::Halted) => return Ok(NavigationOutcome::Halted),
                Step::Stop(_) => {}
            }
        }

        let middlewares = read(&self.middlewares).clone();
        for middleware in middlewares {
            if let Verdict::Blocked(reason) = middleware(current.clone()).await {
                log::info!(target: "lonewolf::router", "navigation to {location} blocked: {reason}");
                return Ok(NavigationOutcome::Blocked { by: reason });
            }
        }

        let target = match (&current, &error) {
            (Some(current), _) => {
                if let Step::Stop(outcome) = self.run_stage(ON_CURRENT_ROUTE_FOUND).await? {
                    return Ok(outcome);
                }
                Arc::clone(current)
            }
            (None, Some(error)) => {
                if let Step::Stop(outcome) = self.run_stage(ON_ERROR).await? {
                    return Ok(outcome);
                }
                Arc::clone(error)
            }
            (None, None) => {
                log::warn!(
                    target: "lonewolf::router",
                    "no route for {location:?} and no error route {:?}",
                    self.pages.err
                );
                return Ok(NavigationOutcome::NotFound);
            }
        };

        let fallback = error.filter(|e| !Arc::ptr_eq(e, &target));
        let main = self.spawn_render(target, fallback, generation);
        Ok(NavigationOutcome::Scheduled(ScheduledRender {
            generation,
            loading: loading_render,
            main,
        }))
    }

    fn spawn_render(
        &self,
        target: Arc<Route>,
        fallback: Option<Arc<Route>>,
        generation: u64,
    ) -> JoinHandle<Result<RenderOutcome>> {
        let shell = Arc::clone(&self.shell);
        let bus = self.bus.clone();
        let scope = self.scope.clone();
        let delay = self.load_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match shell.render_guarded(Arc::clone(&target), generation).await {
                Ok(outcome) => Ok(outcome),
                Err(e) if e.is_halt() => Ok(RenderOutcome::Halted),
                Err(e) => match fallback {
                    Some(error_route) => {
                        log::warn!(
                            target: "lonewolf::router",
                            "rendering {} failed: {e}; showing {}",
                            target.key(),
                            error_route.key()
                        );
                        let report = bus
                            .execute(ON_ERROR, HookContext::new(ON_ERROR, scope, Some(Arc::clone(&error_route))))
                            .await;
                        match report {
                            Ok(StageReport::Blocked { .. }) => Ok(RenderOutcome::Blocked),
                            Err(e) if e.is_halt() => Ok(RenderOutcome::Halted),
                            Err(e) => Err(e),
                            Ok(_) => shell.render_guarded(error_route, generation).await,
                        }
                    }
                    None => {
                        log::warn!(
                            target: "lonewolf::router",
                            "rendering {} failed and no error route is configured: {e}",
                            target.key()
                        );
                        Err(e)
                    }
                },
            }
        })
    }

    /// Route clicks on `[app-link]` elements through the router
    pub fn intercept_links(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        let router = Arc::downgrade(self);
        dispatcher.add_listener(
            "click",
            Arc::new(move |event: &Event| {
                let Some(router) = router.upgrade() else {
                    return;
                };
                let Some(href) = router.link_target(event) else {
                    return;
                };
                event.prevent_default();
                if href == router.history.current() {
                    return;
                }
                router.history.push(&href);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Err(e) = router.navigate(&href).await {
                                log::error!(target: "lonewolf::router", "navigation to {href} failed: {e}");
                            }
                        });
                    }
                    Err(_) => log::error!(
                        target: "lonewolf::router",
                        "link to {href} clicked outside of a runtime"
                    ),
                }
            }),
        );
    }

    fn link_target(&self, event: &Event) -> Option<String> {
        let target = event.target?;
        let doc = lock(&self.scope.document);
        std::iter::once(target)
            .chain(doc.ancestors(target))
            .find(|id| doc.has_attribute(*id, APP_LINK))
            .and_then(|id| doc.get_attribute(id, "href").map(str::to_string))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("pages", &self.pages)
            .field("load_delay", &self.load_delay)
            .field("middlewares", &read(&self.middlewares).len())
            .finish()
    }
}

/// Bare file references (`index.html`) are never routed
pub fn is_file_like(location: &str) -> bool {
    FILE_LIKE.as_ref().is_some_and(|re| re.is_match(location))
}
