//! Application context
//!
//! [`App`] owns everything one single page application needs:
//! 1. The page document, its event dispatcher and the component tree
//! 2. The route table and the lifecycle bus
//! 3. The shell that mounts views and the router that drives it
//! 4. Application state and registered methods

pub mod shell;
pub mod state;

pub use shell::{AppShell, RenderOutcome};
pub use state::{AppState, BIND_STATE};

use crate::component::ComponentTree;
use crate::config::AppConfig;
use crate::dom::{Document, Event, EventDispatcher, HtmlParser, NodeId, SharedDocument, inner_html, query_selector};
use crate::network::{Fetcher, HttpFetcher};
use crate::router::lifecycle::{HookScope, ROUTER_STAGES, SHELL_STAGES};
use crate::router::{
    History, Hook, LifecycleBus, MemoryHistory, Middleware, NavState, NavigationOutcome, Route, RouteDef, RouteTable,
    Router, flatten_routes, transform_declarations,
};
use crate::utils::{ConfigError, Result, ScriptError, lock, read, write};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Named method registered on the application
pub type RegisteredMethod = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`RegisteredMethod`]
pub fn registered_method<F, Fut>(f: F) -> RegisteredMethod
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args| -> BoxFuture<'static, Result<Value>> { Box::pin(f(args)) })
}

/// What a plugin contributes
#[derive(Clone)]
pub enum PluginHandler {
    /// Joins a lifecycle stage
    Hook(Hook),
    /// Stored as a registered method
    Method(RegisteredMethod),
}

/// Extension installed with [`App::use_plugin`]
#[derive(Clone)]
pub struct Plugin {
    pub name: String,
    /// Stage a hook joins; `None` for registered methods
    pub at: Option<String>,
    pub handler: PluginHandler,
}

impl Plugin {
    pub fn hook(name: impl Into<String>, stage: impl Into<String>, hook: Hook) -> Self {
        Self {
            name: name.into(),
            at: Some(stage.into()),
            handler: PluginHandler::Hook(hook),
        }
    }

    pub fn method(name: impl Into<String>, method: RegisteredMethod) -> Self {
        Self {
            name: name.into(),
            at: None,
            handler: PluginHandler::Method(method),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.handler {
            PluginHandler::Hook(_) => "hook",
            PluginHandler::Method(_) => "method",
        };
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("at", &self.at)
            .field("handler", &kind)
            .finish()
    }
}

/// One single page application
pub struct App {
    config: AppConfig,
    document: SharedDocument,
    dispatcher: EventDispatcher,
    bus: LifecycleBus,
    routes: Arc<RwLock<RouteTable>>,
    shell: Arc<AppShell>,
    router: Arc<Router>,
    state: Arc<AppState>,
    registered: RwLock<HashMap<String, RegisteredMethod>>,
    started: AtomicBool,
}

impl App {
    /// Build the application. Stages are declared and routes registered
    /// here; nothing is mounted or fetched until [`App::start`].
    pub fn new(config: AppConfig, fetcher: Arc<dyn Fetcher>, history: Arc<dyn History>) -> Result<Self> {
        let mut doc = Document::new();
        HtmlParser::new().parse_into(&mut doc, &config.shell_html)?;
        let default_title = config
            .default_title
            .clone()
            .or_else(|| Some(doc.title.clone()).filter(|t| !t.is_empty()));
        let document = doc.into_shared();

        let bus = LifecycleBus::with_stages(ROUTER_STAGES)?;
        for stage in SHELL_STAGES {
            bus.extend(stage)?;
        }

        let mut table = RouteTable::new();
        let declared = transform_declarations(&config.declarations)?;
        for route in flatten_routes(&config.routes).into_iter().chain(flatten_routes(&declared)) {
            table.add(route);
        }
        log::info!(target: "lonewolf::app", "{} routes registered", table.len());
        let routes = Arc::new(RwLock::new(table));

        let scope = HookScope {
            nav: Arc::new(Mutex::new(NavState::default())),
            routes: Arc::clone(&routes),
            document: Arc::clone(&document),
        };
        let dispatcher = EventDispatcher::new();
        let tree = Arc::new(ComponentTree::new(
            Arc::clone(&document),
            dispatcher.clone(),
            fetcher,
            config.keywords.clone(),
            config.nested_component_delay(),
        ));
        let shell = Arc::new(AppShell::new(
            scope.clone(),
            bus.clone(),
            tree,
            dispatcher.clone(),
            default_title,
        ));
        let router = Arc::new(Router::new(
            scope,
            bus.clone(),
            Arc::clone(&shell),
            history,
            config.pages_ref.clone(),
            config.load_delay(),
        ));
        let state = Arc::new(AppState::new(Arc::clone(&document)));

        Ok(Self {
            config,
            document,
            dispatcher,
            bus,
            routes,
            shell,
            router,
            state,
            registered: RwLock::new(HashMap::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Application fetching over HTTP with an in-memory history starting at
    /// the root page
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.base_url.as_deref())?);
        let history = Arc::new(MemoryHistory::new(config.pages_ref.root.clone()));
        Self::new(config, fetcher, history)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.document)
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn shell(&self) -> &Arc<AppShell> {
        &self.shell
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn lifecycle(&self) -> &LifecycleBus {
        &self.bus
    }

    /// Register more routes after construction
    pub fn add_routes(&self, defs: &[RouteDef]) {
        let mut table = write(&self.routes);
        for route in flatten_routes(defs) {
            table.add(route);
        }
    }

    /// Register routes from an enhanced declaration map
    pub fn add_declarations(&self, declarations: &Map<String, Value>) -> Result<()> {
        let defs = transform_declarations(declarations)?;
        self.add_routes(&defs);
        Ok(())
    }

    pub fn find_route(&self, key: &str) -> Option<Arc<Route>> {
        read(&self.routes).find_by_key(key)
    }

    pub fn use_middleware(&self, middleware: Middleware) {
        self.router.use_middleware(middleware);
    }

    /// Add a handler to a lifecycle stage
    pub fn on(&self, stage: &str, name: &str, hook: Hook) {
        self.bus.register(stage, name, hook);
    }

    /// Install a plugin: hooks join their stage, methods become callable
    /// through [`App::call_registered`]
    pub fn use_plugin(&self, plugin: Plugin) -> Result<()> {
        match (plugin.at, plugin.handler) {
            (Some(stage), PluginHandler::Hook(hook)) => {
                log::debug!(target: "lonewolf::app", "plugin {:?} joins {stage}", plugin.name);
                self.bus.register(&stage, &plugin.name, hook);
                Ok(())
            }
            (None, PluginHandler::Method(method)) => {
                if write(&self.registered).insert(plugin.name.clone(), method).is_some() {
                    log::warn!(target: "lonewolf::app", "registered method {:?} replaced", plugin.name);
                }
                Ok(())
            }
            (Some(stage), PluginHandler::Method(_)) => Err(ConfigError::InvalidConfig(format!(
                "plugin {:?} targets stage {stage:?} but is not a hook",
                plugin.name
            ))
            .into()),
            (None, PluginHandler::Hook(_)) => Err(ConfigError::InvalidConfig(format!(
                "hook plugin {:?} names no stage",
                plugin.name
            ))
            .into()),
        }
    }

    /// Run a method registered by a plugin
    pub async fn call_registered(&self, name: &str, args: Value) -> Result<Value> {
        let method = read(&self.registered)
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::NotCallable(name.to_string()))?;
        method(args).await
    }

    /// Mount the shell, wire link interception and state refreshes, then
    /// navigate to the current history location
    pub async fn start(&self) -> Result<NavigationOutcome> {
        if !self.started.swap(true, Ordering::SeqCst) {
            if self.shell.set_mount(&self.config.mount_selector).is_none() {
                log::error!(
                    target: "lonewolf::app",
                    "mount point {:?} not found, views will not be shown",
                    self.config.mount_selector
                );
            }
            self.router.intercept_links(&self.dispatcher);
            self.state.watch_view_changes(&self.dispatcher);
            log::info!(target: "lonewolf::app", "started");
        }
        self.router.on_location_change().await
    }

    /// Record `location` in the history and navigate to it
    pub async fn navigate(&self, location: &str) -> Result<NavigationOutcome> {
        let history = self.router.history();
        if history.current() != location {
            history.push(location);
        }
        self.router.navigate(location).await
    }

    /// Dispatch a DOM event, e.g. a click on an `app-link`
    pub fn dispatch(&self, event: &Event) {
        self.dispatcher.dispatch(&self.document, event);
    }

    /// First node matching `selector` in the whole document
    pub fn query(&self, selector: &str) -> Result<Option<NodeId>> {
        let doc = lock(&self.document);
        query_selector(&doc, doc.root(), selector)
    }

    /// Markup currently inside the mount point
    pub fn mount_html(&self) -> Option<String> {
        let mount = self.shell.mount()?;
        Some(inner_html(&lock(&self.document), mount))
    }

    pub fn title(&self) -> String {
        lock(&self.document).title.clone()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &read(&self.routes).len())
            .field("stages", &self.bus.stages())
            .field("shell", &self.shell)
            .field("router", &self.router)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticFetcher;
    use crate::router::{Flow, hook};
    use serde_json::json;

    fn app(config: AppConfig) -> App {
        App::new(
            config.without_delays(),
            Arc::new(StaticFetcher::new()),
            Arc::new(MemoryHistory::new("/index")),
        )
        .unwrap()
    }

    #[test]
    fn test_new_declares_every_stage() {
        let app = app(AppConfig::default());
        for stage in ROUTER_STAGES.iter().chain(SHELL_STAGES) {
            assert!(app.lifecycle().has_stage(stage), "{stage} missing");
        }
    }

    #[test]
    fn test_default_title_comes_from_shell_markup() {
        let config = AppConfig {
            shell_html: r#"<html><head><title> Shop </title></head><body><div id="app"></div></body></html>"#.into(),
            ..AppConfig::default()
        };
        let app = app(config);
        assert_eq!(app.shell().default_title(), Some("Shop"));
    }

    #[test]
    fn test_routes_and_declarations_are_registered() {
        let config = AppConfig::from_json_str(
            r#"{
                "routes": [{"key": "/index", "path": "/index.html"}],
                "declarations": {"/items": {"content": "/items.html", "type": "number"}}
            }"#,
        )
        .unwrap();
        let app = app(config);
        assert!(app.find_route("/index").is_some());
        app.add_routes(&[RouteDef::new("/about", "/about.html")]);
        assert!(app.find_route("/about").is_some());
        assert_eq!(app.router().state().generation, 0);
    }

    #[tokio::test]
    async fn test_plugins() {
        let app = app(AppConfig::default());
        app.use_plugin(Plugin::method(
            "double",
            registered_method(|args: Value| async move { Ok(json!(args.as_i64().unwrap_or(0) * 2)) }),
        ))
        .unwrap();
        assert_eq!(app.call_registered("double", json!(21)).await.unwrap(), json!(42));
        assert!(app.call_registered("missing", Value::Null).await.is_err());

        app.use_plugin(Plugin::hook(
            "audit",
            "onUrlChange",
            hook(|_ctx| async { Ok(Flow::Continue) }),
        ))
        .unwrap();
        assert_eq!(app.lifecycle().handler_names("onUrlChange"), vec!["audit".to_string()]);

        let mismatched = Plugin {
            name: "broken".into(),
            at: Some("onUrlChange".into()),
            handler: PluginHandler::Method(registered_method(|v: Value| async move { Ok(v) })),
        };
        assert!(app.use_plugin(mismatched).is_err());
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let app = app(AppConfig::default());
        assert!(app.lifecycle().extend("onLoading").is_err());
        assert!(app.lifecycle().extend("onAnalytics").is_ok());
    }
}
