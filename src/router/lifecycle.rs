//! Lifecycle stages
//!
//! A stage is a named extension point holding handlers in registration
//! order. Stages are declared once; handlers may be registered before their
//! stage exists and are installed when it is declared.

use super::NavState;
use super::pattern::Params;
use super::route::Route;
use super::table::RouteTable;
use crate::dom::SharedDocument;
use crate::utils::{ConfigError, LoneWolfError, Result, lock, read};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

pub const ON_URL_CHANGE: &str = "onUrlChange";
pub const ON_LOADING: &str = "onLoading";
pub const ON_ERROR: &str = "onError";
pub const ON_CURRENT_ROUTE_FOUND: &str = "onCurrentRouteFound";
pub const ON_BEFORE_RENDERING: &str = "onBeforeRendering";
pub const ON_AFTER_RENDERING: &str = "onAfterRendering";

/// Stages owned by the router
pub const ROUTER_STAGES: &[&str] = &[ON_URL_CHANGE, ON_LOADING, ON_ERROR, ON_CURRENT_ROUTE_FOUND];
/// Stages owned by the app shell
pub const SHELL_STAGES: &[&str] = &[ON_BEFORE_RENDERING, ON_AFTER_RENDERING];

/// What a handler wants the stage to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Skip the remaining handlers and report the stage as blocked
    Stop,
}

impl From<bool> for Flow {
    fn from(proceed: bool) -> Self {
        if proceed { Flow::Continue } else { Flow::Stop }
    }
}

/// Outcome of running a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageReport {
    Completed,
    Blocked { handler: String },
    Undeclared,
}

impl StageReport {
    pub fn is_blocked(&self) -> bool {
        matches!(self, StageReport::Blocked { .. })
    }
}

/// Lifecycle handler
pub type Hook = Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<Flow>> + Send + Sync>;

/// Wrap an async closure as a [`Hook`]
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow>> + Send + 'static,
{
    Arc::new(move |ctx| -> BoxFuture<'static, Result<Flow>> { Box::pin(f(ctx)) })
}

/// State shared by every handler invocation
#[derive(Clone)]
pub(crate) struct HookScope {
    pub(crate) nav: Arc<Mutex<NavState>>,
    pub(crate) routes: Arc<RwLock<RouteTable>>,
    pub(crate) document: SharedDocument,
}

/// Arguments handed to a handler. Accessors read the live router state,
/// not a snapshot taken when the stage started.
#[derive(Clone)]
pub struct HookContext {
    stage: String,
    scope: HookScope,
    target: Option<Arc<Route>>,
}

impl HookContext {
    pub(crate) fn new(stage: &str, scope: HookScope, target: Option<Arc<Route>>) -> Self {
        Self {
            stage: stage.to_string(),
            scope,
            target,
        }
    }

    /// Stage being executed
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Route being rendered, for the shell stages
    pub fn target(&self) -> Option<Arc<Route>> {
        self.target.clone()
    }

    pub fn location(&self) -> String {
        lock(&self.scope.nav).location.clone()
    }

    pub fn current_route(&self) -> Option<Arc<Route>> {
        lock(&self.scope.nav).current.clone()
    }

    pub fn loading_route(&self) -> Option<Arc<Route>> {
        lock(&self.scope.nav).loading.clone()
    }

    pub fn error_route(&self) -> Option<Arc<Route>> {
        lock(&self.scope.nav).error.clone()
    }

    /// Navigation counter; bumps on every navigation
    pub fn generation(&self) -> u64 {
        lock(&self.scope.nav).generation
    }

    /// First route whose key equals `key`
    pub fn find_route(&self, key: &str) -> Option<Arc<Route>> {
        read(&self.scope.routes).find_by_key(key)
    }

    /// Parameters of the current location for the current route
    pub fn url_params(&self) -> Params {
        let nav = lock(&self.scope.nav);
        nav.current
            .as_ref()
            .and_then(|r| r.params(&nav.location))
            .unwrap_or_default()
    }

    /// The page document
    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.scope.document)
    }

    /// Error value that cancels the current execution without counting as a failure
    pub fn halt(&self) -> LoneWolfError {
        LoneWolfError::Halted
    }
}

struct Stage {
    name: String,
    handlers: Vec<(String, Hook)>,
}

#[derive(Default)]
struct Stages {
    declared: Vec<Stage>,
    pending: Vec<(String, String, Hook)>,
}

/// Lifecycle bus; clones share the same stages
#[derive(Clone, Default)]
pub struct LifecycleBus {
    inner: Arc<Mutex<Stages>>,
}

fn install(stage: &mut Stage, name: String, handler: Hook) {
    match stage.handlers.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => {
            log::warn!(
                target: "lonewolf::router",
                "handler {name:?} replaced in stage {:?}",
                stage.name
            );
            slot.1 = handler;
        }
        None => stage.handlers.push((name, handler)),
    }
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with the given stages already declared
    pub fn with_stages(stages: &[&str]) -> Result<Self> {
        let bus = Self::new();
        for stage in stages {
            bus.extend(stage)?;
        }
        Ok(bus)
    }

    /// Declare a new stage; declaring an existing one is a configuration error.
    /// Handlers registered early for this stage are installed now.
    pub fn extend(&self, stage: &str) -> Result<()> {
        let mut stages = lock(&self.inner);
        if stages.declared.iter().any(|s| s.name == stage) {
            return Err(ConfigError::DuplicateStage(stage.to_string()).into());
        }
        let mut declared = Stage {
            name: stage.to_string(),
            handlers: Vec::new(),
        };
        let pending = std::mem::take(&mut stages.pending);
        for (target, name, handler) in pending {
            if target == stage {
                install(&mut declared, name, handler);
            } else {
                stages.pending.push((target, name, handler));
            }
        }
        stages.declared.push(declared);
        Ok(())
    }

    /// Install a handler. Re-using a name replaces the earlier handler in place.
    pub fn register(&self, stage: &str, name: &str, handler: Hook) {
        let mut guard = lock(&self.inner);
        let Stages { declared, pending } = &mut *guard;
        match declared.iter_mut().find(|s| s.name == stage) {
            Some(declared) => install(declared, name.to_string(), handler),
            None => {
                log::debug!(
                    target: "lonewolf::router",
                    "stage {stage:?} not declared yet, parking handler {name:?}"
                );
                pending.push((stage.to_string(), name.to_string(), handler));
            }
        }
    }

    /// Whether a stage exists
    pub fn has_stage(&self, stage: &str) -> bool {
        lock(&self.inner).declared.iter().any(|s| s.name == stage)
    }

    /// Declared stage names in declaration order
    pub fn stages(&self) -> Vec<String> {
        lock(&self.inner)
            .declared
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Handler names of a stage in execution order
    pub fn handler_names(&self, stage: &str) -> Vec<String> {
        lock(&self.inner)
            .declared
            .iter()
            .find(|s| s.name == stage)
            .map(|s| s.handlers.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of handlers waiting for their stage
    pub fn pending_count(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Run a stage's handlers one after another.
    ///
    /// Handlers are snapshotted first; registering during execution takes
    /// effect on the next run. A handler error stops the stage and is returned.
    pub async fn execute(&self, stage: &str, ctx: HookContext) -> Result<StageReport> {
        let handlers = {
            let stages = lock(&self.inner);
            match stages.declared.iter().find(|s| s.name == stage) {
                Some(declared) => declared.handlers.clone(),
                None => {
                    log::warn!(target: "lonewolf::router", "stage {stage:?} is not declared");
                    return Ok(StageReport::Undeclared);
                }
            }
        };

        for (name, handler) in handlers {
            log::debug!(target: "lonewolf::router", "{stage}: running {name}");
            if handler(ctx.clone()).await? == Flow::Stop {
                log::info!(target: "lonewolf::router", "{stage}: blocked by {name}");
                return Ok(StageReport::Blocked { handler: name });
            }
        }
        Ok(StageReport::Completed)
    }
}

impl std::fmt::Debug for LifecycleBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBus")
            .field("stages", &self.stages())
            .field("pending", &self.pending_count())
            .finish()
    }
}
