//! Routes and their payload cache

use super::pattern::{CompiledPattern, Params};
use crate::dom::NodeId;
use crate::network::{Fetcher, Method, Request, fetch_text};
use crate::utils::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::OnceCell;

/// Declarative route definition, as found in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteDef {
    pub key: String,
    /// Payload URL; children without one reuse the parent's
    pub path: Option<String>,
    pub title: Option<String>,
    pub props: Map<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub method: Option<String>,
    pub body: Option<Value>,
    pub children: Vec<RouteDef>,
}

impl RouteDef {
    /// Definition with a key and a payload URL
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Set the title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a prop
    pub fn prop(mut self, name: impl Into<String>, value: Value) -> Self {
        self.props.insert(name.into(), value);
        self
    }

    /// Add a child definition
    pub fn child(mut self, child: RouteDef) -> Self {
        self.children.push(child);
        self
    }
}

/// A registered route: compiled key, fetch options and the cached rendered view
#[derive(Debug)]
pub struct Route {
    key: String,
    path: String,
    title: Option<String>,
    props: Map<String, Value>,
    headers: Vec<(String, String)>,
    method: Method,
    body: Option<String>,
    pattern: CompiledPattern,
    rendered: OnceCell<NodeId>,
}

impl Route {
    /// Create a GET route
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        let key = key.into();
        let pattern = CompiledPattern::compile(&key);
        Self {
            key,
            path: path.into(),
            title: None,
            props: Map::new(),
            headers: Vec::new(),
            method: Method::Get,
            body: None,
            pattern,
            rendered: OnceCell::new(),
        }
    }

    /// Build a route from a flattened definition
    pub(crate) fn from_def(key: String, path: String, def: &RouteDef, props: Map<String, Value>) -> Self {
        let method = match def.method.as_deref() {
            None => Method::Get,
            Some(name) => name.parse().unwrap_or_else(|e| {
                log::warn!(target: "lonewolf::router", "route {key}: {e}, falling back to GET");
                Method::Get
            }),
        };
        let body = def.body.as_ref().map(|b| match b {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let mut route = Self::new(key, path);
        route.title = def.title.clone();
        route.props = props;
        route.headers = def.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        route.method = method;
        route.body = body;
        route
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the props handed to the rendered view
    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = props;
        self
    }

    /// Set the fetch method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Whether the location resolves to this route
    pub fn matches(&self, location: &str) -> bool {
        self.pattern.matches(location)
    }

    /// Parameter values the location carries for this route
    pub fn params(&self, location: &str) -> Option<Params> {
        self.pattern.extract_params(location)
    }

    /// The request issued for the payload
    pub fn request(&self) -> Result<Request> {
        let mut request = Request::new(self.method, self.path.clone())?;
        for (name, value) in &self.headers {
            request = request.header(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        Ok(request)
    }

    /// Fetch the payload once. No retry; non-2xx responses are errors.
    pub async fn fetch(&self, fetcher: &dyn Fetcher) -> Result<String> {
        let request = self.request()?;
        fetch_text(fetcher, &request).await
    }

    /// The cached rendered view, building it with `init` on first use.
    ///
    /// Concurrent callers share one build; a failed build is not cached.
    pub async fn rendered_or_init<F, Fut>(&self, init: F) -> Result<NodeId>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NodeId>>,
    {
        self.rendered.get_or_try_init(init).await.copied()
    }

    /// The cached rendered view, if one was built
    pub fn cached_view(&self) -> Option<NodeId> {
        self.rendered.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::network::{MockFetcher, Response, StaticFetcher};
    use crate::utils::LoneWolfError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_request_carries_route_options() {
        let route = Route::new("/save", "/api/save")
            .with_method(Method::Post)
            .with_header("X-Token", "abc")
            .with_body("{\"a\":1}");
        let request = route.request().unwrap();
        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.url(), "/api/save");
        assert_eq!(request.headers(), &[("X-Token".to_string(), "abc".to_string())]);
        assert_eq!(request.body_text(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_fetch_reports_failures() {
        let fetcher = StaticFetcher::new().with("/ok.html", "<p>ok</p>");
        fetcher.insert_status("/down.html", 500, "");
        assert_eq!(
            Route::new("/ok", "/ok.html").fetch(&fetcher).await.unwrap(),
            "<p>ok</p>"
        );
        assert!(Route::new("/down", "/down.html").fetch(&fetcher).await.is_err());
        assert!(Route::new("/gone", "/gone.html").fetch(&fetcher).await.is_err());
    }

    #[tokio::test]
    async fn test_render_cache_is_single_flight() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch().times(1).returning(|req| {
            let url = req.url().to_string();
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(Response::new(200, url, "<p>x</p>"))
            })
        });
        let route = Route::new("/x", "/x.html");
        let builds = AtomicUsize::new(0);
        let view = Document::new().root();

        let render = || {
            route.rendered_or_init(|| async {
                route.fetch(&mock).await?;
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(view)
            })
        };
        let (a, b) = tokio::join!(render(), render());
        assert_eq!(a.unwrap(), view);
        assert_eq!(b.unwrap(), view);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(route.cached_view(), Some(view));
    }

    #[tokio::test]
    async fn test_failed_render_is_not_cached() {
        let route = Route::new("/x", "/x.html");
        let first = route
            .rendered_or_init(|| async { Err(LoneWolfError::Halted) })
            .await;
        assert!(first.is_err());
        assert!(route.cached_view().is_none());
        let second = route
            .rendered_or_init(|| async { Ok(Document::new().root()) })
            .await;
        assert!(second.is_ok());
    }
}
