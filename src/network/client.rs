//! HTTP fetcher backed by reqwest

use super::{Fetcher, Method, Request, Response};
use crate::utils::{NetworkError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

/// Fetches over HTTP, resolving relative URLs against an optional base URL.
///
/// Without a base URL only absolute URLs can be fetched.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<Url>,
    /// Set once the missing base URL has been reported
    base_warned: Arc<AtomicBool>,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("Lonewolf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        let base_url = base_url
            .map(|b| Url::parse(b).map_err(|_| NetworkError::InvalidUrl(b.to_string())))
            .transpose()?;
        Ok(Self {
            client,
            base_url,
            base_warned: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resolve a possibly relative URL
    pub fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = self.base_url.as_ref() else {
                    if !self.base_warned.swap(true, Ordering::Relaxed) {
                        log::warn!(
                            target: "lonewolf::network",
                            "cannot fetch relative URL {url:?}: no base_url configured"
                        );
                    }
                    return Err(NetworkError::InvalidUrl(url.to_string()).into());
                };
                base.join(url)
                    .map_err(|_| NetworkError::InvalidUrl(url.to_string()).into())
            }
            Err(_) => Err(NetworkError::InvalidUrl(url.to_string()).into()),
        }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Patch => reqwest::Method::PATCH,
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Response>> {
        let resolved = self.resolve(request.url());
        let client = self.client.clone();
        let request = request.clone();
        Box::pin(async move {
            let url = resolved?;
            log::debug!(target: "lonewolf::network", "{} {}", request.method(), url);

            let mut req = client.request(to_reqwest(request.method()), url.clone());
            for (name, value) in request.headers() {
                req = req.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body_text() {
                req = req.body(body.to_string());
            }

            let response = req
                .send()
                .await
                .map_err(|e| NetworkError::Transport(e.to_string()))?;
            let status = response.status().as_u16();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| NetworkError::Transport(e.to_string()))?;

            let mut resp = Response::new(status, url.as_str(), body);
            for (name, value) in headers {
                resp = resp.with_header(name, value);
            }
            Ok(resp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_urls_resolve_against_base() {
        let fetcher = HttpFetcher::new(Some("https://example.com/app/")).unwrap();
        assert_eq!(
            fetcher.resolve("views/home.html").unwrap().as_str(),
            "https://example.com/app/views/home.html"
        );
        assert_eq!(
            fetcher.resolve("/views/home.html").unwrap().as_str(),
            "https://example.com/views/home.html"
        );
        assert_eq!(
            fetcher.resolve("http://other.org/x").unwrap().as_str(),
            "http://other.org/x"
        );
    }

    #[test]
    fn test_relative_url_without_base_is_invalid() {
        let fetcher = HttpFetcher::new(None).unwrap();
        assert!(!fetcher.base_warned.load(Ordering::Relaxed));
        assert!(fetcher.resolve("/home.html").is_err());
        assert!(fetcher.base_warned.load(Ordering::Relaxed));
        // Clones share the flag, so the warning is not repeated
        assert!(fetcher.clone().resolve("views/a.html").is_err());
        assert!(fetcher.resolve("https://example.com/a.html").is_ok());
        assert!(HttpFetcher::new(Some("not a url")).is_err());
    }
}
