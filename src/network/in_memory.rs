//! In-memory fetcher serving fixed bodies by URL

use super::{Fetcher, Request, Response};
use crate::utils::{NetworkError, Result, read, write};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Default)]
struct Entries {
    bodies: HashMap<String, (u16, String)>,
    hits: HashMap<String, usize>,
    delays: HashMap<String, Duration>,
}

/// Serves registered bodies; unknown URLs fail with `NotFound`.
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    entries: Arc<RwLock<Entries>>,
    latency: Option<Duration>,
}

impl StaticFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay responses for `url` only, on top of the shared latency
    pub fn with_delay(self, url: impl Into<String>, delay: Duration) -> Self {
        write(&self.entries).delays.insert(url.into(), delay);
        self
    }

    /// Serve `body` with status 200 at `url`
    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) -> &Self {
        self.insert_status(url, 200, body)
    }

    /// Serve `body` with the given status at `url`
    pub fn insert_status(
        &self,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> &Self {
        write(&self.entries)
            .bodies
            .insert(url.into(), (status, body.into()));
        self
    }

    /// Builder form of [`StaticFetcher::insert`]
    pub fn with(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    /// How many times a URL was requested
    pub fn hits(&self, url: &str) -> usize {
        read(&self.entries).hits.get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Response>> {
        let url = request.url().to_string();
        let (found, delay) = {
            let mut entries = write(&self.entries);
            *entries.hits.entry(url.clone()).or_default() += 1;
            (entries.bodies.get(&url).cloned(), entries.delays.get(&url).copied())
        };
        let latency = self.latency.unwrap_or_default() + delay.unwrap_or_default();
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match found {
                Some((status, body)) => Ok(Response::new(status, url, body)),
                None => Err(NetworkError::NotFound(url).into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::fetch_text;

    #[test]
    fn test_serves_registered_bodies() {
        let fetcher = StaticFetcher::new()
            .with("/home.html", "<p>home</p>");
        fetcher.insert_status("/broken.html", 500, "oops");

        let home = tokio_test::block_on(fetch_text(&fetcher, &Request::get("/home.html").unwrap()));
        assert_eq!(home.unwrap(), "<p>home</p>");

        let broken = tokio_test::block_on(fetch_text(&fetcher, &Request::get("/broken.html").unwrap()));
        assert!(broken.is_err());

        let missing = tokio_test::block_on(fetch_text(&fetcher, &Request::get("/nope").unwrap()));
        assert!(missing.is_err());
        assert_eq!(fetcher.hits("/home.html"), 1);
    }
}
