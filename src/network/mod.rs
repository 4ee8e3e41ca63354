//! Fetch collaborator
//!
//! Everything the engine downloads goes through the [`Fetcher`] trait: route
//! payloads and `<getComponent>` includes alike.

mod client;
mod in_memory;
mod request;
mod response;

pub use client::HttpFetcher;
pub use in_memory::StaticFetcher;
pub use request::{Method, Request};
pub use response::Response;

use crate::utils::Result;
use futures::future::BoxFuture;

/// Source of remote documents
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher: Send + Sync {
    /// Issue a request; the future resolves with whatever status the server sent
    fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Response>>;
}

/// Fetch a request and return its body, rejecting non-2xx responses
pub async fn fetch_text(fetcher: &dyn Fetcher, request: &Request) -> Result<String> {
    fetcher.fetch(request).await?.into_text()
}

/// Fetch several requests concurrently
pub async fn fetch_all(fetcher: &dyn Fetcher, requests: &[Request]) -> Vec<Result<String>> {
    let futures: Vec<_> = requests.iter().map(|r| fetch_text(fetcher, r)).collect();
    futures::future::join_all(futures).await
}
