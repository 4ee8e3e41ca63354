//! Fetch response types

use crate::utils::{NetworkError, Result};
use std::collections::HashMap;

/// Response returned by a [`super::Fetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Response {
    /// Create a new response
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// URL the response was served for
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check if the response was successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Get a specific header
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body text for 2xx responses, an HTTP error otherwise
    pub fn into_text(self) -> Result<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(NetworkError::Http {
                status: self.status,
                url: self.url,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_success_rejects() {
        let ok = Response::new(200, "/a", "<p>a</p>");
        assert_eq!(ok.into_text().unwrap(), "<p>a</p>");

        let missing = Response::new(404, "/b", "not found");
        let err = missing.into_text().unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let res = Response::new(200, "/a", "").with_header("Content-Type", "text/html");
        assert_eq!(res.header("content-type"), Some("text/html"));
    }
}
