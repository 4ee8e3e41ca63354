//! Application configuration
//!
//! Loaded from JSON; every field has a default so an empty object is a
//! valid configuration.

use crate::router::RouteDef;
use crate::utils::{ConfigError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Keys of the special pages
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PagesRef {
    /// Location used for empty or file-like locations
    pub root: String,
    /// Key of the route shown while the target route loads
    pub load: String,
    /// Key of the route shown when nothing matches or rendering fails
    pub err: String,
}

impl Default for PagesRef {
    fn default() -> Self {
        Self {
            root: "/index".to_string(),
            load: "/loading".to_string(),
            err: "/404".to_string(),
        }
    }
}

/// Reserved attribute names
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Keywords {
    /// Marks the root element of a stand-alone component
    pub component: String,
    /// Declares pseudo-event bindings (`click:handler;focus:other`)
    pub event_handler: String,
}

impl Default for Keywords {
    fn default() -> Self {
        Self {
            component: "stand-alone".to_string(),
            event_handler: "lone-event".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mount_selector: String,
    pub load_delay_ms: u64,
    pub nested_component_delay_ms: u64,
    pub pages_ref: PagesRef,
    pub base_url: Option<String>,
    pub default_title: Option<String>,
    pub keywords: Keywords,
    pub shell_html: String,
    pub routes: Vec<RouteDef>,
    pub declarations: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mount_selector: "#app".to_string(),
            load_delay_ms: 1500,
            nested_component_delay_ms: 500,
            pages_ref: PagesRef::default(),
            base_url: None,
            default_title: None,
            keywords: Keywords::default(),
            shell_html: r#"<div id="app"></div>"#.to_string(),
            routes: Vec::new(),
            declarations: Map::new(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    fn validate(&self) -> Result<()> {
        if self.mount_selector.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("mount_selector is empty".into()).into());
        }
        if self.keywords.component.is_empty() || self.keywords.event_handler.is_empty() {
            return Err(ConfigError::InvalidConfig("keywords must not be empty".into()).into());
        }
        Ok(())
    }

    pub fn load_delay(&self) -> Duration {
        Duration::from_millis(self.load_delay_ms)
    }

    pub fn nested_component_delay(&self) -> Duration {
        Duration::from_millis(self.nested_component_delay_ms)
    }

    /// Same configuration without artificial delays
    pub fn without_delays(mut self) -> Self {
        self.load_delay_ms = 0;
        self.nested_component_delay_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config.mount_selector, "#app");
        assert_eq!(config.load_delay(), Duration::from_millis(1500));
        assert_eq!(config.nested_component_delay(), Duration::from_millis(500));
        assert_eq!(config.pages_ref.root, "/index");
        assert_eq!(config.keywords.event_handler, "lone-event");
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_partial_override() {
        let config = AppConfig::from_json_str(
            r#"{
                "load_delay_ms": 0,
                "pages_ref": { "err": "/oops" },
                "routes": [ { "key": "/a", "path": "/a.html", "children": [ { "key": "/b" } ] } ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.load_delay_ms, 0);
        assert_eq!(config.pages_ref.err, "/oops");
        assert_eq!(config.pages_ref.load, "/loading");
        assert_eq!(config.routes[0].children[0].key, "/b");
    }

    #[test]
    fn test_invalid_config() {
        assert!(AppConfig::from_json_str("[]").is_err());
        assert!(AppConfig::from_json_str(r#"{ "mount_selector": " " }"#).is_err());
    }
}
