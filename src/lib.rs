//! # Lonewolf - Client-Side Router and Stand-Alone Components
//!
//! A single page application engine: routes map locations to remote HTML
//! payloads, which are mounted into one shell element and turned into
//! components with props, methods and pseudo-events.
//!
//! ## Architecture
//!
//! The crate is organized into the following core modules:
//!
//! - **engine**: Application context, shell and application state
//! - **router**: Route patterns, route table, lifecycle stages and navigation
//! - **component**: Component building, placeholders, scripts (Boa), includes and event binding
//! - **dom**: Document tree, HTML parsing, selectors and events
//! - **network**: Fetch collaborator (HTTP via reqwest, in-memory for tests)
//! - **config**: Application configuration
//! - **utils**: Shared utilities and error types

pub mod component;
pub mod config;
pub mod dom;
pub mod engine;
pub mod network;
pub mod router;
pub mod utils;

// Re-export main types for convenience
pub use config::AppConfig;
pub use engine::{App, AppState, Plugin, RenderOutcome};
pub use router::{NavigationOutcome, Route, RouteDef, Router};
pub use utils::error::{LoneWolfError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Lonewolf";
