//! Error types for Lonewolf

use thiserror::Error;

/// Main error type for Lonewolf operations
#[derive(Debug, Error)]
pub enum LoneWolfError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    /// Rendering/parsing errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    /// Setup errors, fatal by contract
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Placeholder and inline script errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialisation errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A handler asked for the current execution to stop.
    #[error("Execution halted by request")]
    Halted,
    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

impl LoneWolfError {
    /// True for the deliberate halt signal, false for real failures
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halted)
    }
}

/// Network-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Non-2xx response
    #[error("HTTP {status} while fetching {url}")]
    Http { status: u16, url: String },
    /// Connection or protocol failure
    #[error("transport failure: {0}")]
    Transport(String),
    /// Invalid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Nothing is served at this URL (in-memory fetcher)
    #[error("no resource at {0}")]
    NotFound(String),
}

/// Rendering-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The route could not produce renderable content
    #[error("Fatal Error: Error while requesting rendering of route \"{key}\"")]
    RouteRender { key: String },
    /// Component markup without its `<children>` section
    #[error("component markup is missing its <children> section")]
    MissingChildren,
    /// Node handed to the component builder no longer exists
    #[error("node {0} is not part of the document")]
    Detached(usize),
}

/// Configuration errors, raised at setup time
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Stage declared twice
    #[error("Unauthorized override of lifeCycle: \"{0}\", requires core code modification")]
    DuplicateStage(String),
    /// Root page reference cannot be routed
    #[error("invalid root page reference: {0:?}")]
    InvalidRoot(String),
    /// Selector syntax not understood
    #[error("invalid selector: {0:?}")]
    InvalidSelector(String),
    /// Anything else wrong with the configuration
    #[error("{0}")]
    InvalidConfig(String),
}

/// Errors raised while evaluating placeholder expressions and inline functions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// Expression could not be parsed
    #[error("syntax error: {0}")]
    Syntax(String),
    /// Identifier not found in scope
    #[error("{0}")]
    Reference(String),
    /// Operation not supported for the operand types
    #[error("type error: {0}")]
    Type(String),
    /// Called something that is not a method
    #[error("{0} is not a function")]
    NotCallable(String),
    /// Methods calling each other too deep
    #[error("maximum call depth exceeded")]
    RecursionLimit,
    /// Any other exception escaping a script
    #[error("uncaught {0}")]
    Thrown(String),
}

/// Convenience Result type for Lonewolf operations
pub type Result<T> = std::result::Result<T, LoneWolfError>;
