//! Sumi-Linkgraph: an event-driven crawl core that maps the web as a link graph
//!
//! A discovered URL travels through crawl → scrape → normalize → graph stages as
//! events on an in-process bus. Each stage is gated by per-event-type admission
//! control, fetches go through a size-bounded, cache-aware fetch layer, and every
//! URL is checked against a cached robots.txt before it is requested.

pub mod cache;
pub mod config;
pub mod events;
pub mod fetch;
pub mod graph;
pub mod pipeline;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Linkgraph operations
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Scrape error for {url}: {message}")]
    Scrape { url: String, message: String },

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid duration window: min {min:?} is greater than max {max:?}")]
    InvalidWindow {
        min: std::time::Duration,
        max: std::time::Duration,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Linkgraph operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cache::{build_cache, Cache, CacheBackend};
pub use config::Config;
pub use events::{Dispatcher, Event, EventHandler, EventKind};
pub use fetch::{FetchRequest, FetchResponse, Fetcher};
pub use graph::{GraphStore, MemoryGraph, Node, NodeState};
pub use robots::RobotsCache;
pub use url::{extract_domain, normalize_url};
