use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::events::EventKind;

/// Default accept header, matching what mainstream browsers send for navigation
pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// Main configuration structure for Sumi-Linkgraph
///
/// Every section is optional in the TOML file and falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
}

/// Service identification
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name used in log output and as the default cache namespace
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default = "default_contact_url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `CrawlerName/Version (+ContactURL)`
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: default_contact_url(),
        }
    }
}

/// Which cache backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Process memory, lost on exit
    Memory,
    /// SQLite file on local disk
    Sqlite,
    /// External Redis server
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_backend")]
    pub backend: CacheBackendKind,

    /// SQLite database path (sqlite backend)
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// Redis URL (redis backend)
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Redis connection pool size
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,

    /// Prefix prepended to every key
    #[serde(rename = "key-prefix", default = "default_service_name")]
    pub key_prefix: String,

    /// Shortest time a fetched response is cached (seconds)
    #[serde(rename = "min-duration-secs", default = "default_min_cache_secs")]
    pub min_duration_secs: u64,

    /// Longest time a fetched response is cached (seconds)
    #[serde(rename = "max-duration-secs", default = "default_max_cache_secs")]
    pub max_duration_secs: u64,

    /// How often expired entries are purged (seconds)
    #[serde(rename = "sweep-interval-secs", default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn min_duration(&self) -> Duration {
        Duration::from_secs(self.min_duration_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_cache_path(),
            url: default_redis_url(),
            pool_size: default_pool_size(),
            key_prefix: default_service_name(),
            min_duration_secs: default_min_cache_secs(),
            max_duration_secs: default_max_cache_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// HTTP fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Body bytes read before truncating
    #[serde(rename = "max-bytes", default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Accept header sent when a crawl request does not carry its own
    #[serde(default = "default_accept")]
    pub accept: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            accept: default_accept(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Robots.txt cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RobotsConfig {
    /// How long a fetched robots.txt stays valid (days)
    #[serde(rename = "ttl-days", default = "default_robots_ttl_days")]
    pub ttl_days: u64,
}

impl RobotsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 60 * 60))
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_robots_ttl_days(),
        }
    }
}

/// Event dispatch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Concurrent handler invocations allowed per event type
    #[serde(rename = "default-concurrency", default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Per-event-type overrides, keyed by event name (e.g. `crawl-requested`)
    #[serde(default)]
    pub limits: HashMap<String, usize>,
}

impl DispatchConfig {
    /// Resolves the admission ceiling for every event kind
    pub fn ceilings(&self) -> HashMap<EventKind, usize> {
        EventKind::all()
            .into_iter()
            .map(|kind| {
                let limit = self
                    .limits
                    .get(kind.as_str())
                    .copied()
                    .unwrap_or(self.default_concurrency);
                (kind, limit)
            })
            .collect()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            limits: HashMap::new(),
        }
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Maximum link depth followed from a seed URL
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum outgoing links kept per page
    #[serde(rename = "max-links", default = "default_max_links")]
    pub max_links: usize,

    /// Pages older than this are eligible for re-crawl (days)
    #[serde(rename = "stale-after-days", default = "default_stale_after_days")]
    pub stale_after_days: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-host-delay-ms", default = "default_min_host_delay_ms")]
    pub min_host_delay_ms: u64,

    /// Attempts made for a URL that keeps answering with retry directives
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_links: default_max_links(),
            stale_after_days: default_stale_after_days(),
            min_host_delay_ms: default_min_host_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_service_name() -> String {
    "sumi".to_string()
}

fn default_crawler_name() -> String {
    "SumiLinkgraph".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_contact_url() -> String {
    "https://example.com/bot".to_string()
}

fn default_backend() -> CacheBackendKind {
    CacheBackendKind::Memory
}

fn default_cache_path() -> String {
    "./sumi-cache.db".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_min_cache_secs() -> u64 {
    5 * 60
}

fn default_max_cache_secs() -> u64 {
    20 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_bytes() -> usize {
    1024 * 1024
}

fn default_accept() -> String {
    DEFAULT_ACCEPT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_robots_ttl_days() -> u64 {
    30
}

fn default_concurrency() -> usize {
    20
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_links() -> usize {
    100
}

fn default_stale_after_days() -> u32 {
    7
}

fn default_min_host_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}
