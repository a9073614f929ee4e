//! robots.txt compliance cache
//!
//! One [`RobotsRecord`] is kept per origin (scheme + host + port) in the
//! shared cache and re-fetched lazily once it expires. When no usable record
//! can be obtained the URL is treated as disallowed.

mod parser;
mod record;

pub use parser::{crawl_delay, is_allowed, product_token};
pub use record::{RobotsRecord, MAX_CRAWL_DELAY};

use crate::cache::Cache;
use crate::fetch::{FetchRequest, Fetcher};
use crate::url::{origin_of, robots_url};
use chrono::Utc;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Accept header sent for robots.txt requests
const ROBOTS_ACCEPT: &str = "text/plain,*/*;q=0.5";

/// Per-origin robots.txt records backed by the shared cache
#[derive(Debug, Clone)]
pub struct RobotsCache {
    fetcher: Fetcher,
    cache: Cache,
    ttl: Duration,
    user_agent: String,
}

impl RobotsCache {
    /// Creates a robots cache
    ///
    /// `user_agent` is sent when fetching robots.txt and used to evaluate
    /// rules when a check names no agent of its own.
    pub fn new(fetcher: Fetcher, cache: Cache, ttl: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            fetcher,
            cache,
            ttl,
            user_agent: user_agent.into(),
        }
    }

    /// Returns true if robots.txt permits fetching `url`
    ///
    /// Fails closed: without a usable record the answer is false.
    pub async fn is_permitted(
        &self,
        url: &Url,
        user_agent: Option<&str>,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(record) = self.record(url, cancel).await else {
            warn!(url = %url, "No usable robots.txt, treating URL as disallowed");
            return false;
        };

        let agent = user_agent.unwrap_or("*");
        let allowed = record.is_allowed(url.as_str(), agent);
        if !allowed {
            debug!(url = %url, agent = %product_token(agent), "Disallowed by robots.txt");
        }
        allowed
    }

    /// `Crawl-delay` for `url`'s origin, if the record declares one
    pub async fn crawl_delay(
        &self,
        url: &Url,
        user_agent: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<Duration> {
        let record = self.record(url, cancel).await?;
        record.crawl_delay(user_agent.unwrap_or("*"))
    }

    /// Returns the current record for `url`'s origin, fetching if needed
    pub async fn record(&self, url: &Url, cancel: &CancellationToken) -> Option<RobotsRecord> {
        let origin = origin_of(url)?;
        let key = format!("robots:{}", origin);

        match self.cache.get::<RobotsRecord>(&key).await {
            Ok(Some(record)) if !record.is_expired(Utc::now()) => return Some(record),
            Ok(_) => {}
            Err(e) => warn!(origin = %origin, error = %e, "Robots cache read failed"),
        }

        let record = self.fetch_record(url, cancel).await?;
        if let Err(e) = self.cache.set(&key, &record, Some(self.ttl)).await {
            warn!(origin = %origin, error = %e, "Robots cache write failed");
        }
        Some(record)
    }

    async fn fetch_record(&self, url: &Url, cancel: &CancellationToken) -> Option<RobotsRecord> {
        let source = robots_url(url)?;
        let request = FetchRequest::new(source.clone(), self.user_agent.clone(), ROBOTS_ACCEPT);

        let response = match self.fetcher.fetch(&request, cancel).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %source, error = %e, "Failed to fetch robots.txt");
                return None;
            }
        };

        if response.status_code() != StatusCode::OK {
            warn!(url = %source, status = response.status, "robots.txt not available");
            return None;
        }
        if response.body.trim().is_empty() {
            warn!(url = %source, "robots.txt is empty");
            return None;
        }

        debug!(url = %source, bytes = response.body_bytes(), "Fetched robots.txt");
        Some(RobotsRecord::new(source.as_str(), response.body, self.ttl))
    }
}
