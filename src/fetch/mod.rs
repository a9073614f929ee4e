//! Cache-aware, size-bounded HTTP fetching
//!
//! [`Fetcher::fetch`] turns a URL into a [`FetchResponse`] envelope:
//!
//! 1. Look the request up in the cache (keyed by URL, user agent and accept)
//! 2. On a miss, send the request without following redirects
//! 3. Check the content type against the caller's Accept header
//! 4. Read at most `max_bytes` of the body, truncating anything longer
//! 5. Record any `Retry-After` offset for throttled or unavailable responses
//! 6. Cache the envelope for the server's freshness window, clamped
//!
//! Cache failures never reach the caller: a broken backend reads as a miss and
//! a failed write is only logged.

mod freshness;
mod key;
mod negotiate;

pub use freshness::{
    clamp_cache_duration, freshness_instant, is_retryable, last_modified, parse_http_date,
    retry_after_offset,
};
pub use key::cache_key;
pub use negotiate::{is_acceptable, quality};

use crate::cache::Cache;
use crate::config::Config;
use crate::{Result, SumiError};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Parameters of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub user_agent: String,
    pub accept: String,
    /// Body bytes kept before truncating
    pub max_bytes: usize,
    /// Overrides the freshness window the server declares
    pub cache_duration: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: Url, user_agent: impl Into<String>, accept: impl Into<String>) -> Self {
        Self {
            url,
            user_agent: user_agent.into(),
            accept: accept.into(),
            max_bytes: crate::config::FetchConfig::default().max_bytes,
            cache_duration: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    /// Cache key for this request
    pub fn cache_key(&self) -> String {
        cache_key(self.url.as_str(), &self.user_agent, &self.accept)
    }
}

/// Fetch result: response metadata plus the (possibly truncated) body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// URL that was requested
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Server-declared modification time
    pub last_modified: Option<DateTime<Utc>>,
    /// Absolute redirect target of a 3xx response
    pub location: Option<String>,
    /// Body text; empty when the content type was not acceptable
    pub body: String,
    /// Whether the content type matched the request's Accept header
    pub acceptable: bool,
    /// Whether the body was cut at `max_bytes`
    pub truncated: bool,
    /// Server-directed wait before retrying, for throttled responses
    pub retry_after: Option<Duration>,
    /// Set when this envelope was served from cache
    #[serde(skip)]
    pub from_cache: bool,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResponse {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.status_code().is_success()
    }

    pub fn is_redirect(&self) -> bool {
        self.status_code().is_redirection()
    }

    pub fn is_retryable(&self) -> bool {
        is_retryable(self.status_code())
    }

    /// Body length in bytes
    pub fn body_bytes(&self) -> usize {
        self.body.len()
    }
}

/// Builds the HTTP client used for every fetch
///
/// Redirects are never followed; a 3xx comes back to the caller with its
/// `Location` so the graph can record the alias.
pub fn build_http_client(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.user_agent_string())
        .timeout(Duration::from_secs(config.fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(config.fetch.connect_timeout_secs))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

/// HTTP fetcher with a response cache in front
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    cache: Cache,
    min_cache: Duration,
    max_cache: Duration,
}

impl Fetcher {
    /// Creates a fetcher from configuration
    pub fn new(config: &Config, cache: Cache) -> Result<Self> {
        let client = build_http_client(config)?;
        Self::with_client(
            client,
            cache,
            config.cache.min_duration(),
            config.cache.max_duration(),
        )
    }

    /// Creates a fetcher over an existing client
    pub fn with_client(
        client: Client,
        cache: Cache,
        min_cache: Duration,
        max_cache: Duration,
    ) -> Result<Self> {
        if min_cache > max_cache {
            return Err(crate::ConfigError::InvalidWindow {
                min: min_cache,
                max: max_cache,
            }
            .into());
        }

        Ok(Self {
            client,
            cache,
            min_cache,
            max_cache,
        })
    }

    /// Fetches a URL, serving from cache when possible
    ///
    /// Returns [`SumiError::Cancelled`] if `cancel` fires before the body is
    /// read; the partial body is discarded.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse> {
        let key = request.cache_key();

        match self.cache.get::<FetchResponse>(&key).await {
            Ok(Some(mut cached)) => {
                debug!(url = %request.url, "Fetch served from cache");
                cached.from_cache = true;
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache read failed, fetching from network");
            }
        }

        let Downloaded {
            envelope,
            cache_window,
        } = tokio::select! {
            _ = cancel.cancelled() => return Err(SumiError::Cancelled),
            result = self.download(request) => result?,
        };

        let ttl = match request.cache_duration {
            Some(duration) => Some(duration).filter(|d| !d.is_zero()),
            None => cache_window,
        };

        if let Some(ttl) = ttl.filter(|_| envelope.acceptable && !envelope.is_retryable()) {
            match self.cache.set(&key, &envelope, Some(ttl)).await {
                Ok(()) => debug!(url = %request.url, ttl_secs = ttl.as_secs(), "Cached response"),
                Err(e) => warn!(url = %request.url, error = %e, "Cache write failed"),
            }
        }

        Ok(envelope)
    }

    async fn download(&self, request: &FetchRequest) -> Result<Downloaded> {
        let url = request.url.as_str();
        let response = self
            .client
            .get(request.url.clone())
            .header(USER_AGENT, &request.user_agent)
            .header(ACCEPT, &request.accept)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let now = Utc::now();
        let status = response.status();
        let headers = response.headers().clone();

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let acceptable = is_acceptable(&request.accept, content_type.as_deref());

        let location = if status.is_redirection() {
            headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| request.url.join(loc).ok())
                .map(|loc| loc.to_string())
        } else {
            None
        };

        let retry_after = retry_after_offset(status, &headers, now);
        let cache_window = clamp_cache_duration(
            freshness_instant(&headers, now),
            now,
            self.min_cache,
            self.max_cache,
        )?;

        let (body, truncated) = if acceptable {
            read_capped(response, request.max_bytes, url).await?
        } else {
            debug!(url = %url, content_type = ?content_type, "Unacceptable content type, body discarded");
            (String::new(), false)
        };

        if truncated {
            debug!(url = %url, max_bytes = request.max_bytes, "Body truncated");
        }

        Ok(Downloaded {
            envelope: FetchResponse {
                url: url.to_string(),
                status: status.as_u16(),
                content_type,
                last_modified: last_modified(&headers),
                location,
                body,
                acceptable,
                truncated,
                retry_after,
                from_cache: false,
                fetched_at: now,
            },
            cache_window,
        })
    }
}

struct Downloaded {
    envelope: FetchResponse,
    cache_window: Option<Duration>,
}

/// Reads the body chunk by chunk, stopping at `max_bytes`
async fn read_capped(mut response: Response, max_bytes: usize, url: &str) -> Result<(String, bool)> {
    let mut buf = Vec::new();
    let mut truncated = false;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_error(url, e))?
    {
        let room = max_bytes - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    Ok((decode_body(buf), truncated))
}

/// Decodes a body as UTF-8, dropping a multi-byte sequence cut at the end
fn decode_body(mut buf: Vec<u8>) -> String {
    if let Err(e) = std::str::from_utf8(&buf) {
        if e.error_len().is_none() {
            buf.truncate(e.valid_up_to());
        }
    }

    match String::from_utf8(buf) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> SumiError {
    if error.is_timeout() {
        SumiError::Timeout {
            url: url.to_string(),
        }
    } else {
        SumiError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}
