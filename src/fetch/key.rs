use crate::url::normalize_url;
use sha2::{Digest, Sha256};

/// Cache key for a fetch: SHA-256 hex of (normalized URL, user agent, accept)
///
/// Always 64 characters regardless of header length. A URL that fails to
/// normalize is hashed as given.
pub fn cache_key(url: &str, user_agent: &str, accept: &str) -> String {
    let url = normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(user_agent.as_bytes());
    hasher.update(b"\n");
    hasher.update(accept.as_bytes());
    hex::encode(hasher.finalize())
}
