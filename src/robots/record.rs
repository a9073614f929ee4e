use crate::robots::parser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest `Crawl-delay` honoured
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60 * 60);

/// A fetched robots.txt for one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsRecord {
    /// Where the file was fetched from
    pub source_url: String,
    /// Raw robots.txt text
    pub content: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RobotsRecord {
    /// Creates a record fetched now, valid for `ttl`
    pub fn new(source_url: impl Into<String>, content: impl Into<String>, ttl: Duration) -> Self {
        let fetched_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::days(30));
        Self {
            source_url: source_url.into(),
            content: content.into(),
            fetched_at,
            expires_at: fetched_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Age of the record
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        parser::is_allowed(&self.content, user_agent, url)
    }

    /// `Crawl-delay` for `user_agent`, capped at [`MAX_CRAWL_DELAY`]
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let seconds = parser::crawl_delay(&self.content, user_agent)?;
        let delay = Duration::try_from_secs_f64(seconds).unwrap_or(MAX_CRAWL_DELAY);
        Some(delay.min(MAX_CRAWL_DELAY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str) -> RobotsRecord {
        RobotsRecord::new(
            "https://example.com/robots.txt",
            content,
            Duration::from_secs(30 * 24 * 3600),
        )
    }

    #[test]
    fn test_new_record_not_expired() {
        let record = record("User-agent: *\nAllow: /");
        assert!(!record.is_expired(Utc::now()));
        assert_eq!(record.expires_at - record.fetched_at, chrono::Duration::days(30));
    }

    #[test]
    fn test_record_expires() {
        let mut record = record("User-agent: *\nAllow: /");
        record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(record.is_expired(Utc::now()));
    }

    #[test]
    fn test_age() {
        let mut record = record("");
        record.fetched_at = Utc::now() - chrono::Duration::hours(12);
        let age = record.age();
        assert!(age.num_hours() >= 11 && age.num_hours() <= 13);
    }

    #[test]
    fn test_delegates_rules() {
        let record = record("User-agent: *\nDisallow: /admin\nCrawl-delay: 1.5");
        assert!(!record.is_allowed("https://example.com/admin", "TestBot"));
        assert!(record.is_allowed("https://example.com/", "TestBot"));
        assert_eq!(record.crawl_delay("TestBot"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_absurd_crawl_delay_is_capped() {
        for value in ["1e300", "86400000", "1.7976931348623157e308"] {
            let record = record(&format!("User-agent: *\nCrawl-delay: {}", value));
            assert_eq!(record.crawl_delay("Bot"), Some(MAX_CRAWL_DELAY), "{}", value);
        }
    }
}
