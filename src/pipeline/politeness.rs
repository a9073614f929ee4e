//! Per-host request spacing
//!
//! A host may be requested again once the effective delay has passed since
//! its last request. The effective delay is the larger of the configured
//! minimum and the host's robots.txt `Crawl-delay`.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct HostSlot {
    last_request: Instant,
    delay: Duration,
    request_count: u64,
}

/// Tracks when each host was last requested
#[derive(Debug)]
pub struct PolitenessGate {
    hosts: DashMap<String, HostSlot>,
    min_delay: Duration,
}

impl PolitenessGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            hosts: DashMap::new(),
            min_delay,
        }
    }

    /// Delay applied to a host given its robots `Crawl-delay`
    pub fn effective_delay(&self, crawl_delay: Option<Duration>) -> Duration {
        crawl_delay.unwrap_or_default().max(self.min_delay)
    }

    /// Claims the next request slot for `host`
    ///
    /// Returns `None` if the request may go now (the slot is recorded), or
    /// how long to wait before trying again.
    pub fn try_acquire(&self, host: &str, crawl_delay: Option<Duration>) -> Option<Duration> {
        let delay = self.effective_delay(crawl_delay);
        let now = Instant::now();

        let mut slot = self.hosts.entry(host.to_string()).or_insert(HostSlot {
            last_request: now,
            delay,
            request_count: 0,
        });

        if slot.request_count > 0 {
            let wait = slot.delay.max(delay);
            match slot.last_request.checked_add(wait) {
                Some(ready_at) if ready_at > now => return Some(ready_at - now),
                Some(_) => {}
                None => return Some(wait),
            }
        }

        slot.last_request = now;
        slot.delay = delay;
        slot.request_count += 1;
        None
    }

    /// Requests made to `host` so far
    pub fn request_count(&self, host: &str) -> u64 {
        self.hosts.get(host).map(|s| s.request_count).unwrap_or(0)
    }
}
