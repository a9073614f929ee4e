//! Per-event-type admission control
//!
//! Each event kind owns a semaphore sized to its concurrency ceiling. A handler
//! invocation holds one permit for its whole run; ceilings are fixed once the
//! gate is built.

use crate::config::DispatchConfig;
use crate::events::EventKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Ceiling applied to every event kind without an override
pub const DEFAULT_CEILING: usize = 20;

/// A held admission slot; dropping it frees the slot
#[derive(Debug)]
pub struct AdmissionPermit {
    kind: EventKind,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Bounded-concurrency gate, one semaphore per event kind
#[derive(Debug)]
pub struct AdmissionControl {
    gates: HashMap<EventKind, Arc<Semaphore>>,
    ceilings: HashMap<EventKind, usize>,
}

impl AdmissionControl {
    /// Creates a gate with the same ceiling for every kind
    pub fn new(default_ceiling: usize) -> Self {
        Self::with_ceilings(default_ceiling, HashMap::new())
    }

    /// Creates a gate with per-kind overrides
    ///
    /// Ceilings below 1 are raised to 1 so every kind can make progress.
    pub fn with_ceilings(default_ceiling: usize, overrides: HashMap<EventKind, usize>) -> Self {
        let mut gates = HashMap::new();
        let mut ceilings = HashMap::new();

        for kind in EventKind::all() {
            let ceiling = overrides
                .get(&kind)
                .copied()
                .unwrap_or(default_ceiling)
                .max(1);
            gates.insert(kind, Arc::new(Semaphore::new(ceiling)));
            ceilings.insert(kind, ceiling);
        }

        Self { gates, ceilings }
    }

    /// Builds the gate from the `[dispatch]` configuration section
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::with_ceilings(config.default_concurrency, config.ceilings())
    }

    /// Configured ceiling for a kind
    pub fn ceiling(&self, kind: EventKind) -> usize {
        self.ceilings.get(&kind).copied().unwrap_or(DEFAULT_CEILING)
    }

    /// Permits currently free for a kind
    pub fn available(&self, kind: EventKind) -> usize {
        self.gates
            .get(&kind)
            .map(|gate| gate.available_permits())
            .unwrap_or(0)
    }

    /// Waits for a slot for `kind`
    ///
    /// Returns `None` if `cancel` fires first; in that case no permit is held.
    pub async fn acquire(
        &self,
        kind: EventKind,
        cancel: &CancellationToken,
    ) -> Option<AdmissionPermit> {
        let gate = self.gates.get(&kind)?.clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = gate.acquire_owned() => permit.ok().map(|permit| AdmissionPermit {
                kind,
                _permit: permit,
            }),
        }
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_ceiling() {
        let admission = AdmissionControl::default();
        for kind in EventKind::all() {
            assert_eq!(admission.ceiling(kind), 20);
            assert_eq!(admission.available(kind), 20);
        }
    }

    #[test]
    fn test_overrides_and_floor() {
        let mut overrides = HashMap::new();
        overrides.insert(EventKind::CrawlRequested, 3);
        overrides.insert(EventKind::NodeAdded, 0);
        let admission = AdmissionControl::with_ceilings(5, overrides);

        assert_eq!(admission.ceiling(EventKind::CrawlRequested), 3);
        assert_eq!(admission.ceiling(EventKind::NodeAdded), 1);
        assert_eq!(admission.ceiling(EventKind::ScrapeRequested), 5);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let admission = AdmissionControl::new(1);
        let cancel = CancellationToken::new();

        let permit = admission
            .acquire(EventKind::ScrapeRequested, &cancel)
            .await
            .unwrap();
        assert_eq!(permit.kind(), EventKind::ScrapeRequested);
        assert_eq!(admission.available(EventKind::ScrapeRequested), 0);

        drop(permit);
        assert_eq!(admission.available(EventKind::ScrapeRequested), 1);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let admission = AdmissionControl::new(1);
        let cancel = CancellationToken::new();

        let _held = admission.acquire(EventKind::CrawlRequested, &cancel).await;
        let other = admission.acquire(EventKind::NodeAdded, &cancel).await;
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_cancel_while_saturated() {
        let admission = Arc::new(AdmissionControl::new(1));
        let cancel = CancellationToken::new();
        let _held = admission
            .acquire(EventKind::CrawlRequested, &cancel)
            .await
            .unwrap();

        let waiter_cancel = CancellationToken::new();
        let waiter = {
            let admission = admission.clone();
            let token = waiter_cancel.clone();
            tokio::spawn(async move { admission.acquire(EventKind::CrawlRequested, &token).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter_cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(result.is_none());
        assert_eq!(admission.available(EventKind::CrawlRequested), 0);
    }
}
