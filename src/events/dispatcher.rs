//! Publish/subscribe dispatcher with scheduled delivery
//!
//! The registry maps each [`EventKind`] to an immutable handler list. Changing
//! the subscriptions swaps in a new list, so a publish clones one `Arc` and
//! never holds a map guard while handlers start.

use crate::events::{AdmissionControl, Event, EventKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A subscriber to one or more event kinds
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event
    ///
    /// Errors are logged by the dispatcher and go no further.
    async fn handle(&self, event: Arc<Event>, cancel: CancellationToken) -> crate::Result<()>;

    /// Name used in log output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler backed by an async closure
struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>, cancel: CancellationToken) -> crate::Result<()> {
        (self.f)(event, cancel).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps an async closure as a handler
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// What happened to a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered; this many handler invocations were started
    Dispatched(usize),
    /// Cancelled while waiting for its scheduled instant
    Dropped,
}

type HandlerList = Arc<Vec<Arc<dyn EventHandler>>>;

/// Counts one unit of outstanding work for as long as it is alive
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn track(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process event bus
pub struct Dispatcher {
    registry: DashMap<EventKind, HandlerList>,
    admission: Arc<AdmissionControl>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(admission: AdmissionControl) -> Self {
        Self {
            registry: DashMap::new(),
            admission: Arc::new(admission),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publishes still waiting for their instant plus handler invocations
    /// not yet finished
    ///
    /// Zero means nothing is queued anywhere on this bus.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Admission gate shared by every dispatch
    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Registers a handler for `kind`
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut entry = self.registry.entry(kind).or_default();
        let mut handlers: Vec<_> = entry.iter().cloned().collect();
        handlers.push(handler);
        *entry = Arc::new(handlers);
    }

    /// Removes one handler reference from `kind`
    ///
    /// Returns whether the handler was registered. A kind left without
    /// handlers is removed from the registry.
    pub fn unsubscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> bool {
        let removed = match self.registry.get_mut(&kind) {
            Some(mut entry) => {
                let before = entry.len();
                let remaining: Vec<_> = entry
                    .iter()
                    .filter(|h| !same_handler(h, handler))
                    .cloned()
                    .collect();
                let removed = remaining.len() != before;
                *entry = Arc::new(remaining);
                removed
            }
            None => false,
        };

        self.registry
            .remove_if(&kind, |_, handlers| handlers.is_empty());
        removed
    }

    /// Handlers currently registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry.get(&kind).map(|h| h.len()).unwrap_or(0)
    }

    /// Kinds with at least one handler
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.registry.iter().map(|e| *e.key()).collect();
        kinds.sort();
        kinds
    }

    /// Publishes an event, optionally at a later instant
    ///
    /// A future `scheduled_at` suspends this call until then; a past or absent
    /// one dispatches now. Returns once every handler has been started. If
    /// `cancel` fires during the wait the event is dropped.
    pub async fn publish(
        &self,
        event: Event,
        scheduled_at: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let pending = InFlight::track(&self.in_flight);
        self.deliver(event, scheduled_at, cancel, pending).await
    }

    /// Runs [`publish`](Self::publish) on its own task
    ///
    /// The event counts toward [`in_flight`](Self::in_flight) from the moment
    /// this returns.
    pub fn spawn_publish(
        self: &Arc<Self>,
        event: Event,
        scheduled_at: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> JoinHandle<DispatchOutcome> {
        let pending = InFlight::track(&self.in_flight);
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher
                .deliver(event, scheduled_at, &cancel, pending)
                .await
        })
    }

    async fn deliver(
        &self,
        event: Event,
        scheduled_at: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
        _pending: InFlight,
    ) -> DispatchOutcome {
        let delay = scheduled_at.and_then(|at| (at - Utc::now()).to_std().ok());

        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(
                        event = %event.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "Scheduled event dropped: cancelled before delivery"
                    );
                    return DispatchOutcome::Dropped;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        DispatchOutcome::Dispatched(self.dispatch(event, cancel))
    }

    fn dispatch(&self, event: Event, cancel: &CancellationToken) -> usize {
        let kind = event.kind();
        let handlers = match self.registry.get(&kind) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                debug!(event = %kind, "No handlers registered");
                return 0;
            }
        };

        let event = Arc::new(event);
        for handler in handlers.iter() {
            let handler = Arc::clone(handler);
            let event = Arc::clone(&event);
            let admission = Arc::clone(&self.admission);
            let cancel = cancel.clone();
            let running = InFlight::track(&self.in_flight);

            tokio::spawn(async move {
                let _running = running;
                let Some(_permit) = admission.acquire(kind, &cancel).await else {
                    debug!(event = %kind, handler = handler.name(), "Cancelled awaiting admission");
                    return;
                };

                if let Err(e) = handler.handle(event, cancel).await {
                    warn!(event = %kind, handler = handler.name(), error = %e, "Handler failed");
                }
            });
        }

        handlers.len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(AdmissionControl::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
