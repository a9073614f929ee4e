//! Typed events and the in-process dispatch fabric
//!
//! A URL moves through the pipeline as a chain of events:
//!
//! ```text
//! crawl-requested -> scrape-requested -> normalize-requested
//!     -> graph-update-requested -> node-added
//! ```
//!
//! The [`Dispatcher`] fans each event out to every handler registered for its
//! kind, gating each invocation through [`AdmissionControl`]. Delivery is
//! best-effort and in-memory only: nothing is persisted and nothing is
//! redelivered.

mod admission;
mod dispatcher;
mod payload;

pub use admission::{AdmissionControl, AdmissionPermit, DEFAULT_CEILING};
pub use dispatcher::{handler_fn, DispatchOutcome, Dispatcher, EventHandler};
pub use payload::{
    CrawlOptions, CrawlRequest, FetchedPage, GraphUpdate, GraphUpdateRequest, NodeAdded,
    NormalizeRequest, NormalizedPage, PageLink, ScrapedPage,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of an event; handlers subscribe per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CrawlRequested,
    ScrapeRequested,
    NormalizeRequested,
    GraphUpdateRequested,
    NodeAdded,
}

impl EventKind {
    /// Name used in configuration and log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrawlRequested => "crawl-requested",
            Self::ScrapeRequested => "scrape-requested",
            Self::NormalizeRequested => "normalize-requested",
            Self::GraphUpdateRequested => "graph-update-requested",
            Self::NodeAdded => "node-added",
        }
    }

    /// Parses a configuration name back into a kind
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|kind| kind.as_str() == name)
    }

    /// Returns all event kinds in pipeline order
    pub fn all() -> Vec<Self> {
        vec![
            Self::CrawlRequested,
            Self::ScrapeRequested,
            Self::NormalizeRequested,
            Self::GraphUpdateRequested,
            Self::NodeAdded,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event body, one variant per pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum EventPayload {
    CrawlRequested(CrawlRequest),
    ScrapeRequested(FetchedPage),
    NormalizeRequested(NormalizeRequest),
    GraphUpdateRequested(GraphUpdateRequest),
    NodeAdded(NodeAdded),
}

/// An immutable event: a payload plus the instant it was created
///
/// Two events are equal when their kind and payload are equal; the creation
/// timestamp does not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn crawl_requested(request: CrawlRequest) -> Self {
        Self::new(EventPayload::CrawlRequested(request))
    }

    pub fn scrape_requested(page: FetchedPage) -> Self {
        Self::new(EventPayload::ScrapeRequested(page))
    }

    pub fn normalize_requested(request: NormalizeRequest) -> Self {
        Self::new(EventPayload::NormalizeRequested(request))
    }

    pub fn graph_update_requested(request: GraphUpdateRequest) -> Self {
        Self::new(EventPayload::GraphUpdateRequested(request))
    }

    pub fn node_added(added: NodeAdded) -> Self {
        Self::new(EventPayload::NodeAdded(added))
    }

    /// Kind used to route this event
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::CrawlRequested(_) => EventKind::CrawlRequested,
            EventPayload::ScrapeRequested(_) => EventKind::ScrapeRequested,
            EventPayload::NormalizeRequested(_) => EventKind::NormalizeRequested,
            EventPayload::GraphUpdateRequested(_) => EventKind::GraphUpdateRequested,
            EventPayload::NodeAdded(_) => EventKind::NodeAdded,
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}
