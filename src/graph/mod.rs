//! Link graph: nodes keyed by normalized URL and their outgoing edges
//!
//! Invariants every [`GraphStore`] keeps:
//!
//! - every edge target exists as a node (`Dummy` until it is fetched)
//! - a `FromRedirect` edge exists only while the `FromSource` edge it
//!   replaces exists on the same node
//! - a `Redirected` node has no outgoing edges
//!
//! Operations never fail on valid input; mutating an absent id is a no-op.

mod memory;
mod node;
mod state;

pub use memory::MemoryGraph;
pub use node::{Edge, EdgeProvenance, Node};
pub use state::NodeState;

use chrono::{DateTime, Utc};

/// Content recorded by [`GraphStore::upsert`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeContent {
    pub title: Option<String>,
    pub keywords: Vec<String>,
    pub source_modified_at: Option<DateTime<Utc>>,
    /// Outgoing link targets (node ids)
    pub links: Vec<String>,
}

/// Storage contract for the link graph
pub trait GraphStore: Send + Sync {
    /// Creates or updates a `Populated` node
    ///
    /// Source edges are replaced by `content.links`; redirect edges whose
    /// replaced target is no longer linked are pruned in the same step.
    fn upsert(&self, id: &str, content: NodeContent) -> Node;

    /// Turns a node into an alias of `target`, dropping its edges
    fn mark_redirected(&self, id: &str, target: &str) -> Option<Node>;

    /// Records on `id` that its link to `replaces` now resolves to `target`
    ///
    /// Returns false (and changes nothing) unless `id` currently has a source
    /// edge to `replaces`.
    fn add_redirect_edge(&self, id: &str, replaces: &str, target: &str) -> bool;

    /// Removes a node and every edge pointing at it
    fn remove(&self, id: &str) -> Option<Node>;

    /// Returns true if the node should be (re-)crawled
    ///
    /// Absent and `Dummy` nodes are always stale; others are stale once their
    /// last mutation is older than `max_days`.
    fn is_stale(&self, id: &str, max_days: u32) -> bool;

    fn get(&self, id: &str) -> Option<Node>;

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    /// Ids of nodes with an edge to `id`, sorted
    fn incoming(&self, id: &str) -> Vec<String>;
}
