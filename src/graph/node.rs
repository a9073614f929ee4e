use crate::graph::NodeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an edge came to exist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EdgeProvenance {
    /// Found in the node's own content
    FromSource,
    /// Stands in for the source edge to `replaces`, which redirected
    FromRedirect { replaces: String },
}

/// An outgoing link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub target: String,
    pub provenance: EdgeProvenance,
}

impl Edge {
    pub fn from_source(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            provenance: EdgeProvenance::FromSource,
        }
    }

    pub fn from_redirect(target: impl Into<String>, replaces: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            provenance: EdgeProvenance::FromRedirect {
                replaces: replaces.into(),
            },
        }
    }

    pub fn is_from_source(&self) -> bool {
        matches!(self.provenance, EdgeProvenance::FromSource)
    }

    /// Id of the source edge this edge replaces, for redirect edges
    pub fn replaces(&self) -> Option<&str> {
        match &self.provenance {
            EdgeProvenance::FromRedirect { replaces } => Some(replaces),
            EdgeProvenance::FromSource => None,
        }
    }
}

/// A page in the link graph, identified by its normalized URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub title: Option<String>,
    pub keywords: Vec<String>,
    /// Modification time the server declared
    pub source_modified_at: Option<DateTime<Utc>>,
    /// Last local mutation
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub state: NodeState,
    /// Alias target while `Redirected`
    pub redirect_target: Option<String>,
    pub edges: Vec<Edge>,
}

impl Node {
    /// Placeholder for a URL that is linked but not yet fetched
    pub fn dummy(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: None,
            keywords: Vec::new(),
            source_modified_at: None,
            modified_at: now,
            created_at: now,
            state: NodeState::Dummy,
            redirect_target: None,
            edges: Vec::new(),
        }
    }

    /// Targets of `FromSource` edges, in order
    pub fn source_targets(&self) -> impl Iterator<Item = &str> {
        self.edges
            .iter()
            .filter(|e| e.is_from_source())
            .map(|e| e.target.as_str())
    }

    pub fn has_source_edge(&self, target: &str) -> bool {
        self.source_targets().any(|t| t == target)
    }

    /// Returns true if any edge points at `target`
    pub fn links_to(&self, target: &str) -> bool {
        self.edges.iter().any(|e| e.target == target)
    }
}
