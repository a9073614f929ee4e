use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a graph node
///
/// ```text
/// Dummy -> Populated <-> Redirected
///            ^    |
///            +----+  (re-crawl)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Referenced as an edge target but never fetched
    Dummy,
    /// Content fetched; outgoing edges known
    Populated,
    /// Alias of another node; has no outgoing edges
    Redirected,
}

impl NodeState {
    /// Returns true if the node's content has been fetched at least once
    pub fn is_crawled(&self) -> bool {
        !matches!(self, Self::Dummy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Populated => "populated",
            Self::Redirected => "redirected",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "dummy" => Some(Self::Dummy),
            "populated" => Some(Self::Populated),
            "redirected" => Some(Self::Redirected),
            _ => None,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for state in [NodeState::Dummy, NodeState::Populated, NodeState::Redirected] {
            assert_eq!(NodeState::from_name(state.as_str()), Some(state));
            assert_eq!(state.to_string(), state.as_str());
        }
        assert_eq!(NodeState::from_name("processed"), None);
    }

    #[test]
    fn test_is_crawled() {
        assert!(!NodeState::Dummy.is_crawled());
        assert!(NodeState::Populated.is_crawled());
        assert!(NodeState::Redirected.is_crawled());
    }
}
