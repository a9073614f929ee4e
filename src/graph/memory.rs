//! In-memory graph store

use crate::graph::{Edge, GraphStore, Node, NodeContent, NodeState};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// [`GraphStore`] over a `HashMap` behind a read/write lock
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: RwLock<HashMap<String, Node>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every node, sorted by id
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<_> = self.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_dummy(nodes: &mut HashMap<String, Node>, id: &str) {
    if !nodes.contains_key(id) {
        nodes.insert(id.to_string(), Node::dummy(id));
    }
}

impl GraphStore for MemoryGraph {
    fn upsert(&self, id: &str, content: NodeContent) -> Node {
        let now = Utc::now();
        let mut nodes = self.write();

        let mut seen = HashSet::new();
        let targets: Vec<String> = content
            .links
            .into_iter()
            .filter(|target| seen.insert(target.clone()))
            .collect();

        let node = nodes
            .entry(id.to_string())
            .or_insert_with(|| Node::dummy(id));

        let kept_redirects: Vec<Edge> = node
            .edges
            .drain(..)
            .filter(|edge| edge.replaces().is_some_and(|r| seen.contains(r)))
            .collect();

        node.edges = targets.iter().cloned().map(Edge::from_source).collect();
        node.edges.extend(kept_redirects);
        node.title = content.title;
        node.keywords = content.keywords;
        node.source_modified_at = content.source_modified_at;
        node.state = NodeState::Populated;
        node.redirect_target = None;
        node.modified_at = now;
        let snapshot = node.clone();

        for target in &targets {
            ensure_dummy(&mut nodes, target);
        }
        for edge in &snapshot.edges {
            ensure_dummy(&mut nodes, &edge.target);
        }

        snapshot
    }

    fn mark_redirected(&self, id: &str, target: &str) -> Option<Node> {
        let mut nodes = self.write();
        let node = nodes.get_mut(id)?;

        node.state = NodeState::Redirected;
        node.redirect_target = Some(target.to_string());
        node.edges.clear();
        node.modified_at = Utc::now();
        let snapshot = node.clone();

        ensure_dummy(&mut nodes, target);
        Some(snapshot)
    }

    fn add_redirect_edge(&self, id: &str, replaces: &str, target: &str) -> bool {
        let mut nodes = self.write();
        let Some(node) = nodes.get_mut(id) else {
            return false;
        };
        if !node.has_source_edge(replaces) {
            return false;
        }

        let edge = Edge::from_redirect(target, replaces);
        if !node.edges.contains(&edge) {
            node.edges.push(edge);
            node.modified_at = Utc::now();
        }

        ensure_dummy(&mut nodes, target);
        true
    }

    fn remove(&self, id: &str) -> Option<Node> {
        let mut nodes = self.write();
        let removed = nodes.remove(id)?;

        for node in nodes.values_mut() {
            node.edges
                .retain(|edge| edge.target != id && edge.replaces() != Some(id));
        }

        Some(removed)
    }

    fn is_stale(&self, id: &str, max_days: u32) -> bool {
        let nodes = self.read();
        match nodes.get(id) {
            Some(node) if node.state.is_crawled() => {
                chrono::Duration::try_days(i64::from(max_days))
                    .and_then(|age| Utc::now().checked_sub_signed(age))
                    .map_or(false, |cutoff| node.modified_at < cutoff)
            }
            _ => true,
        }
    }

    fn get(&self, id: &str) -> Option<Node> {
        self.read().get(id).cloned()
    }

    fn node_count(&self) -> usize {
        self.read().len()
    }

    fn edge_count(&self) -> usize {
        self.read().values().map(|n| n.edges.len()).sum()
    }

    fn incoming(&self, id: &str) -> Vec<String> {
        let mut ids: Vec<_> = self
            .read()
            .values()
            .filter(|node| node.links_to(id))
            .map(|node| node.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeProvenance;

    fn content(links: &[&str]) -> NodeContent {
        NodeContent {
            title: Some("Title".to_string()),
            keywords: vec!["rust".to_string()],
            source_modified_at: None,
            links: links.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn source_targets(node: &Node) -> Vec<String> {
        let mut targets: Vec<_> = node.source_targets().map(str::to_string).collect();
        targets.sort();
        targets
    }

    #[test]
    fn test_upsert_creates_populated_node_and_dummies() {
        let graph = MemoryGraph::new();
        let node = graph.upsert("p", content(&["a", "b"]));

        assert_eq!(node.state, NodeState::Populated);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.get("a").unwrap().state, NodeState::Dummy);
        assert_eq!(graph.get("b").unwrap().state, NodeState::Dummy);
    }

    #[test]
    fn test_upsert_replaces_source_edges() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["A", "B"]));
        let node = graph.upsert("p", content(&["A", "C"]));

        assert_eq!(source_targets(&node), vec!["A", "C"]);
        assert_eq!(graph.get("B").unwrap().state, NodeState::Dummy);
        assert_eq!(graph.get("C").unwrap().state, NodeState::Dummy);
    }

    #[test]
    fn test_upsert_keeps_identity() {
        let graph = MemoryGraph::new();
        let first = graph.upsert("p", content(&[]));
        let second = graph.upsert("p", content(&["x"]));

        assert_eq!(first.created_at, second.created_at);
        assert!(second.modified_at >= first.modified_at);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_upsert_dedupes_links() {
        let graph = MemoryGraph::new();
        let node = graph.upsert("p", content(&["a", "a", "b"]));
        assert_eq!(node.edges.len(), 2);
    }

    #[test]
    fn test_dummy_is_populated_by_upsert() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["a"]));
        let created = graph.get("a").unwrap().created_at;

        let a = graph.upsert("a", content(&[]));
        assert_eq!(a.state, NodeState::Populated);
        assert_eq!(a.created_at, created);
    }

    #[test]
    fn test_redirect_edge_pruned_with_source_edge() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["old", "other"]));
        graph.mark_redirected("old", "new");
        assert!(graph.add_redirect_edge("p", "old", "new"));

        let node = graph.upsert("p", content(&["old", "other"]));
        assert!(node.edges.contains(&Edge::from_redirect("new", "old")));

        let node = graph.upsert("p", content(&["other"]));
        assert!(node.edges.iter().all(|e| e.is_from_source()));
        assert_eq!(source_targets(&node), vec!["other"]);
    }

    #[test]
    fn test_add_redirect_edge_requires_source_edge() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["a"]));

        assert!(!graph.add_redirect_edge("p", "missing", "new"));
        assert!(!graph.add_redirect_edge("absent", "a", "new"));
        assert!(graph.get("new").is_none());

        assert!(graph.add_redirect_edge("p", "a", "new"));
        assert!(graph.add_redirect_edge("p", "a", "new"));
        let node = graph.get("p").unwrap();
        assert_eq!(node.edges.len(), 2);
        assert_eq!(
            node.edges[1].provenance,
            EdgeProvenance::FromRedirect {
                replaces: "a".to_string()
            }
        );
        assert_eq!(graph.get("new").unwrap().state, NodeState::Dummy);
    }

    #[test]
    fn test_mark_redirected_clears_edges() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["a", "b"]));

        let node = graph.mark_redirected("p", "q").unwrap();
        assert_eq!(node.state, NodeState::Redirected);
        assert_eq!(node.redirect_target.as_deref(), Some("q"));
        assert!(node.edges.is_empty());
        assert!(graph.get("q").is_some());
    }

    #[test]
    fn test_upsert_after_redirect_repopulates() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&[]));
        graph.mark_redirected("p", "q");

        let node = graph.upsert("p", content(&["a"]));
        assert_eq!(node.state, NodeState::Populated);
        assert_eq!(node.redirect_target, None);
    }

    #[test]
    fn test_absent_ids_are_noops() {
        let graph = MemoryGraph::new();
        assert!(graph.mark_redirected("nope", "x").is_none());
        assert!(graph.remove("nope").is_none());
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_remove_drops_incoming_edges() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["a", "b"]));
        graph.upsert("q", content(&["a"]));
        assert_eq!(graph.incoming("a"), vec!["p", "q"]);

        graph.remove("a");
        assert!(graph.get("a").is_none());
        assert!(graph.incoming("a").is_empty());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_is_stale() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&["a"]));

        assert!(graph.is_stale("absent", 7));
        assert!(graph.is_stale("a", 7));
        assert!(!graph.is_stale("p", 7));

        graph.write().get_mut("p").unwrap().modified_at = Utc::now() - chrono::Duration::days(8);
        assert!(graph.is_stale("p", 7));
        assert!(!graph.is_stale("p", 9));
    }

    #[test]
    fn test_is_stale_with_unrepresentable_age() {
        let graph = MemoryGraph::new();
        graph.upsert("p", content(&[]));
        assert!(!graph.is_stale("p", u32::MAX));
        assert!(graph.is_stale("absent", u32::MAX));
    }
}
