//! Integration tests for the link graph through the `GraphStore` trait

use std::sync::Arc;
use sumi_linkgraph::graph::{GraphStore, MemoryGraph, NodeContent, NodeState};

const A: &str = "https://example.com/a";
const B: &str = "https://example.com/b";
const C: &str = "https://example.com/c";
const ROOT: &str = "https://example.com/";

fn store() -> Arc<dyn GraphStore> {
    Arc::new(MemoryGraph::new())
}

fn links(targets: &[&str]) -> NodeContent {
    NodeContent {
        title: Some("Page".to_string()),
        links: targets.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// Every edge target must exist as a node
fn assert_closed(graph: &MemoryGraph) {
    for node in graph.nodes() {
        for edge in &node.edges {
            assert!(
                graph.get(&edge.target).is_some(),
                "{} links to missing {}",
                node.id,
                edge.target
            );
            if let Some(replaces) = edge.replaces() {
                assert!(node.has_source_edge(replaces));
            }
        }
        if node.state == NodeState::Redirected {
            assert!(node.edges.is_empty());
        }
    }
}

#[test]
fn test_redirect_lifecycle() {
    let graph = store();

    graph.upsert(ROOT, links(&[A, B]));
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.get(A).unwrap().state, NodeState::Dummy);

    // A turns out to redirect to C
    let alias = graph.mark_redirected(A, C).unwrap();
    assert_eq!(alias.state, NodeState::Redirected);
    assert_eq!(alias.redirect_target.as_deref(), Some(C));
    assert!(graph.add_redirect_edge(ROOT, A, C));
    assert_eq!(graph.incoming(C), vec![ROOT.to_string()]);

    // Root stops linking A: the redirect edge goes with it
    graph.upsert(ROOT, links(&[B]));
    let root = graph.get(ROOT).unwrap();
    assert!(!root.links_to(A));
    assert!(!root.links_to(C));
    assert!(graph.incoming(C).is_empty());
}

#[test]
fn test_redirect_edge_requires_source_edge() {
    let graph = store();
    graph.upsert(ROOT, links(&[B]));
    assert!(!graph.add_redirect_edge(ROOT, A, C));
    assert!(!graph.add_redirect_edge("https://example.com/missing", A, C));
    assert!(graph.get(C).is_none());
}

#[test]
fn test_staleness() {
    let graph = store();
    assert!(graph.is_stale(A, 7));

    graph.upsert(ROOT, links(&[A]));
    assert!(!graph.is_stale(ROOT, 7));
    assert!(graph.is_stale(A, 7));
}

#[test]
fn test_remove_drops_incoming_edges() {
    let graph = store();
    graph.upsert(ROOT, links(&[A, B]));
    graph.upsert(B, links(&[A]));

    let removed = graph.remove(A).unwrap();
    assert_eq!(removed.id, A);
    assert!(graph.get(A).is_none());
    assert!(graph.incoming(A).is_empty());
    assert_eq!(graph.edge_count(), 1);
    assert!(graph.remove(A).is_none());
}

#[test]
fn test_repopulating_alias_clears_redirect() {
    let graph = store();
    graph.upsert(ROOT, links(&[A]));
    graph.mark_redirected(A, C);

    let node = graph.upsert(A, links(&[B]));
    assert_eq!(node.state, NodeState::Populated);
    assert_eq!(node.redirect_target, None);
    assert!(node.has_source_edge(B));
}

#[test]
fn test_concurrent_upserts_keep_graph_closed() {
    let graph = Arc::new(MemoryGraph::new());

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let graph = graph.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let id = format!("https://example.com/{}/{}", worker, i);
                    let next = format!("https://example.com/{}/{}", (worker + 1) % 8, i);
                    graph.upsert(&id, links(&[next.as_str(), ROOT]));
                    if i % 10 == 0 {
                        graph.remove(&next);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_closed(&graph);
}
