//! Graph stage: applies crawl results to the link graph

use crate::events::{
    CrawlRequest, Event, EventHandler, EventPayload, GraphUpdate, NodeAdded, NormalizedPage,
    PageLink,
};
use crate::graph::{Node, NodeContent};
use crate::pipeline::PipelineContext;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Handles `graph-update-requested`, publishing `node-added` and crawl
/// requests for stale children
pub struct GraphStage {
    context: Arc<PipelineContext>,
}

impl GraphStage {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self { context }
    }

    fn apply_page(&self, request: &CrawlRequest, page: &NormalizedPage) -> Node {
        self.context.graph.upsert(
            &request.node_id(),
            NodeContent {
                title: page.title.clone(),
                keywords: page.keywords.clone(),
                source_modified_at: page.source_modified_at,
                links: page.links.iter().map(|link| link.id.clone()).collect(),
            },
        )
    }

    /// Records a redirect; returns the alias node if it was in the graph
    fn apply_redirect(&self, request: &CrawlRequest, target: &str) -> Option<Node> {
        let id = request.node_id();
        let graph = &self.context.graph;

        let node = graph.mark_redirected(&id, target);
        if let Some(referrer) = &request.referrer {
            if !graph.add_redirect_edge(referrer, &id, target) {
                trace!(referrer = %referrer, id = %id, "Referrer no longer links here");
            }
        }
        node
    }

    /// Targets that should be crawled next, as requests
    fn follow_ups(&self, request: &CrawlRequest, links: &[PageLink]) -> Vec<CrawlRequest> {
        if request.depth >= request.options.max_depth {
            return Vec::new();
        }

        let stale_after = self.context.crawl.stale_after_days;
        links
            .iter()
            .filter(|link| self.context.graph.is_stale(&link.id, stale_after))
            .filter(|link| self.context.claim(&link.id))
            .map(|link| request.child(link.url.clone()))
            .collect()
    }

    async fn publish_all(&self, events: Vec<Event>, cancel: &CancellationToken) {
        for event in events {
            self.context.dispatcher.publish(event, None, cancel).await;
        }
    }
}

#[async_trait]
impl EventHandler for GraphStage {
    async fn handle(&self, event: Arc<Event>, cancel: CancellationToken) -> Result<()> {
        let EventPayload::GraphUpdateRequested(update) = &event.payload else {
            return Ok(());
        };
        let request = &update.request;
        let id = request.node_id();
        self.context.release(&id);

        let mut events = Vec::new();
        match &update.update {
            GraphUpdate::Page { page } => {
                let node = self.apply_page(request, page);
                debug!(id = %id, edges = node.edges.len(), "Node populated");
                events.push(Event::node_added(NodeAdded { node }));

                for child in self.follow_ups(request, &page.links) {
                    events.push(Event::crawl_requested(child));
                }
            }
            GraphUpdate::Redirect { target } => {
                if let Some(node) = self.apply_redirect(request, &target.id) {
                    debug!(id = %id, target = %target.id, "Node redirected");
                    events.push(Event::node_added(NodeAdded { node }));
                }

                let stale = self
                    .context
                    .graph
                    .is_stale(&target.id, self.context.crawl.stale_after_days);
                if stale && self.context.claim(&target.id) {
                    events.push(Event::crawl_requested(request.redirected(target.url.clone())));
                }
            }
        }

        self.publish_all(events, &cancel).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "graph"
    }
}
