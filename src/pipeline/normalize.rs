//! Normalize stage: pairs raw link strings with their node ids

use crate::events::{
    Event, EventHandler, EventPayload, GraphUpdate, GraphUpdateRequest, NormalizedPage, PageLink,
};
use crate::pipeline::PipelineContext;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Normalizes links, dropping failures, duplicate node ids and self-links
///
/// Document order is kept; the first link to a node decides its fetch URL.
/// At most `max_links` survive.
pub fn normalize_links(self_id: &str, links: &[String], max_links: usize) -> Vec<PageLink> {
    let mut seen = HashSet::new();
    links
        .iter()
        .filter_map(|link| match PageLink::parse(link) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                trace!(link = %link, error = %e, "Dropping link");
                None
            }
        })
        .filter(|link| link.id != self_id)
        .filter(|link| seen.insert(link.id.clone()))
        .take(max_links)
        .collect()
}

/// Handles `normalize-requested`, publishing `graph-update-requested`
pub struct NormalizeStage {
    context: Arc<PipelineContext>,
}

impl NormalizeStage {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EventHandler for NormalizeStage {
    async fn handle(&self, event: Arc<Event>, cancel: CancellationToken) -> Result<()> {
        let EventPayload::NormalizeRequested(scraped) = &event.payload else {
            return Ok(());
        };

        let request = &scraped.request;
        let page = &scraped.page;
        let links = normalize_links(&request.node_id(), &page.links, request.options.max_links);

        let next = Event::graph_update_requested(GraphUpdateRequest {
            request: request.clone(),
            update: GraphUpdate::Page {
                page: NormalizedPage {
                    title: page.title.clone(),
                    keywords: page.keywords.clone(),
                    links,
                    source_modified_at: page.source_modified_at,
                },
            },
        });
        self.context.dispatcher.publish(next, None, &cancel).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "normalize"
    }
}
