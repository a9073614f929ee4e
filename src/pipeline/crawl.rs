//! Crawl stage: robots check, politeness, fetch and routing of the result

use crate::events::{
    CrawlRequest, Event, EventHandler, EventPayload, FetchedPage, GraphUpdate, GraphUpdateRequest,
    PageLink,
};
use crate::fetch::{FetchRequest, FetchResponse};
use crate::pipeline::PipelineContext;
use crate::url::extract_domain;
use crate::{Result, SumiError, UrlError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on the fallback backoff used when a throttled response carries
/// no `Retry-After`
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Longest wait before a rescheduled crawl, whatever the server asked for
const MAX_SCHEDULE: Duration = Duration::from_secs(24 * 60 * 60);

/// Handles `crawl-requested`
pub struct CrawlStage {
    context: Arc<PipelineContext>,
}

impl CrawlStage {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self { context }
    }

    /// Backoff for a throttled response without a server directive:
    /// the host delay doubled per attempt
    fn fallback_backoff(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.context.crawl.min_host_delay_ms.max(1));
        base.saturating_mul(2u32.saturating_pow(attempt + 1))
            .min(MAX_BACKOFF)
    }

    fn schedule(&self, event: Event, after: Duration, cancel: &CancellationToken) {
        let after = chrono::Duration::from_std(after.min(MAX_SCHEDULE))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        let at = now.checked_add_signed(after).unwrap_or(now);
        self.context
            .dispatcher
            .spawn_publish(event, Some(at), cancel.clone());
    }

    async fn route(
        &self,
        request: &CrawlRequest,
        response: FetchResponse,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = &request.url;

        if response.is_retryable() {
            if request.attempt + 1 >= self.context.crawl.max_attempts {
                warn!(url = %url, status = response.status, attempts = request.attempt + 1, "Giving up after repeated throttling");
                return Ok(());
            }
            let wait = response
                .retry_after
                .unwrap_or_else(|| self.fallback_backoff(request.attempt));
            info!(url = %url, status = response.status, wait_ms = wait.as_millis() as u64, "Retry scheduled");
            self.schedule(Event::crawl_requested(request.retry()), wait, cancel);
            return Ok(());
        }

        if response.is_redirect() {
            let Some(location) = response.location.as_deref() else {
                warn!(url = %url, status = response.status, "Redirect without Location");
                return Ok(());
            };
            let target = PageLink::parse(location)?;
            debug!(url = %url, target = %target.url, "Redirect");

            let next = Event::graph_update_requested(GraphUpdateRequest {
                request: request.clone(),
                update: GraphUpdate::Redirect { target },
            });
            self.context.dispatcher.publish(next, None, cancel).await;
            return Ok(());
        }

        if !response.is_success() {
            info!(url = %url, status = response.status, "Not crawled: unsuccessful status");
            return Ok(());
        }
        if !response.acceptable {
            info!(url = %url, content_type = ?response.content_type, "Not crawled: content type not accepted");
            return Ok(());
        }

        let next = Event::scrape_requested(FetchedPage {
            request: request.clone(),
            response,
        });
        self.context.dispatcher.publish(next, None, cancel).await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for CrawlStage {
    async fn handle(&self, event: Arc<Event>, cancel: CancellationToken) -> Result<()> {
        let EventPayload::CrawlRequested(request) = &event.payload else {
            return Ok(());
        };
        let ctx = &self.context;
        let url = &request.url;

        if request.depth > request.options.max_depth {
            debug!(url = %url, depth = request.depth, "Beyond max depth");
            return Ok(());
        }

        let agent = Some(request.options.user_agent.as_str());
        if !ctx.robots.is_permitted(url, agent, &cancel).await {
            info!(url = %url, "Not crawled: disallowed by robots.txt");
            return Ok(());
        }

        let host = extract_domain(url).ok_or(UrlError::MissingDomain)?;
        let crawl_delay = ctx.robots.crawl_delay(url, agent, &cancel).await;
        if let Some(wait) = ctx.politeness.try_acquire(&host, crawl_delay) {
            debug!(url = %url, wait_ms = wait.as_millis() as u64, "Host not ready, rescheduling");
            self.schedule(Event::crawl_requested(request.clone()), wait, &cancel);
            return Ok(());
        }

        let fetch_request = FetchRequest::new(
            url.clone(),
            request.options.user_agent.clone(),
            request.options.accept.clone(),
        )
        .with_max_bytes(ctx.max_bytes);

        let response = match ctx.fetcher.fetch(&fetch_request, &cancel).await {
            Ok(response) => response,
            Err(SumiError::Cancelled) => {
                debug!(url = %url, "Fetch cancelled");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        debug!(
            url = %url,
            status = response.status,
            bytes = response.body_bytes(),
            truncated = response.truncated,
            cached = response.from_cache,
            "Fetched"
        );

        self.route(request, response, &cancel).await
    }

    fn name(&self) -> &str {
        "crawl"
    }
}
