//! Crawl pipeline wiring
//!
//! Each stage is an [`EventHandler`] that consumes one event kind and
//! publishes the next:
//!
//! | Stage | Consumes | Publishes |
//! |-------|----------|-----------|
//! | [`CrawlStage`] | `crawl-requested` | `scrape-requested`, `graph-update-requested` (redirects), `crawl-requested` (retries, politeness) |
//! | [`ScrapeStage`] | `scrape-requested` | `normalize-requested` |
//! | [`NormalizeStage`] | `normalize-requested` | `graph-update-requested` |
//! | [`GraphStage`] | `graph-update-requested` | `node-added`, `crawl-requested` (stale children) |
//!
//! Shared components travel in one [`PipelineContext`].

mod crawl;
mod graph_update;
mod normalize;
mod politeness;
mod scrape;

pub use crawl::CrawlStage;
pub use graph_update::GraphStage;
pub use normalize::{normalize_links, NormalizeStage};
pub use politeness::PolitenessGate;
pub use scrape::{HtmlScraper, PageScraper, ScrapeStage};

use crate::cache::Cache;
use crate::config::{Config, CrawlConfig};
use crate::events::{
    AdmissionControl, CrawlOptions, CrawlRequest, DispatchOutcome, Dispatcher, Event,
    EventHandler, EventKind,
};
use crate::fetch::Fetcher;
use crate::graph::{GraphStore, MemoryGraph};
use crate::robots::RobotsCache;
use crate::url::fetch_target;
use crate::Result;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Components shared by every pipeline stage
pub struct PipelineContext {
    pub dispatcher: Arc<Dispatcher>,
    pub fetcher: Fetcher,
    pub robots: RobotsCache,
    pub graph: Arc<dyn GraphStore>,
    pub scraper: Arc<dyn PageScraper>,
    pub politeness: PolitenessGate,
    pub crawl: CrawlConfig,
    /// Body bytes kept per fetched page
    pub max_bytes: usize,
    /// Default options for seeds
    pub options: CrawlOptions,
    /// Node ids with a crawl already requested in this process
    in_flight: DashSet<String>,
}

impl PipelineContext {
    /// Builds every component from configuration over the given cache
    pub fn from_config(config: &Config, cache: Cache) -> Result<Self> {
        let fetcher = Fetcher::new(config, cache.clone())?;
        let user_agent = config.user_agent.user_agent_string();
        let robots = RobotsCache::new(
            fetcher.clone(),
            cache,
            config.robots.ttl(),
            user_agent.clone(),
        );

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(AdmissionControl::from_config(
                &config.dispatch,
            ))),
            fetcher,
            robots,
            graph: Arc::new(MemoryGraph::new()),
            scraper: Arc::new(HtmlScraper),
            politeness: PolitenessGate::new(Duration::from_millis(config.crawl.min_host_delay_ms)),
            crawl: config.crawl.clone(),
            max_bytes: config.fetch.max_bytes,
            options: CrawlOptions {
                max_depth: config.crawl.max_depth,
                max_links: config.crawl.max_links,
                user_agent,
                accept: config.fetch.accept.clone(),
            },
            in_flight: DashSet::new(),
        })
    }

    /// Replaces the graph store
    pub fn with_graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = graph;
        self
    }

    /// Replaces the page scraper
    pub fn with_scraper(mut self, scraper: Arc<dyn PageScraper>) -> Self {
        self.scraper = scraper;
        self
    }

    /// Marks a node id as requested; false if it already was
    pub(crate) fn claim(&self, id: &str) -> bool {
        self.in_flight.insert(id.to_string())
    }

    /// Clears the requested mark once the graph has recorded the node
    pub(crate) fn release(&self, id: &str) {
        self.in_flight.remove(id);
    }
}

/// The registered set of pipeline stages
pub struct Pipeline {
    context: Arc<PipelineContext>,
    handlers: Vec<(EventKind, Arc<dyn EventHandler>)>,
}

impl Pipeline {
    /// Subscribes every stage to the context's dispatcher
    pub fn register(context: Arc<PipelineContext>) -> Self {
        let handlers: Vec<(EventKind, Arc<dyn EventHandler>)> = vec![
            (
                EventKind::CrawlRequested,
                Arc::new(CrawlStage::new(context.clone())),
            ),
            (
                EventKind::ScrapeRequested,
                Arc::new(ScrapeStage::new(context.clone())),
            ),
            (
                EventKind::NormalizeRequested,
                Arc::new(NormalizeStage::new(context.clone())),
            ),
            (
                EventKind::GraphUpdateRequested,
                Arc::new(GraphStage::new(context.clone())),
            ),
        ];

        for (kind, handler) in &handlers {
            context.dispatcher.subscribe(*kind, handler.clone());
        }
        debug!(stages = handlers.len(), "Pipeline registered");

        Self { context, handlers }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Removes every stage from the dispatcher
    pub fn unregister(&self) {
        for (kind, handler) in &self.handlers {
            self.context.dispatcher.unsubscribe(*kind, handler);
        }
    }

    /// Resolves once the bus has had nothing running or scheduled for
    /// `idle_for`
    ///
    /// Scheduled retries and politeness delays count as work, so a long
    /// `Crawl-delay` keeps the crawl alive.
    pub async fn wait_until_idle(&self, idle_for: Duration) {
        let poll = idle_for.min(Duration::from_millis(250)).max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(poll);
        let mut idle_since: Option<tokio::time::Instant> = None;

        loop {
            ticker.tick().await;
            let busy = self.context.dispatcher.in_flight() > 0;

            match (busy, idle_since) {
                (true, _) => idle_since = None,
                (false, None) => idle_since = Some(tokio::time::Instant::now()),
                (false, Some(since)) if since.elapsed() >= idle_for => return,
                (false, Some(_)) => {}
            }
        }
    }

    /// Publishes a depth-0 crawl request for `url` with the default options
    pub async fn seed(&self, url: &str, cancel: &CancellationToken) -> Result<DispatchOutcome> {
        let request = CrawlRequest::seed(fetch_target(url)?, self.context.options.clone());
        self.context.claim(&request.node_id());
        Ok(self
            .context
            .dispatcher
            .publish(Event::crawl_requested(request), None, cancel)
            .await)
    }
}
