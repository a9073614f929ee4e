//! Payloads carried by pipeline events
//!
//! Every payload is plain data and serializable so an external transport can
//! carry it between processes.

use crate::fetch::FetchResponse;
use crate::graph::Node;
use crate::url::{fetch_target, normalize_url};
use crate::UrlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Options that travel with a crawl from its seed to every page it reaches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlOptions {
    /// Link depth beyond which discovered pages are not crawled
    pub max_depth: u32,
    /// Outgoing links kept per page
    pub max_links: usize,
    /// User agent sent with every request
    pub user_agent: String,
    /// Accept header sent with every page request
    pub accept: String,
}

/// A link target in both of its forms
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageLink {
    /// Canonical form, used as the graph node id
    pub id: String,
    /// URL to request, as linked
    pub url: Url,
}

impl PageLink {
    /// Builds both forms of a raw absolute link
    pub fn parse(raw: &str) -> std::result::Result<Self, UrlError> {
        let url = fetch_target(raw)?;
        let id = normalize_url(url.as_str())?.to_string();
        Ok(Self { id, url })
    }
}

/// A request to crawl one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// URL to request, as linked; its canonical form is [`Self::node_id`]
    pub url: Url,
    pub options: CrawlOptions,
    /// Distance from the seed; seeds are depth 0
    pub depth: u32,
    /// Node id of the page that linked here, if any
    pub referrer: Option<String>,
    /// How many times this URL has been attempted in the current chain
    pub attempt: u32,
}

impl CrawlRequest {
    /// Creates a depth-0 request for a seed URL
    pub fn seed(url: Url, options: CrawlOptions) -> Self {
        Self {
            url,
            options,
            depth: 0,
            referrer: None,
            attempt: 0,
        }
    }

    /// Creates the request for a page linked from this one
    pub fn child(&self, url: Url) -> Self {
        Self {
            url,
            options: self.options.clone(),
            depth: self.depth + 1,
            referrer: Some(self.node_id()),
            attempt: 0,
        }
    }

    /// Request for the target of a redirect: same depth and referrer
    pub fn redirected(&self, url: Url) -> Self {
        Self {
            url,
            attempt: 0,
            ..self.clone()
        }
    }

    /// Same request, one attempt later
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Graph node id of the target
    pub fn node_id(&self) -> String {
        normalize_url(self.url.as_str())
            .map(|id| id.to_string())
            .unwrap_or_else(|_| self.url.to_string())
    }
}

/// What the scrape stage extracted from a fetched page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub title: Option<String>,
    pub keywords: Vec<String>,
    /// Absolute link targets as found in the page, not yet normalized
    pub links: Vec<String>,
    /// Modification time declared by the server
    pub source_modified_at: Option<DateTime<Utc>>,
}

/// A scraped page whose links carry their node ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPage {
    pub title: Option<String>,
    pub keywords: Vec<String>,
    /// Link targets with distinct node ids, in document order
    pub links: Vec<PageLink>,
    pub source_modified_at: Option<DateTime<Utc>>,
}

/// The graph mutation a crawl result calls for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GraphUpdate {
    /// Page content was fetched
    Page { page: NormalizedPage },
    /// The URL answered with a redirect to `target`
    Redirect { target: PageLink },
}

/// Payload of `scrape-requested`: the fetch envelope for a crawl request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub request: CrawlRequest,
    pub response: FetchResponse,
}

/// Payload of `normalize-requested`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeRequest {
    pub request: CrawlRequest,
    pub page: ScrapedPage,
}

/// Payload of `graph-update-requested`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphUpdateRequest {
    pub request: CrawlRequest,
    pub update: GraphUpdate,
}

/// Payload of `node-added`: the node as it stands after the mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAdded {
    pub node: Node,
}
