//! Scrape stage: extracts title, keywords and links from a fetched page
//!
//! # Link extraction rules
//!
//! **Include:**
//! - `<a href="...">` anywhere in the document
//! - `<link rel="canonical" href="...">`
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` and `data:` links
//! - fragment-only links
//! - anything that does not resolve to HTTP(S)
//!
//! `rel="nofollow"` links are followed.

use crate::events::{Event, EventHandler, EventPayload, NormalizeRequest, ScrapedPage};
use crate::fetch::FetchResponse;
use crate::pipeline::PipelineContext;
use crate::{Result, SumiError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Turns a fetched page into its title, keywords and outgoing links
pub trait PageScraper: Send + Sync {
    fn scrape(&self, base: &Url, page: &FetchResponse) -> Result<ScrapedPage>;
}

/// [`PageScraper`] for HTML documents
///
/// Non-HTML bodies yield a page with no title and no links.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlScraper;

impl PageScraper for HtmlScraper {
    fn scrape(&self, base: &Url, page: &FetchResponse) -> Result<ScrapedPage> {
        let is_html = page
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("html"))
            .unwrap_or(true);

        if !is_html {
            return Ok(ScrapedPage {
                title: None,
                keywords: Vec::new(),
                links: Vec::new(),
                source_modified_at: page.last_modified,
            });
        }

        let document = Html::parse_document(&page.body);
        Ok(ScrapedPage {
            title: extract_title(&document),
            keywords: extract_keywords(&document),
            links: extract_links(&document, base).map_err(|message| SumiError::Scrape {
                url: base.to_string(),
                message,
            })?,
            source_modified_at: page.last_modified,
        })
    }
}

fn selector(css: &str) -> std::result::Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {}: {}", css, e))
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Comma-separated `<meta name="keywords">` content
fn extract_keywords(document: &Html) -> Vec<String> {
    let Ok(meta_selector) = Selector::parse("meta[name][content]") else {
        return Vec::new();
    };

    let mut keywords = Vec::new();
    for element in document.select(&meta_selector) {
        let is_keywords = element
            .value()
            .attr("name")
            .is_some_and(|name| name.eq_ignore_ascii_case("keywords"));
        if !is_keywords {
            continue;
        }

        if let Some(content) = element.value().attr("content") {
            for keyword in content.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                if !keywords.iter().any(|k: &String| k == keyword) {
                    keywords.push(keyword.to_string());
                }
            }
        }
    }
    keywords
}

fn extract_links(document: &Html, base: &Url) -> std::result::Result<Vec<String>, String> {
    let mut links = Vec::new();

    for element in document.select(&selector("a[href]")?) {
        if element.value().attr("download").is_some() {
            continue;
        }
        if let Some(absolute) = element.value().attr("href").and_then(|h| resolve_link(h, base)) {
            links.push(absolute);
        }
    }

    for element in document.select(&selector("link[rel='canonical'][href]")?) {
        if let Some(absolute) = element.value().attr("href").and_then(|h| resolve_link(h, base)) {
            links.push(absolute);
        }
    }

    Ok(links)
}

/// Resolves `href` against `base`, or `None` if the link is not followed
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

/// Handles `scrape-requested`, publishing `normalize-requested`
pub struct ScrapeStage {
    context: Arc<PipelineContext>,
}

impl ScrapeStage {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EventHandler for ScrapeStage {
    async fn handle(&self, event: Arc<Event>, cancel: CancellationToken) -> Result<()> {
        let EventPayload::ScrapeRequested(fetched) = &event.payload else {
            return Ok(());
        };

        let base = Url::parse(&fetched.response.url)?;
        let page = self.context.scraper.scrape(&base, &fetched.response)?;
        debug!(
            url = %base,
            links = page.links.len(),
            keywords = page.keywords.len(),
            "Scraped page"
        );

        let next = Event::normalize_requested(NormalizeRequest {
            request: fetched.request.clone(),
            page,
        });
        self.context.dispatcher.publish(next, None, &cancel).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "scrape"
    }
}
