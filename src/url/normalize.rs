//! Node identity and fetch targets
//!
//! A link has two forms. The fetch target is the URL as linked, minus its
//! fragment: this is what gets requested and checked against robots.txt.
//! The node id is the canonical form used as graph identity, so that
//! `https://WWW.Example.com/a/?utm_source=x#top` and `https://example.com/a`
//! land on the same node.

use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Query parameters that only track the visitor and never select content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

/// Parses an absolute HTTP(S) URL with a host
fn parse_web_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                other
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }
    Ok(url)
}

/// The URL to request for a link: validated, fragment dropped, otherwise
/// exactly as linked
///
/// ```
/// use sumi_linkgraph::url::fetch_target;
///
/// let url = fetch_target("https://www.example.com/a/?q=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/a/?q=1");
/// ```
pub fn fetch_target(raw: &str) -> Result<Url, UrlError> {
    let mut url = parse_web_url(raw)?;
    url.set_fragment(None);
    Ok(url)
}

/// Canonical form of a URL, used as its graph node id
///
/// - scheme and port are kept; http and https pages are distinct nodes
/// - host is lowercased and a leading `www.` dropped
/// - empty path segments and a trailing slash are dropped (root stays `/`)
/// - fragment is dropped
/// - tracking parameters are dropped, the rest sorted and re-encoded
///
/// ```
/// use sumi_linkgraph::url::normalize_url;
///
/// let url = normalize_url("https://WWW.EXAMPLE.COM/page/").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_url(raw: &str) -> Result<Url, UrlError> {
    let mut url = parse_web_url(raw)?;

    let host = url
        .host_str()
        .map(canonical_host)
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = canonical_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let query = canonical_query(&url);
    url.set_query(query.as_deref());

    Ok(url)
}

fn canonical_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    }
}

/// Collapses empty segments and drops the trailing slash
///
/// Dot segments are already resolved by the URL parser.
fn canonical_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Sorted, re-encoded query without tracking parameters; `None` if nothing
/// is left
fn canonical_query(url: &Url) -> Option<String> {
    url.query()?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort();

    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish(),
    )
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
