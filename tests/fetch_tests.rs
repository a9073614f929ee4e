//! Integration tests for the cache-aware fetcher against a mock HTTP server

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sumi_linkgraph::cache::{Cache, CacheBackend, CacheError, CacheResult};
use sumi_linkgraph::config::Config;
use sumi_linkgraph::fetch::{FetchRequest, Fetcher};
use sumi_linkgraph::SumiError;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UA: &str = "TestBot/1.0";

fn fetcher() -> Fetcher {
    Fetcher::new(&Config::default(), Cache::in_memory("test")).unwrap()
}

fn request(server: &MockServer, route: &str, accept: &str) -> FetchRequest {
    let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
    FetchRequest::new(url, UA, accept)
}

fn html(body: impl Into<Vec<u8>>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

#[tokio::test]
async fn test_body_truncated_at_max_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html(vec![b'a'; 2 * 1024 * 1024]))
        .mount(&server)
        .await;

    let response = fetcher()
        .fetch(&request(&server, "/big", "text/html"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(response.truncated);
    assert_eq!(response.body_bytes(), 1_048_576);
}

#[tokio::test]
async fn test_small_body_not_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><title>Hi</title></html>"))
        .mount(&server)
        .await;

    let response = fetcher()
        .fetch(&request(&server, "/", "text/html"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!response.truncated);
    assert!(response.acceptable);
    assert!(!response.from_cache);
    assert_eq!(response.body, "<html><title>Hi</title></html>");
    assert_eq!(response.content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn test_unacceptable_type_has_empty_body_and_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("%PDF-1.4", "application/pdf")
                .insert_header("cache-control", "max-age=600"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let req = request(&server, "/doc.pdf", "text/html");
    let cancel = CancellationToken::new();

    let first = fetcher.fetch(&req, &cancel).await.unwrap();
    assert!(!first.acceptable);
    assert!(first.body.is_empty());

    let second = fetcher.fetch(&req, &cancel).await.unwrap();
    assert!(!second.from_cache);
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(html("fresh").insert_header("cache-control", "public, max-age=600"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let req = request(&server, "/cached", "text/html");
    let cancel = CancellationToken::new();

    let first = fetcher.fetch(&req, &cancel).await.unwrap();
    let second = fetcher.fetch(&req, &cancel).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.body, "fresh");
    assert_eq!(second.status, first.status);
}

#[tokio::test]
async fn test_different_accept_is_a_different_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("page").insert_header("cache-control", "max-age=600"))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let cancel = CancellationToken::new();
    fetcher
        .fetch(&request(&server, "/page", "text/html"), &cancel)
        .await
        .unwrap();
    let other = fetcher
        .fetch(&request(&server, "/page", "text/*"), &cancel)
        .await
        .unwrap();
    assert!(!other.from_cache);
}

#[tokio::test]
async fn test_no_store_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(html("secret").insert_header("cache-control", "no-store"))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let req = request(&server, "/private", "text/html");
    let cancel = CancellationToken::new();
    fetcher.fetch(&req, &cancel).await.unwrap();
    let second = fetcher.fetch(&req, &cancel).await.unwrap();
    assert!(!second.from_cache);
}

#[tokio::test]
async fn test_caller_duration_overrides_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/override"))
        .respond_with(html("body").insert_header("cache-control", "no-cache"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let req = request(&server, "/override", "text/html")
        .with_cache_duration(Duration::from_secs(60));
    let cancel = CancellationToken::new();
    fetcher.fetch(&req, &cancel).await.unwrap();
    assert!(fetcher.fetch(&req, &cancel).await.unwrap().from_cache);
}

#[tokio::test]
async fn test_retry_after_on_throttled_statuses() {
    let server = MockServer::start().await;
    let at = (chrono::Utc::now() + chrono::Duration::seconds(120)).to_rfc2822();
    Mock::given(method("GET"))
        .and(path("/throttled"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", at.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/unavailable"))
        .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "30"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fine"))
        .respond_with(html("ok").insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let cancel = CancellationToken::new();

    let throttled = fetcher
        .fetch(&request(&server, "/throttled", "*/*"), &cancel)
        .await
        .unwrap();
    assert!(throttled.is_retryable());
    let offset = throttled.retry_after.unwrap();
    assert!(offset > Duration::from_secs(100) && offset <= Duration::from_secs(120));

    let unavailable = fetcher
        .fetch(&request(&server, "/unavailable", "*/*"), &cancel)
        .await
        .unwrap();
    assert_eq!(unavailable.retry_after, Some(Duration::from_secs(30)));

    let fine = fetcher
        .fetch(&request(&server, "/fine", "*/*"), &cancel)
        .await
        .unwrap();
    assert_eq!(fine.retry_after, None);
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("new"))
        .expect(0)
        .mount(&server)
        .await;

    let response = fetcher()
        .fetch(&request(&server, "/old", "*/*"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.is_redirect());
    assert_eq!(
        response.location,
        Some(format!("{}/new", server.uri()))
    );
}

#[tokio::test]
async fn test_cancel_during_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("late").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = fetcher()
        .fetch(&request(&server, "/slow", "text/html"), &cancel)
        .await;
    assert!(matches!(result, Err(SumiError::Cancelled)));
}

#[tokio::test]
async fn test_connection_failure_is_http_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let url = Url::parse(&format!("{}/gone", uri)).unwrap();
    let result = fetcher()
        .fetch(&FetchRequest::new(url, UA, "*/*"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SumiError::Http { .. })));
}

/// Backend whose every operation fails
struct BrokenBackend;

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Pool("backend down".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
        Err(CacheError::Pool("backend down".to_string()))
    }

    async fn remove(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Pool("backend down".to_string()))
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::Pool("backend down".to_string()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_broken_cache_degrades_to_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("live").insert_header("cache-control", "max-age=600"))
        .expect(2)
        .mount(&server)
        .await;

    let cache = Cache::new(Arc::new(BrokenBackend), "test");
    let fetcher = Fetcher::new(&Config::default(), cache).unwrap();
    let req = request(&server, "/", "text/html");
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let response = fetcher.fetch(&req, &cancel).await.unwrap();
        assert_eq!(response.body, "live");
        assert!(!response.from_cache);
    }
}
