//! Source search and retrieval
//!
//! A [`SearchFetcher`] resolves a [`FetchTarget`] to raw page content in two
//! steps: a search backend turns a query into ranked hits, then the page at
//! the requested rank is downloaded over HTTP. Search results are cached per
//! query in a bounded LRU with a TTL. Concurrent lookups of the same query
//! wait on one in-flight search, so the scrape tasks of one run share a
//! single ranking.
//!
//! Backends:
//! - [`DuckDuckGo`] via the daedra crate (no API key required)
//! - [`SerpApi`] via its JSON API (requires an API key)

use crate::capabilities::extract::html_title;
use crate::capabilities::{
    CapabilityError, ContentType, FetchTarget, FetchedDocument, SourceFetcher,
};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const USER_AGENT: &str = concat!("sage-research/", env!("CARGO_PKG_VERSION"));

const DEFAULT_CACHE_CAPACITY: usize = 128;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A search engine that turns a query into ranked hits.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CapabilityError>;

    fn name(&self) -> &str;
}

// ============= Backends =============

/// DuckDuckGo search powered by daedra
pub struct DuckDuckGo;

#[async_trait]
impl SearchBackend for DuckDuckGo {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CapabilityError> {
        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: limit,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| CapabilityError::Fetch(format!("Search failed: {}", e)))?;

        Ok(response
            .data
            .iter()
            .map(|r| SearchHit {
                title: r.title.to_string(),
                url: r.url.to_string(),
                snippet: r.description.to_string(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// SerpAPI (Google results) over its JSON endpoint
pub struct SerpApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SerpApiResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpApiResult {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

impl SerpApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SearchBackend for SerpApi {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CapabilityError> {
        let num = limit.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CapabilityError::Fetch(format!("SerpAPI request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CapabilityError::Unavailable(format!(
                "SerpAPI rejected the API key ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(CapabilityError::Fetch(format!("SerpAPI returned {}", status)));
        }

        let body: SerpApiResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Fetch(format!("Invalid SerpAPI response: {}", e)))?;
        if let Some(error) = body.error {
            return Err(CapabilityError::Fetch(format!("SerpAPI error: {}", error)));
        }

        Ok(body
            .organic_results
            .into_iter()
            .take(limit)
            .map(|r| SearchHit {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "serpapi"
    }
}

// ============= Search Cache =============

/// Hits for one query. The cell is filled by the first lookup; later lookups
/// wait on it instead of searching again.
struct CachedSearch {
    hits: OnceCell<Arc<Vec<SearchHit>>>,
    expires_at: Instant,
}

impl CachedSearch {
    fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            hits: OnceCell::new(),
            expires_at: Instant::now() + ttl,
        })
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

// ============= Fetcher =============

/// [`SourceFetcher`] that searches with a [`SearchBackend`] and downloads pages over HTTP.
pub struct SearchFetcher<B: SearchBackend> {
    backend: B,
    http: reqwest::Client,
    results_per_query: usize,
    cache: Mutex<LruCache<String, Arc<CachedSearch>>>,
    ttl: Duration,
}

pub type DuckDuckGoFetcher = SearchFetcher<DuckDuckGo>;
pub type SerpApiFetcher = SearchFetcher<SerpApi>;

impl DuckDuckGoFetcher {
    pub fn duckduckgo(results_per_query: usize) -> Self {
        SearchFetcher::new(DuckDuckGo, results_per_query)
    }
}

impl<B: SearchBackend> SearchFetcher<B> {
    pub fn new(backend: B, results_per_query: usize) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            backend,
            http,
            results_per_query: results_per_query.max(1),
            cache: Mutex::new(LruCache::new(cache_capacity(DEFAULT_CACHE_CAPACITY))),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Override the search cache bounds.
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache = Mutex::new(LruCache::new(cache_capacity(capacity)));
        self.ttl = ttl;
        self
    }

    fn cache_entry(&self, query: &str) -> Arc<CachedSearch> {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.get(query) {
            if !entry.is_expired() {
                return Arc::clone(entry);
            }
        }
        let entry = CachedSearch::new(self.ttl);
        cache.put(query.to_string(), Arc::clone(&entry));
        entry
    }

    /// Drop `entry` unless another lookup already replaced it.
    fn evict(&self, query: &str, entry: &Arc<CachedSearch>) {
        let mut cache = self.cache.lock();
        if cache.peek(query).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            cache.pop(query);
        }
    }

    async fn hits(&self, query: &str) -> Result<Arc<Vec<SearchHit>>, CapabilityError> {
        let entry = self.cache_entry(query);
        let hits = entry
            .hits
            .get_or_try_init(|| async {
                let hits = self.backend.search(query, self.results_per_query).await?;
                tracing::debug!(
                    backend = self.backend.name(),
                    query,
                    results = hits.len(),
                    "Search completed"
                );
                Ok::<_, CapabilityError>(Arc::new(hits))
            })
            .await?
            .clone();

        // an empty ranking is worth searching again on retry
        if hits.is_empty() {
            self.evict(query, &entry);
        }
        Ok(hits)
    }

    /// Download a page, classifying its content by `Content-Type` and extension.
    pub async fn download(
        &self,
        url: &str,
        title: Option<String>,
    ) -> Result<FetchedDocument, CapabilityError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CapabilityError::Fetch(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("{} returned {}", url, status);
            let transient = status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::REQUEST_TIMEOUT;
            return Err(if transient {
                CapabilityError::Fetch(message)
            } else {
                CapabilityError::InvalidInput(message)
            });
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let content_type = if url.to_lowercase().ends_with(".pdf") {
            ContentType::Pdf
        } else {
            ContentType::from_mime(&mime)
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| CapabilityError::Fetch(format!("Failed to read {}: {}", url, e)))?;

        let title = match (title, content_type) {
            (None, ContentType::Html) => html_title(&String::from_utf8_lossy(&body)),
            (title, _) => title,
        };

        Ok(FetchedDocument {
            url: url.to_string(),
            title,
            content_type,
            body: body.to_vec(),
        })
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

#[async_trait]
impl<B: SearchBackend> SourceFetcher for SearchFetcher<B> {
    async fn fetch(&self, target: &FetchTarget) -> Result<FetchedDocument, CapabilityError> {
        match target {
            FetchTarget::Url { url } => self.download(url, None).await,
            FetchTarget::Search {
                query,
                rank,
                source_type,
            } => {
                let search_query = source_type.search_query(query);
                let hits = self.hits(&search_query).await?;
                let hit = rank
                    .checked_sub(1)
                    .and_then(|i| hits.get(i))
                    .ok_or_else(|| {
                        let message = format!(
                            "search for '{}' returned {} results, wanted result {}",
                            search_query,
                            hits.len(),
                            rank
                        );
                        // the cached ranking will not grow on retry
                        if hits.is_empty() {
                            CapabilityError::Fetch(message)
                        } else {
                            CapabilityError::InvalidInput(message)
                        }
                    })?;
                self.download(&hit.url, Some(hit.title.clone())).await
            }
        }
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::query::SourceType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Backend returning fixed hits and counting calls
    struct FixedBackend {
        hits: Vec<SearchHit>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FixedBackend {
        fn new(hits: Vec<SearchHit>) -> Self {
            Self {
                hits,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(hits: Vec<SearchHit>, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(hits)
            }
        }
    }

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn hit(server: &MockServer, page: &str) -> SearchHit {
        SearchHit {
            title: format!("Page {}", page),
            url: format!("{}/{}", server.uri(), page),
            snippet: String::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_by_rank_downloads_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><body><p>Second page</p></body></html>",
                    "text/html; charset=utf-8",
                ),
            )
            .mount(&server)
            .await;

        let backend = FixedBackend::new(vec![hit(&server, "first"), hit(&server, "second")]);
        let fetcher = SearchFetcher::new(backend, 10);
        let target = FetchTarget::Search {
            query: "bees".into(),
            rank: 2,
            source_type: SourceType::Web,
        };

        let doc = fetcher.fetch(&target).await.unwrap();
        assert_eq!(doc.title.as_deref(), Some("Page second"));
        assert_eq!(doc.content_type, ContentType::Html);
        assert!(String::from_utf8_lossy(&doc.body).contains("Second page"));

        // The second lookup for the same query is served from the cache
        let _ = fetcher.fetch(&target).await.unwrap();
        assert_eq!(fetcher.backend.calls.load(Ordering::SeqCst), 1);
    }

    fn search_target(query: &str, rank: usize) -> FetchTarget {
        FetchTarget::Search {
            query: query.into(),
            rank,
            source_type: SourceType::Web,
        }
    }

    #[tokio::test]
    async fn test_rank_beyond_results_is_not_retryable() {
        let server = MockServer::start().await;
        let fetcher = SearchFetcher::new(FixedBackend::new(vec![hit(&server, "only")]), 10);

        let err = fetcher.fetch(&search_target("bees", 3)).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_results_are_searched_again() {
        let fetcher = SearchFetcher::new(FixedBackend::new(Vec::new()), 10);

        let err = fetcher.fetch(&search_target("bees", 1)).await.unwrap_err();
        assert!(err.is_retryable());
        let _ = fetcher.fetch(&search_target("bees", 1)).await.unwrap_err();
        assert_eq!(fetcher.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>page</p>"))
            .mount(&server)
            .await;

        let hits = ["a", "b", "c"].iter().map(|p| hit(&server, p)).collect();
        let fetcher = SearchFetcher::new(
            FixedBackend::slow(hits, Duration::from_millis(50)),
            10,
        );

        let (t1, t2, t3) = (
            search_target("bees", 1),
            search_target("bees", 2),
            search_target("bees", 3),
        );
        let (first, second, third) =
            tokio::join!(fetcher.fetch(&t1), fetcher.fetch(&t2), fetcher.fetch(&t3));
        assert!(first.unwrap().url.ends_with("/a"));
        assert!(second.unwrap().url.ends_with("/b"));
        assert!(third.unwrap().url.ends_with("/c"));
        assert_eq!(fetcher.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_cache_is_bounded_and_expires() {
        let server = MockServer::start().await;
        let fetcher = SearchFetcher::new(FixedBackend::new(vec![hit(&server, "a")]), 10)
            .with_cache(1, Duration::from_millis(20));

        fetcher.hits("bees").await.unwrap();
        fetcher.hits("wasps").await.unwrap();
        assert_eq!(fetcher.cache.lock().len(), 1);

        // "bees" was evicted by "wasps"
        fetcher.hits("bees").await.unwrap();
        assert_eq!(fetcher.backend.calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_millis(30)).await;
        fetcher.hits("bees").await.unwrap();
        assert_eq!(fetcher.backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = DuckDuckGoFetcher::duckduckgo(5);
        let err = fetcher
            .download(&format!("{}/missing", server.uri()), None)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = DuckDuckGoFetcher::duckduckgo(5);
        let err = fetcher
            .download(&format!("{}/busy", server.uri()), None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_pdf_detected_by_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .mount(&server)
            .await;

        let fetcher = DuckDuckGoFetcher::duckduckgo(5);
        let doc = fetcher
            .fetch(&FetchTarget::Url {
                url: format!("{}/paper.pdf", server.uri()),
            })
            .await
            .unwrap();
        assert_eq!(doc.content_type, ContentType::Pdf);
    }

    #[tokio::test]
    async fn test_serpapi_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "bees site:arxiv.org"))
            .and(query_param("api_key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic_results": [
                    {"title": "Bee paper", "link": "https://arxiv.org/abs/2401.00001", "snippet": "Bees."},
                    {"title": "Other", "link": "https://arxiv.org/abs/2401.00002"}
                ]
            })))
            .mount(&server)
            .await;

        let backend = SerpApi::new(format!("{}/search", server.uri()), "secret");
        let hits = backend.search("bees site:arxiv.org", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://arxiv.org/abs/2401.00001");
    }

    #[tokio::test]
    async fn test_serpapi_bad_key_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = SerpApi::new(server.uri(), "wrong");
        let err = backend.search("bees", 3).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
    }
}
