//! Document metadata enrichment for citation display.
//!
//! Sources arrive as bare numeric ids. A process-lifetime cache maps
//! document ids to display titles (and chapter titles), populated lazily by
//! best-effort background fetches. A missing entry only means the UI shows
//! raw ids; it is never an error.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::Deserialize;

use crate::chat::types::Source;
use crate::core::config::ClientConfig;
use crate::core::errors::{ok_or_api_error, ClientError};

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub ordering: i64,
}

/// Full document record as served by `GET /docs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentDetail {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterSummary>,
}

/// The slice of a document we keep for labeling citations.
#[derive(Debug, Clone)]
pub struct DocMeta {
    pub title: String,
    pub chapters: HashMap<i64, String>,
}

impl From<DocumentDetail> for DocMeta {
    fn from(detail: DocumentDetail) -> Self {
        Self {
            title: detail.title,
            chapters: detail
                .chapters
                .into_iter()
                .map(|chapter| (chapter.id, chapter.title))
                .collect(),
        }
    }
}

/// Capability to fetch one document's metadata.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_document(&self, document_id: i64) -> Result<DocumentDetail, ClientError>;
}

#[derive(Clone)]
pub struct DocsClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl DocsClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl DocumentFetcher for DocsClient {
    async fn fetch_document(&self, document_id: i64) -> Result<DocumentDetail, ClientError> {
        let url = self.config.endpoint(&format!("/docs/{document_id}"));
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(ClientError::transport)?;
        let res = ok_or_api_error(res).await?;
        res.json().await.map_err(ClientError::transport)
    }
}

/// Process-lifetime cache of document display metadata. Entries are only
/// ever added; writes commute, so the first fetch to land for an id wins
/// and later identical writes are harmless.
#[derive(Clone, Default)]
pub struct DocMetaCache {
    inner: Arc<RwLock<HashMap<i64, DocMeta>>>,
}

impl DocMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, document_id: i64) -> bool {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.contains_key(&document_id)
    }

    pub fn get(&self, document_id: i64) -> Option<DocMeta> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&document_id).cloned()
    }

    pub fn insert(&self, document_id: i64, meta: DocMeta) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(document_id, meta);
    }

    pub fn document_title(&self, document_id: i64) -> Option<String> {
        self.get(document_id).map(|meta| meta.title)
    }

    pub fn chapter_title(&self, document_id: i64, chapter_id: i64) -> Option<String> {
        self.get(document_id)
            .and_then(|meta| meta.chapters.get(&chapter_id).cloned())
    }

    /// Human-readable label for a citation, falling back to raw ids when
    /// the metadata has not arrived (or never will).
    pub fn label_for(&self, source: &Source) -> String {
        match self.get(source.document_id) {
            Some(meta) => match meta.chapters.get(&source.chapter_id) {
                Some(chapter) => format!("{} · {}", meta.title, chapter),
                None => meta.title,
            },
            None => format!("Doc {} / Ch. {}", source.document_id, source.chapter_id),
        }
    }
}

/// Fire-and-forget enrichment: one background fetch per document id the
/// cache has not seen. Each fetch is an independent task; one failing keeps
/// the others (and the message render path) untouched.
#[derive(Clone)]
pub struct SourceAggregator {
    fetcher: Arc<dyn DocumentFetcher>,
    cache: DocMetaCache,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl SourceAggregator {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, cache: DocMetaCache) -> Self {
        Self {
            fetcher,
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Aggregator over the real docs endpoint.
    pub fn for_backend(config: ClientConfig) -> Self {
        Self::new(Arc::new(DocsClient::new(config)), DocMetaCache::new())
    }

    pub fn cache(&self) -> &DocMetaCache {
        &self.cache
    }

    /// Spawn a fetch for every distinct document id that is neither cached
    /// nor already being fetched. Returns how many fetches were started;
    /// completion is not awaited anywhere near the render path.
    pub fn prefetch(&self, sources: &[Source]) -> usize {
        let mut seen = HashSet::new();
        let mut started = 0;

        for source in sources {
            let document_id = source.document_id;
            if !seen.insert(document_id) {
                continue;
            }
            if self.cache.contains(document_id) {
                continue;
            }
            {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                if !in_flight.insert(document_id) {
                    continue;
                }
            }

            started += 1;
            let fetcher = Arc::clone(&self.fetcher);
            let cache = self.cache.clone();
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(async move {
                match fetcher.fetch_document(document_id).await {
                    Ok(detail) => cache.insert(document_id, DocMeta::from(detail)),
                    Err(err) => {
                        // Fail-open: display falls back to raw ids.
                        tracing::debug!(document_id, error = %err, "document metadata fetch failed");
                    }
                }
                let mut in_flight = in_flight.lock().unwrap_or_else(|e| e.into_inner());
                in_flight.remove(&document_id);
            });
        }

        started
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn source(document_id: i64, chapter_id: i64, chunk_id: i64) -> Source {
        Source {
            document_id,
            chapter_id,
            chunk_id,
            page_number: None,
            text: "excerpt".to_string(),
            score: None,
            url: None,
        }
    }

    fn detail(id: i64, title: &str) -> DocumentDetail {
        DocumentDetail {
            id,
            title: title.to_string(),
            summary: None,
            cover_image: None,
            chapters: vec![ChapterSummary {
                id: 7,
                title: "Chapter Seven".to_string(),
                summary: None,
                ordering: 1,
            }],
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentFetcher for CountingFetcher {
        async fn fetch_document(&self, document_id: i64) -> Result<DocumentDetail, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(detail(document_id, "Selected Works"))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl DocumentFetcher for FailingFetcher {
        async fn fetch_document(&self, _document_id: i64) -> Result<DocumentDetail, ClientError> {
            Err(ClientError::Transport("connection refused".into()))
        }
    }

    struct StalledFetcher;

    #[async_trait]
    impl DocumentFetcher for StalledFetcher {
        async fn fetch_document(&self, document_id: i64) -> Result<DocumentDetail, ClientError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(detail(document_id, "never returned"))
        }
    }

    async fn wait_for(cache: &DocMetaCache, document_id: i64) {
        for _ in 0..1000 {
            if cache.contains(document_id) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("metadata for document {document_id} never arrived");
    }

    #[tokio::test]
    async fn same_document_different_chapters_fetches_once() {
        let fetcher = CountingFetcher::new();
        let aggregator = SourceAggregator::new(fetcher.clone(), DocMetaCache::new());

        let started = aggregator.prefetch(&[source(3, 1, 10), source(3, 2, 11)]);
        assert_eq!(started, 1);

        wait_for(aggregator.cache(), 3).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_documents_trigger_no_fetches() {
        let fetcher = CountingFetcher::new();
        let aggregator = SourceAggregator::new(fetcher.clone(), DocMetaCache::new());

        assert_eq!(aggregator.prefetch(&[source(5, 1, 20)]), 1);
        wait_for(aggregator.cache(), 5).await;

        assert_eq!(aggregator.prefetch(&[source(5, 9, 21)]), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_documents_fetch_in_parallel() {
        let fetcher = CountingFetcher::new();
        let aggregator = SourceAggregator::new(fetcher.clone(), DocMetaCache::new());

        let started = aggregator.prefetch(&[source(1, 1, 1), source(2, 1, 2), source(3, 1, 3)]);
        assert_eq!(started, 3);

        for id in [1, 2, 3] {
            wait_for(aggregator.cache(), id).await;
        }
    }

    #[tokio::test]
    async fn in_flight_documents_are_not_refetched() {
        let aggregator = SourceAggregator::new(Arc::new(StalledFetcher), DocMetaCache::new());

        assert_eq!(aggregator.prefetch(&[source(4, 1, 30)]), 1);
        assert_eq!(aggregator.prefetch(&[source(4, 1, 31)]), 0);
    }

    #[tokio::test]
    async fn failed_fetch_is_silent_and_label_falls_back() {
        let aggregator = SourceAggregator::new(Arc::new(FailingFetcher), DocMetaCache::new());

        assert_eq!(aggregator.prefetch(&[source(9, 2, 40)]), 1);
        // Give the doomed task a chance to run.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        assert!(!aggregator.cache().contains(9));
        assert_eq!(aggregator.cache().label_for(&source(9, 2, 40)), "Doc 9 / Ch. 2");
    }

    #[tokio::test]
    async fn labels_use_cached_titles() {
        let cache = DocMetaCache::new();
        cache.insert(3, DocMeta::from(detail(3, "Selected Works")));

        assert_eq!(
            cache.label_for(&source(3, 7, 50)),
            "Selected Works · Chapter Seven"
        );
        assert_eq!(cache.label_for(&source(3, 99, 51)), "Selected Works");
        assert_eq!(cache.document_title(3).as_deref(), Some("Selected Works"));
        assert_eq!(cache.chapter_title(3, 7).as_deref(), Some("Chapter Seven"));
    }
}
