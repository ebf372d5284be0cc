use super::{GatewayResult, GifSearch};
use pawmatch_model::GifResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Holds each gif query for a quiet window and drops it if a newer one
/// arrives first, so only the last keystroke of a burst reaches the gateway.
#[derive(Clone)]
pub struct DebouncedGifSearch {
    inner: Arc<dyn GifSearch>,
    window: Duration,
    generation: Arc<AtomicU64>,
}

impl DebouncedGifSearch {
    pub fn new(inner: Arc<dyn GifSearch>, window: Duration) -> Self {
        Self {
            inner,
            window,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `Ok(None)` when superseded by a later call.
    pub async fn search(&self, query: &str, page: u32) -> GatewayResult<Option<Vec<GifResult>>> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.window).await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            trace!(query, "gif query superseded");
            return Ok(None);
        }
        self.inner.search(query, page).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSearch {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GifSearch for RecordingSearch {
        async fn search(&self, query: &str, _page: u32) -> GatewayResult<Vec<GifResult>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(vec![GifResult {
                id: query.to_string(),
                preview_url: format!("https://g/{query}-small.gif"),
                full_url: format!("https://g/{query}.gif"),
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_query_in_burst_is_issued() {
        let inner = Arc::new(RecordingSearch::default());
        let search = DebouncedGifSearch::new(inner.clone(), Duration::from_millis(500));

        let first = {
            let search = search.clone();
            tokio::spawn(async move { search.search("d", 0).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = {
            let search = search.clone();
            tokio::spawn(async move { search.search("do", 0).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        let last = search.search("dog", 0).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), None);
        assert_eq!(second.await.unwrap().unwrap(), None);
        assert_eq!(last.unwrap()[0].id, "dog");
        assert_eq!(*inner.queries.lock().unwrap(), vec!["dog".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_queries_all_go_through() {
        let inner = Arc::new(RecordingSearch::default());
        let search = DebouncedGifSearch::new(inner.clone(), Duration::from_millis(500));

        assert!(search.search("cat", 0).await.unwrap().is_some());
        assert!(search.search("cats", 1).await.unwrap().is_some());
        assert_eq!(inner.queries.lock().unwrap().len(), 2);
    }
}
