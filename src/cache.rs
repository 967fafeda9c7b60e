//! Per-slug, lazily populated caches
//!
//! Each slug gets its own [`OnceCell`], so concurrent callers asking for the
//! same slug wait on a single population instead of racing. Entries live for
//! the lifetime of the cache (one run).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Get-or-populate cache keyed by series slug
#[derive(Debug)]
pub struct SlugCache<T> {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
}

impl<T> Default for SlugCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SlugCache<T> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `slug`, running `populate` if it has not been stored yet
    ///
    /// `populate` runs at most once per slug, even under concurrent access.
    pub async fn get_or_populate<F, Fut>(&self, slug: &str, populate: F) -> Arc<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(slug.to_string()).or_default())
        };

        Arc::clone(
            cell.get_or_init(|| async { Arc::new(populate().await) })
                .await,
        )
    }

    /// Cached value for `slug`, if populated
    pub async fn get(&self, slug: &str) -> Option<Arc<T>> {
        let entries = self.entries.lock().await;
        entries.get(slug).and_then(|cell| cell.get().cloned())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_populates_once_per_slug() {
        let cache: SlugCache<u32> = SlugCache::new();
        let calls = AtomicU32::new(0);

        let first = cache
            .get_or_populate("a", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                1
            })
            .await;
        let second = cache
            .get_or_populate("a", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                2
            })
            .await;

        assert_eq!(*first, 1);
        assert_eq!(*second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slugs_are_independent() {
        let cache: SlugCache<&'static str> = SlugCache::new();
        cache.get_or_populate("a", || async { "alpha" }).await;
        cache.get_or_populate("b", || async { "beta" }).await;

        assert_eq!(*cache.get("a").await.unwrap(), "alpha");
        assert_eq!(*cache.get("b").await.unwrap(), "beta");
        assert!(cache.get("c").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_population_runs_once() {
        let cache = Arc::new(SlugCache::<u32>::new());
        let calls = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_populate("slug", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            i
                        })
                        .await
                })
            })
            .collect();

        let mut values = Vec::new();
        for task in tasks {
            values.push(*task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| w[0] == w[1]));
    }
}
