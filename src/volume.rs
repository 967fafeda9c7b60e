//! Volume resolution
//!
//! The volume of a chapter is determined by the first strategy that succeeds:
//! 1. the configured volume override (no network access)
//! 2. the series chapter list
//! 3. a depth-first search of the series metadata, validated by fetching the chapter
//! 4. probing every volume of the fallback range in ascending order

use crate::api::ChapterSource;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::utils::{chapter_number_from_value, volume_from_value};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Deepest metadata nesting level the search descends into
pub const MAX_SEARCH_DEPTH: usize = 64;

/// Maps chapter numbers to volumes through an ordered fallback chain
#[derive(Clone)]
pub struct VolumeResolver {
    source: Arc<dyn ChapterSource>,
    volume_override: Option<i64>,
    fallback_range: (i64, i64),
    probe_pause: Duration,
}

impl VolumeResolver {
    /// Create a resolver reading chapter facts from `source`
    pub fn new(source: Arc<dyn ChapterSource>, config: &Config) -> Self {
        Self {
            source,
            volume_override: config.volume_override,
            fallback_range: config.fallback_volume_range,
            probe_pause: config.retry.probe_pause,
        }
    }

    /// Determine the volume of `chapter` in series `slug`
    pub async fn resolve(&self, slug: &str, chapter: u32) -> Result<i64> {
        if let Some(volume) = self.volume_override {
            return Ok(volume);
        }

        let target = f64::from(chapter);

        let chapter_map = self.source.chapter_volumes(slug).await;
        if let Some(volume) = chapter_map.get(target) {
            debug!(chapter, volume, "volume found in chapter list");
            return Ok(volume);
        }

        let series = self.source.series_info(slug).await;
        if let Some(candidate) = search_volume_in_metadata(&series, target) {
            match self.source.chapter_detail(slug, chapter, candidate).await {
                Ok(_) => {
                    debug!(chapter, volume = candidate, "volume found in series metadata");
                    return Ok(candidate);
                }
                Err(e) => debug!(
                    chapter,
                    volume = candidate,
                    error = %e,
                    "metadata volume candidate rejected"
                ),
            }
        }

        self.brute_force(slug, chapter).await
    }

    async fn brute_force(&self, slug: &str, chapter: u32) -> Result<i64> {
        let (first, last) = self.fallback_range;
        info!(chapter, first, last, "probing volumes");

        for volume in first..=last {
            tokio::time::sleep(self.probe_pause).await;
            match self.source.chapter_detail(slug, chapter, volume).await {
                Ok(_) => {
                    info!(chapter, volume, "volume found by probing");
                    return Ok(volume);
                }
                Err(e) => debug!(chapter, volume, error = %e, "volume probe failed"),
            }
        }

        Err(Error::VolumeUnresolved { chapter })
    }
}

/// Depth-first search of a metadata tree for the volume of chapter `target`
///
/// A node matches when it is an object with a chapter number (`number`, or
/// `chapter_number` when `number` is absent or null) equal to `target` and an
/// integer-like `volume`. The first match in document order wins; malformed
/// nodes are skipped and their children still searched.
pub fn search_volume_in_metadata(tree: &Value, target: f64) -> Option<i64> {
    search(tree, target, 0)
}

fn search(node: &Value, target: f64, depth: usize) -> Option<i64> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }

    match node {
        Value::Object(map) => {
            let number = map
                .get("number")
                .filter(|v| !v.is_null())
                .or_else(|| map.get("chapter_number"))
                .filter(|v| !v.is_null());
            let volume = map.get("volume").filter(|v| !v.is_null());

            if let (Some(number), Some(volume)) = (number, volume)
                && chapter_number_from_value(number) == Some(target)
                && let Some(volume) = volume_from_value(volume)
            {
                return Some(volume);
            }

            map.values().find_map(|child| search(child, target, depth + 1))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|child| search(child, target, depth + 1)),
        _ => None,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChapterVolumeMap;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory chapter source recording every detail request
    #[derive(Default)]
    struct FakeSource {
        map: ChapterVolumeMap,
        series: Value,
        /// (chapter, volume) pairs whose detail request succeeds
        valid: HashSet<(u32, i64)>,
        detail_calls: Mutex<Vec<(u32, i64)>>,
        list_calls: Mutex<u32>,
    }

    impl FakeSource {
        fn detail_calls(&self) -> Vec<(u32, i64)> {
            self.detail_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChapterSource for FakeSource {
        async fn chapter_volumes(&self, _slug: &str) -> Arc<ChapterVolumeMap> {
            *self.list_calls.lock().unwrap() += 1;
            Arc::new(self.map.clone())
        }

        async fn series_info(&self, _slug: &str) -> Arc<Value> {
            Arc::new(self.series.clone())
        }

        async fn chapter_detail(&self, _slug: &str, chapter: u32, volume: i64) -> Result<Value> {
            self.detail_calls.lock().unwrap().push((chapter, volume));
            if self.valid.contains(&(chapter, volume)) {
                Ok(json!({"id": 1}))
            } else {
                Err(Error::Http {
                    status: reqwest::StatusCode::NOT_FOUND,
                    url: "fake".into(),
                })
            }
        }
    }

    fn resolver(source: Arc<FakeSource>, config: Config) -> VolumeResolver {
        VolumeResolver::new(source, &config)
    }

    fn config() -> Config {
        let mut config = Config::new("slug", (1, 10));
        config.fallback_volume_range = (1, 5);
        config.retry.probe_pause = Duration::ZERO;
        config
    }

    #[tokio::test]
    async fn test_override_wins_without_network() {
        let source = Arc::new(FakeSource::default());
        let mut cfg = config();
        cfg.volume_override = Some(9);
        let resolver = resolver(Arc::clone(&source), cfg);

        assert_eq!(resolver.resolve("slug", 1).await.unwrap(), 9);
        assert_eq!(resolver.resolve("slug", 500).await.unwrap(), 9);
        assert!(source.detail_calls().is_empty());
        assert_eq!(*source.list_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chapter_list_hit_skips_detail_fetch() {
        let source = Arc::new(FakeSource {
            map: [(54.0, 4)].into_iter().collect(),
            ..Default::default()
        });
        let resolver = resolver(Arc::clone(&source), config());

        assert_eq!(resolver.resolve("slug", 54).await.unwrap(), 4);
        assert!(source.detail_calls().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_candidate_validated() {
        let source = Arc::new(FakeSource {
            series: json!({"branches": [{"chapters": [{"number": "12,0", "volume": "3"}]}]}),
            valid: [(12, 3)].into_iter().collect(),
            ..Default::default()
        });
        let resolver = resolver(Arc::clone(&source), config());

        assert_eq!(resolver.resolve("slug", 12).await.unwrap(), 3);
        assert_eq!(source.detail_calls(), vec![(12, 3)]);
    }

    #[tokio::test]
    async fn test_rejected_metadata_candidate_falls_through_to_probing() {
        let source = Arc::new(FakeSource {
            series: json!({"chapters": [{"number": 12, "volume": 4}]}),
            valid: [(12, 2)].into_iter().collect(),
            ..Default::default()
        });
        let resolver = resolver(Arc::clone(&source), config());

        assert_eq!(resolver.resolve("slug", 12).await.unwrap(), 2);
        assert_eq!(source.detail_calls(), vec![(12, 4), (12, 1), (12, 2)]);
    }

    #[tokio::test]
    async fn test_rejected_candidate_never_returned() {
        let source = Arc::new(FakeSource {
            series: json!({"chapters": [{"number": 12, "volume": 4}]}),
            ..Default::default()
        });
        let resolver = resolver(Arc::clone(&source), config());

        let err = resolver.resolve("slug", 12).await.unwrap_err();
        assert!(matches!(err, Error::VolumeUnresolved { chapter: 12 }));
    }

    #[tokio::test]
    async fn test_brute_force_ascending_first_success() {
        let source = Arc::new(FakeSource {
            valid: [(56, 3), (56, 5)].into_iter().collect(),
            ..Default::default()
        });
        let resolver = resolver(Arc::clone(&source), config());

        assert_eq!(resolver.resolve("slug", 56).await.unwrap(), 3);
        assert_eq!(source.detail_calls(), vec![(56, 1), (56, 2), (56, 3)]);
    }

    #[tokio::test]
    async fn test_brute_force_exhausted_names_chapter() {
        let source = Arc::new(FakeSource::default());
        let resolver = resolver(Arc::clone(&source), config());

        let err = resolver.resolve("slug", 77).await.unwrap_err();
        assert_eq!(err.to_string(), "could not determine volume for chapter 77");
        assert_eq!(
            source.detail_calls(),
            (1..=5).map(|v| (77, v)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_search_first_match_wins() {
        let tree = json!({
            "a": {"number": 5, "volume": 1},
            "b": [{"number": "5", "volume": 2}]
        });
        // serde_json maps are ordered by key unless preserve_order is enabled
        assert_eq!(search_volume_in_metadata(&tree, 5.0), Some(1));
    }

    #[test]
    fn test_search_chapter_number_fallback_field() {
        let tree = json!([{"chapter_number": "7.5", "volume": 2}]);
        assert_eq!(search_volume_in_metadata(&tree, 7.5), Some(2));

        let tree = json!([{"number": null, "chapter_number": 8, "volume": 6}]);
        assert_eq!(search_volume_in_metadata(&tree, 8.0), Some(6));
    }

    #[test]
    fn test_search_skips_malformed_nodes() {
        let tree = json!({
            "list": [
                {"number": "oops", "volume": 1},
                {"number": 9, "volume": "vol. 2", "nested": {"number": 9, "volume": 3}},
                {"number": 9, "volume": null}
            ]
        });
        assert_eq!(search_volume_in_metadata(&tree, 9.0), Some(3));
        assert_eq!(search_volume_in_metadata(&tree, 10.0), None);
        assert_eq!(search_volume_in_metadata(&json!("scalar"), 1.0), None);
    }

    #[test]
    fn test_search_depth_bounded() {
        let mut tree = json!({"number": 1, "volume": 4});
        for _ in 0..(MAX_SEARCH_DEPTH + 5) {
            tree = json!([tree]);
        }
        assert_eq!(search_volume_in_metadata(&tree, 1.0), None);

        let mut shallow = json!({"number": 1, "volume": 4});
        for _ in 0..10 {
            shallow = json!([shallow]);
        }
        assert_eq!(search_volume_in_metadata(&shallow, 1.0), Some(4));
    }
}
