//! REST endpoints of the remote service
//!
//! - `GET {api_base}/{slug}/chapters`: chapter list with volumes
//! - `GET {api_base}/{slug}?fields[]=…`: series metadata
//! - `GET {api_base}/{slug}/chapter?number=N&volume=V`: chapter detail
//!
//! Every payload is wrapped in a `{"data": …}` envelope.

use crate::cache::SlugCache;
use crate::client::HttpClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::ChapterVolumeMap;
use crate::utils::{chapter_number_from_value, volume_from_value};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra fields requested with the series metadata
pub const SERIES_FIELDS: &[&str] = &[
    "background",
    "eng_name",
    "otherNames",
    "summary",
    "releaseDate",
    "type_id",
    "caution",
    "views",
    "close_view",
    "rate_avg",
    "rate",
    "genres",
    "tags",
    "teams",
    "user",
    "franchise",
    "authors",
    "publisher",
    "userRating",
    "moderated",
    "metadata",
    "metadata.count",
    "metadata.close_comments",
    "manga_status_id",
    "chap_count",
    "status_id",
    "artists",
    "format",
];

/// Source of chapter facts used by volume resolution and chapter fetching
///
/// Implemented by [`MangaApi`]; tests substitute in-memory fakes.
#[async_trait]
pub trait ChapterSource: Send + Sync {
    /// Chapter → volume map for a series (empty when unavailable)
    async fn chapter_volumes(&self, slug: &str) -> Arc<ChapterVolumeMap>;

    /// Raw series metadata tree (empty object when unavailable)
    async fn series_info(&self, slug: &str) -> Arc<Value>;

    /// Chapter detail payload (the contents of `data`)
    async fn chapter_detail(&self, slug: &str, chapter: u32, volume: i64) -> Result<Value>;
}

/// Client for the manga REST API with per-slug caches
#[derive(Debug)]
pub struct MangaApi {
    client: HttpClient,
    api_base: String,
    chapter_maps: SlugCache<ChapterVolumeMap>,
    series: SlugCache<Value>,
}

impl MangaApi {
    /// Create an API client on top of a shared HTTP client
    pub fn new(client: HttpClient, config: &Config) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            chapter_maps: SlugCache::new(),
            series: SlugCache::new(),
        }
    }

    /// Underlying HTTP client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    fn series_url(&self, slug: &str) -> String {
        format!("{}/{}", self.api_base, slug)
    }

    async fn load_chapter_volumes(&self, slug: &str) -> ChapterVolumeMap {
        let url = format!("{}/chapters", self.series_url(slug));
        let attempts = self.client.retry_config().chapter_list_attempts;

        match self.client.fetch_json(&url, &[], attempts).await {
            Ok(body) => {
                let map = parse_chapter_list(&body);
                debug!(slug, chapters = map.len(), "chapter list loaded");
                map
            }
            Err(e) => {
                warn!(slug, error = %e, "could not load chapter list");
                ChapterVolumeMap::new()
            }
        }
    }

    async fn load_series_info(&self, slug: &str) -> Value {
        let query: Vec<(&str, String)> = SERIES_FIELDS
            .iter()
            .map(|field| ("fields[]", field.to_string()))
            .collect();
        let attempts = self.client.retry_config().series_info_attempts;

        match self
            .client
            .fetch_json(&self.series_url(slug), &query, attempts)
            .await
        {
            Ok(mut body) => match body.get_mut("data").map(Value::take) {
                Some(data @ Value::Object(_)) => data,
                _ => Value::Object(Map::new()),
            },
            Err(e) => {
                warn!(slug, error = %e, "could not load series info");
                Value::Object(Map::new())
            }
        }
    }
}

#[async_trait]
impl ChapterSource for MangaApi {
    async fn chapter_volumes(&self, slug: &str) -> Arc<ChapterVolumeMap> {
        self.chapter_maps
            .get_or_populate(slug, || self.load_chapter_volumes(slug))
            .await
    }

    async fn series_info(&self, slug: &str) -> Arc<Value> {
        self.series
            .get_or_populate(slug, || self.load_series_info(slug))
            .await
    }

    async fn chapter_detail(&self, slug: &str, chapter: u32, volume: i64) -> Result<Value> {
        let url = format!("{}/chapter", self.series_url(slug));
        let query = [("number", chapter.to_string()), ("volume", volume.to_string())];
        let attempts = self.client.retry_config().chapter_attempts;

        let mut body = self.client.fetch_json(&url, &query, attempts).await?;
        match body.get_mut("data").map(Value::take) {
            Some(data @ Value::Object(_)) => Ok(data),
            _ => Err(Error::InvalidResponse(format!(
                "chapter {} volume {}: 'data' is not an object",
                chapter, volume
            ))),
        }
    }
}

/// Build the chapter → volume map from a chapter list response
///
/// Records missing either field, or whose values do not parse, are skipped.
pub fn parse_chapter_list(body: &Value) -> ChapterVolumeMap {
    let Some(items) = body.get("data").and_then(Value::as_array) else {
        return ChapterVolumeMap::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let chapter = chapter_number_from_value(item.get("number")?)?;
            let volume = volume_from_value(item.get("volume")?)?;
            Some((chapter, volume))
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> MangaApi {
        let config = Config {
            api_base: format!("{}/api/manga/", server.uri()),
            referer: format!("{}/", server.uri()),
            request_delay: Duration::ZERO,
            retry: RetryConfig {
                transient_step: Duration::from_millis(1),
                ..RetryConfig::default()
            },
            ..Config::new("slug", (1, 1))
        };
        MangaApi::new(HttpClient::new(&config).unwrap(), &config)
    }

    #[test]
    fn test_parse_chapter_list_skips_malformed_records() {
        let body = json!({
            "data": [
                {"number": "1", "volume": "1"},
                {"number": 2, "volume": 1},
                {"number": "2,5", "volume": 2},
                {"number": "bonus", "volume": 2},
                {"number": "3", "volume": "two"},
                {"number": "4"},
                {"volume": 3},
                "garbage"
            ]
        });

        let map = parse_chapter_list(&body);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(1.0), Some(1));
        assert_eq!(map.get(2.0), Some(1));
        assert_eq!(map.get(2.5), Some(2));
        assert_eq!(map.get(3.0), None);
    }

    #[test]
    fn test_parse_chapter_list_wrong_envelope() {
        assert!(parse_chapter_list(&json!([{"number": 1, "volume": 1}])).is_empty());
        assert!(parse_chapter_list(&json!({"data": {"number": 1}})).is_empty());
    }

    #[tokio::test]
    async fn test_chapter_volumes_cached_after_first_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/manga/slug/chapters"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"number": "7", "volume": 2}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        assert_eq!(api.chapter_volumes("slug").await.get(7.0), Some(2));
        assert_eq!(api.chapter_volumes("slug").await.get(7.0), Some(2));
    }

    #[tokio::test]
    async fn test_chapter_volumes_failure_yields_empty_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/manga/slug/chapters"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        assert!(api.chapter_volumes("slug").await.is_empty());
        // failure is cached too
        assert!(api.chapter_volumes("slug").await.is_empty());
    }

    #[tokio::test]
    async fn test_series_info_requests_fields_and_unwraps_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/manga/slug"))
            .and(query_param("fields[]", "summary"))
            .and(query_param("fields[]", "authors"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"name": "Title"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        let info = api.series_info("slug").await;
        assert_eq!(info["name"], "Title");
    }

    #[tokio::test]
    async fn test_series_info_failure_yields_empty_object() {
        let server = MockServer::start().await;
        let api = api_for(&server);

        let info = api.series_info("slug").await;
        assert_eq!(*info, json!({}));
    }

    #[tokio::test]
    async fn test_chapter_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/manga/slug/chapter"))
            .and(query_param("number", "3"))
            .and(query_param("volume", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 77, "pages": []}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/manga/slug/chapter"))
            .and(query_param("number", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let detail = api.chapter_detail("slug", 3, 1).await.unwrap();
        assert_eq!(detail["id"], 77);

        let err = api.chapter_detail("slug", 4, 1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));

        let err = api.chapter_detail("slug", 3, 2).await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
    }
}
