//! Chapter detail retrieval and page URL derivation

use crate::api::ChapterSource;
use crate::error::{Error, Result};
use crate::utils::{build_image_url, clean_chapter_name, value_to_string};
use serde_json::Value;
use std::sync::Arc;

/// What the archive needs from a chapter detail payload
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDetail {
    /// Chapter id on the remote service (empty when absent)
    pub id: String,
    /// Display name with numbering noise removed
    pub name: String,
    /// Absolute page image URLs in reading order
    pub page_urls: Vec<String>,
    /// Credited team names
    pub teams: Vec<String>,
    /// Series id reported with the chapter, used as a last-resort title
    pub manga_id: Option<String>,
}

/// Fetches one chapter's detail payload and derives its page URLs
#[derive(Clone)]
pub struct ChapterFetcher {
    source: Arc<dyn ChapterSource>,
    image_host: String,
}

impl ChapterFetcher {
    /// Create a fetcher joining relative page paths to `image_host`
    pub fn new(source: Arc<dyn ChapterSource>, image_host: impl Into<String>) -> Self {
        Self {
            source,
            image_host: image_host.into(),
        }
    }

    /// Fetch chapter `chapter` of volume `volume`
    pub async fn fetch(&self, slug: &str, chapter: u32, volume: i64) -> Result<ChapterDetail> {
        let data = self.source.chapter_detail(slug, chapter, volume).await?;
        parse_chapter_detail(chapter, &data, &self.image_host)
    }
}

/// Interpret a chapter detail payload
///
/// Fails with [`Error::NoPages`] when `pages` is missing or empty, and with
/// [`Error::NoImageUrls`] when no page carries a usable `url`/`image` path.
pub fn parse_chapter_detail(chapter: u32, data: &Value, image_host: &str) -> Result<ChapterDetail> {
    let pages = data
        .get("pages")
        .and_then(Value::as_array)
        .filter(|pages| !pages.is_empty())
        .ok_or(Error::NoPages { chapter })?;

    let page_urls: Vec<String> = pages
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|page| {
            let path = page
                .get("url")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| page.get("image").and_then(Value::as_str))?;
            build_image_url(path, image_host)
        })
        .collect();

    if page_urls.is_empty() {
        return Err(Error::NoImageUrls { chapter });
    }

    let teams = data
        .get("teams")
        .and_then(Value::as_array)
        .map(|teams| {
            teams
                .iter()
                .filter_map(|team| team.get("name"))
                .map(value_to_string)
                .collect()
        })
        .unwrap_or_default();

    let name = data
        .get("name")
        .map(value_to_string)
        .map(|name| clean_chapter_name(name.trim()))
        .unwrap_or_default();

    Ok(ChapterDetail {
        id: data.get("id").map(value_to_string).unwrap_or_default(),
        name,
        page_urls,
        teams,
        manga_id: data
            .get("manga_id")
            .map(value_to_string)
            .filter(|id| !id.is_empty()),
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOST: &str = "https://img.example";

    #[test]
    fn test_parse_full_payload() {
        let data = json!({
            "id": 4411,
            "name": "Rain (part 2) 12",
            "manga_id": 114307,
            "pages": [
                {"url": "/manga/1.jpg"},
                {"image": "//cdn.example/2.png"},
                {"url": "", "image": "manga/3.jpg"},
                {"url": "https://other.example/4.webp"}
            ],
            "teams": [{"name": "Team A"}, {"name": "Team B"}, {"id": 3}]
        });

        let detail = parse_chapter_detail(12, &data, HOST).unwrap();
        assert_eq!(detail.id, "4411");
        assert_eq!(detail.name, "Rain");
        assert_eq!(detail.manga_id.as_deref(), Some("114307"));
        assert_eq!(detail.teams, vec!["Team A", "Team B"]);
        assert_eq!(
            detail.page_urls,
            vec![
                "https://img.example/manga/1.jpg",
                "https://cdn.example/2.png",
                "https://img.example/manga/3.jpg",
                "https://other.example/4.webp",
            ]
        );
    }

    #[test]
    fn test_missing_or_empty_pages() {
        let err = parse_chapter_detail(55, &json!({"pages": []}), HOST).unwrap_err();
        assert!(matches!(err, Error::NoPages { chapter: 55 }));

        let err = parse_chapter_detail(55, &json!({"name": "x"}), HOST).unwrap_err();
        assert!(matches!(err, Error::NoPages { chapter: 55 }));

        let err = parse_chapter_detail(55, &json!({"pages": "nope"}), HOST).unwrap_err();
        assert!(matches!(err, Error::NoPages { chapter: 55 }));
    }

    #[test]
    fn test_pages_without_usable_paths() {
        let data = json!({"pages": [{"url": ""}, "string page", {"width": 800}]});
        let err = parse_chapter_detail(8, &data, HOST).unwrap_err();
        assert!(matches!(err, Error::NoImageUrls { chapter: 8 }));
    }

    #[test]
    fn test_malformed_pages_skipped() {
        let data = json!({"pages": [42, {"url": "a.jpg"}, null]});
        let detail = parse_chapter_detail(1, &data, HOST).unwrap();
        assert_eq!(detail.page_urls, vec!["https://img.example/a.jpg"]);
        assert_eq!(detail.id, "");
        assert_eq!(detail.name, "");
        assert!(detail.teams.is_empty());
        assert_eq!(detail.manga_id, None);
    }
}
