//! Single-chapter download: resolve volume, fetch detail, download images

use crate::archive::{DownloadedChapter, remove_dir_quietly};
use crate::chapter::ChapterDetail;
use crate::error::Result;
use crate::types::{ChapterInfo, Event};
use crate::utils::{page_file_name, unix_timestamp, value_to_string};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::MangaDownloader;

impl MangaDownloader {
    /// Download one chapter into its own staging directory
    ///
    /// Any failure removes the staging directory (unless cleanup is disabled)
    /// and is returned to the caller; sibling chapters are unaffected.
    pub(crate) async fn download_chapter(
        &self,
        chapter: u32,
        series_meta: &Value,
    ) -> Result<DownloadedChapter> {
        let staging = self
            .config
            .output_dir
            .join(format!("_tmp_ch{}_{}", chapter, unix_timestamp()));

        match self.run_chapter(chapter, series_meta, &staging).await {
            Ok(info) => {
                tracing::info!(chapter, volume = info.volume, pages = info.pages_count, "chapter downloaded");
                self.emit_event(Event::ChapterCompleted {
                    chapter,
                    volume: info.volume,
                });
                Ok(DownloadedChapter { staging, info })
            }
            Err(e) => {
                tracing::error!(chapter, error = %e, "chapter failed");
                self.emit_event(Event::ChapterFailed {
                    chapter,
                    error: e.to_string(),
                });
                if self.config.cleanup_temp {
                    remove_dir_quietly(&staging).await;
                }
                Err(e)
            }
        }
    }

    async fn run_chapter(
        &self,
        chapter: u32,
        series_meta: &Value,
        staging: &Path,
    ) -> Result<ChapterInfo> {
        tokio::fs::create_dir_all(staging).await?;

        let slug = self.config.manga_slug.as_str();
        let volume = self.resolver.resolve(slug, chapter).await?;
        let detail = self.fetcher.fetch(slug, chapter, volume).await?;
        let series_title = chapter_series_title(
            self.config.series_title_override.as_deref(),
            series_meta,
            &detail,
        );

        tracing::info!(
            chapter,
            volume,
            pages = detail.page_urls.len(),
            name = %detail.name,
            "downloading chapter"
        );
        self.emit_event(Event::ChapterStarted {
            chapter,
            volume,
            pages: detail.page_urls.len(),
        });

        self.download_images(chapter, &detail.page_urls, staging)
            .await?;

        Ok(ChapterInfo {
            number: chapter,
            volume,
            name: detail.name,
            pages_count: detail.page_urls.len(),
            series_title,
            teams: detail.teams,
            chapter_id: detail.id,
        })
    }

    /// Download every page of a chapter with at most `max_concurrent_images` in flight
    ///
    /// File names follow URL order, not completion order. The first image that
    /// exhausts its retries fails the chapter.
    async fn download_images(&self, chapter: u32, urls: &[String], staging: &Path) -> Result<()> {
        let total = urls.len();
        let attempts = self.config.retry.image_attempts;

        stream::iter(urls.iter().enumerate())
            .map(|(i, url)| {
                let destination: PathBuf = staging.join(page_file_name(i + 1, url));
                async move {
                    self.client
                        .fetch_image(url, &destination, attempts)
                        .await?;
                    self.emit_event(Event::PageDownloaded {
                        chapter,
                        page: i + 1,
                        total,
                    });
                    Ok::<(), crate::error::Error>(())
                }
            })
            .buffer_unordered(self.config.max_concurrent_images)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(())
    }
}

/// Series title recorded for a chapter: override, else series `name` or
/// `title`, else the chapter's `manga_id`, else "Unknown"
pub(crate) fn chapter_series_title(
    title_override: Option<&str>,
    series_meta: &Value,
    detail: &ChapterDetail,
) -> String {
    if let Some(title) = title_override.filter(|t| !t.trim().is_empty()) {
        return title.to_string();
    }

    ["name", "title"]
        .iter()
        .filter_map(|key| series_meta.get(*key))
        .map(value_to_string)
        .find(|title| !title.trim().is_empty())
        .or_else(|| detail.manga_id.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail(manga_id: Option<&str>) -> ChapterDetail {
        ChapterDetail {
            id: "1".into(),
            name: String::new(),
            page_urls: vec![],
            teams: vec![],
            manga_id: manga_id.map(str::to_string),
        }
    }

    #[test]
    fn test_chapter_series_title_precedence() {
        let meta = json!({"name": "Name", "title": "Title"});
        assert_eq!(chapter_series_title(Some("Over"), &meta, &detail(None)), "Over");
        assert_eq!(chapter_series_title(None, &meta, &detail(None)), "Name");
        assert_eq!(
            chapter_series_title(None, &json!({"title": "Title"}), &detail(None)),
            "Title"
        );
        assert_eq!(
            chapter_series_title(Some(""), &json!({}), &detail(Some("114307"))),
            "114307"
        );
        assert_eq!(chapter_series_title(None, &json!({}), &detail(None)), "Unknown");
    }
}
