//! Series archive assembly
//!
//! Successful chapters are laid out as series → volume → chapter container,
//! enriched with metadata documents and a cover, then compressed into a single
//! archive in the output directory.

mod container;

pub use container::{sorted_files, write_cbz, zip_directory};

use crate::client::HttpClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::MetadataGenerator;
use crate::types::ChapterInfo;
use crate::utils::{build_image_url, sanitize_filename, unix_timestamp};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

/// File names the series cover is saved under
pub const COVER_FILE_NAMES: &[&str] = &[
    "Series Cover.jpg",
    "cover.jpg",
    "folder.jpg",
    "poster.jpg",
    "thumbnail.jpg",
];

/// A chapter whose images are complete in its staging directory
#[derive(Debug, Clone)]
pub struct DownloadedChapter {
    /// Staging directory holding the page images
    pub staging: PathBuf,
    /// Facts about the chapter
    pub info: ChapterInfo,
}

/// Builds the final series archive from downloaded chapters
pub struct ArchiveBuilder {
    client: HttpClient,
    metadata: Arc<dyn MetadataGenerator>,
    output_dir: PathBuf,
    image_host: String,
    image_attempts: u32,
    cleanup: bool,
}

impl ArchiveBuilder {
    /// Create a builder writing into the configured output directory
    pub fn new(client: HttpClient, metadata: Arc<dyn MetadataGenerator>, config: &Config) -> Self {
        Self {
            client,
            metadata,
            output_dir: config.output_dir.clone(),
            image_host: config.image_host.clone(),
            image_attempts: config.retry.image_attempts,
            cleanup: config.cleanup_temp,
        }
    }

    /// Assemble and compress the archive, returning its path
    ///
    /// Staging directories are removed afterwards (whether or not assembly
    /// succeeded) unless cleanup is disabled.
    pub async fn build(
        &self,
        chapters: &[DownloadedChapter],
        series_title: &str,
        series_meta: &Value,
    ) -> Result<PathBuf> {
        let mut sanitized = sanitize_filename(series_title);
        if sanitized.is_empty() {
            sanitized = "series".to_string();
        }

        let temp_series_dir = self
            .output_dir
            .join(format!("_tmp_series_{}", unix_timestamp()));
        let archive_path = self.output_dir.join(format!("{}.zip", sanitized));

        let result = self
            .assemble(
                chapters,
                series_title,
                series_meta,
                &temp_series_dir,
                &sanitized,
                &archive_path,
            )
            .await;

        self.remove_staging(chapters, &temp_series_dir).await;

        if result.is_ok() {
            info!(archive = ?archive_path, chapters = chapters.len(), "saved archive");
        }
        result.map(|()| archive_path)
    }

    async fn assemble(
        &self,
        chapters: &[DownloadedChapter],
        series_title: &str,
        series_meta: &Value,
        temp_series_dir: &Path,
        sanitized: &str,
        archive_path: &Path,
    ) -> Result<()> {
        let series_dir = temp_series_dir.join(sanitized);
        tokio::fs::create_dir_all(&series_dir).await?;

        self.save_cover(series_meta, &series_dir).await;

        let plan = SeriesTree {
            metadata: Arc::clone(&self.metadata),
            chapters: chapters.to_vec(),
            series_title: series_title.to_string(),
            series_meta: series_meta.clone(),
            series_dir,
            temp_series_dir: temp_series_dir.to_path_buf(),
            archive_path: archive_path.to_path_buf(),
        };

        spawn_blocking(move || plan.write())
            .await
            .map_err(|e| Error::Other(format!("archive task panicked: {}", e)))?
    }

    /// Save the series cover under each conventional name; failures are only logged
    async fn save_cover(&self, series_meta: &Value, series_dir: &Path) {
        let Some(cover_url) = cover_url(series_meta)
            .and_then(|path| build_image_url(&path, &self.image_host))
        else {
            debug!("series has no cover");
            return;
        };

        for name in COVER_FILE_NAMES {
            if let Err(e) = self
                .client
                .fetch_image(&cover_url, &series_dir.join(name), self.image_attempts)
                .await
            {
                warn!(cover = *name, error = %e, "failed to download cover");
            }
        }
    }

    async fn remove_staging(&self, chapters: &[DownloadedChapter], temp_series_dir: &Path) {
        if !self.cleanup {
            debug!("cleanup disabled, keeping staging directories");
            return;
        }

        let dirs = chapters
            .iter()
            .map(|c| c.staging.as_path())
            .chain(std::iter::once(temp_series_dir));
        for dir in dirs {
            remove_dir_quietly(dir).await;
        }
    }
}

/// Remove a directory tree, logging anything but "not found"
pub(crate) async fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(?dir, error = %e, "failed to remove staging directory");
    }
}

/// Cover URL from series metadata: `cover.default`, or `cover` itself when it is a string
pub fn cover_url(series_meta: &Value) -> Option<String> {
    let cover = series_meta.get("cover")?;
    let url = match cover {
        Value::Object(map) => map.get("default")?.as_str()?,
        Value::String(url) => url.as_str(),
        _ => return None,
    };
    (!url.trim().is_empty()).then(|| url.to_string())
}

/// Everything the blocking writer needs, owned
struct SeriesTree {
    metadata: Arc<dyn MetadataGenerator>,
    chapters: Vec<DownloadedChapter>,
    series_title: String,
    series_meta: Value,
    series_dir: PathBuf,
    temp_series_dir: PathBuf,
    archive_path: PathBuf,
}

impl SeriesTree {
    fn write(self) -> Result<()> {
        std::fs::write(
            self.series_dir.join("ComicInfo.xml"),
            self.metadata
                .series_comic_info(&self.series_title, &self.series_meta)?,
        )?;
        std::fs::write(
            self.series_dir.join("series.json"),
            self.metadata.series_json(&self.series_title, &self.series_meta)?,
        )?;

        for (volume, chapters) in group_by_volume(&self.chapters) {
            let volume_dir = self
                .series_dir
                .join(sanitize_filename(&format!("Volume {:02}", volume)));
            std::fs::create_dir_all(&volume_dir)?;
            std::fs::write(
                volume_dir.join("ComicInfo.xml"),
                self.metadata.volume_comic_info(
                    volume,
                    &self.series_title,
                    chapters.len(),
                    &self.series_meta,
                )?,
            )?;

            for chapter in chapters {
                let file_name = sanitize_filename(&format!("Chapter {:03}", chapter.info.number));
                let manifest = manifest(&chapter.info)?;
                let comic_info = self.metadata.chapter_comic_info(&chapter.info)?;
                write_cbz(
                    &chapter.staging,
                    &[
                        ("info.txt", manifest.as_bytes()),
                        ("ComicInfo.xml", comic_info.as_slice()),
                    ],
                    &volume_dir.join(format!("{}.cbz", file_name)),
                )?;
            }
        }

        zip_directory(&self.temp_series_dir, &self.archive_path)
    }
}

/// Chapters grouped by volume; volumes and chapters ascending
pub fn group_by_volume(chapters: &[DownloadedChapter]) -> BTreeMap<i64, Vec<&DownloadedChapter>> {
    let mut groups: BTreeMap<i64, Vec<&DownloadedChapter>> = BTreeMap::new();
    for chapter in chapters {
        groups.entry(chapter.info.volume).or_default().push(chapter);
    }
    for list in groups.values_mut() {
        list.sort_by_key(|c| c.info.number);
    }
    groups
}

/// `info.txt` manifest stored in each chapter container
fn manifest(info: &ChapterInfo) -> Result<String> {
    let doc = json!({
        "series": info.series_title,
        "chapter_number": info.number,
        "volume": info.volume,
        "chapter_name": info.name,
        "chapter_id": info.chapter_id,
        "teams": info.teams,
        "pages": info.pages_count,
        "created_at": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}
