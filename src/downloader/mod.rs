//! Download orchestration
//!
//! [`MangaDownloader`] drives a chapter range with two nested bounds: at most
//! `max_concurrent_chapters` chapters in flight, and within each chapter at most
//! `max_concurrent_images` images in flight. Every chapter gets its own image
//! bound, so up to K1×K2 images may be downloading at once.
//!
//! - [`chapter_task`] - Per-chapter resolution, fetch and image download

mod chapter_task;

use crate::api::{ChapterSource, MangaApi};
use crate::archive::{ArchiveBuilder, DownloadedChapter};
use crate::chapter::ChapterFetcher;
use crate::client::HttpClient;
use crate::config::Config;
use crate::error::{ChapterFailure, Error, Result};
use crate::metadata::{ComicInfoGenerator, MetadataGenerator};
use crate::types::{Event, RunSummary};
use crate::utils::value_to_string;
use crate::volume::VolumeResolver;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Capacity of the event channel; slow subscribers lag beyond this
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Main downloader instance (cloneable - all shared state is Arc-wrapped)
#[derive(Clone)]
pub struct MangaDownloader {
    /// Run configuration
    pub(crate) config: Arc<Config>,
    /// Shared HTTP client (images and cover)
    pub(crate) client: HttpClient,
    /// Chapter facts: chapter list, series info and chapter detail
    pub(crate) source: Arc<dyn ChapterSource>,
    /// Chapter → volume resolution
    pub(crate) resolver: VolumeResolver,
    /// Chapter detail retrieval
    pub(crate) fetcher: ChapterFetcher,
    /// Metadata documents written into the archive
    pub(crate) metadata: Arc<dyn MetadataGenerator>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl MangaDownloader {
    /// Create a downloader talking to the configured API
    ///
    /// Validates the configuration, creates the output directory and performs
    /// the initial session warm-up.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = HttpClient::new(&config)?;
        let source: Arc<dyn ChapterSource> = Arc::new(MangaApi::new(client.clone(), &config));
        Self::with_source(config, client, source).await
    }

    /// Create a downloader reading chapter facts from a custom source
    ///
    /// `client` is still used for image and cover downloads.
    pub async fn with_source(
        config: Config,
        client: HttpClient,
        source: Arc<dyn ChapterSource>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create output directory '{}': {}",
                        config.output_dir.display(),
                        e
                    ),
                ))
            })?;

        client.warm_up().await;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            resolver: VolumeResolver::new(Arc::clone(&source), &config),
            fetcher: ChapterFetcher::new(Arc::clone(&source), config.image_host.clone()),
            config: Arc::new(config),
            client,
            source,
            metadata: Arc::new(ComicInfoGenerator),
            event_tx,
        })
    }

    /// Replace the metadata generator used for the archive documents
    pub fn with_metadata_generator(mut self, metadata: Arc<dyn MetadataGenerator>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Subscribe to run events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() only fails without receivers
        self.event_tx.send(event).ok();
    }

    /// Download every chapter of the configured range and build the archive
    ///
    /// Chapter failures are isolated and reported in the summary. Returns
    /// [`Error::NoChaptersDownloaded`] when no chapter succeeds, in which case
    /// no archive is written.
    pub async fn download_chapters(&self) -> Result<RunSummary> {
        let slug = self.config.manga_slug.as_str();
        let (first, last) = self.config.chapter_range;
        let chapters = self.config.chapters();

        info!(slug, first, last, "starting download");
        self.emit_event(Event::RunStarted {
            slug: slug.to_string(),
            first,
            last,
        });

        let series = self.source.series_info(slug).await;
        self.source.chapter_volumes(slug).await;

        let series_title = archive_title(&self.config, &series);
        let series_meta: &Value = &series;

        // a slow chapter must not hold back the next one; results are tagged
        // with their position and put back in chapter order afterwards
        let mut results: Vec<(usize, Result<DownloadedChapter>)> =
            stream::iter(chapters.iter().copied().enumerate())
                .map(move |(index, chapter)| async move {
                    (index, self.download_chapter(chapter, series_meta).await)
                })
                .buffer_unordered(self.config.max_concurrent_chapters)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut downloaded = Vec::new();
        let mut failed = Vec::new();
        for (index, result) in results {
            let chapter = chapters[index];
            match result {
                Ok(chapter) => downloaded.push(chapter),
                Err(error) => failed.push(ChapterFailure { chapter, error }),
            }
        }

        if downloaded.is_empty() {
            error!(slug, failed = failed.len(), "no chapters downloaded");
            self.emit_event(Event::RunFinished {
                succeeded: 0,
                failed: failed.len(),
            });
            return Err(Error::NoChaptersDownloaded { failed });
        }

        let builder = ArchiveBuilder::new(
            self.client.clone(),
            Arc::clone(&self.metadata),
            &self.config,
        );
        let archive = builder.build(&downloaded, &series_title, series_meta).await?;
        self.emit_event(Event::ArchiveCreated {
            path: archive.clone(),
        });

        let summary = RunSummary {
            total: chapters.len(),
            succeeded: downloaded.len(),
            failed,
            archive,
        };

        for failure in &summary.failed {
            warn!(chapter = failure.chapter, error = %failure.error, "chapter skipped");
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            archive = ?summary.archive,
            "download finished"
        );
        self.emit_event(Event::RunFinished {
            succeeded: summary.succeeded,
            failed: summary.failed.len(),
        });

        Ok(summary)
    }
}

/// Title naming the archive: override, else the first non-empty of
/// `name`, `rus_name`, `eng_name`, else the slug
pub fn archive_title(config: &Config, series: &Value) -> String {
    if let Some(title) = config
        .series_title_override
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return title.to_string();
    }

    ["name", "rus_name", "eng_name"]
        .iter()
        .filter_map(|key| series.get(*key))
        .map(value_to_string)
        .map(|title| title.trim().to_string())
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| config.manga_slug.clone())
}
