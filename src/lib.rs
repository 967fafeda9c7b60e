//! # mangalib-dl
//!
//! Concurrent chapter downloader for MangaLib-style manga APIs.
//!
//! ## Design Philosophy
//!
//! mangalib-dl is designed to be:
//! - **Resilient** - Rate limits, anti-bot challenges and transient failures are retried
//! - **Isolated** - One failing chapter never aborts its siblings
//! - **Library-first** - The CLI is a thin layer over [`MangaDownloader`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use mangalib_dl::{Config, MangaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("114307--kaoru-hana-wa-rinto-saku", (54, 56));
//!
//!     let downloader = MangaDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = downloader.download_chapters().await?;
//!     println!("{} chapters saved to {}", summary.succeeded, summary.archive.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API endpoints and the chapter source seam
pub mod api;
/// Series archive assembly
pub mod archive;
/// Per-slug get-or-populate cache
pub mod cache;
/// Chapter detail retrieval
pub mod chapter;
/// Retrying HTTP client
pub mod client;
/// Configuration types
pub mod config;
/// Download orchestration
pub mod downloader;
/// Error types
pub mod error;
/// Metadata document generation
pub mod metadata;
/// Retry logic with rate-limit and linear backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Volume resolution
pub mod volume;

// Re-export commonly used types
pub use api::{ChapterSource, MangaApi};
pub use archive::{ArchiveBuilder, DownloadedChapter};
pub use client::HttpClient;
pub use config::{Config, RetryConfig};
pub use downloader::MangaDownloader;
pub use error::{ChapterFailure, Error, Result};
pub use metadata::{ComicInfoGenerator, MetadataGenerator};
pub use retry::IsRetryable;
pub use types::{ChapterInfo, ChapterVolumeMap, Event, RunSummary};
pub use volume::VolumeResolver;
