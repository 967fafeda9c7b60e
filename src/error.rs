//! Error types for mangalib-dl
//!
//! This module provides the error taxonomy used throughout the library:
//! - Transport failures (network, HTTP status, rate limiting, anti-bot challenges)
//! - Payload problems (empty bodies, malformed responses, chapters without pages)
//! - Resolution failures (a chapter whose volume cannot be determined)
//! - Local failures (I/O, archive writing, configuration)

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mangalib-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mangalib-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chapter_range")
        key: Option<String>,
    },

    /// Transport-level failure (timeout, connection refused, body read error)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status that has no dedicated variant
    #[error("HTTP {status} for {url}")]
    Http {
        /// Response status
        status: StatusCode,
        /// Requested URL
        url: String,
    },

    /// Server answered 429 Too Many Requests
    #[error("rate limited (429) for {url}")]
    RateLimited {
        /// Value of the `Retry-After` header when it was a non-negative integer
        retry_after: Option<u64>,
        /// Requested URL
        url: String,
    },

    /// Server answered 403, which the image host uses as an anti-bot challenge
    #[error("anti-bot challenge (403) for {url}")]
    AntiBotChallenge {
        /// Requested URL
        url: String,
    },

    /// Server answered successfully but with no body
    #[error("empty response from {url}")]
    EmptyResponse {
        /// Requested URL
        url: String,
    },

    /// Response body was not shaped as expected
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Chapter detail payload had no pages
    #[error("no pages found for chapter {chapter}")]
    NoPages {
        /// Chapter number
        chapter: u32,
    },

    /// Chapter detail payload had pages but none carried a usable image path
    #[error("no valid image URLs found for chapter {chapter}")]
    NoImageUrls {
        /// Chapter number
        chapter: u32,
    },

    /// Every volume resolution strategy failed
    #[error("could not determine volume for chapter {chapter}")]
    VolumeUnresolved {
        /// Chapter number
        chapter: u32,
    },

    /// Every chapter in the requested range failed
    #[error("no chapters downloaded successfully ({} failed)", failed.len())]
    NoChaptersDownloaded {
        /// Per-chapter failures, in chapter order
        failed: Vec<ChapterFailure>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive writing failed
    #[error("archive error at {path}: {source}")]
    Archive {
        /// Archive being written
        path: PathBuf,
        /// Underlying zip error
        #[source]
        source: zip::result::ZipError,
    },

    /// Metadata document generation failed
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Error::AntiBotChallenge { .. } => Some(StatusCode::FORBIDDEN),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }
}

/// A single chapter's terminal failure, captured without aborting its siblings
#[derive(Debug)]
pub struct ChapterFailure {
    /// Chapter number that failed
    pub chapter: u32,
    /// Cause of the failure
    pub error: Error,
}

impl std::fmt::Display for ChapterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chapter {}: {}", self.chapter, self.error)
    }
}
