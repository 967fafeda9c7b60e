//! Core types and events

use crate::error::ChapterFailure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Facts about one fully downloaded chapter
///
/// Created only after every page image is on disk; consumed by the archive builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    /// Chapter number
    pub number: u32,
    /// Resolved volume
    pub volume: i64,
    /// Display name with numbering noise removed
    pub name: String,
    /// Number of downloaded pages
    pub pages_count: usize,
    /// Series title as seen while downloading this chapter
    pub series_title: String,
    /// Names of the translation teams credited for the chapter
    pub teams: Vec<String>,
    /// Chapter id on the remote service (empty when unknown)
    pub chapter_id: String,
}

/// Chapter number → volume mapping for one series
///
/// Keys are floating point chapter numbers; `-0.0` and `0.0` are the same key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChapterVolumeMap {
    volumes: HashMap<u64, i64>,
}

impl ChapterVolumeMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    fn key(chapter: f64) -> u64 {
        // normalise negative zero so it hashes like zero
        (chapter + 0.0).to_bits()
    }

    /// Record the volume of a chapter, replacing an earlier entry
    pub fn insert(&mut self, chapter: f64, volume: i64) {
        self.volumes.insert(Self::key(chapter), volume);
    }

    /// Volume of a chapter, if listed
    pub fn get(&self, chapter: f64) -> Option<i64> {
        self.volumes.get(&Self::key(chapter)).copied()
    }

    /// Number of listed chapters
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Whether no chapter is listed
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

impl FromIterator<(f64, i64)> for ChapterVolumeMap {
    fn from_iter<I: IntoIterator<Item = (f64, i64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (chapter, volume) in iter {
            map.insert(chapter, volume);
        }
        map
    }
}

/// Outcome of a whole run
#[derive(Debug)]
pub struct RunSummary {
    /// Chapters in the requested range
    pub total: usize,
    /// Chapters packaged into the archive
    pub succeeded: usize,
    /// Chapters that failed, in chapter order
    pub failed: Vec<ChapterFailure>,
    /// Path of the produced archive
    pub archive: PathBuf,
}

/// Event emitted during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run started
    RunStarted {
        /// Series slug
        slug: String,
        /// First chapter of the range
        first: u32,
        /// Last chapter of the range
        last: u32,
    },

    /// Chapter metadata resolved, image download starting
    ChapterStarted {
        /// Chapter number
        chapter: u32,
        /// Resolved volume
        volume: i64,
        /// Number of pages to download
        pages: usize,
    },

    /// One page image written to staging
    PageDownloaded {
        /// Chapter number
        chapter: u32,
        /// 1-based page index
        page: usize,
        /// Pages in the chapter
        total: usize,
    },

    /// Chapter fully downloaded
    ChapterCompleted {
        /// Chapter number
        chapter: u32,
        /// Resolved volume
        volume: i64,
    },

    /// Chapter failed; siblings are unaffected
    ChapterFailed {
        /// Chapter number
        chapter: u32,
        /// Error message
        error: String,
    },

    /// Final archive written
    ArchiveCreated {
        /// Archive path
        path: PathBuf,
    },

    /// Run finished
    RunFinished {
        /// Chapters packaged
        succeeded: usize,
        /// Chapters failed
        failed: usize,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_map_float_keys() {
        let map: ChapterVolumeMap = [(54.0, 1), (54.5, 2), (0.0, 7)].into_iter().collect();

        assert_eq!(map.get(54.0), Some(1));
        assert_eq!(map.get(54.5), Some(2));
        assert_eq!(map.get(-0.0), Some(7));
        assert_eq!(map.get(55.0), None);
        assert_eq!(map.len(), 3);
        assert!(!map.is_empty());
    }

    #[test]
    fn test_volume_map_last_insert_wins() {
        let mut map = ChapterVolumeMap::new();
        assert!(map.is_empty());
        map.insert(3.0, 1);
        map.insert(3.0, 2);
        assert_eq!(map.get(3.0), Some(2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_event_serialization_tagged() {
        let event = Event::ChapterFailed {
            chapter: 55,
            error: "no pages found for chapter 55".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chapter_failed");
        assert_eq!(json["chapter"], 55);
    }
}
