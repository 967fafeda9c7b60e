//! Configuration types for mangalib-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Run parameters for one download session
///
/// Built once before the run and shared read-only by every task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Series slug on the remote service (e.g. "114307--kaoru-hana-wa-rinto-saku")
    #[serde(default)]
    pub manga_slug: String,

    /// Inclusive chapter range to download
    #[serde(default)]
    pub chapter_range: (u32, u32),

    /// Series title to use instead of the one reported by the API
    #[serde(default)]
    pub series_title_override: Option<String>,

    /// Volume to assign to every chapter, bypassing resolution entirely
    #[serde(default)]
    pub volume_override: Option<i64>,

    /// Output directory for the archive and staging directories (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum chapters downloaded at once (default: 3)
    #[serde(default = "default_max_concurrent_chapters")]
    pub max_concurrent_chapters: usize,

    /// Maximum images downloaded at once within one chapter (default: 8)
    #[serde(default = "default_max_concurrent_images")]
    pub max_concurrent_images: usize,

    /// Pause after every successful request (default: 0.03 seconds)
    #[serde(default = "default_request_delay", with = "duration_secs_f64")]
    pub request_delay: Duration,

    /// Inclusive volume range probed when every other strategy fails (default: 1-15)
    #[serde(default = "default_fallback_volume_range")]
    pub fallback_volume_range: (i64, i64),

    /// Remove staging directories once the archive is written (default: true)
    #[serde(default = "default_true")]
    pub cleanup_temp: bool,

    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Host joined to relative image paths
    #[serde(default = "default_image_host")]
    pub image_host: String,

    /// Referer sent with image requests and used for session warm-up
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Retry and timeout tuning
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manga_slug: String::new(),
            chapter_range: (1, 1),
            series_title_override: None,
            volume_override: None,
            output_dir: default_output_dir(),
            max_concurrent_chapters: default_max_concurrent_chapters(),
            max_concurrent_images: default_max_concurrent_images(),
            request_delay: default_request_delay(),
            fallback_volume_range: default_fallback_volume_range(),
            cleanup_temp: true,
            api_base: default_api_base(),
            image_host: default_image_host(),
            referer: default_referer(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Create a configuration for a slug and chapter range with defaults elsewhere
    pub fn new(manga_slug: impl Into<String>, chapter_range: (u32, u32)) -> Self {
        Self {
            manga_slug: manga_slug.into(),
            chapter_range,
            ..Default::default()
        }
    }

    /// Check the configuration for values that would make the run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.manga_slug.trim().is_empty() {
            return Err(Error::config("manga_slug", "slug must not be empty"));
        }

        let (start, end) = self.chapter_range;
        if start > end {
            return Err(Error::config(
                "chapter_range",
                format!("start {} is after end {}", start, end),
            ));
        }

        let (first, last) = self.fallback_volume_range;
        if first > last {
            return Err(Error::config(
                "fallback_volume_range",
                format!("start {} is after end {}", first, last),
            ));
        }

        if self.max_concurrent_chapters == 0 {
            return Err(Error::config(
                "max_concurrent_chapters",
                "must be at least 1",
            ));
        }
        if self.max_concurrent_images == 0 {
            return Err(Error::config("max_concurrent_images", "must be at least 1"));
        }

        for (key, value) in [
            ("api_base", &self.api_base),
            ("image_host", &self.image_host),
            ("referer", &self.referer),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL '{}': {}", value, e)))?;
        }

        Ok(())
    }

    /// Chapter numbers of the configured range, ascending
    pub fn chapters(&self) -> Vec<u32> {
        let (start, end) = self.chapter_range;
        (start..=end).collect()
    }
}

/// Retry, backoff and timeout settings for remote requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts for the chapter list request (default: 4)
    #[serde(default = "default_chapter_list_attempts")]
    pub chapter_list_attempts: u32,

    /// Attempts for the series info request (default: 3)
    #[serde(default = "default_series_info_attempts")]
    pub series_info_attempts: u32,

    /// Attempts for a chapter detail request (default: 4)
    #[serde(default = "default_chapter_attempts")]
    pub chapter_attempts: u32,

    /// Attempts for one image download (default: 10)
    #[serde(default = "default_image_attempts")]
    pub image_attempts: u32,

    /// Linear step for transient failures; retry `n` waits `step * (n + 1)` (default: 0.2 seconds)
    #[serde(default = "default_transient_step", with = "duration_secs_f64")]
    pub transient_step: Duration,

    /// Linear step after a 403 warm-up; retry `n` waits `step * (n + 1)` (default: 0.3 seconds)
    #[serde(default = "default_challenge_step", with = "duration_secs_f64")]
    pub challenge_step: Duration,

    /// Cap for the exponential part of the rate-limit backoff (default: 60 seconds)
    #[serde(default = "default_max_backoff", with = "duration_secs_f64")]
    pub max_backoff: Duration,

    /// Timeout of a single API request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_secs_f64")]
    pub request_timeout: Duration,

    /// Timeout of a single image request (default: 60 seconds)
    #[serde(default = "default_image_timeout", with = "duration_secs_f64")]
    pub image_timeout: Duration,

    /// Timeout of the warm-up request (default: 6 seconds)
    #[serde(default = "default_warm_up_timeout", with = "duration_secs_f64")]
    pub warm_up_timeout: Duration,

    /// Pause before each brute-force volume probe (default: 0.12 seconds)
    #[serde(default = "default_probe_pause", with = "duration_secs_f64")]
    pub probe_pause: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            chapter_list_attempts: default_chapter_list_attempts(),
            series_info_attempts: default_series_info_attempts(),
            chapter_attempts: default_chapter_attempts(),
            image_attempts: default_image_attempts(),
            transient_step: default_transient_step(),
            challenge_step: default_challenge_step(),
            max_backoff: default_max_backoff(),
            request_timeout: default_request_timeout(),
            image_timeout: default_image_timeout(),
            warm_up_timeout: default_warm_up_timeout(),
            probe_pause: default_probe_pause(),
        }
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent_chapters() -> usize {
    3
}

fn default_max_concurrent_images() -> usize {
    8
}

fn default_request_delay() -> Duration {
    Duration::from_millis(30)
}

fn default_fallback_volume_range() -> (i64, i64) {
    (1, 15)
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "https://api.cdnlibs.org/api/manga".to_string()
}

fn default_image_host() -> String {
    "https://img3.mixlib.me".to_string()
}

fn default_referer() -> String {
    "https://mangalib.me/".to_string()
}

fn default_chapter_list_attempts() -> u32 {
    4
}

fn default_series_info_attempts() -> u32 {
    3
}

fn default_chapter_attempts() -> u32 {
    4
}

fn default_image_attempts() -> u32 {
    10
}

fn default_transient_step() -> Duration {
    Duration::from_millis(200)
}

fn default_challenge_step() -> Duration {
    Duration::from_millis(300)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_image_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_warm_up_timeout() -> Duration {
    Duration::from_secs(6)
}

fn default_probe_pause() -> Duration {
    Duration::from_millis(120)
}

// Duration serialization helper (fractional seconds)
mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
