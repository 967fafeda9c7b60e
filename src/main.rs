//! mangalib-dl command-line entry point
//!
//! Downloads a chapter range of one series and packages it into a single archive.
//! Exits with status 0 when an archive was produced and 1 otherwise.

use clap::Parser;
use mangalib_dl::{Config, Error, MangaDownloader, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mangalib-dl")]
#[command(about = "Download manga chapters into a single archive", version)]
struct Cli {
    /// Series slug, e.g. "114307--kaoru-hana-wa-rinto-saku"
    slug: String,

    /// First chapter to download
    #[arg(long = "from")]
    from: u32,

    /// Last chapter to download (inclusive)
    #[arg(long = "to")]
    to: u32,

    /// Series title used instead of the one reported by the API
    #[arg(long)]
    title: Option<String>,

    /// Put every chapter into this volume, skipping volume resolution
    #[arg(long, allow_negative_numbers = true)]
    volume: Option<i64>,

    /// Output directory
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Chapters downloaded at once
    #[arg(long)]
    chapters: Option<usize>,

    /// Images downloaded at once per chapter
    #[arg(long)]
    images: Option<usize>,

    /// Pause after each successful request, in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// Volumes probed when no other source knows a chapter's volume, as A-B
    #[arg(long, value_parser = parse_volume_range)]
    volume_range: Option<(i64, i64)>,

    /// Keep staging directories after the run
    #[arg(long, default_value_t = false)]
    keep_temp: bool,

    /// REST API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Host joined to relative image paths
    #[arg(long)]
    image_host: Option<String>,

    /// Referer for image requests and session warm-up
    #[arg(long)]
    referer: Option<String>,

    /// JSON configuration file; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_volume_range(text: &str) -> std::result::Result<(i64, i64), String> {
    let (first, last) = text
        .split_once('-')
        .ok_or_else(|| format!("expected A-B, got '{}'", text))?;
    let first = first
        .trim()
        .parse()
        .map_err(|e| format!("invalid start '{}': {}", first, e))?;
    let last = last
        .trim()
        .parse()
        .map_err(|e| format!("invalid end '{}': {}", last, e))?;
    Ok((first, last))
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(format!("mangalib_dl={0},{0}", default_level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Build the run configuration: file (if any), then flags on top
fn build_config(cli: Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let mut config: Config = serde_json::from_str(&text)?;
            config.manga_slug = cli.slug.clone();
            config.chapter_range = (cli.from, cli.to);
            config
        }
        None => Config::new(cli.slug.clone(), (cli.from, cli.to)),
    };

    if let Some(title) = cli.title {
        config.series_title_override = Some(title);
    }
    if let Some(volume) = cli.volume {
        config.volume_override = Some(volume);
    }
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if let Some(chapters) = cli.chapters {
        config.max_concurrent_chapters = chapters;
    }
    if let Some(images) = cli.images {
        config.max_concurrent_images = images;
    }
    if let Some(delay) = cli.delay {
        config.request_delay = Duration::try_from_secs_f64(delay)
            .map_err(|e| Error::config("request_delay", e.to_string()))?;
    }
    if let Some(range) = cli.volume_range {
        config.fallback_volume_range = range;
    }
    if cli.keep_temp {
        config.cleanup_temp = false;
    }
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if let Some(image_host) = cli.image_host {
        config.image_host = image_host;
    }
    if let Some(referer) = cli.referer {
        config.referer = referer;
    }

    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    let downloader = MangaDownloader::new(config).await?;

    tokio::select! {
        result = downloader.download_chapters() => {
            let summary = result?;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed.len(),
                total = summary.total,
                "archive saved to {}",
                summary.archive.display()
            );
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, staging directories may be left behind");
            Err(Error::Other("interrupted".to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::NoChaptersDownloaded { failed }) => {
            for failure in &failed {
                error!("{}", failure);
            }
            error!("no chapters were downloaded");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "download failed");
            ExitCode::FAILURE
        }
    }
}
