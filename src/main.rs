//! # Feed Press
//!
//! A feed ingestion pipeline that polls RSS and Atom feeds on a schedule and
//! publishes a static news site: a JSON article store, one HTML page per
//! article, downloaded and recompressed images, and a sitemap.
//!
//! ## Features
//!
//! - Parses RSS 2.0 and Atom, capped at 20 items per feed per cycle
//! - Deduplicates items across cycles by a content fingerprint
//! - Stores every image as original, full-size JPEG and thumbnail, with a
//!   shared fallback when an image cannot be acquired
//! - Keeps the newest 1000 articles, sorted newest first
//! - Runs once at start, then on 15-minute wall-clock boundaries
//!
//! ## Usage
//!
//! ```sh
//! feed_press -d ./data -p ./public
//! feed_press --once -f https://feeds.bbci.co.uk/news/world/rss.xml
//! ```
//!
//! ## Architecture
//!
//! Each cycle is a pipeline:
//! 1. **Prepare**: check output directories, provision the fallback image
//! 2. **Fetch**: download and parse every feed (a few concurrently)
//! 3. **Normalize**: fingerprint, dedup, excerpt, image, page per new item
//! 4. **Persist**: merge into the store, write the snapshot and sitemap

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod feeds;
mod fetch;
mod identity;
mod images;
mod ingest;
mod models;
mod outputs;
mod scheduler;
mod store;
mod utils;

use cli::Cli;
use config::Settings;
use fetch::{HttpFetcher, RetryFetch};
use ingest::Ingestor;
use scheduler::Scheduler;

/// Base delay of the feed retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_press starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.data_dir, ?args.public_dir, once = args.once, "Parsed CLI arguments");

    let settings = Settings::load(&args)?;
    info!(
        feeds = settings.feeds.len(),
        data_dir = %settings.data_dir.display(),
        public_dir = %settings.public_dir.display(),
        interval_minutes = settings.interval_minutes,
        "Settings loaded"
    );

    let http = HttpFetcher::new(settings.timeout(), &settings.user_agent)?;
    let fetcher = RetryFetch::new(http, settings.max_retries, RETRY_BASE_DELAY);
    let interval = settings.interval();
    let ingestor = Ingestor::new(settings, fetcher);

    if args.once {
        let report = ingestor.run_cycle().await;
        info!(
            ?report,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Single cycle finished"
        );
        return Ok(());
    }

    let handle = Scheduler::new(interval).start(Arc::new(ingestor));
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received; stopping after the current cycle");
    handle.stop().await;

    info!(
        uptime_secs = start_time.elapsed().as_secs(),
        "feed_press shut down"
    );
    Ok(())
}
