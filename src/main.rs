//! # newscraper
//!
//! Crawls the category pages of a news source, follows the article links that
//! match each job's regular expression, and extracts every new article
//! through a readability service.
//!
//! ## Usage
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/news \
//! newscraper -b https://news.example -f jobs.yaml -s ./snapshots
//! ```
//!
//! ## Architecture
//!
//! 1. **State**: load the per-source snapshot; its URLs are never re-fetched
//! 2. **Discovery**: fetch each job's category page and collect matching links
//! 3. **Extraction**: fetch each article and send its HTML to the readability
//!    service (concurrently, `--concurrency` at a time)
//! 4. **Output**: insert a row per article into Postgres, append it to the
//!    snapshot, and rewrite the snapshot as a JSON array at the end

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod crawl;
mod models;
mod outputs;
mod scrapers;
mod utils;

use api::ReadabilityClient;
use cli::Cli;
use config::RunConfig;
use crawl::Crawler;
use outputs::database::Database;
use outputs::snapshot::SnapshotStore;
use scrapers::article::ArticleExtractor;
use scrapers::fetch::{HttpFetcher, build_client};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // Before tracing init so RUST_LOG may come from .env
    let dotenv = dotenvy::dotenv();

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
    info!("newscraper starting up");

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => error!(error = %e, "Failed to load .env file"),
    }

    let args = Cli::parse();
    debug!(base_url = %args.base_url, snapshot_dir = ?args.snapshot_dir, "Parsed CLI arguments");

    let config = match RunConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    // Early check: the snapshot is written during and after the crawl.
    if let Err(e) = ensure_writable_dir(&config.snapshot_dir).await {
        error!(
            path = %config.snapshot_dir.display(),
            error = %e,
            "Snapshot directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let http = build_client(&config.user_agent)?;
    let database = Database::connect(&config.database).await;
    let snapshot = SnapshotStore::new(&config.snapshot_dir, &config.base_url_raw);
    info!(path = %snapshot.path().display(), "Using snapshot file");

    let readability = ReadabilityClient::new(http.clone(), &config.readability);
    info!(endpoint = %readability.endpoint(), "Using readability service");

    let extractor = ArticleExtractor::new(
        readability,
        database,
        snapshot,
        config.table.clone(),
    );
    let crawler = Crawler::new(
        HttpFetcher::new(http),
        extractor,
        config.base_url.clone(),
        config.concurrency,
    );

    let database_connected = crawler.persistence().is_connected();
    let result = crawler.run(&config.jobs).await;
    crawler.persistence().close().await;
    let summary = result?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        jobs = summary.jobs,
        seeds = summary.seeds,
        database_connected,
        categories = summary.categories_fetched,
        discovered = summary.links_discovered,
        extracted = summary.articles_extracted,
        failed = summary.articles_failed,
        fetch_failures = summary.fetch_failures,
        total_records = summary.total_records,
        "Execution complete"
    );

    Ok(())
}
