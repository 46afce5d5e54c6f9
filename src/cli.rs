//! Command-line interface definitions for newscraper.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Connection settings can also be provided via environment variables (a
//! `.env` file in the working directory is loaded at startup).

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for a single crawl run.
///
/// # Examples
///
/// ```sh
/// # Jobs inline
/// newscraper --base-url https://news.example \
///     --job-data '[{"category_url":"/world","regular_expression":"https://news\\.example/world/.+","category_id":1}]'
///
/// # Jobs from a YAML file, snapshots in ./data
/// newscraper -b https://news.example -f jobs.yaml -s ./data
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the news source; category URLs and links resolve against it
    #[arg(short, long, env = "BASE_URL")]
    pub base_url: String,

    /// Job list as a JSON array of {category_url, regular_expression, category_id}
    #[arg(short, long, conflicts_with = "jobs_file")]
    pub job_data: Option<String>,

    /// Path to a JSON or YAML file holding the job list
    #[arg(short = 'f', long)]
    pub jobs_file: Option<PathBuf>,

    /// Directory for the per-source JSON snapshot
    #[arg(short, long, env = "SNAPSHOT_DIR", default_value = ".")]
    pub snapshot_dir: PathBuf,

    /// Root URL of the readability extraction service
    #[arg(long, env = "READABILITY_URL", default_value = "http://172.19.128.1:3000")]
    pub readability_url: String,

    /// Postgres connection string; without it articles only go to the snapshot
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Table receiving extracted articles
    #[arg(long, default_value = "content")]
    pub table: String,

    /// Maximum number of page fetches in flight
    #[arg(short, long, default_value_t = 16)]
    pub concurrency: usize,

    /// Maximum number of pooled database connections
    #[arg(long, default_value_t = 4)]
    pub max_connections: u32,

    /// User-Agent header sent with page fetches
    #[arg(long, default_value = concat!("newscraper/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,
}
