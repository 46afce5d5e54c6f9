//! Run configuration: crawl jobs, the source base URL, and the settings for the
//! extraction service and the database.
//!
//! Job lists arrive as a JSON array (inline or from a file) or as a YAML file.
//! Validation happens here so the crawl itself only ever sees well-formed jobs.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::cli::Cli;

/// Errors raised while building a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid job list: {0}")]
    Jobs(String),

    #[error("failed to read jobs file {path}: {source}")]
    JobsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid regular expression {pattern:?} for {category_url}: {source}")]
    Pattern {
        category_url: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Opaque category identifier carried from a job to the rows it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CategoryId {
    Number(i64),
    Text(String),
}

/// One crawl target: a category page and the rule for the article links on it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Job {
    /// Category page, absolute or relative to the run's base URL.
    pub category_url: String,
    /// Matched against absolute link URLs from their first character.
    pub regular_expression: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

impl Job {
    /// Compile `regular_expression` anchored at the start of the input.
    ///
    /// The match is a prefix match: `news\.example/a` accepts
    /// `news.example/abc` but not `www.news.example/a`.
    pub fn compile_pattern(&self) -> Result<Regex, ConfigError> {
        Regex::new(&format!("^(?:{})", self.regular_expression)).map_err(|source| {
            ConfigError::Pattern {
                category_url: self.category_url.clone(),
                pattern: self.regular_expression.clone(),
                source,
            }
        })
    }
}

/// Parse a JSON job list.
///
/// Input that is not JSON at all is logged and yields zero jobs. JSON with
/// the wrong shape (missing `category_url`, a numeric regex, ...) is an error.
pub fn parse_jobs(raw: &str) -> Result<Vec<Job>, ConfigError> {
    match serde_json::from_str::<Vec<Job>>(raw) {
        Ok(jobs) => Ok(jobs),
        Err(e) if matches!(e.classify(), Category::Syntax | Category::Eof) => {
            error!(error = %e, "Failed to decode job data JSON; continuing with no jobs");
            Ok(Vec::new())
        }
        Err(e) => Err(ConfigError::Jobs(e.to_string())),
    }
}

/// Load a job list from disk. `.yaml` and `.yml` files are read as YAML,
/// everything else as JSON.
pub fn load_jobs_file(path: &Path) -> Result<Vec<Job>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::JobsFile {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Jobs(e.to_string()))
    } else {
        parse_jobs(&raw)
    }
}

/// Connection settings for the persistence adapter.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection string. `None` leaves the adapter disconnected.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Settings for the readability extraction service.
#[derive(Debug, Clone)]
pub struct ReadabilityConfig {
    /// Service root; requests go to `{endpoint}/api/readability`.
    pub endpoint: Url,
}

/// Everything a single crawl needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The base URL exactly as supplied; the snapshot filename derives from it.
    pub base_url_raw: String,
    pub base_url: Url,
    pub jobs: Vec<Job>,
    pub snapshot_dir: PathBuf,
    pub table: String,
    pub concurrency: usize,
    pub user_agent: String,
    pub readability: ReadabilityConfig,
    pub database: DatabaseConfig,
}

impl RunConfig {
    /// Validate CLI input into a typed configuration.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&cli.base_url).map_err(|source| ConfigError::BaseUrl {
            url: cli.base_url.clone(),
            source,
        })?;
        let endpoint = Url::parse(&cli.readability_url).map_err(|source| ConfigError::BaseUrl {
            url: cli.readability_url.clone(),
            source,
        })?;

        let jobs = match (&cli.job_data, &cli.jobs_file) {
            (Some(raw), _) => parse_jobs(raw)?,
            (None, Some(path)) => load_jobs_file(path)?,
            (None, None) => Vec::new(),
        };
        info!(count = jobs.len(), "Loaded crawl jobs");

        // Fail before any request goes out.
        for job in &jobs {
            job.compile_pattern()?;
        }

        Ok(Self {
            base_url_raw: cli.base_url.clone(),
            base_url,
            jobs,
            snapshot_dir: cli.snapshot_dir.clone(),
            table: cli.table.clone(),
            concurrency: cli.concurrency.max(1),
            user_agent: cli.user_agent.clone(),
            readability: ReadabilityConfig { endpoint },
            database: DatabaseConfig {
                url: cli.database_url.clone(),
                max_connections: cli.max_connections.max(1),
            },
        })
    }
}
