//! Client for the readability extraction service.
//!
//! The service turns raw article HTML into structured fields:
//!
//! ```text
//! POST {endpoint}/api/readability
//! {"htmlString": "<html>...</html>"}
//!
//! 200 {"title": "...", "textContent": "...", "content": "<div>...</div>", ...}
//! ```
//!
//! # Architecture
//!
//! - [`Readability`]: trait for anything that can extract an article from HTML
//! - [`ReadabilityClient`]: the HTTP implementation used in production
//!
//! Each article gets exactly one attempt. Any non-200 status or transport or
//! decoding problem becomes an [`ExtractionFailure`] and the article is dropped
//! by the caller.

use std::time::Instant;

use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ReadabilityConfig;
use crate::models::ReadabilityArticle;
use crate::utils::truncate_for_log;

/// Why an article could not be extracted.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    /// The service answered with something other than 200.
    #[error("extraction service returned HTTP {status}")]
    ApiError { status: u16, body: String },

    /// The request never completed or the response was not usable.
    #[error("extraction failed: {detail}")]
    Exception { detail: String },
}

impl ExtractionFailure {
    /// Short machine-readable label: `"api_error"` or `"exception"`.
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionFailure::ApiError { .. } => "api_error",
            ExtractionFailure::Exception { .. } => "exception",
        }
    }
}

impl From<reqwest::Error> for ExtractionFailure {
    fn from(e: reqwest::Error) -> Self {
        ExtractionFailure::Exception {
            detail: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExtractionFailure {
    fn from(e: serde_json::Error) -> Self {
        ExtractionFailure::Exception {
            detail: format!("invalid readability response: {e}"),
        }
    }
}

/// Trait for turning article HTML into structured content.
pub trait Readability {
    /// Extract title, plain text and cleaned HTML from `html`.
    async fn parse(&self, html: &str) -> Result<ReadabilityArticle, ExtractionFailure>;
}

/// HTTP client for the readability service.
#[derive(Debug, Clone)]
pub struct ReadabilityClient {
    client: Client,
    endpoint: String,
}

impl ReadabilityClient {
    pub fn new(client: Client, config: &ReadabilityConfig) -> Self {
        Self {
            client,
            endpoint: readability_endpoint(&config.endpoint),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Readability for ReadabilityClient {
    #[instrument(level = "info", skip_all, fields(bytes = html.len()))]
    async fn parse(&self, html: &str) -> Result<ReadabilityArticle, ExtractionFailure> {
        let t0 = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "htmlString": html }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let elapsed_ms = t0.elapsed().as_millis();

        if status != StatusCode::OK {
            warn!(%status, elapsed_ms, body = %truncate_for_log(&body, 300), "Readability API error");
            return Err(ExtractionFailure::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let article: ReadabilityArticle = serde_json::from_str(&body)?;
        debug!(elapsed_ms, title = ?article.title, "Readability extraction succeeded");
        Ok(article)
    }
}

/// `{root}/api/readability`, tolerating a trailing slash on `root`.
fn readability_endpoint(root: &Url) -> String {
    format!("{}/api/readability", root.as_str().trim_end_matches('/'))
}
