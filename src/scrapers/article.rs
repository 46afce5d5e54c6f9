//! Article extraction: readability call plus the two article sinks.

use chrono::Utc;
use tracing::{error, info, instrument};

use crate::api::{ExtractionFailure, Readability};
use crate::config::CategoryId;
use crate::models::ArticleRecord;
use crate::outputs::database::Persistence;
use crate::outputs::snapshot::SnapshotStore;
use crate::utils::truncate_for_log;

/// Turns fetched article pages into [`ArticleRecord`]s and stores them.
#[derive(Debug)]
pub struct ArticleExtractor<R, P> {
    readability: R,
    persistence: P,
    snapshot: SnapshotStore,
    table: String,
}

impl<R, P> ArticleExtractor<R, P>
where
    R: Readability,
    P: Persistence,
{
    pub fn new(readability: R, persistence: P, snapshot: SnapshotStore, table: impl Into<String>) -> Self {
        Self {
            readability,
            persistence,
            snapshot,
            table: table.into(),
        }
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Extract one article and record it.
    ///
    /// On success the row insert and the snapshot append have both been
    /// attempted before this returns. Neither failure is reported here: the
    /// insert logs its own errors, and an append error is logged below.
    #[instrument(level = "info", skip(self, article_html, category_id))]
    pub async fn extract(
        &self,
        article_html: &str,
        source_url: &str,
        category_id: Option<&CategoryId>,
    ) -> Result<ArticleRecord, ExtractionFailure> {
        let article = match self.readability.parse(article_html).await {
            Ok(article) => article,
            Err(e) => {
                match &e {
                    ExtractionFailure::ApiError { status, body } => error!(
                        reason = e.reason(),
                        status,
                        body = %truncate_for_log(body, 200),
                        "API error for {source_url}"
                    ),
                    ExtractionFailure::Exception { detail } => error!(
                        reason = e.reason(),
                        %detail,
                        "Exception occurred while processing article"
                    ),
                }
                return Err(e);
            }
        };

        let record = ArticleRecord::from_readability(article, source_url);

        let row = record.to_content_row(category_id, Utc::now());
        self.persistence.insert(&self.table, row).await;

        if let Err(e) = self.snapshot.append(&record).await {
            error!(error = %e, "Failed to append article to snapshot");
        }

        info!(title = record.title().unwrap_or_default(), "Extracted article");
        Ok(record)
    }
}

/// Readability stand-in used by tests across the crate.
///
/// Pages whose HTML contains `status:NNN` get an API error with that status;
/// pages containing `broken` get an exception; everything else extracts to
/// title `T`, text `C` and content `<p>C</p>`.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeReadability;

#[cfg(test)]
impl Readability for FakeReadability {
    async fn parse(
        &self,
        html: &str,
    ) -> Result<crate::models::ReadabilityArticle, ExtractionFailure> {
        if let Some(rest) = html.split("status:").nth(1) {
            let status = rest.get(..3).and_then(|s| s.parse().ok()).unwrap_or(500);
            return Err(ExtractionFailure::ApiError {
                status,
                body: String::new(),
            });
        }
        if html.contains("broken") {
            return Err(ExtractionFailure::Exception {
                detail: "connection reset".into(),
            });
        }
        Ok(serde_json::from_str(r#"{"title":"T","textContent":"C","content":"<p>C</p>"}"#)
            .unwrap())
    }
}
