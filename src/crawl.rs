//! Crawl orchestration for one news source.
//!
//! A run moves through fixed phases:
//!
//! ```text
//! Init -> Seeding -> CrawlingCategories -> CrawlingArticles -> Finalizing -> Done
//! ```
//!
//! - **Init**: load the snapshot; its URLs become the seen set
//! - **Seeding**: compile each job's pattern and resolve its category URL
//! - **CrawlingCategories**: fetch category pages concurrently and collect
//!   unseen article links
//! - **CrawlingArticles**: fetch and extract articles concurrently
//! - **Finalizing**: rewrite the snapshot as one JSON array
//!
//! The seen set, the scheduled-URL filter and the result list are shared by
//! all in-flight fetches and live behind a single async mutex.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex as StdMutex;

use futures::stream::{self, StreamExt};
use regex::Regex;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::api::Readability;
use crate::config::{CategoryId, ConfigError, Job};
use crate::models::ArticleRecord;
use crate::outputs::database::Persistence;
use crate::outputs::snapshot::SnapshotError;
use crate::scrapers::article::ArticleExtractor;
use crate::scrapers::fetch::Fetch;
use crate::scrapers::links::discover;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Seeding,
    CrawlingCategories,
    CrawlingArticles,
    Finalizing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Seeding => "seeding",
            Phase::CrawlingCategories => "crawling_categories",
            Phase::CrawlingArticles => "crawling_articles",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Conditions that end a run early.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write final snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub jobs: usize,
    /// Jobs whose category URL resolved.
    pub seeds: usize,
    pub categories_fetched: usize,
    /// Article links scheduled for fetching.
    pub links_discovered: usize,
    pub articles_extracted: usize,
    pub articles_failed: usize,
    pub fetch_failures: usize,
    /// Records in the final snapshot, prior ones included.
    pub total_records: usize,
}

#[derive(Debug)]
struct CategorySeed {
    url: Url,
    pattern: Regex,
    category_id: Option<CategoryId>,
}

#[derive(Debug)]
struct ArticleRequest {
    url: String,
    category_id: Option<CategoryId>,
}

#[derive(Debug, Default)]
struct CrawlState {
    results: Vec<ArticleRecord>,
    seen: HashSet<String>,
    /// Every article URL already handed to the fetcher this run.
    scheduled: HashSet<String>,
    summary: CrawlSummary,
}

/// Crawls the category pages of one source and extracts their articles.
pub struct Crawler<F, R, P> {
    fetcher: F,
    extractor: ArticleExtractor<R, P>,
    base_url: Url,
    concurrency: usize,
    phase: StdMutex<Phase>,
    state: Mutex<CrawlState>,
}

impl<F, R, P> Crawler<F, R, P>
where
    F: Fetch,
    R: Readability,
    P: Persistence,
{
    pub fn new(fetcher: F, extractor: ArticleExtractor<R, P>, base_url: Url, concurrency: usize) -> Self {
        Self {
            fetcher,
            extractor,
            base_url,
            concurrency: concurrency.max(1),
            phase: StdMutex::new(Phase::Init),
            state: Mutex::new(CrawlState::default()),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn persistence(&self) -> &P {
        self.extractor.persistence()
    }

    fn enter(&self, next: Phase) {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*phase, to = %next, "Crawl phase transition");
        *phase = next;
    }

    /// Run every job to completion and rewrite the snapshot.
    ///
    /// Per-page and per-article failures are logged and counted. Only an
    /// invalid job pattern or a failed final snapshot write returns an error.
    #[instrument(level = "info", skip_all, fields(base_url = %self.base_url))]
    pub async fn run(&self, jobs: &[Job]) -> Result<CrawlSummary, CrawlError> {
        self.enter(Phase::Init);
        let (records, seen) = self.extractor.snapshot().load().await;
        {
            let mut state = self.state.lock().await;
            *state = CrawlState {
                results: records,
                seen,
                ..CrawlState::default()
            };
            state.summary.jobs = jobs.len();
        }

        self.enter(Phase::Seeding);
        let seeds = self.seed(jobs)?;
        self.state.lock().await.summary.seeds = seeds.len();

        self.enter(Phase::CrawlingCategories);
        let requests: Vec<ArticleRequest> = stream::iter(seeds)
            .map(|seed| self.crawl_category(seed))
            .buffer_unordered(self.concurrency)
            .flat_map(stream::iter)
            .collect()
            .await;
        info!(count = requests.len(), "Article fetches scheduled");

        self.enter(Phase::CrawlingArticles);
        stream::iter(requests)
            .for_each_concurrent(self.concurrency, |request| self.crawl_article(request))
            .await;

        self.enter(Phase::Finalizing);
        let summary = {
            let mut state = self.state.lock().await;
            let total = state.results.len();
            state.summary.total_records = total;
            if let Err(e) = self.extractor.snapshot().finalize(&state.results).await {
                error!(error = %e, summary = ?state.summary, "Failed to write final snapshot");
                return Err(e.into());
            }
            state.summary.clone()
        };

        self.enter(Phase::Done);
        info!(
            extracted = summary.articles_extracted,
            failed = summary.articles_failed,
            total = summary.total_records,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Compile patterns and resolve category URLs. Jobs whose URL does not
    /// resolve are dropped.
    fn seed(&self, jobs: &[Job]) -> Result<Vec<CategorySeed>, ConfigError> {
        let mut seeds = Vec::with_capacity(jobs.len());
        for job in jobs {
            let pattern = job.compile_pattern()?;
            match self.base_url.join(&job.category_url) {
                Ok(url) => {
                    info!("Starting with {url}");
                    seeds.push(CategorySeed {
                        url,
                        pattern,
                        category_id: job.category_id.clone(),
                    });
                }
                Err(e) => {
                    debug!(category_url = %job.category_url, error = %e, "Category URL did not resolve; skipping job");
                }
            }
        }
        Ok(seeds)
    }

    #[instrument(level = "info", skip_all, fields(url = %seed.url))]
    async fn crawl_category(&self, seed: CategorySeed) -> Vec<ArticleRequest> {
        let page = match self.fetcher.fetch(seed.url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "Category page fetch failed");
                self.state.lock().await.summary.fetch_failures += 1;
                return Vec::new();
            }
        };

        let seen = self.state.lock().await.seen.clone();
        let links = discover(&page.body, &self.base_url, &seed.pattern, &seen);
        let found = links.len();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.summary.categories_fetched += 1;
        let fresh: Vec<ArticleRequest> = links
            .into_iter()
            .filter(|url| state.scheduled.insert(url.clone()))
            .map(|url| ArticleRequest {
                url,
                category_id: seed.category_id.clone(),
            })
            .collect();
        state.summary.links_discovered += fresh.len();

        info!(found, scheduled = fresh.len(), "Discovered article links");
        fresh
    }

    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    async fn crawl_article(&self, request: ArticleRequest) {
        let page = match self.fetcher.fetch(&request.url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "Article fetch failed");
                self.state.lock().await.summary.fetch_failures += 1;
                return;
            }
        };
        info!("Got article response");

        if page.url != request.url {
            let mut state = self.state.lock().await;
            if state.seen.contains(&page.url) || !state.scheduled.insert(page.url.clone()) {
                debug!(final_url = %page.url, "Redirected to an article already handled; skipping");
                return;
            }
        }

        let outcome = self
            .extractor
            .extract(&page.body, &page.url, request.category_id.as_ref())
            .await;

        let mut state = self.state.lock().await;
        match outcome {
            Ok(record) => {
                state.seen.insert(page.url.clone());
                state.results.push(record);
                state.summary.articles_extracted += 1;
            }
            Err(_) => state.summary.articles_failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    use crate::outputs::database::MemoryStore;
    use crate::outputs::snapshot::SnapshotStore;
    use crate::scrapers::article::FakeReadability;
    use crate::scrapers::fetch::{FetchError, Page};

    const BASE: &str = "http://news.example";
    const WORLD: &str = r"http://news\.example/world/\d+";

    #[derive(Debug, Default)]
    struct FakeFetcher {
        pages: HashMap<String, Page>,
        hits: StdMutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                Page {
                    url: url.to_string(),
                    body: body.to_string(),
                },
            );
            self
        }

        fn redirect(mut self, from: &str, to: &str, body: &str) -> Self {
            self.pages.insert(
                from.to_string(),
                Page {
                    url: to.to_string(),
                    body: body.to_string(),
                },
            );
            self
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    impl Fetch for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
            self.hits.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn listing(hrefs: &[&str]) -> String {
        hrefs
            .iter()
            .map(|h| format!(r#"<a href="{h}">story</a>"#))
            .collect()
    }

    fn job(category_url: &str, regex: &str, category_id: i64) -> Job {
        Job {
            category_url: category_url.to_string(),
            regular_expression: regex.to_string(),
            category_id: Some(CategoryId::Number(category_id)),
        }
    }

    fn crawler(dir: &Path, fetcher: FakeFetcher) -> Crawler<FakeFetcher, FakeReadability, MemoryStore> {
        let extractor = ArticleExtractor::new(
            FakeReadability,
            MemoryStore::default(),
            SnapshotStore::new(dir, BASE),
            "content",
        );
        Crawler::new(fetcher, extractor, Url::parse(BASE).unwrap(), 4)
    }

    fn world_site() -> FakeFetcher {
        FakeFetcher::default()
            .page(
                "http://news.example/world",
                &listing(&["/world/1", "/world/2", "/about", "http://other.com/world/3"]),
            )
            .page("http://news.example/world/1", "<html>one</html>")
            .page("http://news.example/world/2", "<html>two</html>")
    }

    async fn snapshot_urls(dir: &Path) -> Vec<String> {
        let store = SnapshotStore::new(dir, BASE);
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        let records: Vec<ArticleRecord> = serde_json::from_str(&raw).unwrap();
        let mut urls: Vec<String> = records
            .iter()
            .filter_map(|r| r.url().map(str::to_string))
            .collect();
        urls.sort();
        urls
    }

    #[tokio::test]
    async fn test_crawl_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler(dir.path(), world_site());

        let summary = crawler.run(&[job("/world", WORLD, 1)]).await.unwrap();

        assert_eq!(crawler.phase(), Phase::Done);
        assert_eq!(summary.categories_fetched, 1);
        assert_eq!(summary.links_discovered, 2);
        assert_eq!(summary.articles_extracted, 2);
        assert_eq!(summary.total_records, 2);
        assert_eq!(
            snapshot_urls(dir.path()).await,
            ["http://news.example/world/1", "http://news.example/world/2"]
        );

        let rows = crawler.persistence().rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|(table, row)| table == "content"
            && row.get("category_id") == Some(&crate::models::FieldValue::Integer(1))));
    }

    #[tokio::test]
    async fn test_prior_snapshot_urls_are_skipped_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let article = serde_json::from_str(r#"{"title":"Old","textContent":"old","content":"<p>old</p>"}"#)
            .unwrap();
        let prior = ArticleRecord::from_readability(article, "http://news.example/world/1");
        SnapshotStore::new(dir.path(), BASE)
            .finalize(&[prior])
            .await
            .unwrap();

        let crawler = crawler(dir.path(), world_site());
        let summary = crawler.run(&[job("/world", WORLD, 1)]).await.unwrap();

        assert_eq!(summary.articles_extracted, 1);
        assert!(!crawler.fetcher.hits().contains(&"http://news.example/world/1".to_string()));
        assert_eq!(
            snapshot_urls(dir.path()).await,
            ["http://news.example/world/1", "http://news.example/world/2"]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        crawler(dir.path(), world_site())
            .run(&[job("/world", WORLD, 1)])
            .await
            .unwrap();
        let first = snapshot_urls(dir.path()).await;

        let again = crawler(dir.path(), world_site());
        let summary = again.run(&[job("/world", WORLD, 1)]).await.unwrap();

        assert_eq!(summary.articles_extracted, 0);
        assert!(again.persistence().rows().is_empty());
        assert_eq!(again.fetcher.hits(), ["http://news.example/world"]);
        assert_eq!(snapshot_urls(dir.path()).await, first);
    }

    #[tokio::test]
    async fn test_failed_extraction_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let site = FakeFetcher::default()
            .page("http://news.example/world", &listing(&["/world/1", "/world/2"]))
            .page("http://news.example/world/1", "<html>status:500</html>")
            .page("http://news.example/world/2", "<html>two</html>");
        let crawler = crawler(dir.path(), site);

        let summary = crawler.run(&[job("/world", WORLD, 1)]).await.unwrap();

        assert_eq!(summary.articles_failed, 1);
        assert_eq!(summary.articles_extracted, 1);
        assert_eq!(snapshot_urls(dir.path()).await, ["http://news.example/world/2"]);
        let rows = crawler.persistence().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].1.get("link"),
            Some(&crate::models::FieldValue::Text("http://news.example/world/2".into()))
        );
    }

    #[tokio::test]
    async fn test_cross_category_duplicates_are_fetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let site = FakeFetcher::default()
            .page("http://news.example/world", &listing(&["/world/1"]))
            .page("http://news.example/europe", &listing(&["/world/1", "/world/2"]))
            .page("http://news.example/world/1", "<html>one</html>")
            .page("http://news.example/world/2", "<html>two</html>");
        let crawler = crawler(dir.path(), site);

        let summary = crawler
            .run(&[job("/world", WORLD, 1), job("/europe", WORLD, 2)])
            .await
            .unwrap();

        let hits = crawler.fetcher.hits();
        let article_hits = hits
            .iter()
            .filter(|u| *u == "http://news.example/world/1")
            .count();
        assert_eq!(article_hits, 1);
        assert_eq!(summary.links_discovered, 2);
        assert_eq!(summary.articles_extracted, 2);
        assert_eq!(crawler.persistence().rows().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_to_recorded_article_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let site = FakeFetcher::default()
            .page("http://news.example/world", &listing(&["/world/1", "/world/9"]))
            .page("http://news.example/world/1", "<html>one</html>")
            .redirect("http://news.example/world/9", "http://news.example/world/1", "<html>one</html>");
        let crawler = crawler(dir.path(), site);

        let summary = crawler.run(&[job("/world", WORLD, 1)]).await.unwrap();

        assert_eq!(summary.articles_extracted, 1);
        assert_eq!(snapshot_urls(dir.path()).await, ["http://news.example/world/1"]);
    }

    #[tokio::test]
    async fn test_unresolvable_and_unreachable_categories() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler(dir.path(), world_site());

        let summary = crawler
            .run(&[
                job("http://[::1/", WORLD, 1),
                job("/missing", WORLD, 2),
                job("/world", WORLD, 3),
            ])
            .await
            .unwrap();

        assert_eq!(summary.jobs, 3);
        assert_eq!(summary.seeds, 2);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.articles_extracted, 2);
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler(dir.path(), world_site());

        let result = crawler
            .run(&[job("/world", WORLD, 1), job("/world", "(unclosed", 2)])
            .await;

        assert!(matches!(result, Err(CrawlError::Config(ConfigError::Pattern { .. }))));
        assert!(crawler.fetcher.hits().is_empty());
        assert_eq!(crawler.phase(), Phase::Seeding);
    }

    #[tokio::test]
    async fn test_no_jobs_restores_a_valid_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), BASE);
        tokio::fs::write(store.path(), "[{\"title\": \"half").await.unwrap();

        let summary = crawler(dir.path(), FakeFetcher::default())
            .run(&[])
            .await
            .unwrap();

        assert_eq!(summary, CrawlSummary::default());
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw, "[]");
    }

    #[tokio::test]
    async fn test_prior_records_with_null_fields_survive_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), BASE);
        let prior = serde_json::json!([
            {"title": null, "textContent": "one", "content": null, "url": "http://news.example/world/1"},
            {"title": "Two", "textContent": "two", "content": "<p>two</p>", "url": "http://news.example/world/2"}
        ]);
        tokio::fs::write(store.path(), prior.to_string()).await.unwrap();

        let crawler = crawler(dir.path(), world_site());
        let summary = crawler.run(&[job("/world", WORLD, 1)]).await.unwrap();

        assert_eq!(summary.articles_extracted, 0);
        assert_eq!(summary.total_records, 2);
        assert_eq!(crawler.fetcher.hits(), ["http://news.example/world"]);
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        let after: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(after, prior);
    }
}
