//! Scraping building blocks used by the crawl loop.
//!
//! Each crawl job follows the same two-phase pattern:
//!
//! 1. **Discovery**: fetch a category page and collect article links matching
//!    the job's regular expression ([`links`])
//! 2. **Extraction**: fetch each article and hand its HTML to the readability
//!    service, then record the result ([`article`])
//!
//! | Module | Role |
//! |--------|------|
//! | [`fetch`] | Page fetching over HTTP behind the [`fetch::Fetch`] trait |
//! | [`links`] | Anchor extraction, URL resolution and regex filtering |
//! | [`article`] | Readability call and the snapshot/database writes |
//!
//! Failed fetches and failed extractions are logged and skipped without
//! failing the run.

pub mod article;
pub mod fetch;
pub mod links;
