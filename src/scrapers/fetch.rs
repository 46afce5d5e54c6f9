//! Page fetching.
//!
//! [`Fetch`] is the seam between the crawl loop and the network; the crawl
//! only ever sees a [`Page`] (final URL plus body) or a [`FetchError`].

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// A fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// URL the body was served from, after redirects.
    pub url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Trait for retrieving a page by URL.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;
}

/// Build the HTTP client shared by page fetches and the extraction service.
pub fn build_client(user_agent: &str) -> reqwest::Result<Client> {
    Client::builder().user_agent(user_agent).build()
}

/// [`Fetch`] over HTTP. Redirects are followed; any non-2xx final status is
/// an error.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(%final_url, bytes = body.len(), "Fetched page");
        Ok(Page {
            url: final_url,
            body,
        })
    }
}
