//! HTTP fetcher for remote rule feeds.
//!
//! Ad-block lists are fetched as text, compiled rule sets as raw bytes.
//! Every request is a plain GET; a transport failure or a non-2xx status is a
//! [`RulefeedError::Fetch`]. There is no retry.

use std::time::Duration;

use reqwest::{Client, Response};
use rulefeed_shared::{HttpConfig, Result, RulefeedError};
use tracing::{debug, instrument};
use url::Url;

/// Maximum number of redirects to follow (raw.githubusercontent.com redirects renamed repos).
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("rulefeed/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Fetch options
// ---------------------------------------------------------------------------

/// Configuration for the fetcher.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl From<&HttpConfig> for FetchOptions {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Blocking-style GET client; callers await one request at a time.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the given options.
    pub fn new(opts: &FetchOptions) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| RulefeedError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch a resource and decode its body as text.
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        let body = response
            .text()
            .await
            .map_err(|e| RulefeedError::Fetch(format!("{url}: failed to read body: {e}")))?;

        debug!(bytes = body.len(), "text fetched");
        Ok(body)
    }

    /// Fetch a resource verbatim.
    #[instrument(skip(self))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| RulefeedError::Fetch(format!("{url}: failed to read body: {e}")))?;

        debug!(bytes = body.len(), "binary fetched");
        Ok(body.to_vec())
    }

    /// Issue the GET and reject non-2xx responses.
    async fn get(&self, url: &str) -> Result<Response> {
        let parsed =
            Url::parse(url).map_err(|e| RulefeedError::Fetch(format!("invalid url '{url}': {e}")))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| RulefeedError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RulefeedError::Fetch(format!("{url}: HTTP {status}")));
        }

        Ok(response)
    }
}
