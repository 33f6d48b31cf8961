//! HTTP-backed remote fetcher.

use async_trait::async_trait;

use super::{HostError, RemoteFetcher};

/// Connection timeout for manifest and template fetches. Requests get
/// no overall timeout — template bodies are small and best-effort.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// `RemoteFetcher` over `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("draftboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, HostError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HostError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        response.text().await.map_err(|e| HostError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
