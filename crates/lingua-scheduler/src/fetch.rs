//! HTTP adapter for the `TextFetcher` port.

use async_trait::async_trait;
use lingua_core::ports::TextFetcher;
use lingua_core::{Error, Result};
use std::time::Duration;

const USER_AGENT: &str = concat!("lingua-ci/", env!("CARGO_PKG_VERSION"));

/// Fetches manifests and all-locales files over HTTP with a per-request
/// timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(format!("http client init failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::FetchTimeout {
                    url: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                Error::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?;
        response.text().await.map_err(map_err)
    }
}
