//! HTTP client for the stats backend.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use nodestats_core::{FetchError, Query, SeriesRequest, Settings, StatsService, SummaryPage};

/// [`StatsService`] over the backend's JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpStatsService {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpStatsService {
    /// Client for the backend rooted at `base_url` (which should end in `/`).
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nodestats/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Transport(format!("bad endpoint {path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        let url = self.endpoint(path)?;
        tracing::trace!(%url, ?params, "GET");

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(FetchError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(&e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn classify(&self, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl StatsService for HttpStatsService {
    async fn fetch_summary(&self, query: &Query) -> Result<SummaryPage, FetchError> {
        self.get_json("stats.json", &query.to_params()).await
    }

    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<f64>, FetchError> {
        self.get_json("dstats.json", &request.to_params()).await
    }

    async fn fetch_user_settings(&self) -> Result<Settings, FetchError> {
        self.get_json("user/settings", &[]).await
    }
}
