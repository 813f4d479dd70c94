//! The data-access collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::model::{Settings, SummaryPage};
use crate::query::Query;

/// A time-series request for one metric of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRequest {
    /// Node the series belongs to.
    pub node_name: String,
    /// Backend metric name.
    pub name: String,
    /// Window start, seconds since the epoch.
    pub start: i64,
    /// Window stop, seconds since the epoch.
    pub stop: i64,
    /// Sample spacing in seconds.
    pub step: i64,
    /// Chart step the request was issued for, in seconds.
    pub interval: u64,
}

impl SeriesRequest {
    /// Wire parameters in backend order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("nodeName", self.node_name.clone()),
            ("start", self.start.to_string()),
            ("stop", self.stop.to_string()),
            ("step", self.step.to_string()),
            ("interval", self.interval.to_string()),
            ("name", self.name.clone()),
        ]
    }
}

/// Backend access for the stats view.
///
/// Implementations must be cheap to share: the engine holds one behind an
/// `Arc` and calls it from spawned tasks.
#[async_trait]
pub trait StatsService: Send + Sync {
    /// Fetch one page of the node summary.
    async fn fetch_summary(&self, query: &Query) -> Result<SummaryPage, FetchError>;

    /// Fetch one metric's values over a time window.
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<f64>, FetchError>;

    /// Fetch the current user's display settings.
    async fn fetch_user_settings(&self) -> Result<Settings, FetchError>;
}
