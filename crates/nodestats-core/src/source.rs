//! Pull-based metric sources for charts.
//!
//! A chart owns a set of [`MetricSource`]s and asks each one for the values of
//! the window it is about to draw. The adapter here turns those pulls into
//! [`StatsService::fetch_series`] calls and collapses every failure into
//! [`DataUnavailable`], since the chart cannot act on the cause.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::DataUnavailable;
use crate::service::{SeriesRequest, StatsService};

/// A window requested by a chart, in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub stop_ms: i64,
    pub step_ms: i64,
}

impl TimeWindow {
    /// Number of samples the window covers.
    pub fn len(&self) -> usize {
        if self.step_ms <= 0 || self.stop_ms <= self.start_ms {
            return 0;
        }
        usize::try_from((self.stop_ms - self.start_ms) / self.step_ms).unwrap_or(0)
    }

    /// Whether the window covers no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named series a chart can pull values from.
#[async_trait]
pub trait MetricSource: Send + Sync + fmt::Debug {
    /// Display name of the series.
    fn name(&self) -> &str;

    /// Values covering `window`, or an opaque failure.
    async fn fetch(&self, window: TimeWindow) -> Result<Vec<f64>, DataUnavailable>;
}

/// [`MetricSource`] backed by a [`StatsService`].
pub struct ServiceMetricSource {
    service: Arc<dyn StatsService>,
    label: String,
    node_name: String,
    metric: String,
    interval: u64,
}

impl fmt::Debug for ServiceMetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMetricSource")
            .field("label", &self.label)
            .field("node_name", &self.node_name)
            .field("metric", &self.metric)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl ServiceMetricSource {
    fn request(&self, window: TimeWindow) -> SeriesRequest {
        SeriesRequest {
            node_name: self.node_name.clone(),
            name: self.metric.clone(),
            start: window.start_ms / 1000,
            stop: window.stop_ms / 1000,
            step: window.step_ms / 1000,
            interval: self.interval,
        }
    }
}

#[async_trait]
impl MetricSource for ServiceMetricSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self, window: TimeWindow) -> Result<Vec<f64>, DataUnavailable> {
        let request = self.request(window);
        self.service.fetch_series(&request).await.map_err(|e| {
            debug!(
                node = %self.node_name,
                metric = %self.metric,
                error = %e,
                "Series fetch failed"
            );
            DataUnavailable
        })
    }
}

/// Builds [`MetricSource`]s bound to one data service.
#[derive(Clone)]
pub struct SourceFactory {
    service: Arc<dyn StatsService>,
}

impl fmt::Debug for SourceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFactory").finish_non_exhaustive()
    }
}

impl SourceFactory {
    pub fn new(service: Arc<dyn StatsService>) -> Self {
        Self { service }
    }

    /// Source for one metric of one row, labelled with the row id.
    pub fn make_metric_source(
        &self,
        row_id: &str,
        metric_name: &str,
        step_seconds: u64,
    ) -> Arc<dyn MetricSource> {
        self.make_labeled_metric_source(row_id, metric_name, step_seconds, row_id)
    }

    /// Like [`make_metric_source`](Self::make_metric_source), shown under `label`.
    pub fn make_labeled_metric_source(
        &self,
        row_id: &str,
        metric_name: &str,
        step_seconds: u64,
        label: &str,
    ) -> Arc<dyn MetricSource> {
        Arc::new(ServiceMetricSource {
            service: Arc::clone(&self.service),
            label: label.to_string(),
            node_name: row_id.to_string(),
            metric: metric_name.to_string(),
            interval: step_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::testing::FakeStatsService;

    fn window() -> TimeWindow {
        TimeWindow {
            start_ms: 1_700_000_000_000,
            stop_ms: 1_700_000_050_000,
            step_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn test_fetch_converts_window_to_seconds() {
        let service = Arc::new(FakeStatsService::new());
        service.set_series(vec![1.0, 2.0, 3.0]);
        let factory = SourceFactory::new(service.clone());
        let source = factory.make_metric_source("cap-1", "deltaPacketsPerSec", 5);

        let values = source.fetch(window()).await.unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);

        let requests = service.series_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            SeriesRequest {
                node_name: "cap-1".to_string(),
                name: "deltaPacketsPerSec".to_string(),
                start: 1_700_000_000,
                stop: 1_700_000_050,
                step: 5,
                interval: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_opaque() {
        let service = Arc::new(FakeStatsService::new());
        service.fail_series(FetchError::Status {
            code: 500,
            message: "boom".to_string(),
        });
        let source = SourceFactory::new(service).make_metric_source("cap-1", "cpu", 60);

        assert_eq!(source.fetch(window()).await, Err(DataUnavailable));
    }

    #[tokio::test]
    async fn test_label_defaults_to_row_id() {
        let service = Arc::new(FakeStatsService::new());
        let factory = SourceFactory::new(service.clone());
        let source = factory.make_metric_source("cap-9", "cpu", 60);
        assert_eq!(source.name(), "cap-9");

        let source = factory.make_labeled_metric_source("cap-9", "cpu", 60, "CPU");
        assert_eq!(source.name(), "CPU");
        source.fetch(window()).await.unwrap();
        let request = &service.series_requests()[0];
        assert_eq!(request.node_name, "cap-9");
        assert_eq!(request.name, "cpu");
        assert_eq!(request.interval, 60);
    }

    #[test]
    fn test_window_len() {
        assert_eq!(window().len(), 10);
        let empty = TimeWindow {
            start_ms: 10,
            stop_ms: 10,
            step_ms: 1,
        };
        assert!(empty.is_empty());
    }
}
