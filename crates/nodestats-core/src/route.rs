//! Route parameters and refresh cadences.
//!
//! Page size, graph metric, graph step and table refresh interval round-trip
//! through the address bar so that reloading the view preserves them.

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::form_urlencoded;

use crate::error::RouteError;
use crate::query::DEFAULT_PAGE_SIZE;

/// Default aggregate chart metric.
pub const DEFAULT_GRAPH_TYPE: &str = "deltaPacketsPerSec";
/// Default aggregate chart step, in seconds.
pub const DEFAULT_GRAPH_STEP_SECS: u64 = 5;
/// Default summary refresh interval, in milliseconds.
pub const DEFAULT_DATA_INTERVAL_MS: u64 = 5000;
/// Step used to build a frozen chart when the configured step is zero.
pub const FALLBACK_CHART_STEP_SECS: u64 = 5;
/// Fixed step of per-row detail charts.
pub const DETAIL_CHART_STEP_SECS: u64 = 60;

/// The view's address-bar parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteParams {
    /// Rows per page (`length`).
    pub length: usize,
    /// Aggregate chart metric (`type`).
    #[serde(rename = "type")]
    pub graph_type: String,
    /// Aggregate chart step in seconds, `0` freezes the chart (`gtime`).
    #[serde(rename = "gtime")]
    pub graph_step: u64,
    /// Summary refresh interval in milliseconds, `0` disables it (`interval`).
    #[serde(rename = "interval")]
    pub data_interval: u64,
}

impl Default for RouteParams {
    fn default() -> Self {
        Self {
            length: DEFAULT_PAGE_SIZE,
            graph_type: DEFAULT_GRAPH_TYPE.to_string(),
            graph_step: DEFAULT_GRAPH_STEP_SECS,
            data_interval: DEFAULT_DATA_INTERVAL_MS,
        }
    }
}

impl RouteParams {
    /// Parse a query string, rejecting malformed numbers.
    ///
    /// Unknown keys are ignored and missing keys take their defaults.
    pub fn try_parse(query: &str) -> Result<Self, RouteError> {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            params.apply(&key, &value)?;
        }
        Ok(params)
    }

    /// Parse a query string, replacing malformed values with defaults.
    pub fn parse(query: &str) -> Self {
        Self::parse_over(Self::default(), query)
    }

    /// Parse a query string on top of `base`; missing or malformed keys keep
    /// the value from `base`.
    pub fn parse_over(base: Self, query: &str) -> Self {
        let mut params = base;
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            if let Err(e) = params.apply(&key, &value) {
                warn!(error = %e, "Ignoring route parameter");
            }
        }
        params
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), RouteError> {
        if value.is_empty() {
            return Ok(());
        }
        match key {
            "length" => self.length = parse_number("length", value)?,
            "type" => self.graph_type = value.to_string(),
            "gtime" => self.graph_step = parse_number("gtime", value)?,
            "interval" => self.data_interval = parse_number("interval", value)?,
            _ => {}
        }
        Ok(())
    }

    /// Serialize to a query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("length", &self.length.to_string())
            .append_pair("type", &self.graph_type)
            .append_pair("gtime", &self.graph_step.to_string())
            .append_pair("interval", &self.data_interval.to_string())
            .finish()
    }

    /// The two refresh cadences carried by these parameters.
    pub fn refresh(&self) -> RefreshConfig {
        RefreshConfig {
            summary_interval_ms: self.data_interval,
            chart_step_seconds: self.graph_step,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, RouteError> {
    value.trim().parse().map_err(|_| RouteError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

/// Table and chart cadences. Zero disables the respective timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Summary refetch period in milliseconds.
    pub summary_interval_ms: u64,
    /// Aggregate chart step in seconds.
    pub chart_step_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            summary_interval_ms: DEFAULT_DATA_INTERVAL_MS,
            chart_step_seconds: DEFAULT_GRAPH_STEP_SECS,
        }
    }
}

impl RefreshConfig {
    /// Whether the aggregate chart should run its own timer.
    pub fn chart_is_live(&self) -> bool {
        self.chart_step_seconds != 0
    }

    /// Step the aggregate chart is built with; zero falls back to a frozen 5s chart.
    pub fn effective_chart_step(&self) -> u64 {
        if self.chart_is_live() {
            self.chart_step_seconds
        } else {
            FALLBACK_CHART_STEP_SECS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        assert_eq!(RouteParams::parse(""), RouteParams::default());
        let p = RouteParams::default();
        assert_eq!(p.length, 50);
        assert_eq!(p.graph_type, "deltaPacketsPerSec");
        assert_eq!(p.graph_step, 5);
        assert_eq!(p.data_interval, 5000);
    }

    #[test]
    fn test_parse_all_keys() {
        let p = RouteParams::parse("?length=100&type=deltaBytesPerSec&gtime=60&interval=0");
        assert_eq!(p.length, 100);
        assert_eq!(p.graph_type, "deltaBytesPerSec");
        assert_eq!(p.graph_step, 60);
        assert_eq!(p.data_interval, 0);
    }

    #[test]
    fn test_round_trip() {
        let p = RouteParams {
            length: 25,
            graph_type: "deltaDroppedPerSec".to_string(),
            graph_step: 0,
            data_interval: 15000,
        };
        assert_eq!(RouteParams::try_parse(&p.to_query_string()), Ok(p));
    }

    #[test]
    fn test_parse_over_keeps_base_values() {
        let base = RouteParams {
            length: 200,
            graph_type: "cpu".to_string(),
            graph_step: 30,
            data_interval: 1000,
        };
        let p = RouteParams::parse_over(base, "gtime=0&length=x");
        assert_eq!(p.length, 200);
        assert_eq!(p.graph_type, "cpu");
        assert_eq!(p.graph_step, 0);
        assert_eq!(p.data_interval, 1000);
    }

    #[test]
    fn test_malformed_number_falls_back() {
        let p = RouteParams::parse("length=lots&gtime=10");
        assert_eq!(p.length, 50);
        assert_eq!(p.graph_step, 10);

        assert!(matches!(
            RouteParams::try_parse("interval=soon"),
            Err(RouteError::InvalidNumber { key: "interval", .. })
        ));
    }

    #[test]
    fn test_refresh_config() {
        let cfg = RefreshConfig {
            summary_interval_ms: 0,
            chart_step_seconds: 0,
        };
        assert!(!cfg.chart_is_live());
        assert_eq!(cfg.effective_chart_step(), FALLBACK_CHART_STEP_SECS);

        let cfg = RefreshConfig::default();
        assert_eq!(cfg.effective_chart_step(), 5);
    }
}
