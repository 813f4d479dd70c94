//! Error types for the stats engine.
//!
//! Nothing in the engine is fatal: every error here is recovered locally and
//! degrades to a visible but non-blocking view state.

use std::time::Duration;
use thiserror::Error;

/// Failure of a call into the [`StatsService`](crate::StatsService) collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (connection refused, reset, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("server returned HTTP {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// Opaque failure reported to a chart by a [`MetricSource`](crate::MetricSource).
///
/// The chart's error channel is untyped, so the underlying cause is logged
/// and dropped here.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Default)]
#[error("Unable to load data")]
pub struct DataUnavailable;

/// A route parameter that could not be interpreted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A numeric parameter held a non-numeric value.
    #[error("invalid value {value:?} for route parameter `{key}`")]
    InvalidNumber {
        /// Parameter name.
        key: &'static str,
        /// Raw value from the query string.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_unavailable_message_is_generic() {
        assert_eq!(DataUnavailable.to_string(), "Unable to load data");
    }

    #[test]
    fn test_json_error_becomes_decode() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(FetchError::from(err), FetchError::Decode(_)));
    }

    #[test]
    fn test_status_display() {
        let err = FetchError::Status {
            code: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "server returned HTTP 503: Service Unavailable");
    }
}
