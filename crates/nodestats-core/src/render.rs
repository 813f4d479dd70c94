//! Rendering capability.
//!
//! The engine never draws. It asks a [`Renderer`] to mount a chart into a
//! named container and gets back a [`ChartHandle`] that it can pause, resume
//! and destroy. The handle owns the chart until it is destroyed.

use std::fmt;
use std::sync::Arc;

use crate::source::MetricSource;

/// Number of samples a chart keeps on screen.
pub const DEFAULT_CHART_SIZE: usize = 1440;

/// Container id of the aggregate chart.
pub const AGGREGATE_CONTAINER: &str = "statsGraph";

/// Name of a mount point for a chart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    /// The aggregate chart's container.
    pub fn aggregate() -> Self {
        Self(AGGREGATE_CONTAINER.to_string())
    }

    /// The detail chart container of one row.
    pub fn detail(row_id: &str) -> Self {
        Self(format!("{AGGREGATE_CONTAINER}-{row_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a renderer needs to materialize a chart.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    /// Where the chart is mounted.
    pub container: ContainerId,
    /// Sample spacing in seconds; also the chart's refresh period.
    pub step_seconds: u64,
    /// Samples kept on screen.
    pub size: usize,
    /// One series per source, in display order.
    pub sources: Vec<Arc<dyn MetricSource>>,
}

impl ChartSpec {
    /// Display names of the series.
    pub fn series_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

/// A materialized chart.
///
/// A freshly mounted handle is running: its internal timer pulls the
/// sources once per step until stopped.
pub trait ChartHandle: Send {
    /// Resume pulling data. No-op when already running.
    fn start(&mut self);

    /// Pause pulling data without discarding the chart. No-op when stopped.
    fn stop(&mut self);

    /// Whether the internal timer is running.
    fn is_running(&self) -> bool;

    /// Tear the chart down for good.
    fn destroy(self: Box<Self>);
}

/// Mounts and clears charts.
pub trait Renderer: Send + Sync {
    /// Materialize a chart; the returned handle is running.
    fn mount(&self, spec: ChartSpec) -> Box<dyn ChartHandle>;

    /// Clear whatever is drawn in a container.
    fn unmount(&self, container: &ContainerId);
}
