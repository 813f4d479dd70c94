//! A chart handle that owns its own step timer.
//!
//! [`PollingChart`] is the engine-side half of a horizon chart: once per step
//! it pulls every [`MetricSource`] for the trailing window and stores the
//! values for a renderer to draw. The timer is a tokio task that is aborted on
//! stop and respawned on start.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::render::{ChartHandle, ChartSpec, ContainerId};
use crate::source::{MetricSource, TimeWindow};

/// Latest values of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    /// Series display name.
    pub name: String,
    /// Values of the last successful pull.
    pub values: Vec<f64>,
    /// Whether the last pull succeeded.
    pub available: bool,
}

/// Read side of a [`PollingChart`], shareable with a renderer.
#[derive(Debug, Clone)]
pub struct ChartView {
    series: Arc<RwLock<Vec<SeriesSnapshot>>>,
    pulls: Arc<AtomicU64>,
    step_seconds: u64,
}

impl ChartView {
    /// Copy of every series.
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.series.read().clone()
    }

    /// Number of completed pull rounds.
    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    /// Chart step in seconds.
    pub fn step_seconds(&self) -> u64 {
        self.step_seconds
    }
}

/// [`ChartHandle`] that pulls its sources on a tokio interval.
pub struct PollingChart {
    container: ContainerId,
    sources: Arc<[Arc<dyn MetricSource>]>,
    step: Duration,
    size: usize,
    view: ChartView,
    task: Option<JoinHandle<()>>,
}

impl PollingChart {
    /// Build a stopped chart.
    pub fn new(spec: ChartSpec) -> Self {
        let series = spec
            .sources
            .iter()
            .map(|s| SeriesSnapshot {
                name: s.name().to_string(),
                values: Vec::new(),
                available: true,
            })
            .collect();

        Self {
            container: spec.container,
            sources: spec.sources.into(),
            step: Duration::from_secs(spec.step_seconds.max(1)),
            size: spec.size,
            view: ChartView {
                series: Arc::new(RwLock::new(series)),
                pulls: Arc::new(AtomicU64::new(0)),
                step_seconds: spec.step_seconds,
            },
            task: None,
        }
    }

    /// Build a chart and start its timer.
    pub fn spawn(spec: ChartSpec) -> Self {
        let mut chart = Self::new(spec);
        chart.start();
        chart
    }

    /// Shareable read side.
    pub fn view(&self) -> ChartView {
        self.view.clone()
    }

    /// Container this chart is mounted in.
    pub fn container(&self) -> &ContainerId {
        &self.container
    }
}

impl ChartHandle for PollingChart {
    fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        debug!(container = %self.container, step = ?self.step, "Starting chart timer");
        self.task = Some(tokio::spawn(pull_loop(
            Arc::clone(&self.sources),
            self.step,
            self.size,
            self.view.clone(),
        )));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(container = %self.container, "Stopping chart timer");
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.is_some()
    }

    fn destroy(mut self: Box<Self>) {
        self.stop();
    }
}

impl Drop for PollingChart {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Trailing window of `size` steps, aligned to the step, ending now.
pub fn trailing_window(step: Duration, size: usize) -> TimeWindow {
    let step_ms = i64::try_from(step.as_millis()).unwrap_or(i64::MAX).max(1);
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
    let stop_ms = now_ms - now_ms.rem_euclid(step_ms);
    let span = step_ms.saturating_mul(i64::try_from(size).unwrap_or(i64::MAX));
    TimeWindow {
        start_ms: stop_ms.saturating_sub(span),
        stop_ms,
        step_ms,
    }
}

async fn pull_loop(
    sources: Arc<[Arc<dyn MetricSource>]>,
    step: Duration,
    size: usize,
    view: ChartView,
) {
    let mut ticker = time::interval(step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let window = trailing_window(step, size);

        let mut pulls = JoinSet::new();
        for (index, source) in sources.iter().enumerate() {
            let source = Arc::clone(source);
            pulls.spawn(async move { (index, source.fetch(window).await) });
        }

        while let Some(joined) = pulls.join_next().await {
            let Ok((index, result)) = joined else {
                continue;
            };
            let mut series = view.series.write();
            let Some(slot) = series.get_mut(index) else {
                continue;
            };
            match result {
                Ok(values) => {
                    slot.values = values;
                    slot.available = true;
                }
                Err(_) => {
                    trace!(series = %slot.name, "Series unavailable for window");
                    slot.available = false;
                }
            }
        }

        view.pulls.fetch_add(1, Ordering::Relaxed);
    }
}
