//! Chart materialization state.
//!
//! [`GraphLifecycle`] owns every live [`ChartHandle`] of the view: at most one
//! aggregate chart, plus one detail chart per expanded row. It is the only
//! place that decides whether a new aggregate chart may be built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::model::{StatColumn, SummaryPage};
use crate::render::{ChartHandle, ChartSpec, ContainerId, Renderer};
use crate::route::{DETAIL_CHART_STEP_SECS, RefreshConfig};
use crate::source::{MetricSource, SourceFactory};

/// Materialization state of the aggregate chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphState {
    /// No chart; the next summary refresh may build one.
    #[default]
    Uninitialized,
    /// Chart built and its timer running.
    Materialized,
    /// Chart built and its timer stopped.
    Suspended,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GraphState::Uninitialized => "uninitialized",
            GraphState::Materialized => "live",
            GraphState::Suspended => "paused",
        })
    }
}

struct DetailChart {
    handle: Box<dyn ChartHandle>,
    sources: Vec<Arc<dyn MetricSource>>,
}

/// Owner of the aggregate and detail chart handles.
pub struct GraphLifecycle {
    renderer: Arc<dyn Renderer>,
    chart_size: usize,
    state: GraphState,
    aggregate: Option<Box<dyn ChartHandle>>,
    aggregate_nodes: Vec<String>,
    details: BTreeMap<String, DetailChart>,
}

impl fmt::Debug for GraphLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphLifecycle")
            .field("state", &self.state)
            .field("aggregate_nodes", &self.aggregate_nodes)
            .field("details", &self.details.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl GraphLifecycle {
    pub fn new(renderer: Arc<dyn Renderer>, chart_size: usize) -> Self {
        Self {
            renderer,
            chart_size,
            state: GraphState::Uninitialized,
            aggregate: None,
            aggregate_nodes: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Whether an aggregate handle exists.
    pub fn has_aggregate(&self) -> bool {
        self.aggregate.is_some()
    }

    /// Whether the aggregate chart's timer is running.
    pub fn aggregate_running(&self) -> bool {
        self.aggregate.as_ref().is_some_and(|h| h.is_running())
    }

    /// Node names the aggregate chart is bound to, in display order.
    pub fn aggregate_nodes(&self) -> &[String] {
        &self.aggregate_nodes
    }

    /// Handle the "summary refreshed" signal.
    ///
    /// Builds the aggregate chart when the graphs panel is open and no chart
    /// exists yet. Returns whether a chart was built.
    pub fn on_summary_refreshed(
        &mut self,
        page: &SummaryPage,
        graphs_open: bool,
        refresh: RefreshConfig,
        metric: &str,
        factory: &SourceFactory,
    ) -> bool {
        if !graphs_open || self.state != GraphState::Uninitialized {
            return false;
        }

        let step = refresh.effective_chart_step();
        let nodes = page.node_names();
        let sources = nodes
            .iter()
            .map(|node| factory.make_metric_source(node, metric, step))
            .collect();

        let container = ContainerId::aggregate();
        self.renderer.unmount(&container);
        let mut handle = self.renderer.mount(ChartSpec {
            container,
            step_seconds: step,
            size: self.chart_size,
            sources,
        });

        if refresh.chart_is_live() {
            self.state = GraphState::Materialized;
        } else {
            handle.stop();
            self.state = GraphState::Suspended;
        }

        info!(
            metric,
            step,
            nodes = nodes.len(),
            state = %self.state,
            "Built aggregate chart"
        );
        self.aggregate = Some(handle);
        self.aggregate_nodes = nodes;
        true
    }

    /// Throw the aggregate chart away so the next refresh rebuilds it.
    pub fn invalidate(&mut self) {
        if self.state == GraphState::Uninitialized && self.aggregate.is_none() {
            return;
        }
        if let Some(handle) = self.aggregate.take() {
            handle.destroy();
        }
        self.renderer.unmount(&ContainerId::aggregate());
        self.aggregate_nodes.clear();
        self.state = GraphState::Uninitialized;
        debug!("Aggregate chart invalidated");
    }

    /// Stop the aggregate chart's timer, keeping the chart.
    pub fn suspend(&mut self) {
        if let Some(handle) = self.aggregate.as_mut() {
            handle.stop();
            self.state = GraphState::Suspended;
        }
    }

    /// Restart the aggregate chart's timer.
    pub fn resume(&mut self) {
        if let Some(handle) = self.aggregate.as_mut() {
            handle.start();
            self.state = GraphState::Materialized;
        }
    }

    /// Open or close the detail chart of a row. Returns whether it is now open.
    pub fn toggle_detail(&mut self, row_id: &str, factory: &SourceFactory) -> bool {
        let container = ContainerId::detail(row_id);
        self.renderer.unmount(&container);

        if let Some(detail) = self.details.remove(row_id) {
            detail.handle.destroy();
            debug!(row_id, "Closed detail chart");
            return false;
        }

        let sources: Vec<Arc<dyn MetricSource>> = StatColumn::NUMERIC
            .into_iter()
            .map(|column| {
                let (label, metric) = column.detail_metric();
                factory.make_labeled_metric_source(row_id, metric, DETAIL_CHART_STEP_SECS, &label)
            })
            .collect();

        let handle = self.renderer.mount(ChartSpec {
            container,
            step_seconds: DETAIL_CHART_STEP_SECS,
            size: self.chart_size,
            sources: sources.clone(),
        });
        self.details
            .insert(row_id.to_string(), DetailChart { handle, sources });
        debug!(row_id, "Opened detail chart");
        true
    }

    /// Sources bound to a row's detail chart, if it is open.
    pub fn detail_sources(&self, row_id: &str) -> Option<&[Arc<dyn MetricSource>]> {
        self.details.get(row_id).map(|d| d.sources.as_slice())
    }

    /// Rows whose detail chart is open.
    pub fn open_details(&self) -> Vec<String> {
        self.details.keys().cloned().collect()
    }

    /// Aggregate plus detail handles currently alive.
    pub fn live_handles(&self) -> usize {
        usize::from(self.aggregate.is_some()) + self.details.len()
    }

    /// Destroy every chart and clear every container.
    pub fn teardown(&mut self) {
        let details = std::mem::take(&mut self.details);
        for (row_id, detail) in details {
            detail.handle.destroy();
            self.renderer.unmount(&ContainerId::detail(&row_id));
        }
        if let Some(handle) = self.aggregate.take() {
            handle.destroy();
        }
        self.renderer.unmount(&ContainerId::aggregate());
        self.aggregate_nodes.clear();
        self.state = GraphState::Uninitialized;
        info!("Charts torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStatsService, RecordingRenderer, page_of};

    fn setup() -> (GraphLifecycle, RecordingRenderer, SourceFactory) {
        let renderer = RecordingRenderer::new();
        let lifecycle = GraphLifecycle::new(Arc::new(renderer.clone()), 1440);
        let factory = SourceFactory::new(Arc::new(FakeStatsService::new()));
        (lifecycle, renderer, factory)
    }

    fn live() -> RefreshConfig {
        RefreshConfig {
            summary_interval_ms: 5000,
            chart_step_seconds: 5,
        }
    }

    #[test]
    fn test_builds_once_until_invalidated() {
        let (mut lc, renderer, factory) = setup();
        let page = page_of(&["a", "b", "c"]);

        assert!(lc.on_summary_refreshed(&page, true, live(), "deltaPacketsPerSec", &factory));
        assert!(!lc.on_summary_refreshed(&page, true, live(), "deltaPacketsPerSec", &factory));
        assert_eq!(lc.state(), GraphState::Materialized);
        assert_eq!(renderer.live_charts().len(), 1);

        let chart = renderer.aggregate().unwrap();
        assert_eq!(chart.series, vec!["a", "b", "c"]);
        assert_eq!(chart.step_seconds, 5);

        lc.invalidate();
        assert_eq!(lc.state(), GraphState::Uninitialized);
        assert_eq!(renderer.live_charts().len(), 0);

        assert!(lc.on_summary_refreshed(&page_of(&["c", "b"]), true, live(), "cpu", &factory));
        assert_eq!(renderer.live_charts().len(), 1);
        assert_eq!(renderer.aggregate().unwrap().series, vec!["c", "b"]);
    }

    #[test]
    fn test_closed_panel_does_not_build() {
        let (mut lc, renderer, factory) = setup();
        assert!(!lc.on_summary_refreshed(&page_of(&["a"]), false, live(), "cpu", &factory));
        assert_eq!(lc.state(), GraphState::Uninitialized);
        assert!(renderer.charts().is_empty());
    }

    #[test]
    fn test_zero_step_builds_frozen_chart() {
        let (mut lc, renderer, factory) = setup();
        let frozen = RefreshConfig {
            summary_interval_ms: 5000,
            chart_step_seconds: 0,
        };
        assert!(lc.on_summary_refreshed(&page_of(&["a"]), true, frozen, "cpu", &factory));
        assert_eq!(lc.state(), GraphState::Suspended);

        let chart = renderer.aggregate().unwrap();
        assert_eq!(chart.step_seconds, 5);
        assert!(!chart.running);
    }

    #[test]
    fn test_suspend_and_resume_keep_the_handle() {
        let (mut lc, renderer, factory) = setup();
        lc.on_summary_refreshed(&page_of(&["a"]), true, live(), "cpu", &factory);

        lc.suspend();
        assert_eq!(lc.state(), GraphState::Suspended);
        assert!(!lc.aggregate_running());
        lc.resume();
        assert_eq!(lc.state(), GraphState::Materialized);

        let chart = renderer.aggregate().unwrap();
        assert_eq!((chart.stops, chart.starts), (1, 1));
        assert_eq!(renderer.charts().len(), 1);
    }

    #[test]
    fn test_detail_toggle_twice_leaves_nothing() {
        let (mut lc, renderer, factory) = setup();

        assert!(lc.toggle_detail("node-1", &factory));
        assert_eq!(lc.live_handles(), 1);
        let sources = lc.detail_sources("node-1").unwrap();
        assert_eq!(sources.len(), 11);
        assert_eq!(sources[0].name(), "Sessions");
        assert_eq!(sources[5].name(), "Packet/m");

        let chart = &renderer.live_in(&ContainerId::detail("node-1"))[0];
        assert_eq!(chart.step_seconds, 60);

        assert!(!lc.toggle_detail("node-1", &factory));
        assert_eq!(lc.live_handles(), 0);
        assert!(lc.detail_sources("node-1").is_none());
        assert!(renderer.live_charts().is_empty());
        assert_eq!(renderer.unmount_count(&ContainerId::detail("node-1")), 2);
    }

    #[test]
    fn test_teardown_destroys_everything() {
        let (mut lc, renderer, factory) = setup();
        lc.on_summary_refreshed(&page_of(&["a", "b"]), true, live(), "cpu", &factory);
        lc.toggle_detail("a", &factory);
        lc.toggle_detail("b", &factory);
        assert_eq!(lc.live_handles(), 3);

        lc.teardown();
        assert_eq!(lc.live_handles(), 0);
        assert!(renderer.live_charts().is_empty());
        assert_eq!(lc.state(), GraphState::Uninitialized);
    }
}
