//! In-memory collaborators for exercising the engine without a backend or UI.
//!
//! - [`FakeStatsService`] - scripted summary/settings responses and per-node series
//! - [`RecordingRenderer`] - records every mount, unmount and timer change
//! - [`RecordingAddressBar`] - records route parameter writes

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::model::{NodeStat, Settings, SummaryPage};
use crate::query::Query;
use crate::render::{ChartHandle, ChartSpec, ContainerId, Renderer};
use crate::route::RouteParams;
use crate::service::{SeriesRequest, StatsService};
use crate::session::AddressBar;

/// Build a summary page from node names, with a distinct session count per row.
pub fn page_of(nodes: &[&str]) -> SummaryPage {
    let data: Vec<NodeStat> = nodes
        .iter()
        .enumerate()
        .map(|(i, name)| NodeStat {
            id: (*name).to_string(),
            node_name: (*name).to_string(),
            monitoring: (i + 1) as f64 * 10.0,
            memory_p: 50.0,
            free_space_p: 25.0,
            ..NodeStat::default()
        })
        .collect();
    SummaryPage {
        records_total: data.len() as u64,
        records_filtered: data.len() as u64,
        data,
    }
}

struct Scripted {
    delay: Duration,
    result: Result<SummaryPage, FetchError>,
}

struct ServiceState {
    summary: Result<SummaryPage, FetchError>,
    scripted: VecDeque<Scripted>,
    summary_queries: Vec<Query>,
    series: Result<Vec<f64>, FetchError>,
    node_series: HashMap<String, Result<Vec<f64>, FetchError>>,
    series_requests: Vec<SeriesRequest>,
    settings: Result<Settings, FetchError>,
    settings_calls: usize,
}

/// Scriptable [`StatsService`].
pub struct FakeStatsService {
    state: Mutex<ServiceState>,
}

impl Default for FakeStatsService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStatsService {
    /// Service answering with an empty page, empty series and default settings.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                summary: Ok(SummaryPage::default()),
                scripted: VecDeque::new(),
                summary_queries: Vec::new(),
                series: Ok(Vec::new()),
                node_series: HashMap::new(),
                series_requests: Vec::new(),
                settings: Ok(Settings::default()),
                settings_calls: 0,
            }),
        }
    }

    /// Service answering every summary fetch with `page`.
    pub fn with_page(page: SummaryPage) -> Self {
        let service = Self::new();
        service.set_summary(page);
        service
    }

    /// Answer subsequent summary fetches with `page`.
    pub fn set_summary(&self, page: SummaryPage) {
        self.state.lock().summary = Ok(page);
    }

    /// Fail subsequent summary fetches.
    pub fn fail_summary(&self, error: FetchError) {
        self.state.lock().summary = Err(error);
    }

    /// Answer the next unscripted summary fetch after `delay`, ahead of the default.
    pub fn script_summary(&self, delay: Duration, result: Result<SummaryPage, FetchError>) {
        self.state.lock().scripted.push_back(Scripted { delay, result });
    }

    /// Answer subsequent series fetches with `values`.
    pub fn set_series(&self, values: Vec<f64>) {
        self.state.lock().series = Ok(values);
    }

    /// Fail subsequent series fetches.
    pub fn fail_series(&self, error: FetchError) {
        self.state.lock().series = Err(error);
    }

    /// Answer subsequent series fetches for `node` with `values`, overriding the default.
    pub fn set_node_series(&self, node: &str, values: Vec<f64>) {
        self.state.lock().node_series.insert(node.to_string(), Ok(values));
    }

    /// Fail subsequent series fetches for `node` only.
    pub fn fail_node_series(&self, node: &str, error: FetchError) {
        self.state.lock().node_series.insert(node.to_string(), Err(error));
    }

    /// Fail subsequent settings fetches.
    pub fn fail_settings(&self, error: FetchError) {
        self.state.lock().settings = Err(error);
    }

    /// Answer subsequent settings fetches with `settings`.
    pub fn set_settings(&self, settings: Settings) {
        self.state.lock().settings = Ok(settings);
    }

    /// Number of summary fetches issued so far.
    pub fn summary_calls(&self) -> usize {
        self.state.lock().summary_queries.len()
    }

    /// Queries of every summary fetch issued so far.
    pub fn summary_queries(&self) -> Vec<Query> {
        self.state.lock().summary_queries.clone()
    }

    /// Every series request issued so far.
    pub fn series_requests(&self) -> Vec<SeriesRequest> {
        self.state.lock().series_requests.clone()
    }

    /// Number of settings fetches issued so far.
    pub fn settings_calls(&self) -> usize {
        self.state.lock().settings_calls
    }
}

#[async_trait]
impl StatsService for FakeStatsService {
    async fn fetch_summary(&self, query: &Query) -> Result<SummaryPage, FetchError> {
        let (delay, result) = {
            let mut state = self.state.lock();
            state.summary_queries.push(query.clone());
            match state.scripted.pop_front() {
                Some(s) => (s.delay, s.result),
                None => (Duration::ZERO, state.summary.clone()),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<f64>, FetchError> {
        let mut state = self.state.lock();
        state.series_requests.push(request.clone());
        state
            .node_series
            .get(&request.node_name)
            .unwrap_or(&state.series)
            .clone()
    }

    async fn fetch_user_settings(&self) -> Result<Settings, FetchError> {
        let mut state = self.state.lock();
        state.settings_calls += 1;
        state.settings.clone()
    }
}

/// What a [`RecordingRenderer`] knows about one mounted chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRecord {
    /// Mount order, starting at 1.
    pub id: u64,
    pub container: ContainerId,
    pub step_seconds: u64,
    pub series: Vec<String>,
    pub running: bool,
    pub destroyed: bool,
    /// Number of `start()` calls after mount.
    pub starts: usize,
    /// Number of `stop()` calls.
    pub stops: usize,
}

#[derive(Default)]
struct RendererLog {
    charts: Vec<ChartRecord>,
    unmounts: Vec<ContainerId>,
}

/// [`Renderer`] that records instead of drawing.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<RendererLog>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every chart ever mounted.
    pub fn charts(&self) -> Vec<ChartRecord> {
        self.log.lock().charts.clone()
    }

    /// Charts mounted and not yet destroyed.
    pub fn live_charts(&self) -> Vec<ChartRecord> {
        self.log
            .lock()
            .charts
            .iter()
            .filter(|c| !c.destroyed)
            .cloned()
            .collect()
    }

    /// Live charts in one container.
    pub fn live_in(&self, container: &ContainerId) -> Vec<ChartRecord> {
        self.live_charts()
            .into_iter()
            .filter(|c| &c.container == container)
            .collect()
    }

    /// The single live aggregate chart, if any.
    pub fn aggregate(&self) -> Option<ChartRecord> {
        self.live_in(&ContainerId::aggregate()).into_iter().last()
    }

    /// Number of times a container was cleared.
    pub fn unmount_count(&self, container: &ContainerId) -> usize {
        self.log
            .lock()
            .unmounts
            .iter()
            .filter(|c| *c == container)
            .count()
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut ChartRecord)) {
        let mut log = self.log.lock();
        if let Some(record) = log.charts.iter_mut().find(|c| c.id == id) {
            f(record);
        }
    }
}

impl Renderer for RecordingRenderer {
    fn mount(&self, spec: ChartSpec) -> Box<dyn ChartHandle> {
        let mut log = self.log.lock();
        let id = log.charts.len() as u64 + 1;
        log.charts.push(ChartRecord {
            id,
            container: spec.container.clone(),
            step_seconds: spec.step_seconds,
            series: spec.series_names(),
            running: true,
            destroyed: false,
            starts: 0,
            stops: 0,
        });
        Box::new(RecordedChart {
            id,
            renderer: self.clone(),
            running: true,
        })
    }

    fn unmount(&self, container: &ContainerId) {
        self.log.lock().unmounts.push(container.clone());
    }
}

struct RecordedChart {
    id: u64,
    renderer: RecordingRenderer,
    running: bool,
}

impl ChartHandle for RecordedChart {
    fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.renderer.update(self.id, |c| {
            c.running = true;
            c.starts += 1;
        });
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.renderer.update(self.id, |c| {
            c.running = false;
            c.stops += 1;
        });
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn destroy(self: Box<Self>) {
        self.renderer.update(self.id, |c| {
            c.running = false;
            c.destroyed = true;
        });
    }
}

/// [`AddressBar`] that keeps every write.
#[derive(Clone, Default)]
pub struct RecordingAddressBar {
    writes: Arc<Mutex<Vec<RouteParams>>>,
}

impl RecordingAddressBar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write, oldest first.
    pub fn writes(&self) -> Vec<RouteParams> {
        self.writes.lock().clone()
    }

    /// The most recent write.
    pub fn last(&self) -> Option<RouteParams> {
        self.writes.lock().last().cloned()
    }
}

impl AddressBar for RecordingAddressBar {
    fn write(&self, params: &RouteParams) {
        self.writes.lock().push(params.clone());
    }
}
