//! The stats view session.
//!
//! A [`ViewSession`] owns everything one mounted stats view knows: the
//! summary query, route parameters, selected tab, graphs panel, the last
//! page and its totals, the refresh timer and every chart. All of it is
//! mutated from one task that drains a single event queue; timers, fetches,
//! the visibility observer and [`SessionHandle`]s only post events.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::event::{SessionEvent, ViewAction};
use crate::lifecycle::{GraphLifecycle, GraphState};
use crate::model::{ColumnTotals, Settings, SummaryPage};
use crate::query::{PageChange, Query, Tab};
use crate::render::{DEFAULT_CHART_SIZE, Renderer};
use crate::route::RouteParams;
use crate::scheduler::RefreshScheduler;
use crate::service::StatsService;
use crate::source::SourceFactory;
use crate::visibility::{GateInputs, Visibility, VisibilityGate, VisibilityObserver};

/// Where route parameter changes are written so a reload restores them.
pub trait AddressBar: Send + Sync {
    fn write(&self, params: &RouteParams);
}

/// The capabilities a session is mounted with.
#[derive(Clone)]
pub struct Collaborators {
    pub service: Arc<dyn StatsService>,
    pub renderer: Arc<dyn Renderer>,
    pub visibility: Arc<dyn VisibilityObserver>,
    pub address_bar: Arc<dyn AddressBar>,
}

/// What to do with a summary response that arrives after a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Apply every response in arrival order.
    #[default]
    LastWriterWins,
    /// Ignore responses older than the newest one already applied.
    DropStale,
}

/// Session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub stale_policy: StalePolicy,
    /// Samples kept by every chart.
    pub chart_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stale_policy: StalePolicy::default(),
            chart_size: DEFAULT_CHART_SIZE,
        }
    }
}

/// Everything a view needs to draw the stats page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub page: SummaryPage,
    pub totals: ColumnTotals,
    /// Last summary fetch error, shown as a banner.
    pub error: Option<String>,
    /// Set until the first summary response arrives.
    pub loading: bool,
    pub graph_state: GraphState,
    pub graphs_open: bool,
    pub tab: Tab,
    /// One-based page number.
    pub current_page: usize,
    /// Rows whose detail chart is open.
    pub expanded: Vec<String>,
    pub settings: Settings,
    pub route: RouteParams,
    pub query: Query,
    pub visibility: Visibility,
    /// Whether the summary refresh timer is armed.
    pub refreshing: bool,
    /// Charts currently alive.
    pub live_charts: usize,
}

/// Submits actions to a running session from any task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Queue an action. Returns `false` once the session is gone.
    pub fn send(&self, action: ViewAction) -> bool {
        self.tx.send(SessionEvent::Action(action)).is_ok()
    }

    /// Ask the session to tear down.
    pub fn unmount(&self) -> bool {
        self.send(ViewAction::Unmount)
    }
}

/// One mounted stats view.
pub struct ViewSession {
    service: Arc<dyn StatsService>,
    address_bar: Arc<dyn AddressBar>,
    factory: SourceFactory,
    scheduler: RefreshScheduler,
    lifecycle: GraphLifecycle,
    gate: VisibilityGate,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: watch::Sender<ViewSnapshot>,
    options: SessionOptions,

    query: Query,
    route: RouteParams,
    current_page: usize,
    tab: Tab,
    graphs_open: bool,
    page: SummaryPage,
    totals: ColumnTotals,
    error: Option<String>,
    loading: bool,
    settings: Settings,
    applied_seq: u64,
    /// Seq of the reload issued by the last invalidation; older replies never build charts.
    chart_floor_seq: u64,
    closed: bool,
}

impl ViewSession {
    /// Mount a view: fetch settings, load the first page and arm the refresh timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(collaborators: Collaborators, route: RouteParams, options: SessionOptions) -> Self {
        let query = Query::with_page_size(route.length);
        Self::mount_with_query(collaborators, route, query, options)
    }

    /// Mount a view whose first fetch already uses `query`.
    ///
    /// The page size comes from `query`; the current page follows its offset.
    pub fn mount_with_query(
        collaborators: Collaborators,
        route: RouteParams,
        query: Query,
        options: SessionOptions,
    ) -> Self {
        let Collaborators {
            service,
            renderer,
            visibility,
            address_bar,
        } = collaborators;

        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(ViewSnapshot::default());
        let gate = VisibilityGate::register(visibility.as_ref(), tx.clone());

        info!(
            length = query.page_size,
            offset = query.offset,
            sort = %query.sort_field,
            desc = query.sort_descending,
            filter = query.filter.as_deref().unwrap_or(""),
            graph_type = %route.graph_type,
            graph_step = route.graph_step,
            data_interval = route.data_interval,
            "Mounting stats view"
        );

        let mut session = Self {
            factory: SourceFactory::new(Arc::clone(&service)),
            scheduler: RefreshScheduler::new(Arc::clone(&service), tx.clone()),
            lifecycle: GraphLifecycle::new(renderer, options.chart_size),
            service,
            address_bar,
            gate,
            tx,
            rx,
            snapshot,
            options,
            current_page: query.current_page(),
            query,
            route,
            tab: Tab::Summary,
            graphs_open: true,
            page: SummaryPage::default(),
            totals: ColumnTotals::default(),
            error: None,
            loading: true,
            settings: Settings::default(),
            applied_seq: 0,
            chart_floor_seq: 0,
            closed: false,
        };

        session.load_settings();
        session.chart_floor_seq = session.scheduler.reload(&session.query);
        session.scheduler.configure(session.route.data_interval);
        session.publish();
        session
    }

    /// Handle for submitting actions from other tasks.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.tx.clone(),
        }
    }

    /// Receiver of a fresh [`ViewSnapshot`] after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshot.subscribe()
    }

    /// Current state of the view.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn lifecycle(&self) -> &GraphLifecycle {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn route(&self) -> &RouteParams {
        &self.route
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Queue an action as if it came from a [`SessionHandle`].
    pub fn dispatch(&self, action: ViewAction) {
        let _ = self.tx.send(SessionEvent::Action(action));
    }

    /// Process events until the view is unmounted, then tear down.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if !self.step(event) {
                break;
            }
        }
        self.teardown();
    }

    /// Process every event that is ready without waiting on timers.
    ///
    /// Spawned work is given a chance to run between rounds; returns once two
    /// rounds in a row find the queue empty.
    pub async fn run_pending(&mut self) -> usize {
        let mut processed = 0;
        let mut idle_rounds = 0;
        while idle_rounds < 2 && !self.closed {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            let mut progressed = false;
            while let Ok(event) = self.rx.try_recv() {
                progressed = true;
                processed += 1;
                if !self.step(event) {
                    break;
                }
            }
            idle_rounds = if progressed { 0 } else { idle_rounds + 1 };
        }
        processed
    }

    /// Apply one event. Returns `false` once the session is closed.
    pub fn step(&mut self, event: SessionEvent) -> bool {
        if self.closed {
            return false;
        }

        match event {
            SessionEvent::Tick => {
                self.scheduler.reload(&self.query);
            }
            SessionEvent::SummaryLoaded { seq, result } => self.on_summary_loaded(seq, result),
            SessionEvent::SettingsLoaded(settings) => {
                debug!(timezone = %settings.timezone, "Settings loaded");
                self.settings = settings;
            }
            SessionEvent::Visibility(visibility) => {
                let inputs = self.gate_inputs();
                self.gate.apply(visibility, &mut self.lifecycle, inputs);
            }
            SessionEvent::Action(action) => self.on_action(action),
        }

        if !self.closed {
            self.publish();
        }
        !self.closed
    }

    /// Stop the timer, destroy every chart and release the visibility observer.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.scheduler.stop();
        self.lifecycle.teardown();
        self.gate.release();
        self.closed = true;
        self.publish();
        info!("Stats view unmounted");
    }

    fn load_settings(&self) {
        let service = Arc::clone(&self.service);
        let events = self.tx.clone();
        tokio::spawn(async move {
            let settings = match service.fetch_user_settings().await {
                Ok(settings) => settings,
                Err(e) => {
                    debug!(error = %e, "Settings unavailable, using defaults");
                    Settings::default()
                }
            };
            let _ = events.send(SessionEvent::SettingsLoaded(settings));
        });
    }

    fn on_summary_loaded(&mut self, seq: u64, result: Result<SummaryPage, FetchError>) {
        if self.options.stale_policy == StalePolicy::DropStale && seq < self.applied_seq {
            debug!(seq, applied = self.applied_seq, "Dropping stale summary response");
            return;
        }
        self.applied_seq = self.applied_seq.max(seq);
        self.loading = false;

        match result {
            Ok(page) => {
                self.totals = ColumnTotals::compute(&page.data);
                self.page = page;
                self.error = None;

                if seq < self.chart_floor_seq {
                    debug!(
                        seq,
                        floor = self.chart_floor_seq,
                        "Reply predates invalidation, not building charts"
                    );
                    return;
                }
                let built = self.lifecycle.on_summary_refreshed(
                    &self.page,
                    self.graphs_open,
                    self.route.refresh(),
                    &self.route.graph_type,
                    &self.factory,
                );
                if built && !self.gate.allows_running(self.gate_inputs()) {
                    self.lifecycle.suspend();
                }
            }
            Err(e) => {
                warn!(seq, error = %e, "Summary fetch failed");
                self.error = Some(e.to_string());
            }
        }
    }

    fn on_action(&mut self, action: ViewAction) {
        debug!(?action, "View action");
        match action {
            ViewAction::ChangePagination(change) => self.change_pagination(change),
            ViewAction::SortBy(field) => {
                self.query.sort_by(&field);
                self.rebuild();
            }
            ViewAction::Search(filter) => {
                self.query.filter = filter;
                self.rebuild();
            }
            ViewAction::ChangeGraphType(metric) => {
                self.route.graph_type = metric;
                self.write_route();
                self.rebuild();
            }
            ViewAction::ChangeGraphInterval(seconds) => {
                self.route.graph_step = seconds;
                self.write_route();
                self.rebuild();
            }
            ViewAction::ChangeDataInterval(ms) => {
                self.route.data_interval = ms;
                self.write_route();
                if self.tab.is_summary() {
                    self.scheduler.configure(ms);
                }
            }
            ViewAction::ToggleGraphSection => {
                if self.graphs_open {
                    self.lifecycle.suspend();
                } else if self.route.graph_step != 0 {
                    self.lifecycle.resume();
                }
                self.graphs_open = !self.graphs_open;
            }
            ViewAction::SelectTab(tab) => self.select_tab(tab),
            ViewAction::ToggleDetail(row_id) => {
                self.lifecycle.toggle_detail(&row_id, &self.factory);
            }
            ViewAction::Unmount => self.teardown(),
        }
    }

    fn change_pagination(&mut self, change: PageChange) {
        let resized = change.length != self.route.length;
        self.query.paginate(&change);
        self.current_page = change.current_page;
        if resized {
            self.route.length = change.length;
            self.write_route();
        }
        self.rebuild();
    }

    fn select_tab(&mut self, tab: Tab) {
        let previous = self.tab;
        self.tab = tab;

        if !tab.is_summary() {
            info!(?tab, "Left summary tab, pausing refresh");
            self.scheduler.stop();
            self.lifecycle.suspend();
        } else if !previous.is_summary() {
            info!("Returned to summary tab");
            self.rebuild();
            self.scheduler.configure(self.route.data_interval);
        }
    }

    /// Throw the aggregate chart away and reload so the next page rebuilds it.
    fn rebuild(&mut self) {
        self.lifecycle.invalidate();
        self.chart_floor_seq = self.scheduler.reload(&self.query);
    }

    fn write_route(&self) {
        self.address_bar.write(&self.route);
    }

    fn gate_inputs(&self) -> GateInputs {
        GateInputs {
            chart_step_seconds: self.route.graph_step,
            graphs_open: self.graphs_open,
            tab: self.tab,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(ViewSnapshot {
            page: self.page.clone(),
            totals: self.totals.clone(),
            error: self.error.clone(),
            loading: self.loading,
            graph_state: self.lifecycle.state(),
            graphs_open: self.graphs_open,
            tab: self.tab,
            current_page: self.current_page,
            expanded: self.lifecycle.open_details(),
            settings: self.settings.clone(),
            route: self.route.clone(),
            query: self.query.clone(),
            visibility: self.gate.visibility(),
            refreshing: self.scheduler.is_armed(),
            live_charts: self.lifecycle.live_handles(),
        });
    }
}

impl Drop for ViewSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
