//! Live refresh engine for a capture node statistics view.
//!
//! The engine keeps a summary table of capture nodes fresh and drives live
//! time-series charts of their metrics without ever drawing anything itself.
//! Data comes from a [`StatsService`], charts are materialized through a
//! [`Renderer`], and foreground/background transitions arrive from a
//! [`VisibilityObserver`].
//!
//! # Architecture
//!
//! - [`ViewSession`] owns the view state and processes events from one queue
//! - [`RefreshScheduler`] re-fetches the summary on a configurable interval
//! - [`GraphLifecycle`] decides when the aggregate chart is built, paused or
//!   thrown away, and owns per-row detail charts
//! - [`VisibilityGate`] pauses the aggregate chart while the view is hidden
//! - [`ServiceMetricSource`] adapts series fetches to the pull interface a
//!   chart uses, and [`PollingChart`] is a ready-made chart that pulls them
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nodestats_core::testing::{FakeStatsService, RecordingAddressBar, RecordingRenderer, page_of};
//! use nodestats_core::{Collaborators, RouteParams, SessionOptions, ViewSession, WatchVisibility};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let collaborators = Collaborators {
//!     service: Arc::new(FakeStatsService::with_page(page_of(&["cap-1", "cap-2"]))),
//!     renderer: Arc::new(RecordingRenderer::new()),
//!     visibility: Arc::new(WatchVisibility::default()),
//!     address_bar: Arc::new(RecordingAddressBar::new()),
//! };
//! let session = ViewSession::mount(
//!     collaborators,
//!     RouteParams::parse("length=100&gtime=10"),
//!     SessionOptions::default(),
//! );
//! let handle = session.handle();
//! let running = tokio::spawn(session.run());
//! handle.unmount();
//! running.await.unwrap();
//! # }
//! ```

pub mod chart;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod render;
pub mod route;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod source;
pub mod testing;
pub mod visibility;

pub use chart::{ChartView, PollingChart, SeriesSnapshot};
pub use error::{DataUnavailable, FetchError, RouteError};
pub use event::{SessionEvent, ViewAction};
pub use lifecycle::{GraphLifecycle, GraphState};
pub use model::{ColumnTotals, NodeStat, Settings, StatColumn, SummaryPage, TotalColumn};
pub use query::{PageChange, Query, Tab};
pub use render::{ChartHandle, ChartSpec, ContainerId, Renderer};
pub use route::{RefreshConfig, RouteParams};
pub use scheduler::RefreshScheduler;
pub use service::{SeriesRequest, StatsService};
pub use session::{
    AddressBar, Collaborators, SessionHandle, SessionOptions, StalePolicy, ViewSession, ViewSnapshot,
};
pub use source::{MetricSource, ServiceMetricSource, SourceFactory, TimeWindow};
pub use visibility::{Subscription, Visibility, VisibilityGate, VisibilityObserver, WatchVisibility};
