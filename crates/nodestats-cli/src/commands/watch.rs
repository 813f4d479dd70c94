//! Live node summary with charts.
//!
//! Mounts a [`ViewSession`] against the backend and redraws the terminal
//! whenever the view changes, plus once a second so sparklines advance.
//!
//! On Unix, `SIGUSR1` sends the view to the background (charts pause) and
//! `SIGUSR2` brings it back. Ctrl-C unmounts the view and exits.

use anyhow::{Context as _, Result};
use clap::Args;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use nodestats_core::{
    ChartView, Collaborators, ContainerId, RouteParams, SessionHandle, SessionOptions, ViewAction,
    ViewSession, ViewSnapshot, Visibility, WatchVisibility,
};

use super::{Context, QueryArgs};
use crate::output;
use crate::state::{RouteWriter, ViewStateStore};
use crate::terminal::{TerminalRenderer, sparkline};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Args, Clone, Debug)]
pub struct WatchArgs {
    /// Rows per page
    #[arg(short, long)]
    pub length: Option<usize>,

    /// Aggregate chart metric
    #[arg(short = 't', long)]
    pub graph_type: Option<String>,

    /// Aggregate chart step in seconds (0 freezes the chart)
    #[arg(short = 'g', long)]
    pub graph_step: Option<u64>,

    /// Summary refresh interval in milliseconds (0 disables refresh)
    #[arg(short, long)]
    pub interval: Option<u64>,

    #[command(flatten)]
    pub selection: QueryArgs,

    /// Open the detail chart of a node (repeatable)
    #[arg(short, long, value_name = "NODE")]
    pub detail: Vec<String>,

    /// Start with the graphs panel closed
    #[arg(long)]
    pub no_graphs: bool,

    /// Sparkline width in characters
    #[arg(long, default_value = "60")]
    pub width: usize,
}

impl WatchArgs {
    /// Command-line route overrides applied over `base`.
    fn route(&self, base: RouteParams) -> RouteParams {
        RouteParams {
            length: self.length.unwrap_or(base.length),
            graph_type: self.graph_type.clone().unwrap_or(base.graph_type),
            graph_step: self.graph_step.unwrap_or(base.graph_step),
            data_interval: self.interval.unwrap_or(base.data_interval),
        }
    }

    /// Panel and detail toggles replayed right after mounting.
    fn initial_actions(&self) -> Vec<ViewAction> {
        let mut actions = Vec::new();
        if self.no_graphs {
            actions.push(ViewAction::ToggleGraphSection);
        }
        actions.extend(self.detail.iter().cloned().map(ViewAction::ToggleDetail));
        actions
    }
}

#[instrument(level = "info", name = "cmd::watch", skip_all)]
pub async fn run(ctx: &Context, args: &WatchArgs) -> Result<()> {
    let service = Arc::new(ctx.service()?);
    let store = ViewStateStore::new(&ctx.config_dir)?;
    let route = args.route(store.saved_route(ctx.config.default_route()));
    let (address_bar, saving) = RouteWriter::spawn(store);
    let renderer = TerminalRenderer::new();
    let visibility = Arc::new(WatchVisibility::default());

    let collaborators = Collaborators {
        service,
        renderer: Arc::new(renderer.clone()),
        visibility: visibility.clone(),
        address_bar: Arc::new(address_bar),
    };

    let query = args.selection.query(route.length);
    tracing::debug!(?query, "Initial summary query");
    let initial = args.initial_actions();
    let session =
        ViewSession::mount_with_query(collaborators, route, query, SessionOptions::default());
    let handle = session.handle();
    let mut snapshots = session.subscribe();
    for action in initial {
        handle.send(action);
    }
    let running = tokio::spawn(session.run());

    forward_signals(handle, visibility)?;

    let mut redraw = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = redraw.tick() => {}
        }
        let snapshot = snapshots.borrow_and_update().clone();
        print!("{CLEAR_SCREEN}{}", render_frame(&snapshot, &renderer.views(), args.width));
    }

    running.await.context("View session task failed")?;
    saving.await.context("View state saver failed")?;
    tracing::info!("View closed");
    Ok(())
}

/// Ctrl-C unmounts the view; user signals flip visibility on Unix.
fn forward_signals(handle: SessionHandle, visibility: Arc<WatchVisibility>) -> Result<()> {
    ctrlc::set_handler(move || {
        tracing::debug!("Interrupted, unmounting view");
        handle.unmount();
    })
    .context("Failed to set signal handler")?;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        for (kind, target) in [
            (SignalKind::user_defined1(), Visibility::Hidden),
            (SignalKind::user_defined2(), Visibility::Visible),
        ] {
            let visibility = Arc::clone(&visibility);
            match signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        while stream.recv().await.is_some() {
                            tracing::debug!(?target, "Visibility signal");
                            visibility.set(target);
                        }
                    });
                }
                Err(e) => tracing::warn!("Failed to install signal handler: {e}"),
            }
        }
    }

    #[cfg(not(unix))]
    drop(visibility);

    Ok(())
}

/// One screenful: table, status line and every live chart.
fn render_frame(
    snapshot: &ViewSnapshot,
    charts: &[(ContainerId, ChartView)],
    width: usize,
) -> String {
    let mut out = String::new();

    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "!! {error}");
    }
    if snapshot.loading && snapshot.page.data.is_empty() {
        let _ = writeln!(out, "Loading...");
    } else if snapshot.page.data.is_empty() {
        let _ = writeln!(out, "No nodes");
    } else {
        let _ = writeln!(
            out,
            "{}",
            output::summary_table(&snapshot.page, &snapshot.totals, &snapshot.settings)
        );
    }

    let _ = writeln!(
        out,
        "page {} | {} of {} nodes | sort {}{} | refresh {} | graphs {} ({}) | {:?}",
        snapshot.current_page,
        snapshot.page.data.len(),
        snapshot.page.records_filtered,
        snapshot.query.sort_field,
        if snapshot.query.sort_descending { " desc" } else { "" },
        if snapshot.refreshing {
            format!("{}ms", snapshot.route.data_interval)
        } else {
            "off".to_string()
        },
        if snapshot.graphs_open { "open" } else { "closed" },
        snapshot.graph_state,
        snapshot.visibility,
    );

    if !snapshot.graphs_open {
        return out;
    }
    for (container, view) in charts {
        let _ = writeln!(out, "\n[{container}] every {}s", view.step_seconds());
        for series in view.snapshot() {
            let line = if series.available {
                sparkline(&series.values, width)
            } else {
                "(unavailable)".to_string()
            };
            let _ = writeln!(out, "{:>24} {line}", series.name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ColumnArg;
    use nodestats_core::StatColumn;
    use nodestats_core::testing::page_of;

    fn args() -> WatchArgs {
        WatchArgs {
            length: Some(200),
            graph_type: None,
            graph_step: Some(0),
            interval: None,
            selection: QueryArgs {
                page: 2,
                filter: Some("cap".to_string()),
                sort: Some(ColumnArg(StatColumn::Cpu)),
                desc: false,
            },
            detail: vec!["cap-1".to_string()],
            no_graphs: false,
            width: 60,
        }
    }

    #[test]
    fn test_flags_override_saved_route() {
        let base = RouteParams::parse("length=50&type=cpu&gtime=60&interval=15000");
        let route = args().route(base);
        assert_eq!(route.length, 200);
        assert_eq!(route.graph_type, "cpu");
        assert_eq!(route.graph_step, 0);
        assert_eq!(route.data_interval, 15000);
    }

    #[test]
    fn test_selection_flags_shape_the_mount_query() {
        let args = args();
        let route = args.route(RouteParams::default());
        let query = args.selection.query(route.length);
        assert_eq!(query.page_size, 200);
        assert_eq!(query.offset, 200);
        assert_eq!(query.current_page(), 2);
        assert_eq!(query.filter.as_deref(), Some("cap"));
        assert_eq!(query.sort_field, "cpu");
        assert!(!query.sort_descending);
    }

    #[test]
    fn test_initial_actions_only_toggle_panels() {
        assert_eq!(
            args().initial_actions(),
            vec![ViewAction::ToggleDetail("cap-1".to_string())]
        );

        let mut args = args();
        args.no_graphs = true;
        args.detail.clear();
        assert_eq!(args.initial_actions(), vec![ViewAction::ToggleGraphSection]);
    }

    #[test]
    fn test_frame_shows_error_banner_and_rows() {
        let snapshot = ViewSnapshot {
            page: page_of(&["cap-1", "cap-2"]),
            error: Some("Unable to load data".to_string()),
            loading: false,
            graphs_open: true,
            ..ViewSnapshot::default()
        };
        let frame = render_frame(&snapshot, &[], 10);
        assert!(frame.starts_with("!! Unable to load data"));
        assert!(frame.contains("cap-2"));
        assert!(frame.contains("graphs open"));
    }

    #[test]
    fn test_frame_before_first_load() {
        let snapshot = ViewSnapshot {
            loading: true,
            ..ViewSnapshot::default()
        };
        assert!(render_frame(&snapshot, &[], 10).starts_with("Loading..."));
    }
}
