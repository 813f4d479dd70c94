//! Events delivered to a [`ViewSession`](crate::ViewSession).
//!
//! Timers, fetch completions, the visibility observer and user actions all
//! funnel into one queue, so the session mutates its state from a single task.

use crate::error::FetchError;
use crate::model::{Settings, SummaryPage};
use crate::query::{PageChange, Tab};
use crate::visibility::Visibility;

/// A user action on the stats view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    /// Page size or page number changed.
    ChangePagination(PageChange),
    /// A column header was clicked.
    SortBy(String),
    /// The node search box changed.
    Search(Option<String>),
    /// A different aggregate chart metric was picked.
    ChangeGraphType(String),
    /// A different aggregate chart step (seconds) was picked.
    ChangeGraphInterval(u64),
    /// A different summary refresh interval (milliseconds) was picked.
    ChangeDataInterval(u64),
    /// The graphs panel was opened or closed.
    ToggleGraphSection,
    /// A tab was selected.
    SelectTab(Tab),
    /// A row's detail chart was opened or closed.
    ToggleDetail(String),
    /// The view is going away.
    Unmount,
}

/// Anything the session reacts to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The summary refresh timer fired.
    Tick,
    /// A summary fetch completed.
    SummaryLoaded {
        /// Sequence number assigned when the fetch was issued.
        seq: u64,
        result: Result<SummaryPage, FetchError>,
    },
    /// User settings are known (defaults substituted on failure).
    SettingsLoaded(Settings),
    /// The page moved to the foreground or background.
    Visibility(Visibility),
    /// A user action.
    Action(ViewAction),
}
