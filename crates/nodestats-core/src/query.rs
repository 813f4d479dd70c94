//! Summary query and the view-level selections that feed it.

use serde::{Deserialize, Serialize};

use crate::model::StatColumn;

/// Default number of rows per summary page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Parameters of a summary fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Rows per page (`length` on the wire).
    pub page_size: usize,
    /// Index of the first row (`start` on the wire).
    pub offset: usize,
    /// Node name filter expression.
    pub filter: Option<String>,
    /// Backend sort field.
    pub sort_field: String,
    /// Sort descending (`desc` on the wire).
    pub sort_descending: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl Query {
    /// First page, sorted by node name ascending.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            offset: 0,
            filter: None,
            sort_field: StatColumn::Node.sort_key().to_string(),
            sort_descending: false,
        }
    }

    /// Wire parameters in backend order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("length", self.page_size.to_string()),
            ("start", self.offset.to_string()),
        ];
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            params.push(("filter", filter.to_string()));
        }
        params.push(("sortField", self.sort_field.clone()));
        params.push(("desc", self.sort_descending.to_string()));
        params
    }

    /// Select a sort column. Clicking any column flips the direction.
    pub fn sort_by(&mut self, field: &str) {
        self.sort_field = field.to_string();
        self.sort_descending = !self.sort_descending;
    }

    /// Apply a pagination change.
    pub fn paginate(&mut self, change: &PageChange) {
        self.page_size = change.length;
        self.offset = change.start;
    }

    /// One-based page number the offset falls on.
    pub fn current_page(&self) -> usize {
        if self.page_size == 0 {
            return 1;
        }
        self.offset / self.page_size + 1
    }
}

/// A pagination control change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    /// Rows per page.
    pub length: usize,
    /// Index of the first row.
    pub start: usize,
    /// One-based page number shown to the user.
    pub current_page: usize,
}

impl PageChange {
    /// Jump to a one-based page at the given page size.
    pub fn to_page(current_page: usize, length: usize) -> Self {
        let current_page = current_page.max(1);
        Self {
            length,
            start: (current_page - 1) * length,
            current_page,
        }
    }
}

/// The tabs of the stats view. Only the summary tab drives the refresh engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tab {
    /// Node summary table with graphs (index 0).
    #[default]
    Summary,
    /// Any other tab, by index.
    Other(usize),
}

impl Tab {
    /// Tab from its index.
    pub fn from_index(index: usize) -> Self {
        if index == 0 { Tab::Summary } else { Tab::Other(index) }
    }

    /// Whether this is the summary tab.
    pub fn is_summary(self) -> bool {
        matches!(self, Tab::Summary)
    }
}
