//! Subcommand implementations.

pub mod completions;
pub mod summary;
pub mod watch;

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::str::FromStr;

use nodestats_core::{PageChange, Query, StatColumn};

use crate::config::Config;
use crate::http::HttpStatsService;

/// What every command gets from the global flags and the config file.
pub struct Context {
    pub config: Config,
    /// `--url` / `NODESTATS_URL`, overriding `base_url`.
    pub url: Option<String>,
    /// Directory holding `config.toml` and `view.json`.
    pub config_dir: PathBuf,
}

impl Context {
    /// Backend client built from the effective URL and timeout.
    pub fn service(&self) -> Result<HttpStatsService> {
        let base = self.config.backend_url(self.url.as_deref())?;
        tracing::debug!(%base, "Using stats backend");
        Ok(HttpStatsService::new(base, self.config.timeout())?)
    }
}

/// Output format for one-shot commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Page, filter and sort selection shared by `summary` and `watch`.
#[derive(Args, Clone, Debug, Default)]
pub struct QueryArgs {
    /// One-based page number
    #[arg(short, long, default_value = "1")]
    pub page: usize,

    /// Only show nodes matching this search text
    #[arg(long)]
    pub filter: Option<String>,

    /// Sort column, by backend key or header
    #[arg(short, long)]
    pub sort: Option<ColumnArg>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,
}

impl QueryArgs {
    /// Summary query for `length` rows per page.
    pub fn query(&self, length: usize) -> Query {
        let mut query = Query::with_page_size(length);
        query.paginate(&PageChange::to_page(self.page, length));
        query.filter = self.filter.clone().filter(|f| !f.is_empty());
        if let Some(ColumnArg(column)) = self.sort {
            query.sort_field = column.sort_key().to_string();
        }
        query.sort_descending = self.desc;
        query
    }
}

/// A column picked on the command line, by sort key (`monitoring`) or
/// header (`Sessions`, case-insensitive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnArg(pub StatColumn);

impl FromStr for ColumnArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatColumn::from_sort_key(s)
            .or_else(|| {
                StatColumn::ALL
                    .into_iter()
                    .find(|c| c.header().eq_ignore_ascii_case(s))
            })
            .map(ColumnArg)
            .ok_or_else(|| {
                let keys: Vec<_> = StatColumn::ALL.iter().map(|c| c.sort_key()).collect();
                format!("unknown column '{s}' (expected one of: {})", keys.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_arg_accepts_key_or_header() {
        assert_eq!("deltaBytes".parse::<ColumnArg>().unwrap().0, StatColumn::BytesPerSec);
        assert_eq!("free space".parse::<ColumnArg>().unwrap().0, StatColumn::FreeSpace);
        let err = "bogus".parse::<ColumnArg>().unwrap_err();
        assert!(err.contains("monitoring"));
    }

    #[test]
    fn test_query_from_args() {
        let args = QueryArgs {
            page: 3,
            filter: Some(String::new()),
            sort: Some(ColumnArg(StatColumn::Cpu)),
            desc: true,
        };
        let query = args.query(50);
        assert_eq!(query.page_size, 50);
        assert_eq!(query.offset, 100);
        assert_eq!(query.filter, None);
        assert_eq!(query.sort_field, "cpu");
        assert!(query.sort_descending);
    }

    #[test]
    fn test_sort_without_desc_is_ascending() {
        let args = QueryArgs {
            sort: Some(ColumnArg(StatColumn::Cpu)),
            filter: Some("cap".to_string()),
            ..QueryArgs::default()
        };
        let query = args.query(20);
        assert_eq!(query.sort_field, "cpu");
        assert!(!query.sort_descending);
        assert_eq!(query.filter.as_deref(), Some("cap"));
        assert_eq!(query.offset, 0);
    }
}
