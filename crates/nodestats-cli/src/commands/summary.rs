//! One-shot node summary.

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::instrument;

use nodestats_core::{ColumnTotals, StatsService};

use super::{Context, OutputFormat, QueryArgs};
use crate::output;

#[derive(Args, Clone, Debug)]
pub struct SummaryArgs {
    /// Rows per page (defaults to the configured page size)
    #[arg(short, long)]
    pub length: Option<usize>,

    #[command(flatten)]
    pub selection: QueryArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[instrument(level = "info", name = "cmd::summary", skip_all)]
pub async fn run(ctx: &Context, args: &SummaryArgs) -> Result<()> {
    let service = ctx.service()?;
    let query = args.selection.query(args.length.unwrap_or(ctx.config.page_size));
    tracing::debug!(?query, "Fetching summary");

    let page = service
        .fetch_summary(&query)
        .await
        .context("Failed to load node summary")?;
    let settings = match service.fetch_user_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            tracing::debug!("Using default settings: {e}");
            nodestats_core::Settings::default()
        }
    };
    let totals = ColumnTotals::compute(&page.data);

    match args.format {
        OutputFormat::Table => {
            if page.data.is_empty() {
                println!("No nodes");
            } else {
                println!("{}", output::summary_table(&page, &totals, &settings));
            }
            println!(
                "Showing {} of {} nodes ({} total)",
                page.data.len(),
                page.records_filtered,
                page.records_total
            );
        }
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&page)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("totals".to_string(), output::totals_json(&totals));
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
