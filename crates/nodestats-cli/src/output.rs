//! Table and value formatting shared by the commands.

use chrono::{DateTime, Local, Utc};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{CellAlignment, Table};

use nodestats_core::{ColumnTotals, NodeStat, Settings, StatColumn, SummaryPage, TotalColumn};

/// Format a byte count with binary units.
pub fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    if bytes >= TB {
        format!("{:.2} TB", bytes / TB)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{bytes:.0} B")
    }
}

/// Format a count with thousands separators, rounding to an integer.
pub fn format_count(value: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a node clock (seconds since the epoch) in the user's timezone.
///
/// `gmt` prints UTC, `localtz` prints local time with its offset, anything
/// else prints plain local time.
pub fn format_time(epoch_secs: f64, settings: &Settings) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let Some(utc) = DateTime::<Utc>::from_timestamp(epoch_secs as i64, 0) else {
        return "-".to_string();
    };
    match settings.timezone.as_str() {
        "gmt" => utc.format("%Y/%m/%d %H:%M:%SZ").to_string(),
        "localtz" => utc
            .with_timezone(&Local)
            .format("%Y/%m/%d %H:%M:%S %:z")
            .to_string(),
        _ => utc.with_timezone(&Local).format("%Y/%m/%d %H:%M:%S").to_string(),
    }
}

/// Display text of one cell.
pub fn format_cell(column: StatColumn, stat: &NodeStat, settings: &Settings) -> String {
    match column {
        StatColumn::Node => stat.node_name.clone(),
        StatColumn::Time => format_time(stat.current_time, settings),
        StatColumn::FreeSpace => format_bytes(stat.free_space_m * 1024.0 * 1024.0),
        StatColumn::BytesPerSec => format_bytes(stat.delta_bytes_per_sec),
        StatColumn::Cpu => format!("{:.1}%", stat.cpu / 100.0),
        StatColumn::Memory => format_bytes(stat.memory),
        other => format_count(other.value(stat).unwrap_or(0.0)),
    }
}

fn format_total(column: StatColumn, value: f64) -> String {
    match column {
        StatColumn::FreeSpace => format_bytes(value * 1024.0 * 1024.0),
        StatColumn::BytesPerSec | StatColumn::Memory => format_bytes(value),
        StatColumn::Cpu => format!("{:.1}%", value / 100.0),
        _ => format_count(value),
    }
}

/// The node summary as a table, with average and total footer rows.
pub fn summary_table(page: &SummaryPage, totals: &ColumnTotals, settings: &Settings) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(StatColumn::ALL.iter().map(|c| c.header()));

    for stat in &page.data {
        table.add_row(StatColumn::ALL.iter().map(|c| format_cell(*c, stat, settings)));
    }

    if !page.data.is_empty() {
        for (label, pick) in [
            ("Average", ColumnTotals::average as fn(&ColumnTotals, TotalColumn) -> f64),
            ("Total", ColumnTotals::total),
        ] {
            let row = StatColumn::ALL.iter().map(|c| match c {
                StatColumn::Node => label.to_string(),
                StatColumn::Time => String::new(),
                numeric => format_total(*numeric, pick(totals, TotalColumn::Table(*numeric))),
            });
            table.add_row(row);
        }
    }

    for index in 2..StatColumn::ALL.len() {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}

/// Totals and averages keyed by backend field name, for JSON output.
pub fn totals_json(totals: &ColumnTotals) -> serde_json::Value {
    let mut total = serde_json::Map::new();
    let mut average = serde_json::Map::new();
    for (column, sum, mean) in totals.iter() {
        total.insert(column.key().to_string(), sum.into());
        average.insert(column.key().to_string(), mean.into());
    }
    serde_json::json!({ "total": total, "average": average })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.50 KB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0 * 1024.0), "5.00 GB");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0.0), "0");
        assert_eq!(format_count(999.4), "999");
        assert_eq!(format_count(1_234_567.0), "1,234,567");
        assert_eq!(format_count(-4321.0), "-4,321");
    }

    #[test]
    fn test_format_time_gmt() {
        let settings = Settings {
            timezone: "gmt".to_string(),
        };
        assert_eq!(format_time(0.0, &settings), "1970/01/01 00:00:00Z");
    }

    #[test]
    fn test_summary_table_has_footer_rows() {
        let page = SummaryPage {
            records_total: 2,
            records_filtered: 2,
            data: vec![
                NodeStat {
                    id: "a".to_string(),
                    node_name: "a".to_string(),
                    monitoring: 1000.0,
                    ..NodeStat::default()
                },
                NodeStat {
                    id: "b".to_string(),
                    node_name: "b".to_string(),
                    monitoring: 3000.0,
                    ..NodeStat::default()
                },
            ],
        };
        let totals = ColumnTotals::compute(&page.data);
        let rendered = summary_table(&page, &totals, &Settings::default()).to_string();
        assert!(rendered.contains("Sessions"));
        assert!(rendered.contains("Average"));
        assert!(rendered.contains("2,000"));
        assert!(rendered.contains("4,000"));
    }

    #[test]
    fn test_totals_json_uses_field_keys() {
        let totals = ColumnTotals::compute(&[NodeStat {
            delta_packets_per_sec: 7.0,
            memory_p: 40.0,
            ..NodeStat::default()
        }]);
        let json = totals_json(&totals);
        assert_eq!(json["total"]["deltaPacketsPerSec"], 7.0);
        assert_eq!(json["average"]["memoryP"], 40.0);
    }
}
