//! Summary table data: node rows, columns, and derived totals.
//!
//! The backend returns one [`NodeStat`] per capture node. The view shows them
//! as a table of [`StatColumn`]s and keeps a [`ColumnTotals`] footer that is
//! recomputed from scratch on every successful fetch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the node summary table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStat {
    /// Row identity, used for detail charts. Falls back to the node name.
    pub id: String,
    /// Node name, used for aggregate chart sources.
    pub node_name: String,
    /// Node clock, seconds since the epoch.
    pub current_time: f64,
    /// Sessions currently being monitored.
    pub monitoring: f64,
    /// Free disk space in megabytes.
    pub free_space_m: f64,
    pub cpu: f64,
    pub memory: f64,
    pub packet_queue: f64,
    pub delta_packets_per_sec: f64,
    pub delta_bytes_per_sec: f64,
    pub delta_sessions_per_sec: f64,
    pub delta_dropped_per_sec: f64,
    pub delta_overload_dropped_per_sec: f64,
    #[serde(rename = "deltaESDroppedPerSec")]
    pub delta_es_dropped_per_sec: f64,
    /// Memory usage as a percentage.
    #[serde(rename = "memoryP")]
    pub memory_p: f64,
    /// Free disk space as a percentage.
    #[serde(rename = "freeSpaceP")]
    pub free_space_p: f64,
}

impl NodeStat {
    /// Identity used for per-row state; the node name when the backend omits `id`.
    pub fn row_id(&self) -> &str {
        if self.id.is_empty() {
            &self.node_name
        } else {
            &self.id
        }
    }

    /// Numeric value of a summed column.
    pub fn value(&self, column: TotalColumn) -> f64 {
        match column {
            TotalColumn::Table(c) => c.value(self).unwrap_or(0.0),
            TotalColumn::MemoryPercent => self.memory_p,
            TotalColumn::FreeSpacePercent => self.free_space_p,
        }
    }
}

/// One page of the node summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryPage {
    /// Total number of nodes known to the backend.
    pub records_total: u64,
    /// Number of nodes matching the current filter.
    pub records_filtered: u64,
    /// The rows of this page, in the requested order.
    pub data: Vec<NodeStat>,
}

impl SummaryPage {
    /// Node names in page order; one aggregate chart source per entry.
    pub fn node_names(&self) -> Vec<String> {
        self.data.iter().map(|s| s.node_name.clone()).collect()
    }
}

/// Columns of the node summary table, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatColumn {
    Node,
    Time,
    Sessions,
    FreeSpace,
    Cpu,
    Memory,
    PacketQueue,
    PacketsPerSec,
    BytesPerSec,
    SessionsPerSec,
    PacketDropsPerSec,
    OverloadDropsPerSec,
    EsDropsPerSec,
}

impl StatColumn {
    /// All columns in display order.
    pub const ALL: [StatColumn; 13] = [
        StatColumn::Node,
        StatColumn::Time,
        StatColumn::Sessions,
        StatColumn::FreeSpace,
        StatColumn::Cpu,
        StatColumn::Memory,
        StatColumn::PacketQueue,
        StatColumn::PacketsPerSec,
        StatColumn::BytesPerSec,
        StatColumn::SessionsPerSec,
        StatColumn::PacketDropsPerSec,
        StatColumn::OverloadDropsPerSec,
        StatColumn::EsDropsPerSec,
    ];

    /// Columns that get totals, averages, and a detail chart series.
    ///
    /// Node and Time are identity columns and are never summed.
    pub const NUMERIC: [StatColumn; 11] = [
        StatColumn::Sessions,
        StatColumn::FreeSpace,
        StatColumn::Cpu,
        StatColumn::Memory,
        StatColumn::PacketQueue,
        StatColumn::PacketsPerSec,
        StatColumn::BytesPerSec,
        StatColumn::SessionsPerSec,
        StatColumn::PacketDropsPerSec,
        StatColumn::OverloadDropsPerSec,
        StatColumn::EsDropsPerSec,
    ];

    /// Table header text.
    pub fn header(self) -> &'static str {
        match self {
            StatColumn::Node => "Node",
            StatColumn::Time => "Time",
            StatColumn::Sessions => "Sessions",
            StatColumn::FreeSpace => "Free Space",
            StatColumn::Cpu => "CPU",
            StatColumn::Memory => "Memory",
            StatColumn::PacketQueue => "Packet Q",
            StatColumn::PacketsPerSec => "Packet/s",
            StatColumn::BytesPerSec => "Bytes/s",
            StatColumn::SessionsPerSec => "Sessions/s",
            StatColumn::PacketDropsPerSec => "Packet Drops/s",
            StatColumn::OverloadDropsPerSec => "Overload Drops/s",
            StatColumn::EsDropsPerSec => "ES Drops/s",
        }
    }

    /// Backend sort field for this column.
    pub fn sort_key(self) -> &'static str {
        match self {
            StatColumn::Node => "nodeName",
            StatColumn::Time => "currentTime",
            StatColumn::Sessions => "monitoring",
            StatColumn::FreeSpace => "freeSpaceM",
            StatColumn::Cpu => "cpu",
            StatColumn::Memory => "memory",
            StatColumn::PacketQueue => "packetQueue",
            StatColumn::PacketsPerSec => "deltaPackets",
            StatColumn::BytesPerSec => "deltaBytes",
            StatColumn::SessionsPerSec => "deltaSessions",
            StatColumn::PacketDropsPerSec => "deltaDropped",
            StatColumn::OverloadDropsPerSec => "deltaOverloadDropped",
            StatColumn::EsDropsPerSec => "deltaESDropped",
        }
    }

    /// Row field shown in this column, when it differs from the sort key.
    pub fn field_key(self) -> &'static str {
        match self {
            StatColumn::PacketsPerSec => "deltaPacketsPerSec",
            StatColumn::BytesPerSec => "deltaBytesPerSec",
            StatColumn::SessionsPerSec => "deltaSessionsPerSec",
            StatColumn::PacketDropsPerSec => "deltaDroppedPerSec",
            StatColumn::OverloadDropsPerSec => "deltaOverloadDroppedPerSec",
            StatColumn::EsDropsPerSec => "deltaESDroppedPerSec",
            other => other.sort_key(),
        }
    }

    /// Look a column up by its sort key.
    pub fn from_sort_key(key: &str) -> Option<StatColumn> {
        Self::ALL.into_iter().find(|c| c.sort_key() == key)
    }

    /// Numeric value of this column for a row; `None` for the Node column.
    pub fn value(self, stat: &NodeStat) -> Option<f64> {
        let v = match self {
            StatColumn::Node => return None,
            StatColumn::Time => stat.current_time,
            StatColumn::Sessions => stat.monitoring,
            StatColumn::FreeSpace => stat.free_space_m,
            StatColumn::Cpu => stat.cpu,
            StatColumn::Memory => stat.memory,
            StatColumn::PacketQueue => stat.packet_queue,
            StatColumn::PacketsPerSec => stat.delta_packets_per_sec,
            StatColumn::BytesPerSec => stat.delta_bytes_per_sec,
            StatColumn::SessionsPerSec => stat.delta_sessions_per_sec,
            StatColumn::PacketDropsPerSec => stat.delta_dropped_per_sec,
            StatColumn::OverloadDropsPerSec => stat.delta_overload_dropped_per_sec,
            StatColumn::EsDropsPerSec => stat.delta_es_dropped_per_sec,
        };
        Some(v)
    }

    fn is_rate(self) -> bool {
        self.header().ends_with("/s")
    }

    /// Series label and backend metric name for this column's detail chart.
    ///
    /// Detail charts step once a minute, so per-second columns are shown as
    /// per-minute series of the underlying delta counter.
    pub fn detail_metric(self) -> (String, &'static str) {
        if self.is_rate() {
            (self.header().replace("/s", "/m"), self.sort_key())
        } else {
            (self.header().to_string(), self.sort_key())
        }
    }
}

/// A column that participates in the totals footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TotalColumn {
    /// A visible numeric table column.
    Table(StatColumn),
    /// Memory usage percentage (not a table column).
    MemoryPercent,
    /// Free space percentage (not a table column).
    FreeSpacePercent,
}

impl TotalColumn {
    /// Every column that gets a total and an average.
    pub fn all() -> Vec<TotalColumn> {
        StatColumn::NUMERIC
            .into_iter()
            .map(TotalColumn::Table)
            .chain([TotalColumn::MemoryPercent, TotalColumn::FreeSpacePercent])
            .collect()
    }

    /// Row field name for this column.
    pub fn key(self) -> &'static str {
        match self {
            TotalColumn::Table(c) => c.field_key(),
            TotalColumn::MemoryPercent => "memoryP",
            TotalColumn::FreeSpacePercent => "freeSpaceP",
        }
    }
}

/// Totals and averages of the numeric columns of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTotals {
    totals: BTreeMap<TotalColumn, f64>,
    averages: BTreeMap<TotalColumn, f64>,
}

impl ColumnTotals {
    /// Compute totals and averages from a page of rows.
    ///
    /// Averages of an empty page are zero.
    pub fn compute(rows: &[NodeStat]) -> Self {
        let mut totals = BTreeMap::new();
        let mut averages = BTreeMap::new();

        for column in TotalColumn::all() {
            let total: f64 = rows.iter().map(|s| s.value(column)).sum();
            let average = if rows.is_empty() {
                0.0
            } else {
                total / rows.len() as f64
            };
            totals.insert(column, total);
            averages.insert(column, average);
        }

        Self { totals, averages }
    }

    /// Sum of a column over the page.
    pub fn total(&self, column: TotalColumn) -> f64 {
        self.totals.get(&column).copied().unwrap_or(0.0)
    }

    /// Mean of a column over the page.
    pub fn average(&self, column: TotalColumn) -> f64 {
        self.averages.get(&column).copied().unwrap_or(0.0)
    }

    /// Iterate `(column, total, average)` in column order.
    pub fn iter(&self) -> impl Iterator<Item = (TotalColumn, f64, f64)> + '_ {
        self.totals
            .iter()
            .map(|(c, t)| (*c, *t, self.average(*c)))
    }
}

/// Per-user display settings fetched from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `local`, `localtz`, or `gmt`.
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: "local".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stat(name: &str, sessions: f64, memory_p: f64) -> NodeStat {
        NodeStat {
            id: name.to_string(),
            node_name: name.to_string(),
            monitoring: sessions,
            memory_p,
            ..NodeStat::default()
        }
    }

    #[test]
    fn test_decode_backend_row() {
        let json = r#"{
            "id": "cap-1",
            "nodeName": "cap-1",
            "currentTime": 1700000000,
            "monitoring": 12,
            "freeSpaceM": 2048,
            "deltaPacketsPerSec": 100.5,
            "deltaESDroppedPerSec": 3,
            "memoryP": 41.5,
            "freeSpaceP": 80
        }"#;
        let s: NodeStat = serde_json::from_str(json).unwrap();
        assert_eq!(s.node_name, "cap-1");
        assert_eq!(s.monitoring, 12.0);
        assert_eq!(s.delta_packets_per_sec, 100.5);
        assert_eq!(s.delta_es_dropped_per_sec, 3.0);
        assert_eq!(s.memory_p, 41.5);
        assert_eq!(s.cpu, 0.0);
    }

    #[test]
    fn test_row_id_falls_back_to_node_name() {
        let s = NodeStat {
            node_name: "cap-2".to_string(),
            ..NodeStat::default()
        };
        assert_eq!(s.row_id(), "cap-2");
    }

    #[test]
    fn test_totals_skip_identity_columns() {
        let columns = TotalColumn::all();
        assert!(!columns.contains(&TotalColumn::Table(StatColumn::Node)));
        assert!(!columns.contains(&TotalColumn::Table(StatColumn::Time)));
        assert_eq!(columns.len(), 13);
        assert_eq!(columns[columns.len() - 2].key(), "memoryP");
        assert_eq!(columns[columns.len() - 1].key(), "freeSpaceP");
    }

    #[test]
    fn test_totals_and_averages() {
        let rows = vec![stat("a", 10.0, 20.0), stat("b", 30.0, 40.0)];
        let totals = ColumnTotals::compute(&rows);
        let sessions = TotalColumn::Table(StatColumn::Sessions);
        assert_eq!(totals.total(sessions), 40.0);
        assert_eq!(totals.average(sessions), 20.0);
        assert_eq!(totals.total(TotalColumn::MemoryPercent), 60.0);
        assert_eq!(totals.average(TotalColumn::MemoryPercent), 30.0);
    }

    #[test]
    fn test_empty_page_averages_are_zero() {
        let totals = ColumnTotals::compute(&[]);
        for (_, total, average) in totals.iter() {
            assert_eq!(total, 0.0);
            assert_eq!(average, 0.0);
        }
    }

    #[test]
    fn test_detail_metrics() {
        let metrics: Vec<_> = StatColumn::NUMERIC
            .into_iter()
            .map(StatColumn::detail_metric)
            .collect();
        assert_eq!(metrics.len(), 11);
        assert_eq!(metrics[0], ("Sessions".to_string(), "monitoring"));
        assert_eq!(metrics[5], ("Packet/m".to_string(), "deltaPackets"));
        assert_eq!(metrics[10], ("ES Drops/m".to_string(), "deltaESDropped"));
    }

    #[test]
    fn test_sort_key_lookup() {
        assert_eq!(StatColumn::from_sort_key("cpu"), Some(StatColumn::Cpu));
        assert_eq!(StatColumn::from_sort_key("bogus"), None);
    }

    proptest! {
        #[test]
        fn prop_totals_match_latest_page(values in proptest::collection::vec(0.0f64..1e6, 0..40)) {
            let rows: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| stat(&format!("n{i}"), *v, *v / 2.0))
                .collect();
            let totals = ColumnTotals::compute(&rows);
            let sessions = TotalColumn::Table(StatColumn::Sessions);
            let expected: f64 = values.iter().sum();
            prop_assert!((totals.total(sessions) - expected).abs() < 1e-6);
            if !values.is_empty() {
                let mean = expected / values.len() as f64;
                prop_assert!((totals.average(sessions) - mean).abs() < 1e-6);
            }
        }
    }
}
