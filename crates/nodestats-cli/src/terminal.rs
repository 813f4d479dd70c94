//! Terminal chart renderer.
//!
//! Every mounted chart is a [`PollingChart`]; the renderer keeps the read
//! side of each so the watch loop can draw sparklines of whatever is live.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use nodestats_core::{ChartHandle, ChartSpec, ChartView, ContainerId, PollingChart, Renderer};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// [`Renderer`] backed by [`PollingChart`]s.
#[derive(Clone, Default)]
pub struct TerminalRenderer {
    views: Arc<Mutex<BTreeMap<ContainerId, ChartView>>>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read sides of every mounted chart, by container.
    pub fn views(&self) -> Vec<(ContainerId, ChartView)> {
        self.views
            .lock()
            .iter()
            .map(|(id, view)| (id.clone(), view.clone()))
            .collect()
    }
}

impl Renderer for TerminalRenderer {
    fn mount(&self, spec: ChartSpec) -> Box<dyn ChartHandle> {
        let chart = PollingChart::spawn(spec);
        tracing::debug!(container = %chart.container(), "Mounted chart");
        self.views.lock().insert(chart.container().clone(), chart.view());
        Box::new(chart)
    }

    fn unmount(&self, container: &ContainerId) {
        self.views.lock().remove(container);
    }
}

/// Render the trailing `width` values as a sparkline scaled to their own range.
pub fn sparkline(values: &[f64], width: usize) -> String {
    let tail = &values[values.len().saturating_sub(width)..];
    let finite = tail.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    tail.iter()
        .map(|v| {
            if !v.is_finite() {
                ' '
            } else if max <= min {
                BARS[0]
            } else {
                let scaled = (v - min) / (max - min) * (BARS.len() - 1) as f64;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let index = scaled.round() as usize;
                BARS[index.min(BARS.len() - 1)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_scales_to_range() {
        assert_eq!(sparkline(&[0.0, 7.0], 10), "▁█");
        assert_eq!(sparkline(&[3.0, 3.0, 3.0], 10), "▁▁▁");
        assert_eq!(sparkline(&[], 10), "");
    }

    #[test]
    fn test_sparkline_keeps_trailing_window() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let line = sparkline(&values, 8);
        assert_eq!(line.chars().count(), 8);
        assert!(line.ends_with('█'));
    }

    #[test]
    fn test_sparkline_blanks_missing_samples() {
        assert_eq!(sparkline(&[1.0, f64::NAN, 2.0], 10), "▁ █");
    }

    #[tokio::test]
    async fn test_unmount_forgets_view() {
        let renderer = TerminalRenderer::new();
        let mut handle = renderer.mount(ChartSpec {
            container: ContainerId::aggregate(),
            step_seconds: 5,
            size: 10,
            sources: Vec::new(),
        });
        assert_eq!(renderer.views().len(), 1);
        assert!(handle.is_running());
        handle.stop();
        renderer.unmount(&ContainerId::aggregate());
        assert!(renderer.views().is_empty());
        handle.destroy();
    }
}
