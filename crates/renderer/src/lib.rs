//! Turns a `MonitorState` into something a person can look at.
//!
//! [`ChartLayout::project`] maps samples onto canvas coordinates (newest at the
//! right edge, 100% at the top). [`render_frame`] rasterises those points into
//! a plain-text frame with one sparkline per series.

pub mod text;

pub use text::{render_frame, sparkline};

use chrono::{DateTime, Duration, Utc};
use cpumon_config::MonitorConfig;
use cpumon_core::UtilizationSample;

/// Plot pixels covered by one character column of text output.
const COLUMN_PX: f32 = 12.0;

/// Space reserved around the plot for axis labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub left:   u32,
    pub top:    u32,
    pub right:  u32,
    pub bottom: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self { left: 50, top: 20, right: 20, bottom: 30 }
    }
}

/// Plot area inside the canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub left:   f32,
    pub top:    f32,
    pub right:  f32,
    pub bottom: f32,
}

impl PlotArea {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Canvas geometry for the utilization chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartLayout {
    pub width:   u32,
    pub height:  u32,
    pub margins: Margins,
}

impl ChartLayout {
    /// Build a [`ChartLayout`] from the loaded configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            width:   config.width,
            height:  config.height,
            margins: Margins::default(),
        }
    }

    pub fn plot_boundaries(&self) -> PlotArea {
        let m = self.margins;
        PlotArea {
            left:   m.left as f32,
            top:    m.top as f32,
            right:  self.width.saturating_sub(m.right).max(m.left) as f32,
            bottom: self.height.saturating_sub(m.bottom).max(m.top) as f32,
        }
    }

    /// Character columns the plot area spans when drawn as text.
    pub fn text_columns(&self) -> usize {
        ((self.plot_boundaries().width() / COLUMN_PX).round() as usize).clamp(20, 200)
    }

    /// Canvas `(x, y)` for every sample inside `window` before `now`.
    ///
    /// Samples older than the window are left out rather than drawn off-canvas.
    pub fn project(
        &self,
        samples: &[UtilizationSample],
        now: DateTime<Utc>,
        window: Duration,
    ) -> Vec<(f32, f32)> {
        let area = self.plot_boundaries();
        let window_ms = window.num_milliseconds().max(1) as f32;

        samples
            .iter()
            .filter_map(|s| {
                let age_ms = (now - s.timestamp).num_milliseconds() as f32;
                if !(0.0..=window_ms).contains(&age_ms) {
                    return None;
                }
                let x = area.right - (age_ms / window_ms) * area.width();
                let y = area.bottom - (s.percentage as f32 / 100.0) * area.height();
                Some((x, y))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    #[test]
    fn layout_uses_configured_size() {
        let layout = ChartLayout::from_config(&MonitorConfig::default());
        assert_eq!((layout.width, layout.height), (900, 345));

        let area = layout.plot_boundaries();
        assert_eq!(area.width(), 830.0);
        assert_eq!(area.height(), 295.0);
    }

    #[test]
    fn text_columns_follow_plot_width() {
        assert_eq!(ChartLayout::from_config(&MonitorConfig::default()).text_columns(), 69);

        let narrow = MonitorConfig { width: 400, ..Default::default() };
        assert_eq!(ChartLayout::from_config(&narrow).text_columns(), 28);

        let wide = MonitorConfig { width: 10_000, ..Default::default() };
        assert_eq!(ChartLayout::from_config(&wide).text_columns(), 200);
    }

    #[test]
    fn newest_sample_sits_on_the_right_edge() {
        let layout = ChartLayout::from_config(&MonitorConfig::default());
        let area = layout.plot_boundaries();
        let samples = [
            UtilizationSample::new(at(0), 0.0),
            UtilizationSample::new(at(30), 50.0),
            UtilizationSample::new(at(60), 100.0),
        ];

        let points = layout.project(&samples, at(60), Duration::seconds(60));
        assert_eq!(points[0], (area.left, area.bottom));
        assert_eq!(points[1].0, area.left + area.width() / 2.0);
        assert_eq!(points[2], (area.right, area.top));
    }

    #[test]
    fn samples_outside_window_are_dropped() {
        let layout = ChartLayout::from_config(&MonitorConfig::default());
        let samples = [
            UtilizationSample::new(at(0), 10.0),
            UtilizationSample::new(at(50), 10.0),
        ];
        let points = layout.project(&samples, at(70), Duration::seconds(60));
        assert_eq!(points.len(), 1);
    }
}
