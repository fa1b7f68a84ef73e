use crate::ChartLayout;
use chrono::{DateTime, Duration, Utc};
use cpumon_core::{MonitorState, RunState, Series, SeriesHistory, UtilizationSample};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Rasterise `samples` onto the layout's time axis, one character per column.
///
/// `now` sits at the right edge. Columns without a sample stay blank, so
/// skipped ticks show up as gaps.
pub fn sparkline(
    layout: &ChartLayout,
    samples: &[UtilizationSample],
    now: DateTime<Utc>,
    window: Duration,
) -> String {
    let columns = layout.text_columns();
    let area = layout.plot_boundaries();
    let mut cells = vec![' '; columns];

    for (x, y) in layout.project(samples, now, window) {
        let col = ((x - area.left) / area.width() * (columns - 1) as f32).round() as usize;
        let level = ((area.bottom - y) / area.height() * (BARS.len() - 1) as f32).round() as usize;
        cells[col.min(columns - 1)] = BARS[level.min(BARS.len() - 1)];
    }
    cells.into_iter().collect()
}

/// Text frame: a status header, the aggregate line, then each exposed core
/// when `per_core` is set.
///
/// The time axis ends at the newest sample of any series, so a paused monitor
/// keeps a still picture.
pub fn render_frame(state: &MonitorState, per_core: bool, layout: &ChartLayout) -> String {
    let mut out = header(state);
    let now = state
        .series
        .iter()
        .filter_map(|h| h.latest().map(|s| s.timestamp))
        .max();

    let rows = state
        .series
        .iter()
        .filter(|h| per_core || h.series == Series::Aggregate);
    for history in rows {
        out.push('\n');
        out.push_str(&row(history, layout, now, state.window));
    }
    out
}

fn header(state: &MonitorState) -> String {
    let status = match state.run_state {
        RunState::Running => "running",
        RunState::Paused => "paused",
        RunState::Stopped => "stopped",
    };
    let mode = state.mode.map_or_else(|| "-".to_string(), |m| m.to_string());
    let mut line = format!(
        "[{status}] source: {mode} | cores: {} | window: {}s",
        state.core_count,
        state.window.num_seconds()
    );
    if state.dropped_ticks > 0 {
        line.push_str(&format!(" | dropped: {}", state.dropped_ticks));
    }
    if state.slow_reads > 0 {
        line.push_str(&format!(" | slow reads: {}", state.slow_reads));
    }
    line
}

fn row(
    history: &SeriesHistory,
    layout: &ChartLayout,
    now: Option<DateTime<Utc>>,
    window: Duration,
) -> String {
    let latest = history
        .latest()
        .map_or_else(|| "   --".to_string(), |s| format!("{:5.1}%", s.percentage));
    let chart = now.map_or_else(String::new, |now| {
        sparkline(layout, &history.samples, now, window)
    });
    format!("{:<8}{latest:>7}  {chart}", history.series.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cpumon_config::MonitorConfig;
    use cpumon_core::SourceMode;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn history(series: Series, pcts: &[f64]) -> SeriesHistory {
        SeriesHistory {
            series,
            samples: pcts
                .iter()
                .enumerate()
                .map(|(i, p)| UtilizationSample::new(at(i as i64), *p))
                .collect(),
        }
    }

    fn layout() -> ChartLayout {
        ChartLayout::from_config(&MonitorConfig::default())
    }

    fn state() -> MonitorState {
        MonitorState {
            run_state:     RunState::Running,
            mode:          Some(SourceMode::Preferred),
            window:        Duration::seconds(60),
            core_count:    2,
            dropped_ticks: 0,
            slow_reads:    0,
            series:        vec![
                history(Series::Aggregate, &[0.0, 50.0, 100.0]),
                history(Series::Core(0), &[]),
                history(Series::Core(1), &[12.5]),
            ],
        }
    }

    #[test]
    fn sparkline_spans_the_plot_width() {
        let h = history(Series::Aggregate, &[0.0, 50.0, 100.0]);
        let line = sparkline(&layout(), &h.samples, at(2), Duration::seconds(60));

        assert_eq!(line.chars().count(), 69);
        assert!(line.ends_with("▁▅█"), "{line:?}");
        assert_eq!(line.trim_start(), "▁▅█");
    }

    #[test]
    fn missing_samples_leave_gaps() {
        let samples = [
            UtilizationSample::new(at(0), 100.0),
            UtilizationSample::new(at(30), 100.0),
        ];
        let line: Vec<char> = sparkline(&layout(), &samples, at(30), Duration::seconds(60))
            .chars()
            .collect();

        assert_eq!(line[68], '█');
        assert_eq!(line[34], '█');
        assert!(line[35..68].iter().all(|c| *c == ' '));
        assert!(line[..34].iter().all(|c| *c == ' '));
    }

    #[test]
    fn aggregate_only_frame() {
        let frame = render_frame(&state(), false, &layout());
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "[running] source: preferred | cores: 2 | window: 60s");
        assert!(lines[1].starts_with("CPU"));
        assert!(lines[1].contains("100.0%"));
        assert!(lines[1].ends_with('█'));
    }

    #[test]
    fn per_core_frame_marks_empty_series() {
        let frame = render_frame(&state(), true, &layout());
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("Core 0"));
        assert!(lines[2].contains("--"));
        assert!(lines[3].contains("12.5%"));
    }

    #[test]
    fn header_reports_dropped_ticks_and_slow_reads() {
        let mut s = state();
        s.dropped_ticks = 3;
        let frame = render_frame(&s, false, &layout());
        assert!(frame.lines().next().unwrap().ends_with("dropped: 3"));

        s.slow_reads = 2;
        let frame = render_frame(&s, false, &layout());
        assert!(frame.lines().next().unwrap().ends_with("dropped: 3 | slow reads: 2"));
    }

    #[test]
    fn empty_state_has_no_chart() {
        let frame = render_frame(&MonitorState::default(), true, &layout());
        assert_eq!(frame, "[stopped] source: - | cores: 0 | window: 0s");
    }
}
