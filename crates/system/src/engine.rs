use crate::history::HistoryBuffer;
use crate::sampler;
use crate::source::CounterSource;
use cpumon_config::{validate_interval, validate_window, window_from_secs, MonitorConfig};
use cpumon_core::{
    CounterSnapshot, MonitorError, MonitorState, Result, RunState, Series, SeriesHistory,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a single [`MonitorEngine::tick`] did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Engine not started; nothing read.
    Stopped,
    /// Tick consumed without reading or appending.
    Paused,
    /// The source had no reading newer than the previous one; nothing appended.
    Deferred,
    /// No earlier snapshot existed; this reading only became the baseline.
    Primed,
    /// Samples appended. `skipped` lists series that got no sample this tick.
    Sampled { appended: usize, skipped: Vec<Series> },
    /// The whole tick was lost; the previous snapshot is kept for the next one.
    Dropped(MonitorError),
}

/// Owns the counter source, the previous snapshot and every series' history.
///
/// All mutation happens through `&mut self` from one tick handler; readers get
/// an owned [`MonitorState`] from [`snapshot_state`](Self::snapshot_state)
/// and therefore never observe a half-applied tick.
#[derive(Debug)]
pub struct MonitorEngine {
    source:        Box<dyn CounterSource>,
    run_state:     RunState,
    interval:      Duration,
    window:        chrono::Duration,
    previous:      Option<CounterSnapshot>,
    aggregate:     HistoryBuffer,
    cores:         Vec<HistoryBuffer>,
    /// Cores exposed to readers (0 = all). Tracking is unaffected.
    max_cores:     usize,
    dropped_ticks: u64,
    slow_reads:    u64,
}

impl MonitorEngine {
    pub fn new(source: Box<dyn CounterSource>) -> Self {
        let defaults = MonitorConfig::default();
        Self {
            source,
            run_state:     RunState::Stopped,
            interval:      defaults.interval(),
            window:        defaults.window(),
            previous:      None,
            aggregate:     HistoryBuffer::new(defaults.window()),
            cores:         Vec::new(),
            max_cores:     0,
            dropped_ticks: 0,
            slow_reads:    0,
        }
    }

    /// Validate the sampling settings, take the baseline snapshot, and start.
    ///
    /// Fails without side effects on an out-of-range interval or window or
    /// when the source cannot produce a first snapshot.
    pub fn start(&mut self, config: &MonitorConfig) -> Result<()> {
        if self.run_state != RunState::Stopped {
            return Err(MonitorError::AlreadyRunning);
        }
        validate_interval(config.interval_ms)?;
        validate_window(config.window_s)?;

        let initial = self.source.read().map_err(|e| match e {
            MonitorError::SourceParse(msg) => {
                MonitorError::SourceUnavailable(format!("{}: {msg}", self.source.name()))
            }
            other => other,
        })?;
        let core_count = initial.core_count();

        self.interval = config.interval();
        self.window = config.window();
        self.max_cores = config.max_cores;
        self.aggregate = HistoryBuffer::new(self.window);
        self.cores = (0..core_count).map(|_| HistoryBuffer::new(self.window)).collect();
        self.previous = Some(initial);
        self.dropped_ticks = 0;
        self.slow_reads = 0;
        self.run_state = RunState::Running;

        info!(
            source = self.source.name(),
            mode = %self.source.mode(),
            cores = core_count,
            interval_ms = config.interval_ms,
            window_s = config.window_s,
            "monitor started"
        );
        Ok(())
    }

    /// Take one sample. Called by the timer at the configured interval.
    pub fn tick(&mut self) -> TickOutcome {
        match self.run_state {
            RunState::Stopped => return TickOutcome::Stopped,
            RunState::Paused => return TickOutcome::Paused,
            RunState::Running => {}
        }

        let started = Instant::now();
        let read = self.source.read();
        let elapsed = started.elapsed();
        if elapsed > self.interval {
            self.slow_reads += 1;
            warn!(
                source = self.source.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = self.interval.as_millis() as u64,
                "counter read took longer than the sampling interval"
            );
        }

        let snapshot = match read {
            Ok(s) => self.fit_cores(s),
            Err(e) => {
                self.dropped_ticks += 1;
                warn!(source = self.source.name(), "tick dropped: {e}");
                return TickOutcome::Dropped(e);
            }
        };
        if self.previous.as_ref().is_some_and(|p| snapshot.taken_at <= p.taken_at) {
            debug!(source = self.source.name(), "no newer reading; tick deferred");
            return TickOutcome::Deferred;
        }

        let Some(samples) = sampler::compute(self.previous.as_ref(), &snapshot) else {
            self.previous = Some(snapshot);
            return TickOutcome::Primed;
        };

        let mut appended = 0;
        let mut skipped = Vec::new();
        for series in self.tracked_series() {
            let buffer = match series {
                Series::Aggregate => &mut self.aggregate,
                Series::Core(i) => &mut self.cores[i],
            };
            match samples.get(&series) {
                Some(sample) if buffer.append(*sample) => appended += 1,
                _ => skipped.push(series),
            }
        }
        if !skipped.is_empty() {
            warn!(?skipped, "series skipped this tick");
        }
        debug!(appended, "tick sampled");

        self.previous = Some(match self.previous.take() {
            Some(prev) => snapshot.carry_forward(&prev),
            None => snapshot,
        });

        TickOutcome::Sampled { appended, skipped }
    }

    /// `Running -> Paused`. Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        if self.run_state != RunState::Running {
            return false;
        }
        self.run_state = RunState::Paused;
        info!("monitor paused");
        true
    }

    /// `Paused -> Running`. History and the previous snapshot are untouched,
    /// so the first tick after resuming covers the whole paused span.
    pub fn resume(&mut self) -> bool {
        if self.run_state != RunState::Paused {
            return false;
        }
        self.run_state = RunState::Running;
        info!("monitor resumed");
        true
    }

    /// Discard all state, including history.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Stopped {
            return;
        }
        self.run_state = RunState::Stopped;
        self.previous = None;
        self.aggregate = HistoryBuffer::new(self.window);
        self.cores.clear();
        self.dropped_ticks = 0;
        self.slow_reads = 0;
        info!("monitor stopped");
    }

    /// Remove every sample from every series. Sampling carries on.
    pub fn clear(&mut self) {
        self.aggregate.clear();
        self.cores.iter_mut().for_each(HistoryBuffer::clear);
        debug!("history cleared");
    }

    /// Change the history window. Shrinking evicts out-of-range samples now.
    pub fn resize(&mut self, window_s: u64) -> Result<()> {
        validate_window(window_s)?;
        self.window = window_from_secs(window_s);
        self.aggregate.resize(self.window);
        for buffer in &mut self.cores {
            buffer.resize(self.window);
        }
        info!(window_s, "history window changed");
        Ok(())
    }

    /// Change the expected tick cadence (used for slow-read detection).
    pub fn set_interval(&mut self, interval_ms: u64) -> Result<()> {
        validate_interval(interval_ms)?;
        self.interval = Duration::from_millis(interval_ms);
        info!(interval_ms, "sampling interval changed");
        Ok(())
    }

    /// Limit which cores [`snapshot_state`](Self::snapshot_state) exposes (0 = all).
    pub fn set_max_cores(&mut self, max_cores: usize) {
        self.max_cores = max_cores;
    }

    /// Consistent read-only copy of everything a renderer needs.
    pub fn snapshot_state(&self) -> MonitorState {
        let mut series = Vec::with_capacity(1 + self.exposed_cores());
        if self.run_state != RunState::Stopped {
            series.push(SeriesHistory {
                series:  Series::Aggregate,
                samples: self.aggregate.snapshot(),
            });
        }
        series.extend(
            self.cores
                .iter()
                .take(self.exposed_cores())
                .enumerate()
                .map(|(i, buffer)| SeriesHistory {
                    series:  Series::Core(i),
                    samples: buffer.snapshot(),
                }),
        );

        MonitorState {
            run_state: self.run_state,
            mode: (self.run_state != RunState::Stopped).then(|| self.source.mode()),
            window: self.window,
            core_count: self.cores.len(),
            dropped_ticks: self.dropped_ticks,
            slow_reads: self.slow_reads,
            series,
        }
    }

    /// Cadence the timer should tick at.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn exposed_cores(&self) -> usize {
        match self.max_cores {
            0 => self.cores.len(),
            n => n.min(self.cores.len()),
        }
    }

    fn tracked_series(&self) -> Vec<Series> {
        std::iter::once(Series::Aggregate)
            .chain((0..self.cores.len()).map(Series::Core))
            .collect()
    }

    /// Keep only the cores that existed at start; pad missing ones as failed.
    fn fit_cores(&self, mut snapshot: CounterSnapshot) -> CounterSnapshot {
        snapshot.cores.resize(self.cores.len(), None);
        snapshot
    }
}
