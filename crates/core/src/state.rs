use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Cumulative CPU time counters for one series.
///
/// Both values only ever grow while the machine is up; units are whatever the
/// producing source counts in (kernel ticks, microseconds) and only matter
/// relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuCounters {
    pub busy:  u64,
    pub total: u64,
}

impl CpuCounters {
    pub const fn new(busy: u64, total: u64) -> Self {
        Self { busy, total }
    }
}

/// One-instant capture of cumulative counters for the aggregate and every core.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSnapshot {
    pub taken_at:  DateTime<Utc>,
    /// `None` when the source could not read the aggregate line.
    pub aggregate: Option<CpuCounters>,
    /// Indexed by core. `None` means the source could not read that core.
    pub cores:     Vec<Option<CpuCounters>>,
}

impl CounterSnapshot {
    pub fn new(
        taken_at: DateTime<Utc>,
        aggregate: Option<CpuCounters>,
        cores: Vec<Option<CpuCounters>>,
    ) -> Self {
        Self { taken_at, aggregate, cores }
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Counters for `series`, or `None` if it failed or does not exist.
    pub fn counters(&self, series: Series) -> Option<CpuCounters> {
        match series {
            Series::Aggregate => self.aggregate,
            Series::Core(i) => self.cores.get(i).copied().flatten(),
        }
    }

    /// Indices of cores the source failed to read for this snapshot.
    pub fn failed_cores(&self) -> impl Iterator<Item = usize> + '_ {
        self.cores
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.is_none().then_some(i))
    }

    /// Fill failed series with the counters from `prev` so the next delta for
    /// a recovering series is taken against its last good reading.
    #[must_use]
    pub fn carry_forward(mut self, prev: &CounterSnapshot) -> Self {
        self.aggregate = self.aggregate.or(prev.aggregate);
        for (i, slot) in self.cores.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = prev.cores.get(i).copied().flatten();
            }
        }
        self
    }
}

/// A (timestamp, percentage) point; percentage is always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilizationSample {
    pub timestamp:  DateTime<Utc>,
    pub percentage: f64,
}

impl UtilizationSample {
    pub fn new(timestamp: DateTime<Utc>, percentage: f64) -> Self {
        let percentage = if percentage.is_nan() { 0.0 } else { percentage.clamp(0.0, 100.0) };
        Self { timestamp, percentage }
    }
}

/// One tracked utilization stream.
///
/// Ordering puts the aggregate first, then cores by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Series {
    Aggregate,
    Core(usize),
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Series::Aggregate => f.write_str("CPU"),
            Series::Core(i) => write!(f, "Core {i}"),
        }
    }
}

/// Which counter mechanism is feeding the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// System-introspection library.
    Preferred,
    /// Kernel pseudo-file parser.
    Fallback,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Preferred => f.write_str("preferred"),
            SourceMode::Fallback => f.write_str("fallback"),
        }
    }
}

/// Engine lifecycle: `Stopped -> Running <-> Paused -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// History of a single series as exposed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesHistory {
    pub series:  Series,
    /// Oldest first.
    pub samples: Vec<UtilizationSample>,
}

impl SeriesHistory {
    pub fn latest(&self) -> Option<&UtilizationSample> {
        self.samples.last()
    }
}

/// Read-only view of everything the engine tracks, taken between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorState {
    pub run_state:     RunState,
    /// `None` until the engine has started.
    pub mode:          Option<SourceMode>,
    pub window:        Duration,
    /// Cores detected at start. Exposed series may be fewer (see `max_cores`).
    pub core_count:    usize,
    /// Ticks lost to a total source failure.
    pub dropped_ticks: u64,
    /// Reads that took longer than the sampling interval.
    pub slow_reads:    u64,
    /// Aggregate first, then the exposed cores in index order.
    pub series:        Vec<SeriesHistory>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            run_state:     RunState::Stopped,
            mode:          None,
            window:        Duration::zero(),
            core_count:    0,
            dropped_ticks: 0,
            slow_reads:    0,
            series:        Vec::new(),
        }
    }
}

impl MonitorState {
    pub fn aggregate(&self) -> Option<&SeriesHistory> {
        self.series.iter().find(|h| h.series == Series::Aggregate)
    }

    pub fn cores(&self) -> impl Iterator<Item = &SeriesHistory> {
        self.series.iter().filter(|h| matches!(h.series, Series::Core(_)))
    }

    pub fn get(&self, series: Series) -> Option<&SeriesHistory> {
        self.series.iter().find(|h| h.series == series)
    }
}
