//! Counter sources for engine and task tests.

use crate::source::CounterSource;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cpumon_core::{CounterSnapshot, CpuCounters, MonitorError, Result, SourceMode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Replays a fixed list of reads, then reports itself unavailable.
#[derive(Debug)]
pub(crate) struct ScriptedSource {
    reads: VecDeque<Result<CounterSnapshot>>,
    mode:  SourceMode,
}

impl ScriptedSource {
    pub(crate) fn new(reads: impl IntoIterator<Item = Result<CounterSnapshot>>) -> Self {
        Self {
            reads: reads.into_iter().collect(),
            mode:  SourceMode::Fallback,
        }
    }

    pub(crate) fn with_mode(mut self, mode: SourceMode) -> Self {
        self.mode = mode;
        self
    }
}

impl CounterSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn mode(&self) -> SourceMode {
        self.mode
    }

    fn read(&mut self) -> Result<CounterSnapshot> {
        self.reads
            .pop_front()
            .unwrap_or_else(|| Err(MonitorError::SourceUnavailable("script exhausted".into())))
    }
}

/// Steadily 25% busy source whose reads block for a scripted time.
///
/// Records when every read started.
#[derive(Debug)]
pub(crate) struct SlowSource {
    delays:  VecDeque<std::time::Duration>,
    started: Arc<Mutex<Vec<Instant>>>,
    reads:   u64,
}

impl SlowSource {
    /// Read `n` blocks for `delays[n]`; reads past the list return at once.
    pub(crate) fn new(
        delays: impl IntoIterator<Item = std::time::Duration>,
    ) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let started = Arc::new(Mutex::new(Vec::new()));
        let source = Self {
            delays:  delays.into_iter().collect(),
            started: Arc::clone(&started),
            reads:   0,
        };
        (source, started)
    }
}

impl CounterSource for SlowSource {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Fallback
    }

    fn read(&mut self) -> Result<CounterSnapshot> {
        self.started.lock().unwrap().push(Instant::now());
        if let Some(delay) = self.delays.pop_front() {
            std::thread::sleep(delay);
        }
        self.reads += 1;
        let n = self.reads;
        Ok(CounterSnapshot::new(Utc::now(), Some(CpuCounters::new(n * 25, n * 100)), vec![]))
    }
}

pub(crate) fn at_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + Duration::milliseconds(ms)
}

/// Snapshot at `ms` with `(busy, total)` for the aggregate and each core.
pub(crate) fn snap(ms: i64, aggregate: (u64, u64), cores: &[Option<(u64, u64)>]) -> CounterSnapshot {
    CounterSnapshot::new(
        at_ms(ms),
        Some(CpuCounters::new(aggregate.0, aggregate.1)),
        cores
            .iter()
            .map(|c| c.map(|(busy, total)| CpuCounters::new(busy, total)))
            .collect(),
    )
}
