//! Linux `/proc/stat` fallback.
//!
//! The parser is a pure function over the file contents so it can be tested
//! with string input; [`ProcStatSource`] adds the file read and the fixed core
//! count on top.

use super::{CoreCount, CounterSource};
use chrono::Utc;
use cpumon_core::{CounterSnapshot, CpuCounters, MonitorError, Result, Series, SourceMode};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PROC_STAT_PATH: &str = "/proc/stat";

const NAME: &str = "/proc/stat";
/// user, nice, system, idle are always present.
const MIN_FIELDS: usize = 4;
/// user nice system idle iowait irq softirq steal; guest columns are ignored.
const COUNTED_FIELDS: usize = 8;
const IDLE: usize = 3;
const IOWAIT: usize = 4;

/// Error for a single malformed `cpu` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// The `cpu` lines of `/proc/stat`.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuStat {
    pub aggregate: Result<CpuCounters, ParseError>,
    /// Keyed by core index; a bad line is kept as its error.
    pub cores:     BTreeMap<usize, Result<CpuCounters, ParseError>>,
}

impl CpuStat {
    /// Number of cores implied by the highest index seen.
    pub fn detected_cores(&self) -> usize {
        self.cores.keys().next_back().map_or(0, |i| i + 1)
    }
}

/// Parse `/proc/stat` content.
///
/// A bad or missing line only fails its own series. The whole parse fails
/// when no `cpu` line at all could be read.
pub fn parse_cpu_stat(content: &str) -> Result<CpuStat, ParseError> {
    let mut aggregate = None;
    let mut cores = BTreeMap::new();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };
        let Some(suffix) = label.strip_prefix("cpu") else { continue };
        let values: Vec<&str> = fields.collect();

        if suffix.is_empty() {
            aggregate = Some(parse_counters(&values));
        } else if let Ok(index) = suffix.parse::<usize>() {
            cores.insert(index, parse_counters(&values));
        }
    }

    let aggregate =
        aggregate.unwrap_or_else(|| Err(ParseError::new("missing aggregate cpu line")));
    if let Err(e) = &aggregate {
        if cores.values().all(Result::is_err) {
            return Err(ParseError::new(format!(
                "no readable cpu line (aggregate: {})",
                e.message
            )));
        }
    }
    Ok(CpuStat { aggregate, cores })
}

/// Busy = everything but idle and iowait; total = all counted fields.
fn parse_counters(values: &[&str]) -> Result<CpuCounters, ParseError> {
    if values.len() < MIN_FIELDS {
        return Err(ParseError::new(format!(
            "expected at least {MIN_FIELDS} fields, got {}",
            values.len()
        )));
    }

    let mut busy = 0u64;
    let mut total = 0u64;
    for (idx, raw) in values.iter().take(COUNTED_FIELDS).enumerate() {
        let value: u64 = raw
            .parse()
            .map_err(|_| ParseError::new(format!("invalid counter '{raw}'")))?;
        total = total.saturating_add(value);
        if idx != IDLE && idx != IOWAIT {
            busy = busy.saturating_add(value);
        }
    }
    Ok(CpuCounters::new(busy, total))
}

/// Counter source backed by the kernel's `/proc/stat`.
#[derive(Debug)]
pub struct ProcStatSource {
    path:       PathBuf,
    core_count: CoreCount,
    /// Series currently failing whose first failure was already logged.
    reported:   BTreeSet<Series>,
}

impl ProcStatSource {
    /// Make sure `/proc/stat` is readable and parseable before committing to it.
    pub fn probe() -> Result<Self> {
        Self::probe_path(PROC_STAT_PATH)
    }

    pub fn probe_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut source = Self {
            path:       path.as_ref().to_path_buf(),
            core_count: CoreCount::default(),
            reported:   BTreeSet::new(),
        };
        let content = source.read_content()?;
        let stat = parse_cpu_stat(&content).map_err(|e| {
            MonitorError::SourceUnavailable(format!("{}: {e}", source.path.display()))
        })?;
        // Fix the core count from the probe so the first real read is checked.
        source.core_count.fit(vec![None; stat.detected_cores()], NAME);
        Ok(source)
    }

    fn read_content(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            MonitorError::SourceUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })
    }

    /// Counters for `series`. A failure is logged at warn level the first time
    /// and at debug level while it keeps failing, as offline CPUs do.
    fn check(
        &mut self,
        series: Series,
        parsed: Option<&Result<CpuCounters, ParseError>>,
    ) -> Option<CpuCounters> {
        let reason = match parsed {
            Some(Ok(counters)) => {
                self.reported.remove(&series);
                return Some(*counters);
            }
            Some(Err(e)) => e.to_string(),
            None => "line missing".to_string(),
        };
        if self.reported.insert(series) {
            warn!(%series, "{}: {reason}", self.path.display());
        } else {
            debug!(%series, "{}: {reason}", self.path.display());
        }
        None
    }
}

impl CounterSource for ProcStatSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Fallback
    }

    fn read(&mut self) -> Result<CounterSnapshot> {
        let content = self.read_content()?;
        let taken_at = Utc::now();
        let stat = parse_cpu_stat(&content)
            .map_err(|e| MonitorError::SourceParse(format!("{}: {e}", self.path.display())))?;

        let aggregate = self.check(Series::Aggregate, Some(&stat.aggregate));
        let expected = self.core_count.get().unwrap_or_else(|| stat.detected_cores());
        let cores = (0..expected)
            .map(|i| self.check(Series::Core(i), stat.cores.get(&i)))
            .collect();

        let cores = self.core_count.fit(cores, NAME);
        Ok(CounterSnapshot::new(taken_at, aggregate, cores))
    }
}
