//! Turns two counter snapshots into utilization percentages.
//!
//! Pure functions only: the caller owns the previous snapshot.

use cpumon_core::{CounterSnapshot, CpuCounters, Series, UtilizationSample};
use std::collections::BTreeMap;

/// Samples produced by one tick, keyed by series. A series without an entry
/// was unreadable in either snapshot and must be skipped for that tick.
pub type SampleSet = BTreeMap<Series, UtilizationSample>;

/// Percentage of `total` time spent busy between two readings.
///
/// A zero or negative total delta (counter reset, two reads within one kernel
/// tick) yields exactly `0.0`.
pub fn utilization(prev: CpuCounters, curr: CpuCounters) -> f64 {
    let busy_delta = i128::from(curr.busy) - i128::from(prev.busy);
    let total_delta = i128::from(curr.total) - i128::from(prev.total);
    if total_delta <= 0 {
        return 0.0;
    }
    (100.0 * busy_delta as f64 / total_delta as f64).clamp(0.0, 100.0)
}

/// Compute every series present in both snapshots, stamped with `curr`'s time.
///
/// Returns `None` when there is no previous snapshot yet: a single reading
/// carries no utilization, and no placeholder value is invented for it.
pub fn compute(prev: Option<&CounterSnapshot>, curr: &CounterSnapshot) -> Option<SampleSet> {
    let prev = prev?;

    let series = std::iter::once(Series::Aggregate).chain((0..curr.core_count()).map(Series::Core));
    let samples = series
        .filter_map(|s| {
            let (p, c) = (prev.counters(s)?, curr.counters(s)?);
            Some((s, UtilizationSample::new(curr.taken_at, utilization(p, c))))
        })
        .collect();

    Some(samples)
}
