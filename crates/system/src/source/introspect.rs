use super::{CoreCount, CounterSource};
use chrono::Utc;
use cpumon_core::{CounterSnapshot, CpuCounters, MonitorError, Result, SourceMode};
use std::time::{Duration, Instant};
use sysinfo::{CpuRefreshKind, RefreshKind, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{trace, warn};

const NAME: &str = "sysinfo";

/// Counters derived from `sysinfo`.
///
/// `sysinfo` reports the utilization since its previous refresh rather than raw
/// counters, so this source keeps its own monotonic counters: every refresh
/// adds `elapsed_us` to `total` and `usage% * elapsed_us` to `busy`.
/// Differencing two of its snapshots yields exactly the usage `sysinfo`
/// measured in between.
///
/// `sysinfo` keeps the old usage when refreshed again within
/// [`MINIMUM_CPU_UPDATE_INTERVAL`]. A read inside that span returns the
/// previous snapshot unchanged, timestamp included, so no new sample is derived
/// from it.
#[derive(Debug)]
pub struct SysinfoSource {
    sys:          System,
    last_refresh: Instant,
    aggregate:    CpuCounters,
    cores:        Vec<CpuCounters>,
    core_count:   CoreCount,
    latest:       Option<CounterSnapshot>,
}

impl SysinfoSource {
    /// Check that `sysinfo` supports this platform and can see at least one CPU.
    pub fn probe() -> Result<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(MonitorError::SourceUnavailable(
                "sysinfo does not support this platform".into(),
            ));
        }

        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        if sys.cpus().is_empty() {
            return Err(MonitorError::SourceUnavailable("sysinfo reported no CPUs".into()));
        }
        let cores = vec![CpuCounters::default(); sys.cpus().len()];

        Ok(Self {
            sys,
            last_refresh: Instant::now(),
            aggregate:    CpuCounters::default(),
            cores,
            core_count:   CoreCount::default(),
            latest:       None,
        })
    }

    /// Refresh `sysinfo` and fold the measured usage into the counters.
    fn refresh(&mut self) -> Result<(Option<CpuCounters>, Vec<Option<CpuCounters>>)> {
        self.sys.refresh_cpu_usage();
        let now = Instant::now();
        let elapsed_us = u64::try_from(now.duration_since(self.last_refresh).as_micros())
            .unwrap_or(u64::MAX)
            .max(1);
        self.last_refresh = now;

        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return Err(MonitorError::SourceUnavailable("sysinfo reported no CPUs".into()));
        }

        let aggregate = if accumulate(&mut self.aggregate, self.sys.global_cpu_usage(), elapsed_us)
        {
            Some(self.aggregate)
        } else {
            warn!("sysinfo returned a non-finite global usage");
            None
        };

        if self.cores.len() < cpus.len() {
            self.cores.resize(cpus.len(), CpuCounters::default());
        }
        let cores = cpus
            .iter()
            .zip(self.cores.iter_mut())
            .enumerate()
            .map(|(i, (cpu, counters))| {
                if accumulate(counters, cpu.cpu_usage(), elapsed_us) {
                    Some(*counters)
                } else {
                    warn!(core = i, "sysinfo returned a non-finite core usage");
                    None
                }
            })
            .collect();

        Ok((aggregate, cores))
    }
}

impl CounterSource for SysinfoSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Preferred
    }

    fn read(&mut self) -> Result<CounterSnapshot> {
        if let Some(latest) = &self.latest {
            if !refresh_due(self.last_refresh.elapsed()) {
                trace!("sysinfo refreshed too recently; repeating last snapshot");
                return Ok(latest.clone());
            }
        }

        let (aggregate, cores) = if self.latest.is_some() {
            self.refresh()?
        } else {
            // Baseline: the counters as of the refresh done by `probe`.
            (Some(self.aggregate), self.cores.iter().copied().map(Some).collect())
        };

        let cores = self.core_count.fit(cores, NAME);
        let snapshot = CounterSnapshot::new(Utc::now(), aggregate, cores);
        self.latest = Some(snapshot.clone());
        Ok(snapshot)
    }
}

/// Whether `sysinfo` will measure new usage after `since_last` has passed.
fn refresh_due(since_last: Duration) -> bool {
    since_last >= MINIMUM_CPU_UPDATE_INTERVAL
}

/// Advance `counters` by one refresh worth of time at `usage` percent.
/// Returns `false` (leaving `counters` untouched) for a non-finite usage.
fn accumulate(counters: &mut CpuCounters, usage: f32, elapsed_us: u64) -> bool {
    if !usage.is_finite() {
        return false;
    }
    let fraction = f64::from(usage.clamp(0.0, 100.0)) / 100.0;
    let busy = (fraction * elapsed_us as f64).round() as u64;

    counters.busy = counters.busy.saturating_add(busy.min(elapsed_us));
    counters.total = counters.total.saturating_add(elapsed_us);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::utilization;

    #[test]
    fn accumulated_counters_reproduce_usage() {
        let mut c = CpuCounters::default();
        assert!(accumulate(&mut c, 10.0, 1_000));
        let prev = c;
        assert!(accumulate(&mut c, 37.5, 400_000));

        assert_eq!(c.total - prev.total, 400_000);
        assert!((utilization(prev, c) - 37.5).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_usage_is_clamped() {
        let mut c = CpuCounters::default();
        assert!(accumulate(&mut c, 250.0, 1_000));
        assert_eq!(c, CpuCounters::new(1_000, 1_000));
    }

    #[test]
    fn nan_usage_leaves_counters_alone() {
        let mut c = CpuCounters::new(5, 10);
        assert!(!accumulate(&mut c, f32::NAN, 1_000));
        assert_eq!(c, CpuCounters::new(5, 10));
    }

    #[test]
    fn refresh_waits_for_sysinfo_minimum() {
        assert!(!refresh_due(Duration::from_millis(120)));
        assert!(!refresh_due(MINIMUM_CPU_UPDATE_INTERVAL - Duration::from_millis(1)));
        assert!(refresh_due(MINIMUM_CPU_UPDATE_INTERVAL));
    }

    #[test]
    fn fast_reads_repeat_the_last_snapshot() {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }
        let mut source = SysinfoSource::probe().unwrap();
        let baseline = source.read().unwrap();

        // Well inside sysinfo's minimum: nothing new was measured.
        let again = source.read().unwrap();
        assert_eq!(again, baseline);

        std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL + Duration::from_millis(50));
        let fresh = source.read().unwrap();
        assert!(fresh.taken_at > baseline.taken_at);
        let (prev, curr) = (baseline.aggregate.unwrap(), fresh.aggregate.unwrap());
        assert!(curr.total - prev.total >= MINIMUM_CPU_UPDATE_INTERVAL.as_micros() as u64);
        assert!((0.0..=100.0).contains(&utilization(prev, curr)));

        // Immediately after a real refresh the next read is stale again.
        assert_eq!(source.read().unwrap(), fresh);
    }
}
