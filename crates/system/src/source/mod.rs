//! Raw counter acquisition.
//!
//! Two implementations of [`CounterSource`] exist: the `sysinfo` library
//! (preferred, every platform it supports) and a `/proc/stat` parser (Linux
//! only). [`detect_source`] picks one at startup; nothing switches afterwards.

mod introspect;
pub mod proc_stat;

pub use introspect::SysinfoSource;
pub use proc_stat::ProcStatSource;

use cpumon_config::SourcePreference;
use cpumon_core::{CounterSnapshot, CpuCounters, MonitorError, Result, SourceMode};
use std::fmt;
use tracing::{info, warn};

/// Anything that can produce cumulative CPU counters on demand.
pub trait CounterSource: Send + fmt::Debug {
    /// Short mechanism name used in log lines and error messages.
    fn name(&self) -> &'static str;

    fn mode(&self) -> SourceMode;

    /// Take one snapshot.
    ///
    /// Fails with [`MonitorError::SourceUnavailable`] when no counters could be
    /// obtained at all and [`MonitorError::SourceParse`] when nothing in the
    /// data could be parsed. A single bad series is reported as `None` in the
    /// snapshot instead.
    ///
    /// A source with nothing new to report returns its previous snapshot,
    /// `taken_at` unchanged.
    fn read(&mut self) -> Result<CounterSnapshot>;
}

/// Probe the available mechanisms once and return the one to use.
pub fn detect_source(preference: SourcePreference) -> Result<Box<dyn CounterSource>> {
    let source = choose_source(
        preference,
        cfg!(target_os = "linux"),
        || SysinfoSource::probe().map(|s| Box::new(s) as Box<dyn CounterSource>),
        || ProcStatSource::probe().map(|s| Box::new(s) as Box<dyn CounterSource>),
    )?;

    info!(source = source.name(), mode = %source.mode(), "CPU counter source selected");
    Ok(source)
}

/// Selection policy behind [`detect_source`].
///
/// `/proc/stat` is only ever tried when `is_linux`. Under
/// [`SourcePreference::Auto`] a failed preferred probe falls back to it on
/// Linux and is fatal anywhere else.
fn choose_source<P, F>(
    preference: SourcePreference,
    is_linux: bool,
    preferred: P,
    fallback: F,
) -> Result<Box<dyn CounterSource>>
where
    P: FnOnce() -> Result<Box<dyn CounterSource>>,
    F: FnOnce() -> Result<Box<dyn CounterSource>>,
{
    let linux_fallback = || {
        if !is_linux {
            return Err(MonitorError::SourceUnavailable(format!(
                "{} is only available on Linux",
                proc_stat::PROC_STAT_PATH
            )));
        }
        fallback()
    };

    match preference {
        SourcePreference::Sysinfo => preferred(),
        SourcePreference::ProcStat => linux_fallback(),
        SourcePreference::Auto => match preferred() {
            Ok(source) => Ok(source),
            Err(e) if is_linux => {
                warn!("{e}; falling back to {}", proc_stat::PROC_STAT_PATH);
                linux_fallback().map_err(|fallback_err| {
                    MonitorError::SourceUnavailable(format!("sysinfo: {e}; {fallback_err}"))
                })
            }
            Err(e) => Err(e),
        },
    }
}

/// Core count fixed on the first successful read.
///
/// Later reads are trimmed or padded to that count: extra cores are ignored
/// and missing ones show up as failed series.
#[derive(Debug, Default)]
pub(crate) struct CoreCount(Option<usize>);

impl CoreCount {
    pub(crate) fn get(&self) -> Option<usize> {
        self.0
    }

    pub(crate) fn fit(
        &mut self,
        mut cores: Vec<Option<CpuCounters>>,
        source: &str,
    ) -> Vec<Option<CpuCounters>> {
        let expected = *self.0.get_or_insert_with(|| {
            info!(source, cores = cores.len(), "core count fixed");
            cores.len()
        });

        if cores.len() > expected {
            tracing::debug!(
                source,
                detected = cores.len(),
                expected,
                "ignoring cores that appeared after startup"
            );
            cores.truncate(expected);
        } else if cores.len() < expected {
            warn!(
                source,
                detected = cores.len(),
                expected,
                "cores missing from this read"
            );
            cores.resize(expected, None);
        }
        cores
    }
}
