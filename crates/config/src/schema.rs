use cpumon_core::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Accepted sampling cadence in milliseconds.
pub const INTERVAL_MS_RANGE: RangeInclusive<u64> = 100..=10_000;
/// Accepted history window in seconds.
pub const WINDOW_S_RANGE: RangeInclusive<u64> = 10..=3_600;
pub const MIN_WIDTH: u32 = 400;
pub const MIN_HEIGHT: u32 = 200;
pub const MAX_CORES_LIMIT: usize = 64;

/// Root configuration structure parsed from `cpumon.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling cadence in milliseconds.
    pub interval_ms: u64,
    /// Retained history, in seconds.
    pub window_s: u64,
    /// Start with every core drawn instead of the aggregate only.
    pub per_core: bool,
    /// Cores exposed to the chart (0 = all).
    pub max_cores: usize,
    /// Chart width in pixels.
    pub width: u32,
    /// Chart height in pixels.
    pub height: u32,
    /// Counter source selection.
    pub source: SourcePreference,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            window_s:    60,
            per_core:    false,
            max_cores:   0,
            width:       900,
            height:      345,
            source:      SourcePreference::Auto,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn window(&self) -> chrono::Duration {
        window_from_secs(self.window_s)
    }

    /// Reject anything outside the supported ranges.
    ///
    /// Sampling limits are checked first so that an engine-fatal problem is
    /// the one reported.
    pub fn validate(&self) -> Result<()> {
        validate_interval(self.interval_ms)?;
        validate_window(self.window_s)?;

        if self.width < MIN_WIDTH {
            return Err(invalid(format!("chart width must be at least {MIN_WIDTH} pixels")));
        }
        if self.height < MIN_HEIGHT {
            return Err(invalid(format!("chart height must be at least {MIN_HEIGHT} pixels")));
        }
        if self.max_cores > MAX_CORES_LIMIT {
            return Err(invalid(format!(
                "max cores is limited to {MAX_CORES_LIMIT} (0 shows all cores)"
            )));
        }
        Ok(())
    }
}

pub fn validate_interval(interval_ms: u64) -> Result<()> {
    if INTERVAL_MS_RANGE.contains(&interval_ms) {
        Ok(())
    } else {
        Err(invalid(format!(
            "interval {interval_ms}ms outside {}..={}ms",
            INTERVAL_MS_RANGE.start(),
            INTERVAL_MS_RANGE.end()
        )))
    }
}

pub fn validate_window(window_s: u64) -> Result<()> {
    if WINDOW_S_RANGE.contains(&window_s) {
        Ok(())
    } else {
        Err(invalid(format!(
            "time window {window_s}s outside {}..={}s",
            WINDOW_S_RANGE.start(),
            WINDOW_S_RANGE.end()
        )))
    }
}

pub fn window_from_secs(window_s: u64) -> chrono::Duration {
    let secs = i64::try_from(window_s).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
    chrono::Duration::seconds(secs)
}

fn invalid(msg: String) -> MonitorError {
    MonitorError::InvalidConfiguration(msg)
}

/// Values supplied on the command line; each one present wins over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub interval_ms: Option<u64>,
    pub window_s:    Option<u64>,
    pub per_core:    Option<bool>,
    pub max_cores:   Option<usize>,
    pub width:       Option<u32>,
    pub height:      Option<u32>,
    pub source:      Option<SourcePreference>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(v) = self.interval_ms {
            config.interval_ms = v;
        }
        if let Some(v) = self.window_s {
            config.window_s = v;
        }
        if let Some(v) = self.per_core {
            config.per_core = v;
        }
        if let Some(v) = self.max_cores {
            config.max_cores = v;
        }
        if let Some(v) = self.width {
            config.width = v;
        }
        if let Some(v) = self.height {
            config.height = v;
        }
        if let Some(v) = self.source {
            config.source = v;
        }
    }
}

/// Which counter mechanism to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePreference {
    /// Library first, `/proc/stat` on Linux if the library is unusable.
    #[default]
    Auto,
    Sysinfo,
    ProcStat,
}

impl fmt::Display for SourcePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourcePreference::Auto => "auto",
            SourcePreference::Sysinfo => "sysinfo",
            SourcePreference::ProcStat => "proc-stat",
        })
    }
}

impl FromStr for SourcePreference {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SourcePreference::Auto),
            "sysinfo" => Ok(SourcePreference::Sysinfo),
            "proc-stat" | "procstat" | "proc_stat" => Ok(SourcePreference::ProcStat),
            other => Err(invalid(format!("unknown counter source '{other}'"))),
        }
    }
}
