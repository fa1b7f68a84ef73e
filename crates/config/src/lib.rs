pub mod schema;
pub mod watcher;

pub use schema::{
    validate_interval, validate_window, window_from_secs, ConfigOverrides, MonitorConfig,
    SourcePreference,
};
pub use watcher::ConfigWatcher;

use cpumon_core::{MonitorError, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file.  Returns `MonitorConfig::default()` if
/// the file doesn't exist so the monitor always has sensible defaults.
///
/// The result is not validated; callers merge command-line overrides first.
pub fn load(path: impl AsRef<Path>) -> Result<MonitorConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            "Config file not found at '{}'; using defaults.",
            path.display()
        );
        return Ok(MonitorConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| MonitorError::Config(format!("cannot read '{}': {e}", path.display())))?;

    toml::from_str(&raw).map_err(|e| MonitorError::Config(format!("TOML parse error: {e}")))
}

/// Return the default config path, honouring `$XDG_CONFIG_HOME`.
pub fn default_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cpumon").join("cpumon.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, MonitorConfig::default());
    }

    #[test]
    fn reads_values_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window_s = 120\nper_core = true\nmax_cores = 4").unwrap();

        let cfg = load(file.path()).unwrap();
        assert_eq!(cfg.window_s, 120);
        assert!(cfg.per_core);
        assert_eq!(cfg.max_cores, 4);
        assert_eq!(cfg.interval_ms, 500);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interval_ms = \"fast\"").unwrap();

        assert!(matches!(load(file.path()), Err(MonitorError::Config(_))));
    }

    #[test]
    fn default_path_ends_with_app_file() {
        assert!(default_path().ends_with("cpumon/cpumon.toml"));
    }
}
