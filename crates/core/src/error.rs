use thiserror::Error;

/// Top-level error type used across the entire application.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration outside the accepted ranges; fatal at start.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No counter mechanism could produce data (permissions, platform).
    #[error("CPU counter source unavailable: {0}")]
    SourceUnavailable(String),

    /// No series in the counter data could be parsed. Costs one tick, never the engine.
    #[error("failed to parse CPU counters: {0}")]
    SourceParse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
