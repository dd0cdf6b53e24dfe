use std::path::PathBuf;

use thiserror::Error;

/// Errors in the run configuration itself. Surfaced at construction or
/// validation time, never silently defaulted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Speed multiplier must be >= 0, got {0}")]
    NegativeSpeed(f64),

    #[error("Simulation window requires a start time or a named preset")]
    MissingStartTime,

    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("Invalid time window: start {start} is not before end {end}")]
    InvalidWindow { start: String, end: String },

    #[error("Invalid percentage for {field}: {value}")]
    InvalidPercent { field: &'static str, value: f64 },

    #[error("Starting cash must be positive, got {0}")]
    InvalidCash(f64),
}

/// Errors raised while preparing a run. The controller never enters the
/// running state after one of these.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to fetch historical data: {0}")]
    DataFetch(String),

    #[error("Directory is not writable: {path}")]
    UnwritableDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data package for {0} contains no price bars")]
    EmptyPackage(String),
}
