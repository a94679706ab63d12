//! Pipeline configuration value object.
//!
//! Every stage receives its configuration explicitly at construction; there
//! is no global or environment-sourced state inside the pipeline. The
//! binaries load a [`PipelineConfig`] once (optionally from `LINEWATCH_*`
//! environment variables) and hand it to each stage.

use std::str::FromStr;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error raised when startup configuration is missing or unparsable.
///
/// Configuration errors are fatal: the affected stage refuses to start and
/// the error names the offending variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent from the environment.
    #[error("Missing required configuration variable: {0}")]
    Missing(&'static str),

    /// A variable is present but does not parse as the expected type.
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Detection rule thresholds, one field per rule.
///
/// The record tier compares raw samples (`downtime_threshold`,
/// `runtime_threshold`); the aggregate tier compares window statistics
/// (`ratio_threshold`, `score_threshold`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Downtime (minutes) above which a record triggers `high-downtime`.
    pub downtime_threshold: f64,
    /// Runtime (minutes) below which a record triggers `low-runtime`.
    pub runtime_threshold: f64,
    /// Bottleneck ratio above which a window triggers `ratio-exceeded`.
    pub ratio_threshold: f64,
    /// Bottleneck score above which a window triggers `score-exceeded`.
    pub score_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            downtime_threshold: 20.0,
            runtime_threshold: 30.0,
            ratio_threshold: 0.8,
            score_threshold: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Default number of samples per machine before a window closes.
const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default number of publish attempts before the dispatcher escalates.
const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Samples per machine before the aggregation window closes.
    pub window_size: usize,
    /// Detection rule thresholds.
    pub thresholds: Thresholds,
    /// Maximum publish attempts for the alert dispatcher.
    pub retry_budget: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            thresholds: Thresholds::default(),
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `LINEWATCH_*` environment variables.
    ///
    /// Every variable is optional and falls back to its default; a variable
    /// that is present but unparsable is a fatal [`ConfigError::Invalid`].
    ///
    /// | Variable                       | Default |
    /// |--------------------------------|---------|
    /// | `LINEWATCH_WINDOW_SIZE`        | `10`    |
    /// | `LINEWATCH_DOWNTIME_THRESHOLD` | `20`    |
    /// | `LINEWATCH_RUNTIME_THRESHOLD`  | `30`    |
    /// | `LINEWATCH_RATIO_THRESHOLD`    | `0.8`   |
    /// | `LINEWATCH_SCORE_THRESHOLD`    | `1.0`   |
    /// | `LINEWATCH_RETRY_BUDGET`       | `3`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            window_size: env_or("LINEWATCH_WINDOW_SIZE", defaults.window_size)?,
            thresholds: Thresholds {
                downtime_threshold: env_or(
                    "LINEWATCH_DOWNTIME_THRESHOLD",
                    defaults.thresholds.downtime_threshold,
                )?,
                runtime_threshold: env_or(
                    "LINEWATCH_RUNTIME_THRESHOLD",
                    defaults.thresholds.runtime_threshold,
                )?,
                ratio_threshold: env_or(
                    "LINEWATCH_RATIO_THRESHOLD",
                    defaults.thresholds.ratio_threshold,
                )?,
                score_threshold: env_or(
                    "LINEWATCH_SCORE_THRESHOLD",
                    defaults.thresholds.score_threshold,
                )?,
            },
            retry_budget: env_or("LINEWATCH_RETRY_BUDGET", defaults.retry_budget)?,
        })
    }
}

/// Read an optional environment variable, falling back to `default` when the
/// variable is unset and failing when it is set but unparsable.
///
/// Shared by [`PipelineConfig::from_env`] and the binaries' own `LINEWATCH_*`
/// variables so every unparsable value fails startup the same way.
pub fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
