//! Linewatch domain types and pure detection logic.
//!
//! This crate provides the building blocks shared by every pipeline stage:
//!
//! - [`TelemetryRecord`] -- the canonical decoded machine-telemetry event.
//! - [`AggregateStats`] -- per-machine window statistics.
//! - [`detector`] -- threshold rule evaluation (record tier and aggregate
//!   tier), producing [`TriggerReason`](detector::TriggerReason) sets.
//! - [`AlertMessage`] -- the externally published bottleneck alert.
//! - [`PipelineConfig`] -- the explicit configuration value object passed to
//!   each stage at construction.
//! - [`topics`] -- canonical bus topic and mailbox names.
//!
//! It has no internal dependencies and performs no I/O.

pub mod alert;
pub mod config;
pub mod detector;
pub mod stats;
pub mod telemetry;
pub mod topics;

pub use alert::{AlertMessage, Severity};
pub use config::{ConfigError, PipelineConfig, Thresholds};
pub use detector::{Detection, TriggerReason};
pub use stats::AggregateStats;
pub use telemetry::{MachineStatus, TelemetryRecord};
