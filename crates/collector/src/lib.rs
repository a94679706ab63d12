//! Telemetry sources feeding the raw ingestion topic.
//!
//! Two sources are supported:
//!
//! - [`synth`] -- synthetic telemetry for local runs and load exercises.
//! - [`csv_source`] -- replay of historical telemetry from a CSV file.
//!
//! Both produce raw JSON payloads; [`source::publish_all`] pushes them onto
//! the bus where the ingestion stage validates and decodes them.

pub mod csv_source;
pub mod source;
pub mod synth;

pub use source::publish_all;

/// Error type for telemetry source loading.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read telemetry file: {0}")]
    Io(#[from] std::io::Error),
}
