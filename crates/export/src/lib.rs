//! File exports for aggregate statistics.
//!
//! External collaborators (warehouse loaders, object-storage uploaders)
//! consume aggregate rows as files. This crate owns the boundary formats:
//!
//! - [`AggregateRow`] -- the fixed warehouse row schema, camelCase fields.
//! - [`jsonl`] -- line-delimited JSON writing and the millisecond-to-second
//!   timestamp normalization applied before object-storage handoff.
//! - [`csv`] -- JSONL to CSV conversion with first-seen header ordering.
//!
//! The upload and load jobs themselves are external; nothing here talks to
//! the network.

pub mod csv;
pub mod jsonl;
pub mod row;

pub use jsonl::JsonlWriter;
pub use row::AggregateRow;

/// Error type for export file operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export row is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
