//! The linewatch processing pipeline.
//!
//! Five independently scheduled stages, each owning a bus subscription and a
//! cancellable receive loop:
//!
//! ```text
//! raw topic -> IngestStage -> records topic -> AggregatorStage -> aggregates topic
//!                                  |                                   |
//!                                  +-----------> DetectorStage <-------+
//!                                                     | (point-to-point)
//!                                              DispatcherStage -> alert topic
//!                                                                      |
//!                                                                NotifierStage
//! ```
//!
//! Stages subscribe in their constructors, so wiring order never races
//! message flow; `run` consumes the stage and drains its subscription until
//! the cancellation token fires.

pub mod aggregator;
pub mod detector;
pub mod dispatcher;
pub mod ingest;
pub mod notifier;

pub use aggregator::AggregatorStage;
pub use detector::DetectorStage;
pub use dispatcher::DispatcherStage;
pub use ingest::{DecodeError, IngestStage, IngestionPayload};
pub use notifier::NotifierStage;
