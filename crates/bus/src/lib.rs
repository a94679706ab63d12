//! In-process message bus with at-least-once delivery semantics.
//!
//! This crate provides the transport contract the pipeline stages hand
//! messages over:
//!
//! - [`MessageBus`] -- publish/subscribe hub shared via `Arc<MessageBus>`,
//!   supporting **broadcast** topics (fan-out to every subscriber) and
//!   **point-to-point** mailboxes (named-recipient hand-off between stages).
//! - [`Envelope`] -- delivery wrapper carrying the payload plus redelivery
//!   metadata; owned by the bus, never persisted by stages.
//! - [`Disposition`] -- a handler's verdict on a delivery (`Ack`, `Nack`,
//!   `Retry(delay)`); anything but `Ack` re-enqueues the envelope.
//! - [`Subscription`] -- a cancellable receive endpoint; each subscription
//!   drains one FIFO queue in a single task, so messages sharing a partition
//!   key are handled serially in arrival order.

pub mod bus;
pub mod envelope;

pub use bus::{MessageBus, PublishError, Subscription, MAX_REDELIVERIES};
pub use envelope::{Disposition, Envelope, MessageId};
