//! Delivery envelope and handler dispositions.

use std::time::Duration;

use uuid::Uuid;

/// Unique id assigned to a message at publish time.
pub type MessageId = Uuid;

/// Transport wrapper around a payload.
///
/// The bus owns the envelope: stages inspect it inside the handler invocation
/// that received it and must not hold onto it afterwards. The same envelope
/// (same `id`) may be redelivered with a higher `attempt` after a `Nack` or
/// `Retry`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: MessageId,
    /// Delivery attempt, starting at 1 for the first delivery.
    pub attempt: u32,
    /// Routing key used to shard per-entity state (the machine id).
    pub partition_key: Option<String>,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub(crate) fn new(partition_key: Option<&str>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 1,
            partition_key: partition_key.map(str::to_string),
            payload,
        }
    }

    /// The same envelope, one attempt later.
    pub(crate) fn redelivered(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// A handler's verdict on a delivery.
///
/// Acknowledgment is the sole commit point: any state the handler mutated
/// must be in place before it returns `Ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing took effect; the envelope is done.
    Ack,
    /// Processing failed; redeliver the envelope.
    Nack,
    /// Processing should be retried after a delay.
    Retry(Duration),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
