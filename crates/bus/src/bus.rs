//! Publish/subscribe hub with broadcast topics and point-to-point mailboxes.
//!
//! [`MessageBus`] is the central hand-off point between pipeline stages. It
//! is designed to be shared via `Arc<MessageBus>` across the application.
//!
//! Delivery is at-least-once: a subscription's [`serve`](Subscription::serve)
//! loop re-enqueues any envelope whose handler did not return
//! [`Disposition::Ack`]. Each subscription drains one FIFO queue in a single
//! task, so deliveries are serialized in arrival order -- which is what the
//! aggregator's per-machine accumulator relies on.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::envelope::{Disposition, Envelope, MessageId};

/// Default per-subscription queue capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Redelivery cap per envelope. One poison message must not wedge a
/// partition forever; an envelope that reaches the cap is dropped with an
/// error log instead of looping.
pub const MAX_REDELIVERIES: u32 = 25;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for failed publishes. Never silently swallowed: the caller
/// decides whether to retry or escalate.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Point-to-point send to a recipient that never registered a mailbox.
    #[error("No mailbox registered for recipient {0:?}")]
    NoRecipient(String),

    /// The recipient's mailbox exists but its receiving task is gone.
    #[error("Mailbox for recipient {0:?} is closed")]
    MailboxClosed(String),
}

// ---------------------------------------------------------------------------
// MessageBus
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BusState {
    /// Broadcast topics: every live subscriber receives each publish.
    topics: HashMap<String, Vec<mpsc::Sender<Envelope>>>,
    /// Point-to-point mailboxes, one consumer per recipient name.
    mailboxes: HashMap<String, mpsc::Sender<Envelope>>,
}

/// In-process message bus.
pub struct MessageBus {
    capacity: usize,
    state: Mutex<BusState>,
}

impl MessageBus {
    /// Create a bus whose subscription queues hold up to `capacity`
    /// in-flight envelopes. A publisher suspends when a queue is full.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BusState::default()),
        }
    }

    /// Broadcast a payload to every subscriber of `topic`.
    ///
    /// `partition_key` is carried on the envelope for per-entity routing and
    /// diagnostics. Publishing to a topic with zero subscribers succeeds (a
    /// fan-out of zero); subscribers whose task has gone away are pruned.
    pub async fn publish(
        &self,
        topic: &str,
        partition_key: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<MessageId, PublishError> {
        let envelope = Envelope::new(partition_key, payload);
        let id = envelope.id;

        let senders: Vec<mpsc::Sender<Envelope>> = {
            let state = self.state.lock().expect("bus state lock poisoned");
            state.topics.get(topic).cloned().unwrap_or_default()
        };

        let mut delivered = 0usize;
        for sender in &senders {
            if sender.send(envelope.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        if delivered < senders.len() {
            self.prune_closed(topic);
        }

        tracing::trace!(topic, %id, subscribers = delivered, "Published envelope");
        Ok(id)
    }

    /// Send a payload point-to-point to a named recipient's mailbox.
    pub async fn send(
        &self,
        recipient: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId, PublishError> {
        let sender = {
            let state = self.state.lock().expect("bus state lock poisoned");
            state
                .mailboxes
                .get(recipient)
                .cloned()
                .ok_or_else(|| PublishError::NoRecipient(recipient.to_string()))?
        };

        let envelope = Envelope::new(None, payload);
        let id = envelope.id;

        sender
            .send(envelope)
            .await
            .map_err(|_| PublishError::MailboxClosed(recipient.to_string()))?;

        tracing::trace!(recipient, %id, "Sent envelope point-to-point");
        Ok(id)
    }

    /// Subscribe to a broadcast topic.
    ///
    /// Every subscription receives its own copy of each publish, in publish
    /// order.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let subscription = Subscription {
            name: topic.to_string(),
            rx,
            loopback: tx.clone(),
            parked: VecDeque::new(),
        };

        let mut state = self.state.lock().expect("bus state lock poisoned");
        state.topics.entry(topic.to_string()).or_default().push(tx);
        subscription
    }

    /// Register the point-to-point mailbox for `recipient`.
    ///
    /// Registering again replaces the previous mailbox -- the old consumer's
    /// queue is closed once drained.
    pub fn register(&self, recipient: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let subscription = Subscription {
            name: recipient.to_string(),
            rx,
            loopback: tx.clone(),
            parked: VecDeque::new(),
        };

        let mut state = self.state.lock().expect("bus state lock poisoned");
        if state.mailboxes.insert(recipient.to_string(), tx).is_some() {
            tracing::warn!(recipient, "Replacing existing mailbox registration");
        }
        subscription
    }

    /// Drop topic senders whose subscription has gone away.
    fn prune_closed(&self, topic: &str) {
        let mut state = self.state.lock().expect("bus state lock poisoned");
        if let Some(senders) = state.topics.get_mut(topic) {
            senders.retain(|s| !s.is_closed());
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving end of a topic subscription or a point-to-point mailbox.
pub struct Subscription {
    name: String,
    rx: mpsc::Receiver<Envelope>,
    /// Sender back into our own queue, used for redelivery.
    loopback: mpsc::Sender<Envelope>,
    /// Redeliveries that found the queue full, drained ahead of the queue so
    /// an unacknowledged envelope is never lost below the redelivery cap.
    parked: VecDeque<Envelope>,
}

impl Subscription {
    /// Topic or recipient name this subscription is attached to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next envelope, suspending until one arrives.
    ///
    /// Returns `None` when `cancel` fires or the queue is closed. This is
    /// the pipeline's only suspension point -- there is no busy-polling.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Option<Envelope> {
        if let Some(envelope) = self.parked.pop_front() {
            return Some(envelope);
        }

        tokio::select! {
            _ = cancel.cancelled() => None,
            envelope = self.rx.recv() => envelope,
        }
    }

    /// Drive a handler loop over this subscription until cancelled.
    ///
    /// The handler's [`Disposition`] decides the envelope's fate: `Ack`
    /// completes it, `Nack` re-enqueues it immediately, `Retry(delay)`
    /// re-enqueues it after sleeping. Redelivery goes through this
    /// subscription's own queue, so it lands behind messages already in
    /// flight and the per-queue serial ordering holds. If the queue is full
    /// at redelivery time the envelope is instead delivered next, ahead of
    /// the queue; an unacknowledged envelope is never dropped below the cap.
    pub async fn serve<F, Fut>(mut self, cancel: CancellationToken, mut handler: F)
    where
        F: FnMut(Envelope) -> Fut,
        Fut: Future<Output = Disposition>,
    {
        while let Some(envelope) = self.recv(&cancel).await {
            match handler(envelope.clone()).await {
                Disposition::Ack => {}
                Disposition::Nack => self.redeliver(envelope, None).await,
                Disposition::Retry(delay) => self.redeliver(envelope, Some(delay)).await,
            }
        }
        tracing::debug!(name = %self.name, "Subscription serve loop stopped");
    }

    /// Re-enqueue an envelope for another attempt, optionally after a delay.
    ///
    /// Exposed for stages that drive their own receive loop instead of
    /// [`serve`](Self::serve). Redelivery lands behind messages already in
    /// flight on this queue and is capped at [`MAX_REDELIVERIES`]. When the
    /// queue is full the envelope is parked locally and delivered next
    /// instead of being dropped.
    pub async fn redeliver(&mut self, envelope: Envelope, delay: Option<Duration>) {
        if envelope.attempt >= MAX_REDELIVERIES {
            tracing::error!(
                name = %self.name,
                id = %envelope.id,
                attempt = envelope.attempt,
                "Envelope exhausted its redelivery cap, dropping"
            );
            return;
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // try_send, not send: we are the queue's only consumer, so awaiting
        // space here would deadlock against ourselves when the queue is full.
        let envelope = envelope.redelivered();
        match self.loopback.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                // Publishers filled the queue while the handler ran; keep the
                // unacknowledged envelope rather than losing it.
                self.parked.push_back(envelope);
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                tracing::error!(
                    name = %self.name,
                    id = %envelope.id,
                    "Redelivery queue closed, dropping envelope"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let bus = MessageBus::default();
        let mut sub_a = bus.subscribe("topic.a");
        let mut sub_b = bus.subscribe("topic.a");
        let cancel = CancellationToken::new();

        bus.publish("topic.a", Some("M-0"), serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let a = sub_a.recv(&cancel).await.unwrap();
        let b = sub_b.recv(&cancel).await.unwrap();
        assert_eq!(a.payload["n"], 1);
        assert_eq!(b.payload["n"], 1);
        assert_eq!(a.partition_key.as_deref(), Some("M-0"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = MessageBus::default();
        let result = bus.publish("topic.empty", None, serde_json::Value::Null).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn point_to_point_requires_registration() {
        let bus = MessageBus::default();
        let err = bus.send("nobody", serde_json::Value::Null).await.unwrap_err();
        assert_matches!(err, PublishError::NoRecipient(name) if name == "nobody");
    }

    #[tokio::test]
    async fn point_to_point_delivers_to_registered_mailbox() {
        let bus = MessageBus::default();
        let mut mailbox = bus.register("worker-1");
        let cancel = CancellationToken::new();

        bus.send("worker-1", serde_json::json!("hello")).await.unwrap();

        let envelope = mailbox.recv(&cancel).await.unwrap();
        assert_eq!(envelope.payload, serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn recv_returns_none_on_cancellation() {
        let bus = MessageBus::default();
        let mut sub = bus.subscribe("topic.quiet");
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(sub.recv(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn deliveries_arrive_in_publish_order() {
        let bus = MessageBus::default();
        let mut sub = bus.subscribe("topic.ordered");
        let cancel = CancellationToken::new();

        for n in 0..5 {
            bus.publish("topic.ordered", Some("M-0"), serde_json::json!(n))
                .await
                .unwrap();
        }

        for n in 0..5 {
            let envelope = sub.recv(&cancel).await.unwrap();
            assert_eq!(envelope.payload, serde_json::json!(n));
        }
    }

    #[tokio::test]
    async fn nack_redelivers_with_incremented_attempt() {
        let bus = MessageBus::default();
        let sub = bus.subscribe("topic.retry");
        let cancel = CancellationToken::new();

        bus.publish("topic.retry", None, serde_json::json!("flaky"))
            .await
            .unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        let loop_cancel = cancel.clone();

        let server = tokio::spawn(sub.serve(cancel, move |envelope| {
            let seen = seen.clone();
            let loop_cancel = loop_cancel.clone();
            async move {
                seen.store(envelope.attempt, Ordering::SeqCst);
                if envelope.attempt < 3 {
                    Disposition::Nack
                } else {
                    loop_cancel.cancel();
                    Disposition::Ack
                }
            }
        }));

        server.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn full_queue_parks_redelivery_instead_of_dropping() {
        let bus = MessageBus::new(1);
        let mut sub = bus.subscribe("topic.full");
        let cancel = CancellationToken::new();

        bus.publish("topic.full", None, serde_json::json!(1))
            .await
            .unwrap();
        let first = sub.recv(&cancel).await.unwrap();

        // Refill the queue before the redelivery so try_send finds it full.
        bus.publish("topic.full", None, serde_json::json!(2))
            .await
            .unwrap();
        sub.redeliver(first, None).await;

        let redelivered = sub.recv(&cancel).await.unwrap();
        assert_eq!(redelivered.payload, serde_json::json!(1));
        assert_eq!(redelivered.attempt, 2);

        let queued = sub.recv(&cancel).await.unwrap();
        assert_eq!(queued.payload, serde_json::json!(2));
    }

    #[tokio::test]
    async fn redelivery_stops_at_the_cap() {
        let bus = MessageBus::default();
        let sub = bus.subscribe("topic.poison");
        let cancel = CancellationToken::new();

        bus.publish("topic.poison", None, serde_json::json!("bad"))
            .await
            .unwrap();

        let deliveries = Arc::new(AtomicU32::new(0));
        let counter = deliveries.clone();
        let loop_cancel = cancel.clone();

        // Always Nack; the loop must terminate once the cap drops the envelope.
        let server = tokio::spawn(sub.serve(cancel, move |envelope| {
            let counter = counter.clone();
            let loop_cancel = loop_cancel.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if envelope.attempt >= MAX_REDELIVERIES {
                    // The drop happens after this Nack; cancel so the test ends.
                    loop_cancel.cancel();
                }
                Disposition::Nack
            }
        }));

        server.await.unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), MAX_REDELIVERIES);
    }
}
