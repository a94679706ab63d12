//! Alert dispatcher: detections to published alert messages.
//!
//! [`DispatcherStage`] consumes detections from its point-to-point mailbox,
//! builds an [`AlertMessage`], and publishes it to the alert topic with
//! bounded exponential-backoff retry. A short-lived set of recently
//! dispatched `(machine_id, timestamp)` keys suppresses the duplicates that
//! at-least-once redelivery would otherwise push to external consumers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use linewatch_bus::{Disposition, Envelope, MessageBus, MessageId, PublishError, Subscription};
use linewatch_core::topics::{MAILBOX_DISPATCHER, TOPIC_ALERTS};
use linewatch_core::{AlertMessage, Detection};

/// How long a dispatched alert key suppresses duplicates.
const DEDUP_TTL: Duration = Duration::from_secs(300);

/// Upper bound on remembered alert keys; oldest entries are evicted first.
const DEDUP_MAX_ENTRIES: usize = 4096;

// ---------------------------------------------------------------------------
// DedupSet
// ---------------------------------------------------------------------------

/// Bounded, time-limited set of recently dispatched alert keys.
///
/// Owned exclusively by the dispatcher stage; nothing else reads or writes
/// it.
pub(crate) struct DedupSet {
    entries: HashMap<(String, i64), Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl DedupSet {
    pub(crate) fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Whether `key` was dispatched within the TTL.
    pub(crate) fn contains(&mut self, key: &(String, i64)) -> bool {
        self.contains_at(key, Instant::now())
    }

    /// Remember `key` as dispatched now.
    pub(crate) fn insert(&mut self, key: (String, i64)) {
        self.insert_at(key, Instant::now());
    }

    fn contains_at(&mut self, key: &(String, i64), now: Instant) -> bool {
        self.prune(now);
        self.entries.contains_key(key)
    }

    fn insert_at(&mut self, key: (String, i64), now: Instant) {
        self.prune(now);
        self.entries.insert(key, now);

        // Capacity bound: evict the oldest entry when over the limit.
        while self.entries.len() > self.max_entries {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&oldest);
            }
        }
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries.retain(|_, at| now.duration_since(*at) < ttl);
    }
}

// ---------------------------------------------------------------------------
// DispatcherStage
// ---------------------------------------------------------------------------

/// The alert dispatch worker.
pub struct DispatcherStage {
    bus: Arc<MessageBus>,
    retry_budget: u32,
    mailbox: Subscription,
}

impl DispatcherStage {
    /// Create the stage and register the dispatcher mailbox.
    pub fn new(bus: Arc<MessageBus>, retry_budget: u32) -> Self {
        let mailbox = bus.register(MAILBOX_DISPATCHER);
        Self {
            bus,
            retry_budget,
            mailbox,
        }
    }

    /// Drain the mailbox until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let bus = self.bus;
        let retry_budget = self.retry_budget;
        let dedup = Arc::new(Mutex::new(DedupSet::new(DEDUP_MAX_ENTRIES, DEDUP_TTL)));

        self.mailbox
            .serve(cancel, move |envelope| {
                let bus = bus.clone();
                let dedup = dedup.clone();
                async move { handle(&bus, &dedup, retry_budget, envelope).await }
            })
            .await;
        tracing::info!("Alert dispatcher stopped");
    }
}

/// Process one detection: dedup, build the alert, publish with retry.
async fn handle(
    bus: &MessageBus,
    dedup: &Mutex<DedupSet>,
    retry_budget: u32,
    envelope: Envelope,
) -> Disposition {
    let detection: Detection = match serde_json::from_value(envelope.payload) {
        Ok(detection) => detection,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable detection envelope");
            return Disposition::Ack;
        }
    };

    if detection.reasons.is_empty() {
        tracing::warn!(machine_id = %detection.machine_id, "Dropping detection with no reasons");
        return Disposition::Ack;
    }

    let alert = AlertMessage::from_detection(detection);
    let key = alert.dedup_key();

    if dedup.lock().expect("dedup lock poisoned").contains(&key) {
        tracing::debug!(
            machine_id = %alert.machine_id,
            timestamp = alert.timestamp,
            "Suppressing duplicate alert"
        );
        return Disposition::Ack;
    }

    match publish_with_retry(bus, &alert, retry_budget).await {
        Ok(id) => {
            // Insert before acking so a crash after the publish replays into
            // the dedup window instead of double-alerting.
            dedup.lock().expect("dedup lock poisoned").insert(key);
            tracing::info!(
                machine_id = %alert.machine_id,
                severity = ?alert.severity,
                message_id = %id,
                "Alert dispatched"
            );
            Disposition::Ack
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                machine_id = %alert.machine_id,
                "Alert publish failed after all retries, redelivering detection"
            );
            Disposition::Nack
        }
    }
}

/// Publish an alert with exponential-backoff retry (1 s, 2 s, 4 s, ...).
async fn publish_with_retry(
    bus: &MessageBus,
    alert: &AlertMessage,
    retry_budget: u32,
) -> Result<MessageId, PublishError> {
    let payload = serde_json::to_value(alert).expect("AlertMessage is always serialisable");
    let attempts = retry_budget.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match bus
            .publish(TOPIC_ALERTS, Some(&alert.machine_id), payload.clone())
            .await
        {
            Ok(id) => return Ok(id),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    machine_id = %alert.machine_id,
                    error = %e,
                    "Alert publish attempt failed"
                );
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_err.expect("at least one publish attempt was made"))
}

/// Delay before retry `attempt + 1`: 1 s doubling per attempt, capped.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(5))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
