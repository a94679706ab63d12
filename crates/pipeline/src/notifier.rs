//! Notifier: terminal consumer of the alert topic.
//!
//! [`NotifierStage`] renders every received [`AlertMessage`] through
//! structured logging and acknowledges it. Rendering is idempotent, so a
//! redelivered alert is safe to render twice. An independent heartbeat tick
//! reports liveness to operators without touching the message stream.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use linewatch_bus::{MessageBus, Subscription};
use linewatch_core::topics::TOPIC_ALERTS;
use linewatch_core::{AlertMessage, Severity};

/// Interval between liveness heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Receive-loop state, reported in heartbeat logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotifierState {
    /// Between messages.
    Idle,
    /// Suspended on the blocking receive.
    Receiving,
    /// Rendering a received alert.
    Processing,
}

/// The terminal alert consumer.
pub struct NotifierStage {
    sub: Subscription,
    heartbeat: Duration,
    state: NotifierState,
}

impl NotifierStage {
    /// Create the stage and subscribe to the alert topic.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        let sub = bus.subscribe(TOPIC_ALERTS);
        Self {
            sub,
            heartbeat: HEARTBEAT_INTERVAL,
            state: NotifierState::Idle,
        }
    }

    /// Override the heartbeat interval.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    /// Receive and render alerts until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut heartbeat = tokio::time::interval(self.heartbeat);

        loop {
            self.state = NotifierState::Receiving;

            tokio::select! {
                _ = heartbeat.tick() => {
                    tracing::info!(state = ?self.state, "Notifier alive and waiting for alerts");
                }
                maybe = self.sub.recv(&cancel) => {
                    let Some(envelope) = maybe else { break };

                    self.state = NotifierState::Processing;
                    match serde_json::from_value::<AlertMessage>(envelope.payload.clone()) {
                        Ok(alert) => render(&alert),
                        Err(e) => {
                            // An alert we cannot render is redelivered rather
                            // than dropped; the bus caps the attempts.
                            tracing::error!(error = %e, "Failed to decode alert, redelivering");
                            self.sub.redeliver(envelope, None).await;
                        }
                    }
                    self.state = NotifierState::Idle;
                }
            }
        }

        tracing::info!("Notifier stopped");
    }
}

/// Render one alert for operators.
fn render(alert: &AlertMessage) {
    let reasons: Vec<&str> = alert.reasons.iter().map(|r| r.as_str()).collect();

    match alert.severity {
        Severity::Critical => tracing::error!(
            machine_id = %alert.machine_id,
            timestamp = alert.timestamp,
            reasons = ?reasons,
            "BOTTLENECK ALERT"
        ),
        Severity::Warning => tracing::warn!(
            machine_id = %alert.machine_id,
            timestamp = alert.timestamp,
            reasons = ?reasons,
            "Bottleneck warning"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
