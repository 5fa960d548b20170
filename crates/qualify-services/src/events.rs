//! Probe result events.

use serde::Serialize;
use tokio::sync::broadcast;

use qualify_core::StatusType;

/// Emitted on every real contact status transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "Contact")]
    pub contact: String,
    #[serde(rename = "Status")]
    pub status: &'static str,
    #[serde(rename = "RTT")]
    pub rtt: u64,
}

impl ProbeResult {
    pub fn new(contact: impl Into<String>, status: StatusType, rtt: u64) -> Self {
        Self {
            contact: contact.into(),
            status: status.label(),
            rtt,
        }
    }
}

/// Broadcast bus for [`ProbeResult`]s. Slow subscribers see `Lagged`.
pub struct EventBus {
    tx: broadcast::Sender<ProbeResult>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish. Dropped silently when nobody listens.
    pub fn publish(&self, event: ProbeResult) {
        tracing::debug!(
            contact = %event.contact,
            status = event.status,
            rtt = event.rtt,
            "probe result"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProbeResult> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
