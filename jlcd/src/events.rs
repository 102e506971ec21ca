//! Event broadcast for run progress (JSON lines).

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

const BUFFER: usize = 256;

pub const RUN_STARTED: &str = "run_started";
pub const RUN_LOG: &str = "run_log";
pub const RUN_COMPLETED: &str = "run_completed";
pub const RUN_FAILED: &str = "run_failed";
pub const RUN_CANCELLED: &str = "run_cancelled";
pub const TESTS_DISCOVERED: &str = "tests_discovered";

/// Broadcast channel for daemon events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl EventBus {
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event with payload.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                // No subscribers is fine.
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }
}

impl Default for EventBus {
    /// Room for `BUFFER` events; agents flush logs in bursts.
    fn default() -> Self {
        let (sender, _) = broadcast::channel(BUFFER);
        Self { sender }
    }
}
