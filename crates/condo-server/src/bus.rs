//! Observers the server registers on the engine.

use condo_core::events::{EventObserver, LifecycleEvent};
use tokio::sync::broadcast;

/// Forwards lifecycle events to SSE subscribers. Sending with no
/// subscribers is not an error.
pub struct BroadcastObserver {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastObserver {
    pub fn new(tx: broadcast::Sender<LifecycleEvent>) -> Self {
        Self { tx }
    }
}

impl EventObserver for BroadcastObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Writes one structured log line per event.
#[derive(Debug, Default)]
pub struct LogObserver;

impl EventObserver for LogObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::TaskFailed { task_id, error, .. } => tracing::warn!(
                event = event.name(),
                goal_id = event.goal_id(),
                %task_id,
                %error,
                "lifecycle event"
            ),
            _ => tracing::info!(event = event.name(), goal_id = event.goal_id(), "lifecycle event"),
        }
    }
}
