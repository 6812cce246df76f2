use serde::Serialize;
use tokio::sync::broadcast;

/// Notifications for whatever renders queue state (badges, status widgets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    ScanQueued { id: String },
    ScanSynced { id: String },
    ScanFailed { id: String, reason: String },
    ScanRequeued { id: String },
    ReplayFinished { synced: usize, failed: usize },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire and forget; having no subscribers is fine.
    pub fn publish(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
