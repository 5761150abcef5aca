// Events emitted to the surrounding application (UI, tray, logs). Fire and
// forget over a broadcast channel; slow or absent subscribers never block a
// pass.

use crate::engine::SyncStatus;
use crate::history::HistoryEntry;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum SyncEvent {
    PassStarted(SyncStatus),
    PassCompleted(SyncStatus),
    ScheduleStateChanged(bool),
    LogAppended(HistoryEntry),
}

pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        // Err only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::ScheduleStateChanged(true));

        match rx.recv().await.unwrap() {
            SyncEvent::ScheduleStateChanged(running) => assert!(running),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(SyncEvent::ScheduleStateChanged(false));
    }
}
