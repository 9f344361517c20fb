//! Outbound events
//!
//! Listeners subscribe to a single broadcast channel instead of registering a
//! callback per event kind. Slow subscribers lag and lose the oldest events;
//! the service never blocks on them.

use tokio::sync::broadcast;
use tracing::trace;

use crate::protocol::{PortId, RecordResult, TimerRecordingResult};
use crate::registry::DeviceInfo;

/// Event announced to external listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CecEvent {
    DeviceAdded(DeviceInfo),
    DeviceRemoved(DeviceInfo),
    /// The TV switched input; carries the new source or a placeholder record
    InputChanged(DeviceInfo),
    SystemAudioModeChanged(bool),
    RecordResult(RecordResult),
    TimerResult(TimerRecordingResult),
    Hotplug { port_id: PortId, connected: bool },
}

/// Fan-out of `CecEvent`s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CecEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: CecEvent) {
        trace!(?event, "Publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CecEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(CecEvent::SystemAudioModeChanged(true));

        assert_eq!(a.recv().await.unwrap(), CecEvent::SystemAudioModeChanged(true));
        assert_eq!(b.recv().await.unwrap(), CecEvent::SystemAudioModeChanged(true));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(1);
        bus.publish(CecEvent::Hotplug {
            port_id: 1,
            connected: true,
        });
    }
}
