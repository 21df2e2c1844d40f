//! "Index changed" notifications.
//!
//! A broadcast channel lets any number of listeners (a UI refreshing a live
//! view, the CLI printing changes) observe index mutations. Delivery is
//! fire-and-forget: sending with no subscribers is not an error and slow
//! subscribers may lag.

use tokio::sync::broadcast;

/// What changed. Listeners should treat every variant as "something
/// changed, re-query if you care".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    DocumentAdded { path: String },
    DocumentRemoved { path: String },
    /// A full crawl finished.
    Rebuilt,
    Cleared,
}

/// Fan-out of [`IndexEvent`]s to every subscriber.
#[derive(Clone)]
pub struct NotificationBroadcaster {
    sender: broadcast::Sender<IndexEvent>,
}

impl NotificationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event to all current subscribers.
    pub fn send(&self, event: IndexEvent) {
        match self.sender.send(event) {
            Ok(count) => {
                crate::debug_event!("notify", "sent", "to {count} subscribers");
            }
            Err(broadcast::error::SendError(event)) => {
                crate::debug_event!("notify", "dropped", "no subscribers for {event:?}");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
