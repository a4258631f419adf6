//! Fan-out of attendance notices to connected clients.

use presence_verification::{AttendanceNotice, Listener};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// One notice, addressed to a room.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoomEvent {
    pub room: String,
    pub event: String,
    pub data: serde_json::Value,
}

impl From<&AttendanceNotice> for RoomEvent {
    fn from(notice: &AttendanceNotice) -> Self {
        Self {
            room: notice.room(),
            event: notice.name().to_string(),
            data: notice.payload(),
        }
    }
}

/// Broadcast channel shared by every connection's forwarder.
pub struct NotificationHub {
    tx: broadcast::Sender<Arc<RoomEvent>>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a notice. Returns how many connections were listening.
    pub fn publish(&self, notice: &AttendanceNotice) -> usize {
        let event = Arc::new(RoomEvent::from(notice));
        // No receivers is not an error: nobody is connected right now.
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!(event = notice.name(), "no connected clients");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RoomEvent>> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// An event-bus listener that publishes every notice on this hub.
    pub fn listener(self: &Arc<Self>) -> Listener {
        let hub = Arc::clone(self);
        Box::new(move |notice| {
            hub.publish(notice);
            Ok(())
        })
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}
