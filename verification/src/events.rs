//! Attendance notices fanned out to external notification transports.
//!
//! Delivery is fire-and-forget: a failing listener is logged and skipped, and
//! never changes the verification result.

use presence_store::AttendanceStatus;
use presence_types::{Timestamp, UserId};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMethod {
    CheckIn,
    CheckOut,
    Scan,
    Proxy,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttendanceNotice {
    /// Sent to the subject's own room after any accepted attendance change.
    AttendanceUpdate {
        user_id: UserId,
        status: AttendanceStatus,
        method: CheckMethod,
        timestamp: Timestamp,
    },
    /// Sent to faculty when a user leaves.
    StudentExit {
        user_id: UserId,
        timestamp: Timestamp,
        forced_absent: bool,
    },
}

impl AttendanceNotice {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            AttendanceNotice::AttendanceUpdate { .. } => "attendance-update",
            AttendanceNotice::StudentExit { .. } => "student_exit",
        }
    }

    /// Room the event is addressed to.
    pub fn room(&self) -> String {
        match self {
            AttendanceNotice::AttendanceUpdate { user_id, .. } => format!("user:{user_id}"),
            AttendanceNotice::StudentExit { .. } => "role:faculty".to_string(),
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

pub type Listener = Box<dyn Fn(&AttendanceNotice) -> Result<(), NotifyError> + Send + Sync>;

/// Synchronous fan-out of attendance notices.
///
/// Listeners run inline on the emitting task; keep them to a channel send or similar.
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit(&self, notice: &AttendanceNotice) {
        for listener in &self.listeners {
            if let Err(e) = listener(notice) {
                warn!(event = notice.name(), room = %notice.room(), error = %e, "notification dropped");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
