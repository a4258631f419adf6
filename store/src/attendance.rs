//! Attendance record storage.
//!
//! `(user_id, date)` is the natural key: exactly one record per user per UTC
//! day. All writes go through [`AttendanceStore::upsert_attendance`].

use crate::StoreError;
use presence_types::{Location, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateEventKind {
    Enter,
    Exit,
}

/// A single entry into or exit from the authorized area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateEvent {
    pub kind: GateEventKind,
    pub location: Location,
    pub timestamp: Timestamp,
}

/// Marks a record written by one principal on behalf of another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProxyMark {
    pub is_proxy: bool,
    pub proxy_user_id: UserId,
    pub reason: String,
    pub approved: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub user_id: UserId,
    /// Start of the UTC day this record covers.
    pub date: Timestamp,
    pub status: AttendanceStatus,
    pub check_in_at: Option<Timestamp>,
    pub check_out_at: Option<Timestamp>,
    pub events: Vec<GateEvent>,
    pub proxy: Option<ProxyMark>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Partial update applied by [`AttendanceStore::upsert_attendance`].
///
/// `None` fields leave the stored value untouched; `event` is appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttendanceUpdate {
    pub status: Option<AttendanceStatus>,
    pub check_in_at: Option<Timestamp>,
    pub check_out_at: Option<Timestamp>,
    pub event: Option<GateEvent>,
    pub proxy: Option<ProxyMark>,
}

impl AttendanceRecord {
    /// The record inserted on the first write of a day: absent, no events.
    pub fn new(user_id: UserId, date: Timestamp, now: Timestamp) -> Self {
        Self {
            user_id,
            date,
            status: AttendanceStatus::Absent,
            check_in_at: None,
            check_out_at: None,
            events: Vec::new(),
            proxy: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: &AttendanceUpdate, now: Timestamp) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(at) = update.check_in_at {
            self.check_in_at = Some(at);
        }
        if let Some(at) = update.check_out_at {
            self.check_out_at = Some(at);
        }
        if let Some(event) = &update.event {
            self.events.push(event.clone());
        }
        if let Some(proxy) = &update.proxy {
            self.proxy = Some(proxy.clone());
        }
        self.updated_at = now;
    }

    pub fn count_events(&self, kind: GateEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Trait for attendance storage operations.
pub trait AttendanceStore {
    /// Insert-or-update the record keyed on `(user, date)`.
    ///
    /// When absent, [`AttendanceRecord::new`] is inserted first; the lookup,
    /// insert and update are one atomic step. Returns the record as stored.
    fn upsert_attendance(
        &self,
        user: &UserId,
        date: Timestamp,
        update: &AttendanceUpdate,
        now: Timestamp,
    ) -> Result<AttendanceRecord, StoreError>;

    fn get_attendance(
        &self,
        user: &UserId,
        date: Timestamp,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// All records of `user`, oldest day first.
    fn attendance_history(&self, user: &UserId) -> Result<Vec<AttendanceRecord>, StoreError>;
}
