//! LMDB implementation of AttendanceStore.
//!
//! Key format: `[user] ++ date_be`, the user id length-prefixed. One key per (user, day) is the
//! uniqueness constraint; history is a prefix scan in date order.

use presence_store::{AttendanceRecord, AttendanceStore, AttendanceUpdate, StoreError};
use presence_types::{Timestamp, UserId};

use crate::environment::{get_value, scan_prefix};
use crate::keys::{attendance_key, user_prefix};
use crate::{LmdbError, LmdbStore};

impl AttendanceStore for LmdbStore {
    fn upsert_attendance(
        &self,
        user: &UserId,
        date: Timestamp,
        update: &AttendanceUpdate,
        now: Timestamp,
    ) -> Result<AttendanceRecord, StoreError> {
        let key = attendance_key(user, date);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut record = get_value(&self.attendance_db, &wtxn, &key)?
            .unwrap_or_else(|| AttendanceRecord::new(user.clone(), date, now));
        record.apply(update, now);
        let bytes = bincode::serialize(&record).map_err(LmdbError::from)?;
        self.attendance_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(record)
    }

    fn get_attendance(
        &self,
        user: &UserId,
        date: Timestamp,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.attendance_db, &rtxn, &attendance_key(user, date))?)
    }

    fn attendance_history(&self, user: &UserId) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let rows = scan_prefix(&self.attendance_db, &rtxn, &user_prefix(user))?;
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }
}
