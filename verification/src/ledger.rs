//! The attendance ledger: one record per user per UTC day.
//!
//! Every mutation is a single keyed upsert on `(user, start_of_day)`, so the
//! store's atomic upsert is the only serialization needed. Records are created
//! lazily by the first check-in or check-out of the day and never deleted.

use crate::error::VerificationError;
use crate::geofence::GeofenceEvaluator;
use crate::policy::ProxyGrant;
use presence_store::{
    AttendanceRecord, AttendanceStatus, AttendanceUpdate, GateEvent, GateEventKind,
    PresenceStore, ProxyMark,
};
use presence_types::{Clock, Location, Timestamp, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a check-out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckOut {
    pub record: AttendanceRecord,
    /// The check-out happened outside the geofence and voided presence.
    pub forced_absent: bool,
}

pub struct AttendanceLedger {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    geofence: Arc<GeofenceEvaluator>,
}

impl AttendanceLedger {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
        geofence: Arc<GeofenceEvaluator>,
    ) -> Self {
        Self {
            store,
            clock,
            geofence,
        }
    }

    /// Mark the user present for the day of `at` and append an `enter` event.
    pub fn check_in(
        &self,
        user: &UserId,
        location: Location,
        at: Timestamp,
    ) -> Result<AttendanceRecord, VerificationError> {
        let record = self.upsert(user, at, enter_update(location, at))?;
        info!(
            user = %user,
            date = record.date.as_secs(),
            enters = record.count_events(GateEventKind::Enter),
            "checked in"
        );
        Ok(record)
    }

    /// Append an `exit` event. Leaving from outside the geofence forces `absent`.
    pub fn check_out(
        &self,
        user: &UserId,
        location: Location,
        at: Timestamp,
    ) -> Result<CheckOut, VerificationError> {
        let forced_absent = !self.geofence.is_inside(&location.point);
        let update = AttendanceUpdate {
            status: forced_absent.then_some(AttendanceStatus::Absent),
            check_out_at: Some(at),
            event: Some(GateEvent {
                kind: GateEventKind::Exit,
                location,
                timestamp: at,
            }),
            ..Default::default()
        };
        let record = self.upsert(user, at, update)?;
        if forced_absent {
            warn!(user = %user, date = record.date.as_secs(), "checked out off campus, marked absent");
        } else {
            info!(user = %user, date = record.date.as_secs(), "checked out");
        }
        Ok(CheckOut {
            record,
            forced_absent,
        })
    }

    /// Check-in on behalf of the grant's subject, stamped with the proxy mark.
    pub fn proxy_check_in(
        &self,
        grant: &ProxyGrant,
        location: Location,
        at: Timestamp,
    ) -> Result<AttendanceRecord, VerificationError> {
        let update = AttendanceUpdate {
            proxy: Some(ProxyMark {
                is_proxy: true,
                proxy_user_id: grant.actor().clone(),
                reason: grant.reason().to_string(),
                approved: true,
            }),
            ..enter_update(location, at)
        };
        let record = self.upsert(grant.subject(), at, update)?;
        info!(
            user = %grant.subject(),
            proxy = %grant.actor(),
            date = record.date.as_secs(),
            "proxy check-in recorded"
        );
        Ok(record)
    }

    pub fn record_for(
        &self,
        user: &UserId,
        day: Timestamp,
    ) -> Result<Option<AttendanceRecord>, VerificationError> {
        Ok(self.store.get_attendance(user, day.start_of_day())?)
    }

    pub fn today(&self, user: &UserId) -> Result<Option<AttendanceRecord>, VerificationError> {
        self.record_for(user, self.clock.now())
    }

    /// All of the user's records, oldest first.
    pub fn history(&self, user: &UserId) -> Result<Vec<AttendanceRecord>, VerificationError> {
        Ok(self.store.attendance_history(user)?)
    }

    fn upsert(
        &self,
        user: &UserId,
        at: Timestamp,
        update: AttendanceUpdate,
    ) -> Result<AttendanceRecord, VerificationError> {
        Ok(self
            .store
            .upsert_attendance(user, at.start_of_day(), &update, self.clock.now())?)
    }
}

fn enter_update(location: Location, at: Timestamp) -> AttendanceUpdate {
    AttendanceUpdate {
        status: Some(AttendanceStatus::Present),
        check_in_at: Some(at),
        event: Some(GateEvent {
            kind: GateEventKind::Enter,
            location,
            timestamp: at,
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Principal;
    use crate::policy::SecurityPolicies;
    use presence_nullables::{NullClock, NullStore};
    use presence_store::GeofenceConfig;
    use presence_types::{
        GeoPoint, PipelineParams, Role, DEFAULT_GEOFENCE_CENTER, DEFAULT_GEOFENCE_RADIUS_M,
        SECS_PER_DAY,
    };

    const NOW: u64 = 20 * SECS_PER_DAY + 9 * 3600;

    struct Fixture {
        store: Arc<NullStore>,
        ledger: AttendanceLedger,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(NOW));
        let geofence = Arc::new(
            GeofenceEvaluator::load(
                store.clone(),
                clock.clone(),
                GeofenceConfig::seeded(DEFAULT_GEOFENCE_CENTER, DEFAULT_GEOFENCE_RADIUS_M),
            )
            .unwrap(),
        );
        let ledger = AttendanceLedger::new(store.clone(), clock, geofence);
        Fixture { store, ledger }
    }

    fn on_campus() -> Location {
        Location::new(DEFAULT_GEOFENCE_CENTER).with_accuracy(8.0)
    }

    fn off_campus() -> Location {
        Location::new(GeoPoint::new(16.5, 78.0))
    }

    #[test]
    fn repeated_check_ins_share_one_record() {
        let f = fixture();
        let user = UserId::new("s1");
        f.ledger.check_in(&user, on_campus(), Timestamp::new(NOW)).unwrap();
        let second = f
            .ledger
            .check_in(&user, on_campus(), Timestamp::new(NOW + 600))
            .unwrap();
        assert_eq!(f.store.attendance_count(), 1);
        assert_eq!(second.count_events(GateEventKind::Enter), 2);
        assert_eq!(second.status, AttendanceStatus::Present);
        assert_eq!(second.check_in_at, Some(Timestamp::new(NOW + 600)));
        assert_eq!(second.date, Timestamp::new(NOW).start_of_day());
    }

    #[test]
    fn next_day_gets_a_new_record() {
        let f = fixture();
        let user = UserId::new("s1");
        f.ledger.check_in(&user, on_campus(), Timestamp::new(NOW)).unwrap();
        f.ledger
            .check_in(&user, on_campus(), Timestamp::new(NOW + SECS_PER_DAY))
            .unwrap();
        let history = f.ledger.history(&user).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].date < history[1].date);
    }

    #[test]
    fn off_campus_check_out_forces_absent() {
        let f = fixture();
        let user = UserId::new("s1");
        f.ledger.check_in(&user, on_campus(), Timestamp::new(NOW)).unwrap();
        let out = f
            .ledger
            .check_out(&user, off_campus(), Timestamp::new(NOW + 3600))
            .unwrap();
        assert!(out.forced_absent);
        assert_eq!(out.record.status, AttendanceStatus::Absent);
        assert_eq!(out.record.check_out_at, Some(Timestamp::new(NOW + 3600)));
        assert_eq!(out.record.count_events(GateEventKind::Exit), 1);
    }

    #[test]
    fn on_campus_check_out_keeps_status() {
        let f = fixture();
        let user = UserId::new("s1");
        f.ledger.check_in(&user, on_campus(), Timestamp::new(NOW)).unwrap();
        let out = f
            .ledger
            .check_out(&user, on_campus(), Timestamp::new(NOW + 3600))
            .unwrap();
        assert!(!out.forced_absent);
        assert_eq!(out.record.status, AttendanceStatus::Present);
    }

    #[test]
    fn check_out_without_check_in_creates_absent_record() {
        let f = fixture();
        let user = UserId::new("s1");
        let out = f
            .ledger
            .check_out(&user, on_campus(), Timestamp::new(NOW))
            .unwrap();
        assert_eq!(out.record.status, AttendanceStatus::Absent);
        assert_eq!(out.record.check_in_at, None);
        assert_eq!(f.ledger.today(&user).unwrap(), Some(out.record));
    }

    #[test]
    fn proxy_check_in_stamps_the_mark() {
        let f = fixture();
        let policies = SecurityPolicies::new(f.store.clone(), &PipelineParams::default());
        let subject = UserId::new("s1");
        policies
            .set_proxy_opt_in(&Principal::new("s1", Role::Student), &subject, true)
            .unwrap();
        let grant = policies
            .authorize_proxy(&Principal::new("prof", Role::Hod), &subject, Some("lab duty".into()))
            .unwrap();
        let record = f
            .ledger
            .proxy_check_in(&grant, on_campus(), Timestamp::new(NOW))
            .unwrap();
        let mark = record.proxy.unwrap();
        assert!(mark.is_proxy && mark.approved);
        assert_eq!(mark.proxy_user_id, UserId::new("prof"));
        assert_eq!(mark.reason, "lab duty");
        assert_eq!(record.user_id, subject);
        assert_eq!(record.status, AttendanceStatus::Present);
    }
}
