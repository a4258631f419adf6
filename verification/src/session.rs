//! Verification sessions: the attempt history of one (subject, token) pair.

use crate::error::VerificationError;
use presence_crypto::random_id;
use presence_store::{
    Attempt, FlagRecord, PresenceStore, SecurityFlag, SessionStatus, SessionUpdate,
    VerificationSession, VerificationSummary,
};
use presence_types::{Clock, SessionId, TokenId, UserId};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SessionRecorder {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append a passing attempt to the open session, creating it `active` if needed.
    pub fn record_attempt(
        &self,
        subject: &UserId,
        token: &TokenId,
        attempt: Attempt,
        verification: VerificationSummary,
    ) -> Result<VerificationSession, VerificationError> {
        let session = self.upsert(
            subject,
            token,
            SessionUpdate {
                attempt: Some(attempt),
                verification: Some(verification),
                ..Default::default()
            },
        )?;
        debug!(
            session = %session.session_id,
            attempts = session.attempts.len(),
            "verification attempt recorded"
        );
        Ok(session)
    }

    /// Mark the open session suspicious and attach `flag`.
    pub fn flag(
        &self,
        subject: &UserId,
        token: &TokenId,
        flag: SecurityFlag,
        detail: String,
        attempt: Option<Attempt>,
        verification: Option<VerificationSummary>,
    ) -> Result<VerificationSession, VerificationError> {
        let session = self.upsert(
            subject,
            token,
            SessionUpdate {
                attempt,
                status: Some(SessionStatus::Suspicious),
                flag: Some(FlagRecord {
                    flag,
                    detail,
                    raised_at: self.clock.now(),
                }),
                verification,
            },
        )?;
        warn!(session = %session.session_id, subject = %subject, ?flag, "session flagged");
        Ok(session)
    }

    /// Close the open session as completed.
    pub fn complete(
        &self,
        subject: &UserId,
        token: &TokenId,
    ) -> Result<VerificationSession, VerificationError> {
        self.upsert(
            subject,
            token,
            SessionUpdate {
                status: Some(SessionStatus::Completed),
                ..Default::default()
            },
        )
    }

    pub fn open_session(
        &self,
        subject: &UserId,
        token: &TokenId,
    ) -> Result<Option<VerificationSession>, VerificationError> {
        Ok(self.store.get_open_session(subject, token)?)
    }

    fn upsert(
        &self,
        subject: &UserId,
        token: &TokenId,
        update: SessionUpdate,
    ) -> Result<VerificationSession, VerificationError> {
        let new_id = SessionId::new(random_id("ses_")?);
        Ok(self
            .store
            .upsert_session(subject, token, &new_id, &update, self.clock.now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_nullables::{NullClock, NullStore};
    use presence_types::Timestamp;

    fn attempt(at: u64) -> Attempt {
        Attempt {
            timestamp: Timestamp::new(at),
            face_score: Some(1.0),
            location: None,
            device_info: Some("pixel".into()),
        }
    }

    #[test]
    fn retries_update_the_same_session() {
        let store = Arc::new(NullStore::new());
        let rec = SessionRecorder::new(store.clone(), Arc::new(NullClock::new(100)));
        let (u, t) = (UserId::new("s1"), TokenId::new("qr_1"));
        let first = rec
            .record_attempt(&u, &t, attempt(100), VerificationSummary::default())
            .unwrap();
        let second = rec
            .record_attempt(&u, &t, attempt(110), VerificationSummary::default())
            .unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.attempts.len(), 2);
        assert_eq!(second.status, SessionStatus::Active);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn flagged_session_stays_open_and_suspicious() {
        let store = Arc::new(NullStore::new());
        let rec = SessionRecorder::new(store.clone(), Arc::new(NullClock::new(100)));
        let (u, t) = (UserId::new("s1"), TokenId::new("qr_1"));
        rec.flag(&u, &t, SecurityFlag::FaceMismatch, "score 0.10".into(), Some(attempt(100)), None)
            .unwrap();
        let retried = rec
            .record_attempt(&u, &t, attempt(120), VerificationSummary::default())
            .unwrap();
        assert_eq!(retried.status, SessionStatus::Suspicious);
        assert_eq!(retried.security_flags.len(), 1);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn completed_session_is_not_reused() {
        let store = Arc::new(NullStore::new());
        let rec = SessionRecorder::new(store.clone(), Arc::new(NullClock::new(100)));
        let (u, t) = (UserId::new("s1"), TokenId::new("qr_1"));
        rec.record_attempt(&u, &t, attempt(100), VerificationSummary::default())
            .unwrap();
        let done = rec.complete(&u, &t).unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(rec.open_session(&u, &t).unwrap().is_none());
        let next = rec
            .record_attempt(&u, &t, attempt(130), VerificationSummary::default())
            .unwrap();
        assert_ne!(next.session_id, done.session_id);
        assert_eq!(store.session_count(), 2);
    }
}
