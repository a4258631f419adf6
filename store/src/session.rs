//! Verification session storage.
//!
//! A session is the attempt sequence of one subject against one scan token.
//! At most one non-terminal session exists per `(subject, token)` pair; retries
//! update it, and a new one opens only after the previous one terminated.

use crate::StoreError;
use presence_types::{GeoPoint, SessionId, Timestamp, TokenId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
    Suspicious,
}

impl SessionStatus {
    /// Completed and expired sessions accept no further attempts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Expired)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityFlag {
    FaceMismatch,
    MultipleSessions,
    RapidScanning,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub flag: SecurityFlag,
    pub detail: String,
    pub raised_at: Timestamp,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub face_score: Option<f64>,
    pub face_verified: bool,
    pub location_verified: bool,
}

/// One scan attempt, whatever its outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub timestamp: Timestamp,
    pub face_score: Option<f64>,
    pub location: Option<GeoPoint>,
    pub device_info: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub session_id: SessionId,
    pub token_id: TokenId,
    pub subject: UserId,
    pub status: SessionStatus,
    pub verification: VerificationSummary,
    pub security_flags: Vec<FlagRecord>,
    pub attempts: Vec<Attempt>,
    pub started_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Partial update applied to a session by [`SessionStore::upsert_session`].
///
/// `None` fields leave the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionUpdate {
    pub attempt: Option<Attempt>,
    pub status: Option<SessionStatus>,
    pub flag: Option<FlagRecord>,
    pub verification: Option<VerificationSummary>,
}

impl VerificationSession {
    /// A fresh, active session with no attempts.
    pub fn open(session_id: SessionId, subject: UserId, token_id: TokenId, now: Timestamp) -> Self {
        Self {
            session_id,
            token_id,
            subject,
            status: SessionStatus::Active,
            verification: VerificationSummary::default(),
            security_flags: Vec::new(),
            attempts: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: &SessionUpdate, now: Timestamp) {
        if let Some(attempt) = &update.attempt {
            self.attempts.push(attempt.clone());
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(flag) = &update.flag {
            self.security_flags.push(flag.clone());
        }
        if let Some(verification) = &update.verification {
            self.verification = verification.clone();
        }
        self.updated_at = now;
    }

    /// Attempts recorded at or after `since`.
    pub fn attempts_since(&self, since: Timestamp) -> usize {
        self.attempts.iter().filter(|a| a.timestamp >= since).count()
    }
}

/// Trait for verification session storage.
pub trait SessionStore {
    /// Apply `update` to the open session of `(subject, token)`.
    ///
    /// When no open session exists (none yet, or the latest one is terminal) a
    /// new active session with id `new_id` is created first. The lookup,
    /// creation and update happen atomically. Returns the session as stored.
    fn upsert_session(
        &self,
        subject: &UserId,
        token: &TokenId,
        new_id: &SessionId,
        update: &SessionUpdate,
        now: Timestamp,
    ) -> Result<VerificationSession, StoreError>;

    /// The open (non-terminal) session of `(subject, token)`, if any.
    fn get_open_session(
        &self,
        subject: &UserId,
        token: &TokenId,
    ) -> Result<Option<VerificationSession>, StoreError>;

    /// Every session of `subject` updated at or after `since`.
    fn sessions_since(
        &self,
        subject: &UserId,
        since: Timestamp,
    ) -> Result<Vec<VerificationSession>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(at: u64) -> Attempt {
        Attempt {
            timestamp: Timestamp::new(at),
            face_score: Some(0.9),
            location: None,
            device_info: None,
        }
    }

    #[test]
    fn apply_appends_and_overwrites() {
        let mut s = VerificationSession::open(
            SessionId::new("ses_1"),
            UserId::new("u1"),
            TokenId::new("t1"),
            Timestamp::new(100),
        );
        s.apply(
            &SessionUpdate {
                attempt: Some(attempt(110)),
                ..Default::default()
            },
            Timestamp::new(110),
        );
        s.apply(
            &SessionUpdate {
                attempt: Some(attempt(120)),
                status: Some(SessionStatus::Suspicious),
                flag: Some(FlagRecord {
                    flag: SecurityFlag::FaceMismatch,
                    detail: "score 0.12".into(),
                    raised_at: Timestamp::new(120),
                }),
                verification: None,
            },
            Timestamp::new(120),
        );
        assert_eq!(s.attempts.len(), 2);
        assert_eq!(s.status, SessionStatus::Suspicious);
        assert_eq!(s.security_flags.len(), 1);
        assert_eq!(s.updated_at, Timestamp::new(120));
        assert_eq!(s.started_at, Timestamp::new(100));
        assert_eq!(s.attempts_since(Timestamp::new(115)), 1);
    }

    #[test]
    fn only_completed_and_expired_are_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Suspicious.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
    }

    #[test]
    fn bincode_roundtrip() {
        let s = VerificationSession::open(
            SessionId::new("ses_2"),
            UserId::new("u2"),
            TokenId::new("t2"),
            Timestamp::new(5),
        );
        let bytes = bincode::serialize(&s).unwrap();
        let back: VerificationSession = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, s);
    }
}
