//! Suspicious-activity rules over a user's recent verification sessions.
//!
//! The detector only reads. What happens to a suspicious attempt is the
//! orchestrator's decision.

use crate::error::VerificationError;
use presence_store::{PresenceStore, SecurityFlag, SessionStatus};
use presence_types::{Clock, PipelineParams, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FraudAssessment {
    pub suspicious: bool,
    pub reason: Option<String>,
    pub severity: Option<Severity>,
    #[serde(skip)]
    pub flag: Option<SecurityFlag>,
}

impl FraudAssessment {
    pub fn clear() -> Self {
        Self {
            suspicious: false,
            reason: None,
            severity: None,
            flag: None,
        }
    }

    fn alert(flag: SecurityFlag, reason: &str, severity: Severity) -> Self {
        Self {
            suspicious: true,
            reason: Some(reason.to_string()),
            severity: Some(severity),
            flag: Some(flag),
        }
    }
}

pub struct FraudDetector {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    active_window_secs: u64,
    max_active_sessions: usize,
    attempt_window_secs: u64,
}

impl FraudDetector {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, params: &PipelineParams) -> Self {
        Self {
            store,
            clock,
            active_window_secs: params.active_session_window_secs,
            max_active_sessions: params.max_active_sessions,
            attempt_window_secs: params.attempt_window_secs,
        }
    }

    /// Evaluate both rules for `user`. Multiple active sessions wins over rapid scanning.
    ///
    /// `max_attempts` is the user's tolerated attempt count inside the attempt window.
    pub fn check(&self, user: &UserId, max_attempts: u32) -> Result<FraudAssessment, VerificationError> {
        let now = self.clock.now();

        let active_since = now.minus_secs(self.active_window_secs);
        let active = self
            .store
            .sessions_since(user, active_since)?
            .into_iter()
            .filter(|s| s.status == SessionStatus::Active && s.started_at >= active_since)
            .count();
        if active > self.max_active_sessions {
            warn!(user = %user, active, "multiple active sessions");
            return Ok(FraudAssessment::alert(
                SecurityFlag::MultipleSessions,
                "multiple active sessions",
                Severity::High,
            ));
        }

        let attempts_since = now.minus_secs(self.attempt_window_secs);
        let attempts: usize = self
            .store
            .sessions_since(user, attempts_since)?
            .iter()
            .map(|s| s.attempts_since(attempts_since))
            .sum();
        if attempts > max_attempts as usize {
            warn!(user = %user, attempts, max_attempts, "too many scanning attempts");
            return Ok(FraudAssessment::alert(
                SecurityFlag::RapidScanning,
                "too many scanning attempts",
                Severity::Medium,
            ));
        }

        Ok(FraudAssessment::clear())
    }
}
