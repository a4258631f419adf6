//! Pipeline parameters: thresholds, fraud windows, token defaults and stage budgets.

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Geofence center used on cold start before any persisted configuration exists.
pub const DEFAULT_GEOFENCE_CENTER: GeoPoint = GeoPoint::new(15.797113, 78.077443);

/// Geofence radius (meters) used on cold start.
pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 1000.0;

/// Tunable parameters for every stage of the verification pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    // ── Face matching ────────────────────────────────────────────────────
    /// Similarity required by ad-hoc face verification.
    pub face_match_threshold: f64,

    /// Similarity required by the token-scan flow, which gates attendance directly.
    pub scan_face_threshold: f64,

    // ── Fraud detection ──────────────────────────────────────────────────
    /// Window (seconds) in which concurrently active sessions are counted.
    pub active_session_window_secs: u64,

    /// Active sessions tolerated inside the window before raising an alert.
    pub max_active_sessions: usize,

    /// Window (seconds) in which verification attempts are counted.
    pub attempt_window_secs: u64,

    /// Attempts tolerated inside the window when the user has no stored policy.
    pub default_max_verification_attempts: u32,

    // ── Tokens ───────────────────────────────────────────────────────────
    /// Lifetime of a newly issued token when the issuer does not specify one.
    pub default_token_ttl_secs: u64,

    /// Usage cap of a newly issued token when the issuer does not specify one.
    pub default_token_max_usage: u32,

    // ── Stages ───────────────────────────────────────────────────────────
    pub stage_timeouts: StageTimeouts,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            face_match_threshold: 0.6,
            scan_face_threshold: 0.7,
            active_session_window_secs: 30 * 60,
            max_active_sessions: 1,
            attempt_window_secs: 5 * 60,
            default_max_verification_attempts: 3,
            default_token_ttl_secs: 5 * 60,
            default_token_max_usage: 100,
            stage_timeouts: StageTimeouts::default(),
        }
    }
}

/// Per-stage time budgets, in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub geofence_ms: u64,
    pub token_ms: u64,
    pub face_ms: u64,
    pub fraud_ms: u64,
    pub policy_ms: u64,
    pub session_ms: u64,
    pub ledger_ms: u64,
}

impl StageTimeouts {
    pub fn geofence(&self) -> Duration {
        Duration::from_millis(self.geofence_ms)
    }

    pub fn token(&self) -> Duration {
        Duration::from_millis(self.token_ms)
    }

    pub fn face(&self) -> Duration {
        Duration::from_millis(self.face_ms)
    }

    pub fn fraud(&self) -> Duration {
        Duration::from_millis(self.fraud_ms)
    }

    pub fn policy(&self) -> Duration {
        Duration::from_millis(self.policy_ms)
    }

    pub fn session(&self) -> Duration {
        Duration::from_millis(self.session_ms)
    }

    pub fn ledger(&self) -> Duration {
        Duration::from_millis(self.ledger_ms)
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            geofence_ms: 2_000,
            token_ms: 2_000,
            face_ms: 5_000,
            fraud_ms: 2_000,
            policy_ms: 2_000,
            session_ms: 2_000,
            ledger_ms: 3_000,
        }
    }
}
