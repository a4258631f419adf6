use crate::fraud::Severity;
use crate::stage::Stage;
use presence_crypto::IdError;
use presence_store::StoreError;
use presence_types::{ErrorCode, LocationError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("location is required")]
    LocationRequired,

    #[error("location coordinates are invalid")]
    InvalidLocation,

    #[error("outside campus: {distance_m:.1} m from center, radius {radius_m:.1} m")]
    OutsideCampus { distance_m: f64, radius_m: f64 },

    #[error("token {0} not found or inactive")]
    TokenNotFound(String),

    #[error("token {0} has expired")]
    TokenExpired(String),

    #[error("token {0} reached its usage limit")]
    TokenExhausted(String),

    #[error("invalid token request: {0}")]
    InvalidToken(String),

    #[error("face verification failed: score {score:.2} below {threshold:.2}")]
    FaceVerificationFailed { score: f64, threshold: f64 },

    #[error("no face registered for {0}")]
    NoFaceRegistered(String),

    #[error("security alert: {reason}, manual verification required")]
    SecurityAlert { reason: String, severity: Severity },

    #[error("{0} has not opted in to proxy attendance")]
    ProxyNotAllowed(String),

    #[error("{0} is not authorized to mark proxy attendance")]
    UnauthorizedProxy(String),

    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("{actor} is not authorized to {action}")]
    Unauthorized { actor: String, action: &'static str },

    #[error("invalid geofence: {0}")]
    InvalidGeofence(String),

    #[error("{0} stage timed out")]
    StageTimeout(Stage),

    #[error("{stage} stage aborted: {reason}")]
    StageAborted { stage: Stage, reason: String },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("identifier generation failed: {0}")]
    Id(#[from] IdError),
}

impl VerificationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VerificationError::LocationRequired => ErrorCode::LocationRequired,
            VerificationError::InvalidLocation => ErrorCode::InvalidLocation,
            VerificationError::OutsideCampus { .. } => ErrorCode::OutsideCampus,
            VerificationError::TokenNotFound(_) => ErrorCode::TokenNotFound,
            VerificationError::TokenExpired(_) => ErrorCode::TokenExpired,
            VerificationError::TokenExhausted(_) => ErrorCode::TokenExhausted,
            VerificationError::InvalidToken(_) => ErrorCode::InvalidToken,
            VerificationError::FaceVerificationFailed { .. } => ErrorCode::FaceVerificationFailed,
            VerificationError::NoFaceRegistered(_) => ErrorCode::NoFaceRegistered,
            VerificationError::SecurityAlert { .. } => ErrorCode::SecurityAlert,
            VerificationError::ProxyNotAllowed(_) => ErrorCode::ProxyNotAllowed,
            VerificationError::UnauthorizedProxy(_) => ErrorCode::UnauthorizedProxy,
            VerificationError::MissingInput(_) => ErrorCode::MissingInput,
            VerificationError::Unauthorized { .. } => ErrorCode::Unauthorized,
            VerificationError::InvalidGeofence(_) => ErrorCode::InvalidGeofence,
            VerificationError::StageTimeout(_) => ErrorCode::StageTimeout,
            VerificationError::StageAborted { .. }
            | VerificationError::Store(_)
            | VerificationError::Id(_) => ErrorCode::StorageError,
        }
    }

    /// Message safe to hand to clients. Internal failures are not described.
    pub fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::StorageError => "internal storage error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured hints for the client, where the rejection carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            VerificationError::OutsideCampus {
                distance_m,
                radius_m,
            } => Some(json!({ "distance_m": distance_m, "radius_m": radius_m })),
            VerificationError::FaceVerificationFailed { score, threshold } => {
                Some(json!({ "score": score, "threshold": threshold }))
            }
            VerificationError::SecurityAlert { severity, .. } => {
                Some(json!({ "severity": severity }))
            }
            _ => None,
        }
    }
}

impl From<LocationError> for VerificationError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::Missing => VerificationError::LocationRequired,
            LocationError::Invalid => VerificationError::InvalidLocation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_share_one_code_and_hide_details() {
        let err = VerificationError::from(StoreError::Backend("disk on fire".into()));
        assert_eq!(err.code(), ErrorCode::StorageError);
        assert_eq!(err.public_message(), "internal storage error");
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn face_failure_exposes_score() {
        let err = VerificationError::FaceVerificationFailed {
            score: 0.25,
            threshold: 0.7,
        };
        let details = err.details().unwrap();
        assert_eq!(details["score"], 0.25);
        assert_eq!(details["threshold"], 0.7);
        assert_eq!(err.code(), ErrorCode::FaceVerificationFailed);
    }

    #[test]
    fn location_errors_map_to_taxonomy() {
        assert_eq!(
            VerificationError::from(LocationError::Missing).code(),
            ErrorCode::LocationRequired
        );
        assert_eq!(
            VerificationError::from(LocationError::Invalid).code(),
            ErrorCode::InvalidLocation
        );
    }
}
