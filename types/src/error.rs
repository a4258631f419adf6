//! Wire-level error codes returned to callers of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-readable rejection reason.
///
/// Every crate-level error maps onto exactly one code; clients switch on the
/// code, never on the human-readable message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LocationRequired,
    InvalidLocation,
    OutsideCampus,
    TokenNotFound,
    TokenExpired,
    TokenExhausted,
    FaceVerificationFailed,
    NoFaceRegistered,
    SecurityAlert,
    ProxyNotAllowed,
    UnauthorizedProxy,
    MissingInput,
    Unauthorized,
    InvalidGeofence,
    InvalidToken,
    StageTimeout,
    StorageError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LocationRequired => "LOCATION_REQUIRED",
            ErrorCode::InvalidLocation => "INVALID_LOCATION",
            ErrorCode::OutsideCampus => "OUTSIDE_CAMPUS",
            ErrorCode::TokenNotFound => "TOKEN_NOT_FOUND",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenExhausted => "TOKEN_EXHAUSTED",
            ErrorCode::FaceVerificationFailed => "FACE_VERIFICATION_FAILED",
            ErrorCode::NoFaceRegistered => "NO_FACE_REGISTERED",
            ErrorCode::SecurityAlert => "SECURITY_ALERT",
            ErrorCode::ProxyNotAllowed => "PROXY_NOT_ALLOWED",
            ErrorCode::UnauthorizedProxy => "UNAUTHORIZED_PROXY",
            ErrorCode::MissingInput => "MISSING_INPUT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidGeofence => "INVALID_GEOFENCE",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::StageTimeout => "STAGE_TIMEOUT",
            ErrorCode::StorageError => "STORAGE_ERROR",
        }
    }

    /// Server-side failures, as opposed to rejections of the request itself.
    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorCode::StorageError | ErrorCode::StageTimeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_as_str() {
        for code in [
            ErrorCode::LocationRequired,
            ErrorCode::OutsideCampus,
            ErrorCode::TokenExhausted,
            ErrorCode::FaceVerificationFailed,
            ErrorCode::UnauthorizedProxy,
            ErrorCode::StorageError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
