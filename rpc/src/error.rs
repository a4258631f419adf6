//! RPC error types and the HTTP status mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use presence_types::ErrorCode;
use presence_verification::{Envelope, ErrorBody, VerificationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("missing x-user-id header")]
    MissingActor,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl RpcError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::MissingActor => ErrorCode::Unauthorized,
            RpcError::InvalidRequest(_) => ErrorCode::MissingInput,
            RpcError::Verification(e) => e.code(),
            RpcError::Server(_) => ErrorCode::StorageError,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            RpcError::Verification(e) => ErrorBody::from(e),
            RpcError::Server(_) => ErrorBody {
                message: "internal server error".to_string(),
                code: self.code(),
                details: None,
            },
            other => ErrorBody {
                message: other.to_string(),
                code: other.code(),
                details: None,
            },
        }
    }
}

impl From<JsonRejection> for RpcError {
    fn from(rejection: JsonRejection) -> Self {
        RpcError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for RpcError {
    fn from(rejection: QueryRejection) -> Self {
        RpcError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for RpcError {
    fn from(rejection: PathRejection) -> Self {
        RpcError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = status_for(self.code());
        (status, Json(Envelope::<()>::err(self.body()))).into_response()
    }
}

/// HTTP status for a rejection code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::LocationRequired
        | ErrorCode::InvalidLocation
        | ErrorCode::MissingInput
        | ErrorCode::InvalidToken
        | ErrorCode::InvalidGeofence => StatusCode::BAD_REQUEST,
        ErrorCode::FaceVerificationFailed => StatusCode::UNAUTHORIZED,
        ErrorCode::Unauthorized
        | ErrorCode::UnauthorizedProxy
        | ErrorCode::ProxyNotAllowed
        | ErrorCode::OutsideCampus
        | ErrorCode::SecurityAlert => StatusCode::FORBIDDEN,
        ErrorCode::TokenNotFound | ErrorCode::NoFaceRegistered => StatusCode::NOT_FOUND,
        ErrorCode::TokenExhausted => StatusCode::CONFLICT,
        ErrorCode::TokenExpired => StatusCode::GONE,
        ErrorCode::StageTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_codes_are_5xx() {
        assert!(status_for(ErrorCode::StorageError).is_server_error());
        assert!(status_for(ErrorCode::StageTimeout).is_server_error());
        assert_eq!(status_for(ErrorCode::TokenExhausted), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCode::OutsideCampus), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_actor_is_unauthorized() {
        let err = RpcError::MissingActor;
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert_eq!(err.body().message, "missing x-user-id header");
    }

    #[test]
    fn io_failures_do_not_leak_details() {
        let err = RpcError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
        assert_eq!(err.body().message, "internal server error");
    }
}
