//! The structured result handed to callers: `{success, data?, error?{message, code}}`.

use crate::error::VerificationError;
use presence_types::ErrorCode;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&VerificationError> for ErrorBody {
    fn from(e: &VerificationError) -> Self {
        Self {
            message: e.public_message(),
            code: e.code(),
            details: e.details(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

impl<T> From<Result<T, VerificationError>> for Envelope<T> {
    fn from(result: Result<T, VerificationError>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::err(ErrorBody::from(&e)),
        }
    }
}
