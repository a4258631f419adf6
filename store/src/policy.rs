//! Per-user security policy storage.

use crate::StoreError;
use presence_types::UserId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Token scans must pass face verification.
    pub require_face_verification: bool,
    /// The user opted in to attendance marked by authorized staff.
    pub allow_proxy_attendance: bool,
    /// Attempts tolerated inside the fraud attempt window.
    pub max_verification_attempts: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            require_face_verification: true,
            allow_proxy_attendance: false,
            max_verification_attempts: 3,
        }
    }
}

pub trait PolicyStore {
    fn get_policy(&self, user: &UserId) -> Result<Option<SecurityPolicy>, StoreError>;

    fn put_policy(&self, user: &UserId, policy: &SecurityPolicy) -> Result<(), StoreError>;
}
