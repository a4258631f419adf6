//! Face profile storage.

use crate::StoreError;
use presence_types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// The stored encoding of a user's registered face image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceProfile {
    pub user_id: UserId,
    /// Opaque, reproducible digest of the registration image.
    pub encoding: String,
    pub registered_at: Timestamp,
    pub last_verified_at: Option<Timestamp>,
    pub verification_count: u64,
}

pub trait FaceStore {
    fn get_face_profile(&self, user: &UserId) -> Result<Option<FaceProfile>, StoreError>;

    /// Create or replace the profile of `profile.user_id`.
    fn put_face_profile(&self, profile: &FaceProfile) -> Result<(), StoreError>;

    /// Atomically stamp `last_verified_at = now` and increment
    /// `verification_count`. Fails with [`StoreError::NotFound`] without a profile.
    fn record_face_match(&self, user: &UserId, now: Timestamp) -> Result<FaceProfile, StoreError>;
}
