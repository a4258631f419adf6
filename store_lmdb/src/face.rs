//! LMDB implementation of FaceStore, keyed by user id.

use presence_store::{FaceProfile, FaceStore, StoreError};
use presence_types::{Timestamp, UserId};

use crate::environment::get_value;
use crate::{LmdbError, LmdbStore};

impl FaceStore for LmdbStore {
    fn get_face_profile(&self, user: &UserId) -> Result<Option<FaceProfile>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.faces_db, &rtxn, user.as_str().as_bytes())?)
    }

    fn put_face_profile(&self, profile: &FaceProfile) -> Result<(), StoreError> {
        let bytes = bincode::serialize(profile).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.faces_db
            .put(&mut wtxn, profile.user_id.as_str().as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn record_face_match(&self, user: &UserId, now: Timestamp) -> Result<FaceProfile, StoreError> {
        let key = user.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut profile: FaceProfile = get_value(&self.faces_db, &wtxn, key)?
            .ok_or_else(|| LmdbError::NotFound(format!("face profile for {user}")))?;
        profile.last_verified_at = Some(now);
        profile.verification_count += 1;
        let bytes = bincode::serialize(&profile).map_err(LmdbError::from)?;
        self.faces_db
            .put(&mut wtxn, key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(profile)
    }
}
