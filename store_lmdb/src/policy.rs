//! LMDB implementation of PolicyStore, keyed by user id.

use presence_store::{PolicyStore, SecurityPolicy, StoreError};
use presence_types::UserId;

use crate::environment::get_value;
use crate::{LmdbError, LmdbStore};

impl PolicyStore for LmdbStore {
    fn get_policy(&self, user: &UserId) -> Result<Option<SecurityPolicy>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.policies_db, &rtxn, user.as_str().as_bytes())?)
    }

    fn put_policy(&self, user: &UserId, policy: &SecurityPolicy) -> Result<(), StoreError> {
        let bytes = bincode::serialize(policy).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.policies_db
            .put(&mut wtxn, user.as_str().as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
