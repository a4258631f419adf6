//! LMDB implementation of TokenStore.
//!
//! `consume_token` reads, checks and writes back inside one write transaction,
//! so concurrent consumers are serialized by LMDB's single-writer lock and
//! `usage_count` can never pass `max_usage`. `release_token` undoes one use the
//! same way.

use presence_store::{ConsumeOutcome, ScanToken, StoreError, TokenStore};
use presence_types::{Timestamp, TokenId};

use crate::environment::get_value;
use crate::{LmdbError, LmdbStore};

impl TokenStore for LmdbStore {
    fn put_token(&self, token: &ScanToken) -> Result<(), StoreError> {
        let key = token.id.as_str().as_bytes();
        let bytes = bincode::serialize(token).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .tokens_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("token {}", token.id)));
        }
        self.tokens_db
            .put(&mut wtxn, key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_token(&self, id: &TokenId) -> Result<Option<ScanToken>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.tokens_db, &rtxn, id.as_str().as_bytes())?)
    }

    fn consume_token(&self, id: &TokenId, now: Timestamp) -> Result<ConsumeOutcome, StoreError> {
        let key = id.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut token: ScanToken = match get_value(&self.tokens_db, &wtxn, key)? {
            Some(token) => token,
            None => return Ok(ConsumeOutcome::NotFound),
        };
        let outcome = token.consume(now);
        if matches!(outcome, ConsumeOutcome::Consumed(_)) {
            let bytes = bincode::serialize(&token).map_err(LmdbError::from)?;
            self.tokens_db
                .put(&mut wtxn, key, &bytes)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
        }
        Ok(outcome)
    }

    fn release_token(&self, id: &TokenId) -> Result<Option<ScanToken>, StoreError> {
        let key = id.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut token: ScanToken = match get_value(&self.tokens_db, &wtxn, key)? {
            Some(token) => token,
            None => return Ok(None),
        };
        if token.release() {
            let bytes = bincode::serialize(&token).map_err(LmdbError::from)?;
            self.tokens_db
                .put(&mut wtxn, key, &bytes)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
        }
        Ok(Some(token))
    }
}
