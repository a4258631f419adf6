//! LMDB implementation of SessionStore.
//!
//! Key format: `[subject] ++ [token] ++ started_be ++ session_id`, where `[s]`
//! is a length-prefixed component.
//! The open session of a pair is the newest non-terminal one under the pair
//! prefix; the upsert finds and rewrites it inside a single write transaction.

use presence_store::{SessionStore, SessionUpdate, StoreError, VerificationSession};
use presence_types::{SessionId, Timestamp, TokenId, UserId};

use crate::environment::scan_prefix;
use crate::keys::{session_key, session_pair_prefix, user_prefix};
use crate::{LmdbError, LmdbStore};

impl SessionStore for LmdbStore {
    fn upsert_session(
        &self,
        subject: &UserId,
        token: &TokenId,
        new_id: &SessionId,
        update: &SessionUpdate,
        now: Timestamp,
    ) -> Result<VerificationSession, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let open = scan_prefix::<VerificationSession>(
            &self.sessions_db,
            &wtxn,
            &session_pair_prefix(subject, token),
        )?
        .into_iter()
        .rev()
        .find(|(_, s)| !s.status.is_terminal());

        let (key, mut session) = match open {
            Some(found) => found,
            None => (
                session_key(subject, token, now, new_id),
                VerificationSession::open(new_id.clone(), subject.clone(), token.clone(), now),
            ),
        };
        session.apply(update, now);
        let bytes = bincode::serialize(&session).map_err(LmdbError::from)?;
        self.sessions_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(session)
    }

    fn get_open_session(
        &self,
        subject: &UserId,
        token: &TokenId,
    ) -> Result<Option<VerificationSession>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let sessions = scan_prefix::<VerificationSession>(
            &self.sessions_db,
            &rtxn,
            &session_pair_prefix(subject, token),
        )?;
        Ok(sessions
            .into_iter()
            .rev()
            .map(|(_, s)| s)
            .find(|s| !s.status.is_terminal()))
    }

    fn sessions_since(
        &self,
        subject: &UserId,
        since: Timestamp,
    ) -> Result<Vec<VerificationSession>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let sessions =
            scan_prefix::<VerificationSession>(&self.sessions_db, &rtxn, &user_prefix(subject))?;
        Ok(sessions
            .into_iter()
            .map(|(_, s)| s)
            .filter(|s| s.updated_at >= since)
            .collect())
    }
}
