//! LMDB environment setup.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::keys::increment_prefix;
use crate::LmdbError;

/// Default map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 8;

/// The environment and every database handle. Implements all storage traits.
#[derive(Clone)]
pub struct LmdbStore {
    pub(crate) env: Arc<Env>,
    pub(crate) geofence_db: Database<Bytes, Bytes>,
    pub(crate) tokens_db: Database<Bytes, Bytes>,
    pub(crate) sessions_db: Database<Bytes, Bytes>,
    pub(crate) attendance_db: Database<Bytes, Bytes>,
    pub(crate) faces_db: Database<Bytes, Bytes>,
    pub(crate) policies_db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create an environment in `path`, creating the directory if needed.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per process for this path and
        // the memory map is never handed out beyond heed's transaction guards.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let geofence_db = env.create_database(&mut wtxn, Some("geofence"))?;
        let tokens_db = env.create_database(&mut wtxn, Some("tokens"))?;
        let sessions_db = env.create_database(&mut wtxn, Some("sessions"))?;
        let attendance_db = env.create_database(&mut wtxn, Some("attendance"))?;
        let faces_db = env.create_database(&mut wtxn, Some("faces"))?;
        let policies_db = env.create_database(&mut wtxn, Some("policies"))?;
        wtxn.commit()?;

        info!(path = %path.display(), map_size, "LMDB environment opened");
        Ok(Self {
            env: Arc::new(env),
            geofence_db,
            tokens_db,
            sessions_db,
            attendance_db,
            faces_db,
            policies_db,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}

/// Read and decode one value.
pub(crate) fn get_value<T: DeserializeOwned>(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn,
    key: &[u8],
) -> Result<Option<T>, LmdbError> {
    match db.get(txn, key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        None => Ok(None),
    }
}

/// Prefix range-scan: decode every `(key, value)` whose key starts with `prefix`, in key order.
pub(crate) fn scan_prefix<T: DeserializeOwned>(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, T)>, LmdbError> {
    let mut upper = prefix.to_vec();
    increment_prefix(&mut upper);
    let bounds = (Bound::Included(prefix), Bound::Excluded(upper.as_slice()));
    let iter = db.range(txn, &bounds)?;
    let mut results = Vec::new();
    for result in iter {
        let (key, val) = result?;
        results.push((key.to_vec(), bincode::deserialize(val)?));
    }
    Ok(results)
}
