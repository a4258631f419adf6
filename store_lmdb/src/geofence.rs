//! LMDB implementation of GeofenceStore. A single key holds the current configuration.

use presence_store::{next_geofence, GeofenceConfig, GeofenceStore, StoreError};
use presence_types::{GeoPoint, Timestamp};

use crate::environment::get_value;
use crate::{LmdbError, LmdbStore};

const CURRENT_KEY: &[u8] = b"current";

impl GeofenceStore for LmdbStore {
    fn get_geofence(&self) -> Result<Option<GeofenceConfig>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(get_value(&self.geofence_db, &rtxn, CURRENT_KEY)?)
    }

    fn replace_geofence(
        &self,
        center: GeoPoint,
        radius_m: f64,
        now: Timestamp,
    ) -> Result<GeofenceConfig, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let previous: Option<GeofenceConfig> = get_value(&self.geofence_db, &wtxn, CURRENT_KEY)?;
        let config = next_geofence(previous.as_ref(), center, radius_m, now);
        let bytes = bincode::serialize(&config).map_err(LmdbError::from)?;
        self.geofence_db
            .put(&mut wtxn, CURRENT_KEY, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(config)
    }
}
