//! Geofence configuration storage.

use crate::StoreError;
use presence_types::{GeoPoint, Timestamp};
use serde::{Deserialize, Serialize};

/// Where the active geofence came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceSource {
    /// Seeded from configuration; nothing persisted yet.
    Default,
    /// Loaded from (or just written to) persistent storage.
    Persisted,
}

/// The circular authorized area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeofenceConfig {
    pub center: GeoPoint,
    pub radius_m: f64,
    pub source: GeofenceSource,
    /// Incremented on every persisted replacement.
    pub revision: u64,
    pub updated_at: Timestamp,
}

impl GeofenceConfig {
    /// The cold-start configuration, before persistence has been consulted.
    pub fn seeded(center: GeoPoint, radius_m: f64) -> Self {
        Self {
            center,
            radius_m,
            source: GeofenceSource::Default,
            revision: 0,
            updated_at: Timestamp::EPOCH,
        }
    }

    /// `radius_m > 0` (and finite) with a valid center.
    pub fn is_valid(&self) -> bool {
        self.center.is_valid() && self.radius_m.is_finite() && self.radius_m > 0.0
    }
}

/// Single-record store for the geofence.
pub trait GeofenceStore {
    fn get_geofence(&self) -> Result<Option<GeofenceConfig>, StoreError>;

    /// Replace the persisted geofence in one read-modify-write step.
    ///
    /// The stored record gets `revision = previous + 1` (1 when nothing was
    /// stored) and `source = Persisted`. Returns the record as written.
    fn replace_geofence(
        &self,
        center: GeoPoint,
        radius_m: f64,
        now: Timestamp,
    ) -> Result<GeofenceConfig, StoreError>;
}

/// Build the record that replaces `previous`. Shared by all backends.
pub fn next_geofence(
    previous: Option<&GeofenceConfig>,
    center: GeoPoint,
    radius_m: f64,
    now: Timestamp,
) -> GeofenceConfig {
    GeofenceConfig {
        center,
        radius_m,
        source: GeofenceSource::Persisted,
        revision: previous.map_or(1, |p| p.revision + 1),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_negative_radius_is_invalid() {
        let center = GeoPoint::new(15.797113, 78.077443);
        assert!(GeofenceConfig::seeded(center, 1000.0).is_valid());
        assert!(!GeofenceConfig::seeded(center, 0.0).is_valid());
        assert!(!GeofenceConfig::seeded(center, -5.0).is_valid());
        assert!(!GeofenceConfig::seeded(center, f64::NAN).is_valid());
        assert!(!GeofenceConfig::seeded(GeoPoint::new(91.0, 0.0), 10.0).is_valid());
    }

    #[test]
    fn revisions_increase_from_one() {
        let c = GeoPoint::new(1.0, 2.0);
        let first = next_geofence(None, c, 50.0, Timestamp::new(10));
        assert_eq!(first.revision, 1);
        assert_eq!(first.source, GeofenceSource::Persisted);
        let second = next_geofence(Some(&first), c, 75.0, Timestamp::new(20));
        assert_eq!(second.revision, 2);
        assert_eq!(second.radius_m, 75.0);
    }
}
