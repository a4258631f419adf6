//! Geofence evaluation against a cached, atomically replaceable configuration.
//!
//! The evaluator owns the current [`GeofenceConfig`] as an immutable snapshot.
//! Readers clone the `Arc`; an update persists the new configuration first and
//! then swaps the pointer, so no reader ever sees a half-written config.

use crate::error::VerificationError;
use presence_store::{GeofenceConfig, PresenceStore, StoreError};
use presence_types::{Clock, GeoPoint};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points (haversine).
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// The point reached from `origin` after travelling `distance_m` along `bearing_deg`.
pub fn destination_point(origin: &GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lng.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
    GeoPoint::new(phi2.to_degrees(), lambda2.to_degrees())
}

/// Outcome of one geofence evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeofenceDecision {
    pub inside: bool,
    /// `None` when the point was malformed and no distance could be computed.
    pub distance_m: Option<f64>,
    pub radius_m: f64,
    pub revision: u64,
}

pub struct GeofenceEvaluator {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    seed: GeofenceConfig,
    current: RwLock<Arc<GeofenceConfig>>,
}

impl GeofenceEvaluator {
    /// Build an evaluator, preferring the persisted configuration over `seed`.
    pub fn load(
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
        seed: GeofenceConfig,
    ) -> Result<Self, StoreError> {
        let evaluator = Self {
            store,
            clock,
            current: RwLock::new(Arc::new(seed.clone())),
            seed,
        };
        evaluator.reload()?;
        Ok(evaluator)
    }

    /// Refresh the cached snapshot from persistence.
    pub fn reload(&self) -> Result<Arc<GeofenceConfig>, StoreError> {
        let config = match self.store.get_geofence()? {
            Some(persisted) => persisted,
            None => self.seed.clone(),
        };
        Ok(self.publish(config))
    }

    /// The current configuration.
    pub fn snapshot(&self) -> Arc<GeofenceConfig> {
        let guard = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    pub fn evaluate(&self, point: &GeoPoint) -> GeofenceDecision {
        let config = self.snapshot();
        let decision = if point.is_valid() {
            let distance = distance_meters(point, &config.center);
            GeofenceDecision {
                inside: distance <= config.radius_m,
                distance_m: Some(distance),
                radius_m: config.radius_m,
                revision: config.revision,
            }
        } else {
            GeofenceDecision {
                inside: false,
                distance_m: None,
                radius_m: config.radius_m,
                revision: config.revision,
            }
        };
        debug!(
            lat = point.lat,
            lng = point.lng,
            distance_m = ?decision.distance_m,
            radius_m = decision.radius_m,
            inside = decision.inside,
            revision = decision.revision,
            "geofence evaluated"
        );
        decision
    }

    /// Malformed points are outside.
    pub fn is_inside(&self, point: &GeoPoint) -> bool {
        self.evaluate(point).inside
    }

    /// Validate, persist and publish a new configuration.
    pub fn update(
        &self,
        center: GeoPoint,
        radius_m: f64,
    ) -> Result<Arc<GeofenceConfig>, VerificationError> {
        if !center.is_valid() {
            return Err(VerificationError::InvalidGeofence(format!(
                "center ({}, {}) is not a valid coordinate",
                center.lat, center.lng
            )));
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(VerificationError::InvalidGeofence(format!(
                "radius {radius_m} must be a positive number of meters"
            )));
        }
        let persisted = self
            .store
            .replace_geofence(center, radius_m, self.clock.now())?;
        info!(
            lat = center.lat,
            lng = center.lng,
            radius_m,
            revision = persisted.revision,
            "geofence updated"
        );
        Ok(self.publish(persisted))
    }

    fn publish(&self, config: GeofenceConfig) -> Arc<GeofenceConfig> {
        let snapshot = Arc::new(config);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::clone(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_nullables::{NullClock, NullStore};
    use presence_store::{GeofenceSource, GeofenceStore};
    use presence_types::{Timestamp, DEFAULT_GEOFENCE_CENTER, DEFAULT_GEOFENCE_RADIUS_M};

    fn evaluator(store: Arc<NullStore>) -> GeofenceEvaluator {
        GeofenceEvaluator::load(
            store,
            Arc::new(NullClock::new(1_000)),
            GeofenceConfig::seeded(DEFAULT_GEOFENCE_CENTER, DEFAULT_GEOFENCE_RADIUS_M),
        )
        .unwrap()
    }

    #[test]
    fn zero_distance_to_self() {
        assert_eq!(distance_meters(&DEFAULT_GEOFENCE_CENTER, &DEFAULT_GEOFENCE_CENTER), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_meters(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn boundary_example() {
        let fence = evaluator(Arc::new(NullStore::new()));
        let near = destination_point(&DEFAULT_GEOFENCE_CENTER, 0.0, 999.0);
        let far = destination_point(&DEFAULT_GEOFENCE_CENTER, 0.0, 1001.0);
        assert!(fence.is_inside(&near));
        assert!(!fence.is_inside(&far));
        assert!(fence.is_inside(&DEFAULT_GEOFENCE_CENTER));
    }

    #[test]
    fn malformed_point_is_outside_without_distance() {
        let fence = evaluator(Arc::new(NullStore::new()));
        let decision = fence.evaluate(&GeoPoint::new(f64::NAN, 78.0));
        assert!(!decision.inside);
        assert_eq!(decision.distance_m, None);
        assert!(!fence.is_inside(&GeoPoint::new(95.0, 78.0)));
    }

    #[test]
    fn cold_start_uses_seed_then_persisted() {
        let store = Arc::new(NullStore::new());
        let fence = evaluator(Arc::clone(&store));
        assert_eq!(fence.snapshot().source, GeofenceSource::Default);

        store
            .replace_geofence(GeoPoint::new(10.0, 10.0), 250.0, Timestamp::new(5))
            .unwrap();
        let reloaded = evaluator(store);
        let snap = reloaded.snapshot();
        assert_eq!(snap.source, GeofenceSource::Persisted);
        assert_eq!(snap.radius_m, 250.0);
        assert_eq!(snap.revision, 1);
    }

    #[test]
    fn update_validates_then_swaps() {
        let store = Arc::new(NullStore::new());
        let fence = evaluator(Arc::clone(&store));
        let before = fence.snapshot();

        let err = fence.update(GeoPoint::new(10.0, 10.0), 0.0).unwrap_err();
        assert!(matches!(err, VerificationError::InvalidGeofence(_)));
        let err = fence.update(GeoPoint::new(100.0, 10.0), 50.0).unwrap_err();
        assert!(matches!(err, VerificationError::InvalidGeofence(_)));
        assert_eq!(fence.snapshot(), before);

        let after = fence.update(GeoPoint::new(10.0, 10.0), 50.0).unwrap();
        assert_eq!(after.revision, 1);
        assert_eq!(after.updated_at, Timestamp::new(1_000));
        assert_eq!(fence.snapshot(), after);
        // An old snapshot held by a reader is untouched.
        assert_eq!(before.radius_m, DEFAULT_GEOFENCE_RADIUS_M);
        assert_eq!(store.get_geofence().unwrap().unwrap().radius_m, 50.0);
    }

    #[test]
    fn failed_persist_keeps_old_snapshot() {
        let store = Arc::new(NullStore::new());
        let fence = evaluator(Arc::clone(&store));
        store.set_unavailable(true);
        let err = fence.update(GeoPoint::new(10.0, 10.0), 50.0).unwrap_err();
        assert!(matches!(err, VerificationError::Store(_)));
        assert_eq!(fence.snapshot().source, GeofenceSource::Default);
    }
}
