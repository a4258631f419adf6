//! Coordinates and caller-supplied locations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A WGS-84 coordinate in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside `[-90, 90] x [-180, 180]`.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A validated location attached to an attendance event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub point: GeoPoint,
    /// Reported horizontal accuracy in meters, if the device provided one.
    pub accuracy: Option<f64>,
}

impl Location {
    pub fn new(point: GeoPoint) -> Self {
        Self {
            point,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location is required")]
    Missing,

    #[error("location coordinates are invalid")]
    Invalid,
}

/// Coordinates as they arrive from a client, before validation.
///
/// Either coordinate may be absent; present values may still be non-finite or
/// out of range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub accuracy: Option<f64>,
}

impl RawLocation {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            accuracy: None,
        }
    }

    /// Validate into a [`Location`].
    ///
    /// A missing coordinate is [`LocationError::Missing`]; a non-finite or
    /// out-of-range one is [`LocationError::Invalid`]. A non-finite or negative
    /// accuracy is dropped rather than rejected.
    pub fn validate(&self) -> Result<Location, LocationError> {
        let (lat, lng) = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return Err(LocationError::Missing),
        };
        let point = GeoPoint::new(lat, lng);
        if !point.is_valid() {
            return Err(LocationError::Invalid);
        }
        Ok(Location {
            point,
            accuracy: self.accuracy.filter(|a| a.is_finite() && *a >= 0.0),
        })
    }
}
