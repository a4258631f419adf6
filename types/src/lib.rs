//! Fundamental types for the presence verification pipeline.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identifiers, timestamps and clocks, coordinates, roles, pipeline parameters,
//! and the wire-level error code taxonomy.

pub mod error;
pub mod geo;
pub mod ids;
pub mod params;
pub mod role;
pub mod time;

pub use error::ErrorCode;
pub use geo::{GeoPoint, Location, LocationError, RawLocation};
pub use ids::{SessionId, TokenId, UserId};
pub use params::{
    PipelineParams, StageTimeouts, DEFAULT_GEOFENCE_CENTER, DEFAULT_GEOFENCE_RADIUS_M,
};
pub use role::Role;
pub use time::{Clock, SystemClock, Timestamp, SECS_PER_DAY};
