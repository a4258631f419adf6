//! Persisted records and abstract storage traits.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these traits.
//! The rest of the codebase depends only on the traits.
//!
//! Two guarantees are part of the contract and not left to callers:
//! - attendance and session writes are upserts keyed on their natural key,
//!   applied atomically so concurrent writers never create duplicates;
//! - token consumption is one atomic check-and-increment of `usage_count`,
//!   and releasing a use is one atomic decrement.

pub mod attendance;
pub mod error;
pub mod face;
pub mod geofence;
pub mod policy;
pub mod session;
pub mod token;

pub use attendance::{
    AttendanceRecord, AttendanceStatus, AttendanceStore, AttendanceUpdate, GateEvent,
    GateEventKind, ProxyMark,
};
pub use error::StoreError;
pub use face::{FaceProfile, FaceStore};
pub use geofence::{next_geofence, GeofenceConfig, GeofenceSource, GeofenceStore};
pub use policy::{PolicyStore, SecurityPolicy};
pub use session::{
    Attempt, FlagRecord, SecurityFlag, SessionStatus, SessionStore, SessionUpdate,
    VerificationSession, VerificationSummary,
};
pub use token::{ConsumeOutcome, ScanToken, TokenKind, TokenStore};

/// Everything the verification pipeline persists, behind one handle.
pub trait PresenceStore:
    GeofenceStore + TokenStore + SessionStore + AttendanceStore + FaceStore + PolicyStore + Send + Sync
{
}

impl<T> PresenceStore for T where
    T: GeofenceStore
        + TokenStore
        + SessionStore
        + AttendanceStore
        + FaceStore
        + PolicyStore
        + Send
        + Sync
{
}
