use thiserror::Error;

/// Failures surfaced by any storage backend.
///
/// The verification core maps all of these to `STORAGE_ERROR`; only
/// `NotFound` and `Duplicate` carry meaning callers branch on.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist (e.g. touching a missing face profile).
    #[error("record not found: {0}")]
    NotFound(String),

    /// Insert-only collections reject a second record under the same key.
    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("storage backend unavailable: {0}")]
    Backend(String),

    #[error("record encoding failed: {0}")]
    Serialization(String),
}
