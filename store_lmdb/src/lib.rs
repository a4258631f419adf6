//! LMDB storage backend for the presence verification pipeline.
//!
//! Implements every storage trait from `presence-store` using the `heed` LMDB
//! bindings. Each collection maps to one named database inside a single
//! environment. Every mutation runs in one write transaction; LMDB admits a
//! single writer at a time, which makes keyed upserts and the token's
//! check-and-increment atomic without any extra locking.

pub mod attendance;
pub mod environment;
pub mod error;
pub mod face;
pub mod geofence;
pub mod keys;
pub mod policy;
pub mod session;
pub mod token;

pub use environment::{LmdbStore, DEFAULT_MAP_SIZE};
pub use error::LmdbError;
