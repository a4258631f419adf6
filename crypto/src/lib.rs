//! Digest and identifier primitives.
//!
//! - **Blake2b-256** content digests (face encodings are digests of the raw image)
//! - Random, prefixed identifiers for scan tokens and verification sessions

pub mod hash;
pub mod id;

pub use hash::{blake2b_256, blake2b_256_hex};
pub use id::{random_id, IdError};
