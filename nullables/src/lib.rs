//! Nullable infrastructure for deterministic testing.
//!
//! All external dependencies (clock, storage) are abstracted behind traits.
//! This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (time travel, outages, latency)
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests. `NullStore` is
//! also the node's `memory` backend.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullStore;
