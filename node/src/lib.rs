//! Attendance node: wires storage, the verification pipeline, and its servers.
//!
//! The node:
//! - opens the configured storage backend (LMDB or in-memory)
//! - builds the role directory from configuration
//! - constructs the verification orchestrator with the configured geofence and parameters
//! - fans attendance notices out to WebSocket rooms
//! - runs the HTTP and WebSocket servers until shutdown

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod shutdown;

pub use config::{GeofenceSection, NodeConfig, PrincipalEntry, StoreBackend};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::PresenceNode;
pub use shutdown::ShutdownController;
