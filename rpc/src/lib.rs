//! HTTP API for the attendance verification pipeline.
//!
//! Every endpoint answers with the `{success, data?, error?{message, code}}`
//! envelope. The acting principal comes from the `x-user-id` header, which
//! the upstream identity layer sets after authenticating the caller.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod pagination;
pub mod server;

pub use error::{status_for, RpcError};
pub use metrics::RpcMetrics;
pub use server::{router, RpcServer, RpcState};
