//! Axum-based RPC server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use presence_verification::{Envelope, VerificationOrchestrator};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::error::RpcError;
use crate::handlers;
use crate::metrics::RpcMetrics;

/// Shared by every handler.
#[derive(Clone)]
pub struct RpcState {
    pub orchestrator: Arc<VerificationOrchestrator>,
    pub metrics: Arc<RpcMetrics>,
}

impl RpcState {
    pub fn new(orchestrator: Arc<VerificationOrchestrator>, metrics: Arc<RpcMetrics>) -> Self {
        Self {
            orchestrator,
            metrics,
        }
    }

    /// Count the outcome and wrap it in the envelope.
    pub(crate) fn respond<T: Serialize>(
        &self,
        endpoint: &'static str,
        started: Instant,
        result: Result<T, RpcError>,
    ) -> Response {
        match result {
            Ok(data) => {
                self.metrics.observe(endpoint, "OK", started.elapsed());
                (StatusCode::OK, Json(Envelope::ok(data))).into_response()
            }
            Err(e) => {
                let code = e.code();
                if code.is_internal() {
                    error!(endpoint, %code, error = %e, "request failed");
                } else {
                    debug!(endpoint, %code, "request rejected");
                }
                self.metrics.observe(endpoint, code.as_str(), started.elapsed());
                e.into_response()
            }
        }
    }
}

pub fn router(state: RpcState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/attendance/check-in", post(handlers::check_in))
        .route("/attendance/check-out", post(handlers::check_out))
        .route("/attendance/scan", post(handlers::scan))
        .route("/attendance/proxy", post(handlers::proxy_check_in))
        .route("/attendance/today", get(handlers::today))
        .route("/attendance/history", get(handlers::history))
        .route("/tokens", post(handlers::issue_token))
        .route("/tokens/:id", get(handlers::get_token))
        .route(
            "/geofence",
            get(handlers::get_geofence).put(handlers::update_geofence),
        )
        .route("/face/register", post(handlers::register_face))
        .route("/face/verify", post(handlers::verify_face))
        .route("/policy/proxy", put(handlers::set_proxy_opt_in))
        .route(
            "/policy/:user_id",
            get(handlers::get_policy).put(handlers::set_policy),
        )
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

pub struct RpcServer {
    pub port: u16,
    pub state: RpcState,
}

impl RpcServer {
    pub fn new(port: u16, state: RpcState) -> Self {
        Self { port, state }
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), RpcError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state.clone());
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "RPC server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
