//! RPC request bodies and handlers.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use presence_store::{SecurityPolicy, TokenKind};
use presence_types::{GeoPoint, RawLocation, Timestamp, TokenId, UserId};
use presence_verification::{
    CheckRequest, IssueRequest, ProxyClaim, ProxyRequest, ScanRequest, VerificationError,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RpcError;
use crate::pagination::{paginate, PageParams};
use crate::server::RpcState;

/// Header carrying the authenticated caller.
pub const ACTOR_HEADER: &str = "x-user-id";

// ── Locations ────────────────────────────────────────────────────────────

/// A coordinate sent as a JSON number or a numeric string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    /// Unparseable text becomes NaN, which location validation rejects.
    pub fn value(&self) -> f64 {
        match self {
            Coordinate::Number(v) => *v,
            Coordinate::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LocationBody {
    #[serde(default, alias = "latitude")]
    pub lat: Option<Coordinate>,
    #[serde(default, alias = "longitude")]
    pub lng: Option<Coordinate>,
    #[serde(default)]
    pub accuracy: Option<Coordinate>,
}

impl From<LocationBody> for RawLocation {
    fn from(body: LocationBody) -> Self {
        RawLocation {
            lat: body.lat.map(|c| c.value()),
            lng: body.lng.map(|c| c.value()),
            accuracy: body.accuracy.map(|c| c.value()),
        }
    }
}

// ── Attendance ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CheckBody {
    #[serde(default)]
    pub location: LocationBody,
}

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub token_id: Option<String>,
    /// Hex-encoded image bytes.
    pub face_image: Option<String>,
    #[serde(default)]
    pub location: LocationBody,
    pub device_info: Option<String>,
    /// Subject of a proxy scan.
    pub on_behalf_of: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyBody {
    #[serde(alias = "student_id")]
    pub subject: String,
    #[serde(default)]
    pub location: LocationBody,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub cursor: Option<String>,
    pub count: Option<u32>,
}

// ── Tokens, geofence, faces, policies ────────────────────────────────────

fn default_kind() -> TokenKind {
    TokenKind::Attendance
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenBody {
    #[serde(default = "default_kind")]
    pub kind: TokenKind,
    #[serde(default)]
    pub location: LocationBody,
    pub max_usage: Option<u32>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct GeofenceBody {
    #[serde(default)]
    pub center: LocationBody,
    #[serde(rename = "radiusMeters", alias = "radius_meters")]
    pub radius_meters: f64,
}

#[derive(Debug, Deserialize)]
pub struct FaceBody {
    /// Defaults to the caller.
    pub user_id: Option<String>,
    /// Hex-encoded image bytes.
    pub image: String,
}

/// What registration reveals: never the stored encoding.
#[derive(Debug, Serialize)]
pub struct FaceRegistration {
    pub user_id: UserId,
    pub registered_at: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct ProxyOptInBody {
    pub allow: bool,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyBody {
    pub require_face_verification: Option<bool>,
    pub allow_proxy_attendance: Option<bool>,
    pub max_verification_attempts: Option<u32>,
}

impl PolicyBody {
    pub fn apply(self, mut policy: SecurityPolicy) -> SecurityPolicy {
        if let Some(v) = self.require_face_verification {
            policy.require_face_verification = v;
        }
        if let Some(v) = self.allow_proxy_attendance {
            policy.allow_proxy_attendance = v;
        }
        if let Some(v) = self.max_verification_attempts {
            policy.max_verification_attempts = v;
        }
        policy
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub geofence_revision: u64,
}

// ── Helpers ──────────────────────────────────────────────────────────────

pub fn actor(headers: &HeaderMap) -> Result<UserId, RpcError> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new)
        .ok_or(RpcError::MissingActor)
}

fn decode_image(field: &str, hex_image: &str) -> Result<Vec<u8>, RpcError> {
    hex::decode(hex_image.trim())
        .map_err(|_| RpcError::InvalidRequest(format!("{field} must be hex-encoded")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Handlers ─────────────────────────────────────────────────────────────

pub async fn check_in(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<CheckBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let user_id = actor(&headers)?;
        let Json(body) = body?;
        let record = state
            .orchestrator
            .check_in(CheckRequest {
                user_id,
                location: body.location.into(),
            })
            .await?;
        Ok::<_, RpcError>(record)
    }
    .await;
    state.respond("check_in", started, result)
}

pub async fn check_out(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<CheckBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let user_id = actor(&headers)?;
        let Json(body) = body?;
        let out = state
            .orchestrator
            .check_out(CheckRequest {
                user_id,
                location: body.location.into(),
            })
            .await?;
        Ok::<_, RpcError>(out)
    }
    .await;
    state.respond("check_out", started, result)
}

pub async fn scan(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let face_image = match non_blank(body.face_image) {
            Some(hex_image) => Some(decode_image("face_image", &hex_image)?),
            None => None,
        };
        let proxy = non_blank(body.on_behalf_of).map(|subject| ProxyClaim {
            subject: UserId::new(subject),
            reason: body.reason,
        });
        let outcome = state
            .orchestrator
            .scan(ScanRequest {
                actor,
                token_id: non_blank(body.token_id).map(TokenId::new),
                face_image,
                location: body.location.into(),
                device_info: body.device_info,
                proxy,
            })
            .await?;
        Ok::<_, RpcError>(outcome)
    }
    .await;
    state.respond("scan", started, result)
}

pub async fn proxy_check_in(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<ProxyBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let record = state
            .orchestrator
            .proxy_check_in(ProxyRequest {
                actor,
                subject: UserId::new(body.subject),
                location: body.location.into(),
                reason: body.reason,
            })
            .await?;
        Ok::<_, RpcError>(record)
    }
    .await;
    state.respond("proxy_check_in", started, result)
}

pub async fn today(
    State(state): State<RpcState>,
    headers: HeaderMap,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Query(query) = query?;
        let user = non_blank(query.user_id).map(UserId::new).unwrap_or(actor);
        let record = state.orchestrator.today(&user).await?;
        Ok::<_, RpcError>(record)
    }
    .await;
    state.respond("today", started, result)
}

pub async fn history(
    State(state): State<RpcState>,
    headers: HeaderMap,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Query(query) = query?;
        let user = non_blank(query.user_id).map(UserId::new).unwrap_or(actor);
        let records = state.orchestrator.history(&user).await?;
        let page = PageParams {
            cursor: query.cursor,
            count: query.count,
        };
        Ok::<_, RpcError>(paginate(records, &page))
    }
    .await;
    state.respond("history", started, result)
}

pub async fn issue_token(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<IssueTokenBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let location = RawLocation::from(body.location)
            .validate()
            .map_err(VerificationError::from)?;
        let token = state
            .orchestrator
            .issue_token(
                &actor,
                IssueRequest {
                    kind: body.kind,
                    location: location.point,
                    max_usage: body.max_usage,
                    ttl_secs: body.ttl_secs,
                },
            )
            .await?;
        Ok::<_, RpcError>(token)
    }
    .await;
    state.respond("issue_token", started, result)
}

pub async fn get_token(
    State(state): State<RpcState>,
    headers: HeaderMap,
    id: Result<Path<String>, PathRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        actor(&headers)?;
        let Path(id) = id?;
        let token = state
            .orchestrator
            .token(&TokenId::new(id.clone()))
            .await?
            .ok_or(VerificationError::TokenNotFound(id))?;
        Ok::<_, RpcError>(token)
    }
    .await;
    state.respond("get_token", started, result)
}

pub async fn get_geofence(State(state): State<RpcState>) -> Response {
    let started = Instant::now();
    let snapshot = state.orchestrator.geofence();
    state.respond("get_geofence", started, Ok(snapshot.as_ref().clone()))
}

pub async fn update_geofence(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<GeofenceBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let raw = RawLocation::from(body.center);
        let center = GeoPoint::new(
            raw.lat.unwrap_or(f64::NAN),
            raw.lng.unwrap_or(f64::NAN),
        );
        let config = state
            .orchestrator
            .update_geofence(&actor, center, body.radius_meters)
            .await?;
        Ok::<_, RpcError>(config.as_ref().clone())
    }
    .await;
    state.respond("update_geofence", started, result)
}

pub async fn register_face(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<FaceBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let user = non_blank(body.user_id)
            .map(UserId::new)
            .unwrap_or_else(|| actor.clone());
        let image = decode_image("image", &body.image)?;
        let profile = state.orchestrator.register_face(&actor, &user, image).await?;
        Ok::<_, RpcError>(FaceRegistration {
            user_id: profile.user_id,
            registered_at: profile.registered_at,
        })
    }
    .await;
    state.respond("register_face", started, result)
}

pub async fn verify_face(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<FaceBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let user = non_blank(body.user_id).map(UserId::new).unwrap_or(actor);
        let image = decode_image("image", &body.image)?;
        let verification = state.orchestrator.verify_face(&user, image).await?;
        Ok::<_, RpcError>(verification)
    }
    .await;
    state.respond("verify_face", started, result)
}

pub async fn set_proxy_opt_in(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Result<Json<ProxyOptInBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Json(body) = body?;
        let policy = state
            .orchestrator
            .set_proxy_opt_in(&actor, &actor, body.allow)
            .await?;
        Ok::<_, RpcError>(policy)
    }
    .await;
    state.respond("set_proxy_opt_in", started, result)
}

pub async fn get_policy(
    State(state): State<RpcState>,
    headers: HeaderMap,
    user: Result<Path<String>, PathRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        actor(&headers)?;
        let Path(user) = user?;
        let policy = state.orchestrator.policy_for(&UserId::new(user)).await?;
        Ok::<_, RpcError>(policy)
    }
    .await;
    state.respond("get_policy", started, result)
}

pub async fn set_policy(
    State(state): State<RpcState>,
    headers: HeaderMap,
    user: Result<Path<String>, PathRejection>,
    body: Result<Json<PolicyBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = async {
        let actor = actor(&headers)?;
        let Path(user) = user?;
        let Json(body) = body?;
        let user = UserId::new(user);
        let current = state.orchestrator.policy_for(&user).await?;
        let policy = state
            .orchestrator
            .set_policy(&actor, &user, body.apply(current))
            .await?;
        Ok::<_, RpcError>(policy)
    }
    .await;
    state.respond("set_policy", started, result)
}

pub async fn health(State(state): State<RpcState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        geofence_revision: state.orchestrator.geofence().revision,
    })
}

pub async fn metrics(State(state): State<RpcState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
        .into_response()
}
