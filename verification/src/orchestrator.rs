//! Entry flows composing the pipeline stages.
//!
//! Direct flow: location, geofence, ledger, notice.
//!
//! Scan flow: inputs, proxy authorization, token validation, location and
//! geofence, subject policy, face match, fraud rules, then token consumption,
//! session attempt and ledger. The use is taken only after every gate passed,
//! and before anything is recorded, so a scan that loses the race for the last
//! use writes nothing. If recording fails the use is released again, so a
//! rejected attempt never spends one.
//!
//! Every stage runs on the blocking pool under its own time budget.

use crate::error::VerificationError;
use crate::events::{AttendanceNotice, CheckMethod, EventBus};
use crate::face::{FaceMatcher, FaceVerification};
use crate::fraud::FraudDetector;
use crate::geofence::{GeofenceDecision, GeofenceEvaluator};
use crate::identity::{Directory, Principal};
use crate::ledger::{AttendanceLedger, CheckOut};
use crate::policy::{ProxyGrant, SecurityPolicies};
use crate::session::SessionRecorder;
use crate::stage::{run_stage, Stage, StageDeadline};
use crate::token::{IssueRequest, TokenRegistry};
use presence_store::{
    AttendanceRecord, Attempt, FaceProfile, GeofenceConfig, PresenceStore,
    ScanToken, SecurityFlag, SecurityPolicy, StoreError, VerificationSession,
    VerificationSummary,
};
use presence_types::{
    Clock, GeoPoint, Location, PipelineParams, RawLocation, StageTimeouts, Timestamp, TokenId,
    UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A direct check-in or check-out.
#[derive(Clone, Debug)]
pub struct CheckRequest {
    pub user_id: UserId,
    pub location: RawLocation,
}

/// A direct proxy check-in by `actor` for `subject`.
#[derive(Clone, Debug)]
pub struct ProxyRequest {
    pub actor: UserId,
    pub subject: UserId,
    pub location: RawLocation,
    pub reason: Option<String>,
}

/// A scan made on behalf of another user.
#[derive(Clone, Debug)]
pub struct ProxyClaim {
    pub subject: UserId,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ScanRequest {
    pub actor: UserId,
    pub token_id: Option<TokenId>,
    pub face_image: Option<Vec<u8>>,
    pub location: RawLocation,
    pub device_info: Option<String>,
    pub proxy: Option<ProxyClaim>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub action: CheckMethod,
    pub record: AttendanceRecord,
    pub session: VerificationSession,
    pub token: ScanToken,
    pub face_score: Option<f64>,
    pub forced_absent: bool,
}

pub struct VerificationOrchestrator {
    clock: Arc<dyn Clock>,
    directory: Arc<dyn Directory>,
    geofence: Arc<GeofenceEvaluator>,
    tokens: Arc<TokenRegistry>,
    faces: Arc<FaceMatcher>,
    fraud: Arc<FraudDetector>,
    ledger: Arc<AttendanceLedger>,
    sessions: Arc<SessionRecorder>,
    policies: Arc<SecurityPolicies>,
    events: EventBus,
    timeouts: StageTimeouts,
}

impl VerificationOrchestrator {
    /// Wire every component over one store. Loads the persisted geofence, or `seed`.
    pub fn new(
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn Directory>,
        params: &PipelineParams,
        seed: GeofenceConfig,
        events: EventBus,
    ) -> Result<Self, StoreError> {
        let geofence = Arc::new(GeofenceEvaluator::load(
            Arc::clone(&store),
            Arc::clone(&clock),
            seed,
        )?);
        Ok(Self {
            tokens: Arc::new(TokenRegistry::new(Arc::clone(&store), Arc::clone(&clock), params)),
            faces: Arc::new(FaceMatcher::new(Arc::clone(&store), Arc::clone(&clock), params)),
            fraud: Arc::new(FraudDetector::new(Arc::clone(&store), Arc::clone(&clock), params)),
            ledger: Arc::new(AttendanceLedger::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                Arc::clone(&geofence),
            )),
            sessions: Arc::new(SessionRecorder::new(Arc::clone(&store), Arc::clone(&clock))),
            policies: Arc::new(SecurityPolicies::new(store, params)),
            geofence,
            clock,
            directory,
            events,
            timeouts: params.stage_timeouts.clone(),
        })
    }

    // ── Direct flow ──────────────────────────────────────────────────────

    pub async fn check_in(&self, req: CheckRequest) -> Result<AttendanceRecord, VerificationError> {
        logged("check-in", self.check_in_inner(req).await)
    }

    async fn check_in_inner(&self, req: CheckRequest) -> Result<AttendanceRecord, VerificationError> {
        let now = self.clock.now();
        let location = req.location.validate()?;
        self.require_inside(location.point).await?;

        let ledger = Arc::clone(&self.ledger);
        let user = req.user_id.clone();
        let record = self
            .stage(Stage::Ledger, move |deadline| {
                deadline.check()?;
                ledger.check_in(&user, location, now)
            })
            .await?;

        self.notify_update(&record, CheckMethod::CheckIn, now);
        Ok(record)
    }

    /// Check-out never fails on the geofence. Leaving from outside marks the day absent.
    pub async fn check_out(&self, req: CheckRequest) -> Result<CheckOut, VerificationError> {
        logged("check-out", self.check_out_inner(req).await)
    }

    async fn check_out_inner(&self, req: CheckRequest) -> Result<CheckOut, VerificationError> {
        let now = self.clock.now();
        let location = req.location.validate()?;
        let out = self.ledger_check_out(req.user_id, location, now).await?;
        self.notify_exit(&out, CheckMethod::CheckOut, now);
        Ok(out)
    }

    /// Check-in by an authorized role on behalf of a user who opted in.
    pub async fn proxy_check_in(&self, req: ProxyRequest) -> Result<AttendanceRecord, VerificationError> {
        logged("proxy check-in", self.proxy_check_in_inner(req).await)
    }

    async fn proxy_check_in_inner(
        &self,
        req: ProxyRequest,
    ) -> Result<AttendanceRecord, VerificationError> {
        let now = self.clock.now();
        let grant = self.authorize_proxy(&req.actor, &req.subject, req.reason).await?;
        let location = req.location.validate()?;
        self.require_inside(location.point).await?;

        let ledger = Arc::clone(&self.ledger);
        let record = self
            .stage(Stage::Ledger, move |deadline| {
                deadline.check()?;
                ledger.proxy_check_in(&grant, location, now)
            })
            .await?;

        self.notify_update(&record, CheckMethod::Proxy, now);
        Ok(record)
    }

    // ── Token-scan flow ──────────────────────────────────────────────────

    pub async fn scan(&self, req: ScanRequest) -> Result<ScanOutcome, VerificationError> {
        logged("scan", self.scan_inner(req).await)
    }

    async fn scan_inner(&self, req: ScanRequest) -> Result<ScanOutcome, VerificationError> {
        let now = self.clock.now();
        let token_id = req
            .token_id
            .filter(|t| !t.is_blank())
            .ok_or(VerificationError::MissingInput("token"))?;
        let image = req
            .face_image
            .filter(|i| !i.is_empty())
            .ok_or(VerificationError::MissingInput("face image"))?;

        let grant = match req.proxy {
            Some(claim) => Some(self.authorize_proxy(&req.actor, &claim.subject, claim.reason).await?),
            None => None,
        };
        let subject = grant
            .as_ref()
            .map(|g| g.subject().clone())
            .unwrap_or_else(|| req.actor.clone());

        let tokens = Arc::clone(&self.tokens);
        let id = token_id.clone();
        let token = self
            .stage(Stage::Token, move |_| tokens.validate(&id))
            .await?;

        let location = req.location.validate()?;
        self.require_inside(location.point).await?;

        let policies = Arc::clone(&self.policies);
        let who = subject.clone();
        let policy = self
            .stage(Stage::Policy, move |_| policies.policy_for(&who))
            .await?;

        let attempt = Attempt {
            timestamp: now,
            face_score: None,
            location: Some(location.point),
            device_info: req.device_info,
        };
        let mut summary = VerificationSummary {
            face_score: None,
            face_verified: false,
            location_verified: true,
        };

        if policy.require_face_verification {
            let threshold = self.faces.scan_threshold();
            let faces = Arc::clone(&self.faces);
            let who = subject.clone();
            let assessed = self
                .stage(Stage::Face, move |_| faces.assess(&who, &image, threshold))
                .await;
            let score = match assessed {
                Ok(s) => Some(s),
                Err(VerificationError::NoFaceRegistered(_)) => None,
                Err(e) => return Err(e),
            };
            let value = score.map_or(0.0, |s| s.value);
            summary.face_score = Some(value);
            summary.face_verified = score.is_some_and(|s| s.matched);

            if !summary.face_verified {
                let detail = match score {
                    Some(_) => format!("face score {value:.2} below {threshold:.2}"),
                    None => "no face profile registered".to_string(),
                };
                self.flag_session(
                    &subject,
                    &token_id,
                    SecurityFlag::FaceMismatch,
                    detail,
                    Attempt {
                        face_score: Some(value),
                        ..attempt
                    },
                    summary,
                )
                .await?;
                return Err(VerificationError::FaceVerificationFailed {
                    score: value,
                    threshold,
                });
            }
            self.touch_face_profile(subject.clone());
        }

        let face_score = summary.face_score;
        let fraud = Arc::clone(&self.fraud);
        let who = subject.clone();
        let max_attempts = policy.max_verification_attempts;
        let assessment = self
            .stage(Stage::Fraud, move |_| fraud.check(&who, max_attempts))
            .await?;
        let attempt = Attempt {
            face_score,
            ..attempt
        };
        if let (true, Some(flag), Some(reason), Some(severity)) = (
            assessment.suspicious,
            assessment.flag,
            assessment.reason.clone(),
            assessment.severity,
        ) {
            self.flag_session(&subject, &token_id, flag, reason.clone(), attempt, summary)
                .await?;
            return Err(VerificationError::SecurityAlert { reason, severity });
        }

        // Every gate passed: take a use now so that a scan losing the race for
        // the last use records nothing.
        let tokens = Arc::clone(&self.tokens);
        let id = token_id.clone();
        let token = self
            .stage(Stage::Token, move |deadline| {
                deadline.check()?;
                tokens.consume(&id)
            })
            .await?;

        let recorded = async {
            let sessions = Arc::clone(&self.sessions);
            let (who, tid) = (subject.clone(), token_id.clone());
            let session = self
                .stage(Stage::Session, move |deadline| {
                    deadline.check()?;
                    sessions.record_attempt(&who, &tid, attempt, summary)
                })
                .await?;

            if token.kind.is_checkout() {
                let out = self.ledger_check_out(subject.clone(), location, now).await?;
                let sessions = Arc::clone(&self.sessions);
                let (who, tid) = (subject.clone(), token_id.clone());
                let closed = self
                    .stage(Stage::Session, move |_| sessions.complete(&who, &tid))
                    .await?;
                Ok::<_, VerificationError>((
                    CheckMethod::CheckOut,
                    out.record,
                    closed,
                    out.forced_absent,
                ))
            } else {
                let ledger = Arc::clone(&self.ledger);
                let who = subject.clone();
                let proxy = grant.clone();
                let record = self
                    .stage(Stage::Ledger, move |deadline| {
                        deadline.check()?;
                        match &proxy {
                            Some(grant) => ledger.proxy_check_in(grant, location, now),
                            None => ledger.check_in(&who, location, now),
                        }
                    })
                    .await?;
                let method = if grant.is_some() {
                    CheckMethod::Proxy
                } else {
                    CheckMethod::Scan
                };
                Ok::<_, VerificationError>((method, record, session, false))
            }
        }
        .await;
        let (action, record, session, forced_absent) = match recorded {
            Ok(recorded) => recorded,
            Err(e) => {
                self.release_token(token_id.clone()).await;
                return Err(e);
            }
        };

        if action == CheckMethod::CheckOut {
            self.notify_exit(
                &CheckOut {
                    record: record.clone(),
                    forced_absent,
                },
                CheckMethod::Scan,
                now,
            );
        } else {
            self.notify_update(&record, action, now);
        }

        info!(
            subject = %subject,
            actor = %req.actor,
            token = %token.id,
            kind = ?token.kind,
            session = %session.session_id,
            "scan accepted"
        );
        Ok(ScanOutcome {
            action,
            record,
            session,
            token,
            face_score,
            forced_absent,
        })
    }

    // ── Administration ───────────────────────────────────────────────────

    pub async fn issue_token(
        &self,
        actor: &UserId,
        request: IssueRequest,
    ) -> Result<ScanToken, VerificationError> {
        let issuer = self.principal(actor).await?;
        let tokens = Arc::clone(&self.tokens);
        self.stage(Stage::Token, move |deadline| {
            deadline.check()?;
            tokens.issue(&issuer, request)
        })
        .await
    }

    pub async fn update_geofence(
        &self,
        actor: &UserId,
        center: GeoPoint,
        radius_m: f64,
    ) -> Result<Arc<GeofenceConfig>, VerificationError> {
        let principal = self.principal(actor).await?;
        if !principal.role.can_administer() {
            return Err(VerificationError::Unauthorized {
                actor: actor.to_string(),
                action: "update the geofence",
            });
        }
        let geofence = Arc::clone(&self.geofence);
        self.stage(Stage::Geofence, move |deadline| {
            deadline.check()?;
            geofence.update(center, radius_m)
        })
        .await
    }

    pub fn geofence(&self) -> Arc<GeofenceConfig> {
        self.geofence.snapshot()
    }

    /// Register a face for `user`. Users register themselves; admins may register anyone.
    pub async fn register_face(
        &self,
        actor: &UserId,
        user: &UserId,
        image: Vec<u8>,
    ) -> Result<FaceProfile, VerificationError> {
        if actor != user {
            let principal = self.principal(actor).await?;
            if !principal.role.can_administer() {
                return Err(VerificationError::Unauthorized {
                    actor: actor.to_string(),
                    action: "register another user's face",
                });
            }
        }
        let faces = Arc::clone(&self.faces);
        let user = user.clone();
        self.stage(Stage::Face, move |deadline| {
            deadline.check()?;
            faces.register(&user, &image)
        })
        .await
    }

    /// Ad-hoc verification at the lower threshold. A match touches the profile in the background.
    pub async fn verify_face(
        &self,
        user: &UserId,
        image: Vec<u8>,
    ) -> Result<FaceVerification, VerificationError> {
        if image.is_empty() {
            return Err(VerificationError::MissingInput("face image"));
        }
        let faces = Arc::clone(&self.faces);
        let threshold = faces.verify_threshold();
        let who = user.clone();
        let score = self
            .stage(Stage::Face, move |_| faces.assess(&who, &image, threshold))
            .await?;
        if score.matched {
            self.touch_face_profile(user.clone());
        }
        Ok(FaceVerification::from_score(score))
    }

    pub async fn set_proxy_opt_in(
        &self,
        actor: &UserId,
        user: &UserId,
        allow: bool,
    ) -> Result<SecurityPolicy, VerificationError> {
        let principal = self.principal(actor).await?;
        let policies = Arc::clone(&self.policies);
        let user = user.clone();
        self.stage(Stage::Policy, move |deadline| {
            deadline.check()?;
            policies.set_proxy_opt_in(&principal, &user, allow)
        })
        .await
    }

    pub async fn set_policy(
        &self,
        actor: &UserId,
        user: &UserId,
        policy: SecurityPolicy,
    ) -> Result<SecurityPolicy, VerificationError> {
        let principal = self.principal(actor).await?;
        let policies = Arc::clone(&self.policies);
        let user = user.clone();
        self.stage(Stage::Policy, move |deadline| {
            deadline.check()?;
            policies.set_policy(&principal, &user, policy)
        })
        .await
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn policy_for(&self, user: &UserId) -> Result<SecurityPolicy, VerificationError> {
        let policies = Arc::clone(&self.policies);
        let user = user.clone();
        self.stage(Stage::Policy, move |_| policies.policy_for(&user))
            .await
    }

    pub async fn today(&self, user: &UserId) -> Result<Option<AttendanceRecord>, VerificationError> {
        let ledger = Arc::clone(&self.ledger);
        let user = user.clone();
        self.stage(Stage::Ledger, move |_| ledger.today(&user)).await
    }

    pub async fn history(&self, user: &UserId) -> Result<Vec<AttendanceRecord>, VerificationError> {
        let ledger = Arc::clone(&self.ledger);
        let user = user.clone();
        self.stage(Stage::Ledger, move |_| ledger.history(&user)).await
    }

    pub async fn token(&self, id: &TokenId) -> Result<Option<ScanToken>, VerificationError> {
        let tokens = Arc::clone(&self.tokens);
        let id = id.clone();
        self.stage(Stage::Token, move |_| tokens.lookup(&id)).await
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn stage<T, F>(&self, stage: Stage, f: F) -> Result<T, VerificationError>
    where
        F: FnOnce(StageDeadline) -> Result<T, VerificationError> + Send + 'static,
        T: Send + 'static,
    {
        run_stage(stage, self.budget(stage), f).await
    }

    fn budget(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Geofence => self.timeouts.geofence(),
            Stage::Token => self.timeouts.token(),
            Stage::Face => self.timeouts.face(),
            Stage::Fraud => self.timeouts.fraud(),
            Stage::Policy => self.timeouts.policy(),
            Stage::Session => self.timeouts.session(),
            Stage::Ledger => self.timeouts.ledger(),
        }
    }

    async fn principal(&self, user: &UserId) -> Result<Principal, VerificationError> {
        let directory = Arc::clone(&self.directory);
        let user = user.clone();
        self.stage(Stage::Policy, move |_| Ok(directory.principal(&user)?))
            .await
    }

    async fn authorize_proxy(
        &self,
        actor: &UserId,
        subject: &UserId,
        reason: Option<String>,
    ) -> Result<ProxyGrant, VerificationError> {
        let principal = self.principal(actor).await?;
        let policies = Arc::clone(&self.policies);
        let subject = subject.clone();
        self.stage(Stage::Policy, move |_| {
            policies.authorize_proxy(&principal, &subject, reason)
        })
        .await
    }

    async fn require_inside(&self, point: GeoPoint) -> Result<GeofenceDecision, VerificationError> {
        let geofence = Arc::clone(&self.geofence);
        let decision = self
            .stage(Stage::Geofence, move |_| Ok(geofence.evaluate(&point)))
            .await?;
        if !decision.inside {
            return Err(VerificationError::OutsideCampus {
                distance_m: decision.distance_m.unwrap_or(f64::INFINITY),
                radius_m: decision.radius_m,
            });
        }
        Ok(decision)
    }

    async fn ledger_check_out(
        &self,
        user: UserId,
        location: Location,
        at: Timestamp,
    ) -> Result<CheckOut, VerificationError> {
        let ledger = Arc::clone(&self.ledger);
        self.stage(Stage::Ledger, move |deadline| {
            deadline.check()?;
            ledger.check_out(&user, location, at)
        })
        .await
    }

    async fn flag_session(
        &self,
        subject: &UserId,
        token: &TokenId,
        flag: SecurityFlag,
        detail: String,
        attempt: Attempt,
        summary: VerificationSummary,
    ) -> Result<VerificationSession, VerificationError> {
        let sessions = Arc::clone(&self.sessions);
        let (who, tid) = (subject.clone(), token.clone());
        self.stage(Stage::Session, move |deadline| {
            deadline.check()?;
            sessions.flag(&who, &tid, flag, detail, Some(attempt), Some(summary))
        })
        .await
    }

    /// Hand back a use reserved by a scan that failed to record. On failure the
    /// use stays spent.
    async fn release_token(&self, id: TokenId) {
        let tokens = Arc::clone(&self.tokens);
        let token = id.clone();
        match tokio::task::spawn_blocking(move || tokens.release(&id)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(token = %token, error = %e, "reserved token use not released"),
            Err(e) => warn!(token = %token, error = %e, "token release task failed"),
        }
    }

    /// Best-effort profile touch after a match, off the response path.
    fn touch_face_profile(&self, user: UserId) {
        let faces = Arc::clone(&self.faces);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = faces.record_match(&user) {
                warn!(user = %user, error = %e, "face profile update failed");
            }
        });
    }

    fn notify_update(&self, record: &AttendanceRecord, method: CheckMethod, at: Timestamp) {
        self.events.emit(&AttendanceNotice::AttendanceUpdate {
            user_id: record.user_id.clone(),
            status: record.status,
            method,
            timestamp: at,
        });
    }

    fn notify_exit(&self, out: &CheckOut, method: CheckMethod, at: Timestamp) {
        self.notify_update(&out.record, method, at);
        self.events.emit(&AttendanceNotice::StudentExit {
            user_id: out.record.user_id.clone(),
            timestamp: at,
            forced_absent: out.forced_absent,
        });
    }
}

fn logged<T>(flow: &'static str, result: Result<T, VerificationError>) -> Result<T, VerificationError> {
    if let Err(e) = &result {
        if e.code().is_internal() {
            warn!(flow, code = %e.code(), error = %e, "request failed");
        } else {
            warn!(flow, code = %e.code(), reason = %e, "request rejected");
        }
    }
    result
}
