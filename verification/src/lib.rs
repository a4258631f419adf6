//! Attendance verification and anti-fraud pipeline.
//!
//! A request passes through independent gates before anything is recorded:
//! 1. **Geofence**: the reported location must lie inside the authorized circle.
//! 2. **Scan token** (scan flow only): time-boxed, usage-limited QR credential.
//! 3. **Face match**: deterministic digest similarity against the registered profile.
//! 4. **Fraud rules**: concurrent active sessions and rapid re-scanning.
//!
//! Only then does the **attendance ledger** upsert the one record per user per
//! day, and only after that is token usage consumed, so a rejected attempt
//! never burns a use.
//!
//! The face matcher is a content-hash stand-in, not biometric recognition.

pub mod error;
pub mod events;
pub mod face;
pub mod fraud;
pub mod geofence;
pub mod identity;
pub mod ledger;
pub mod orchestrator;
pub mod policy;
pub mod response;
pub mod session;
pub mod stage;
pub mod token;

pub use error::VerificationError;
pub use events::{AttendanceNotice, CheckMethod, EventBus, Listener, NotifyError};
pub use face::{FaceMatcher, FaceReason, FaceScore, FaceVerification};
pub use fraud::{FraudAssessment, FraudDetector, Severity};
pub use geofence::{distance_meters, GeofenceDecision, GeofenceEvaluator};
pub use identity::{Directory, Principal, StaticDirectory};
pub use ledger::{AttendanceLedger, CheckOut};
pub use orchestrator::{
    CheckRequest, ProxyClaim, ProxyRequest, ScanOutcome, ScanRequest, VerificationOrchestrator,
};
pub use policy::{ProxyGrant, SecurityPolicies};
pub use response::{Envelope, ErrorBody};
pub use session::SessionRecorder;
pub use stage::{run_stage, Stage, StageDeadline};
pub use token::{IssueRequest, TokenRegistry};
