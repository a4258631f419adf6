//! Nullable store: thread-safe in-memory storage.
//!
//! Each collection sits behind its own mutex; every trait operation takes the
//! lock once, so upserts and token consumption are atomic exactly as the
//! storage contract requires.

use presence_store::attendance::{AttendanceRecord, AttendanceStore, AttendanceUpdate};
use presence_store::face::{FaceProfile, FaceStore};
use presence_store::geofence::{next_geofence, GeofenceConfig, GeofenceStore};
use presence_store::policy::{PolicyStore, SecurityPolicy};
use presence_store::session::{SessionStore, SessionUpdate, VerificationSession};
use presence_store::token::{ConsumeOutcome, ScanToken, TokenStore};
use presence_store::StoreError;
use presence_types::{GeoPoint, SessionId, Timestamp, TokenId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An in-memory implementation of every storage trait.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullStore {
    geofence: Mutex<Option<GeofenceConfig>>,
    tokens: Mutex<HashMap<TokenId, ScanToken>>,
    sessions: Mutex<Vec<VerificationSession>>,
    attendance: Mutex<BTreeMap<(UserId, Timestamp), AttendanceRecord>>,
    faces: Mutex<HashMap<UserId, FaceProfile>>,
    policies: Mutex<HashMap<UserId, SecurityPolicy>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl NullStore {
    pub fn new() -> Self {
        Self {
            geofence: Mutex::new(None),
            tokens: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            attendance: Mutex::new(BTreeMap::new()),
            faces: Mutex::new(HashMap::new()),
            policies: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every subsequent operation fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent operation, before it takes any lock.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of stored attendance records across all users.
    pub fn attendance_count(&self) -> usize {
        self.attendance.lock().unwrap().len()
    }

    /// Number of stored sessions, terminal ones included.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Copy of every stored session, in insertion order.
    pub fn sessions_snapshot(&self) -> Vec<VerificationSession> {
        self.sessions.lock().unwrap().clone()
    }

    /// Insert a session as-is, bypassing the upsert rules.
    pub fn insert_session(&self, session: VerificationSession) {
        self.sessions.lock().unwrap().push(session);
    }

    fn gate(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            std::thread::sleep(Duration::from_millis(latency));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("null store is unavailable".into()));
        }
        Ok(())
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GeofenceStore for NullStore {
    fn get_geofence(&self) -> Result<Option<GeofenceConfig>, StoreError> {
        self.gate()?;
        Ok(self.geofence.lock().unwrap().clone())
    }

    fn replace_geofence(
        &self,
        center: GeoPoint,
        radius_m: f64,
        now: Timestamp,
    ) -> Result<GeofenceConfig, StoreError> {
        self.gate()?;
        let mut slot = self.geofence.lock().unwrap();
        let next = next_geofence(slot.as_ref(), center, radius_m, now);
        *slot = Some(next.clone());
        Ok(next)
    }
}

impl TokenStore for NullStore {
    fn put_token(&self, token: &ScanToken) -> Result<(), StoreError> {
        self.gate()?;
        let mut tokens = self.tokens.lock().unwrap();
        if tokens.contains_key(&token.id) {
            return Err(StoreError::Duplicate(token.id.to_string()));
        }
        tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    fn get_token(&self, id: &TokenId) -> Result<Option<ScanToken>, StoreError> {
        self.gate()?;
        Ok(self.tokens.lock().unwrap().get(id).cloned())
    }

    fn consume_token(&self, id: &TokenId, now: Timestamp) -> Result<ConsumeOutcome, StoreError> {
        self.gate()?;
        let mut tokens = self.tokens.lock().unwrap();
        Ok(match tokens.get_mut(id) {
            Some(token) => token.consume(now),
            None => ConsumeOutcome::NotFound,
        })
    }

    fn release_token(&self, id: &TokenId) -> Result<Option<ScanToken>, StoreError> {
        self.gate()?;
        let mut tokens = self.tokens.lock().unwrap();
        Ok(tokens.get_mut(id).map(|token| {
            token.release();
            token.clone()
        }))
    }
}

impl SessionStore for NullStore {
    fn upsert_session(
        &self,
        subject: &UserId,
        token: &TokenId,
        new_id: &SessionId,
        update: &SessionUpdate,
        now: Timestamp,
    ) -> Result<VerificationSession, StoreError> {
        self.gate()?;
        let mut sessions = self.sessions.lock().unwrap();
        let open = sessions.iter().rposition(|s| {
            &s.subject == subject && &s.token_id == token && !s.status.is_terminal()
        });
        let idx = match open {
            Some(idx) => idx,
            None => {
                sessions.push(VerificationSession::open(
                    new_id.clone(),
                    subject.clone(),
                    token.clone(),
                    now,
                ));
                sessions.len() - 1
            }
        };
        sessions[idx].apply(update, now);
        Ok(sessions[idx].clone())
    }

    fn get_open_session(
        &self,
        subject: &UserId,
        token: &TokenId,
    ) -> Result<Option<VerificationSession>, StoreError> {
        self.gate()?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| &s.subject == subject && &s.token_id == token && !s.status.is_terminal())
            .cloned())
    }

    fn sessions_since(
        &self,
        subject: &UserId,
        since: Timestamp,
    ) -> Result<Vec<VerificationSession>, StoreError> {
        self.gate()?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.subject == subject && s.updated_at >= since)
            .cloned()
            .collect())
    }
}

impl AttendanceStore for NullStore {
    fn upsert_attendance(
        &self,
        user: &UserId,
        date: Timestamp,
        update: &AttendanceUpdate,
        now: Timestamp,
    ) -> Result<AttendanceRecord, StoreError> {
        self.gate()?;
        let mut records = self.attendance.lock().unwrap();
        let record = records
            .entry((user.clone(), date))
            .or_insert_with(|| AttendanceRecord::new(user.clone(), date, now));
        record.apply(update, now);
        Ok(record.clone())
    }

    fn get_attendance(
        &self,
        user: &UserId,
        date: Timestamp,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        self.gate()?;
        Ok(self
            .attendance
            .lock()
            .unwrap()
            .get(&(user.clone(), date))
            .cloned())
    }

    fn attendance_history(&self, user: &UserId) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.gate()?;
        Ok(self
            .attendance
            .lock()
            .unwrap()
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

impl FaceStore for NullStore {
    fn get_face_profile(&self, user: &UserId) -> Result<Option<FaceProfile>, StoreError> {
        self.gate()?;
        Ok(self.faces.lock().unwrap().get(user).cloned())
    }

    fn put_face_profile(&self, profile: &FaceProfile) -> Result<(), StoreError> {
        self.gate()?;
        self.faces
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    fn record_face_match(&self, user: &UserId, now: Timestamp) -> Result<FaceProfile, StoreError> {
        self.gate()?;
        let mut faces = self.faces.lock().unwrap();
        let profile = faces
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(user.to_string()))?;
        profile.last_verified_at = Some(now);
        profile.verification_count += 1;
        Ok(profile.clone())
    }
}

impl PolicyStore for NullStore {
    fn get_policy(&self, user: &UserId) -> Result<Option<SecurityPolicy>, StoreError> {
        self.gate()?;
        Ok(self.policies.lock().unwrap().get(user).cloned())
    }

    fn put_policy(&self, user: &UserId, policy: &SecurityPolicy) -> Result<(), StoreError> {
        self.gate()?;
        self.policies
            .lock()
            .unwrap()
            .insert(user.clone(), policy.clone());
        Ok(())
    }
}
