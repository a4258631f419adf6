//! Deterministic face matching.
//!
//! This is a content-digest stand-in, not biometric recognition: the encoding
//! of an image is the Blake2b-256 digest of its raw bytes, and similarity is
//! the fraction of equal byte positions over the shared prefix of two digests.
//! Identical images always match with score 1.0; anything else almost never does.

use crate::error::VerificationError;
use presence_crypto::blake2b_256_hex;
use presence_store::{FaceProfile, PresenceStore};
use presence_types::{Clock, PipelineParams, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Encode an image into its stored digest (lowercase hex).
pub fn encode(image: &[u8]) -> String {
    blake2b_256_hex(image)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FaceScore {
    /// Similarity in `[0, 1]`.
    pub value: f64,
    pub matched: bool,
}

/// Score `candidate` against `stored`.
///
/// Hex encodings are compared as decoded digest bytes. Anything that is not
/// valid hex is compared byte for byte as given. Empty input scores 0.
pub fn score(stored: &str, candidate: &str, threshold: f64) -> FaceScore {
    let value = match (hex::decode(stored), hex::decode(candidate)) {
        (Ok(a), Ok(b)) => prefix_similarity(&a, &b),
        _ => prefix_similarity(stored.as_bytes(), candidate.as_bytes()),
    };
    FaceScore {
        value,
        matched: value >= threshold,
    }
}

fn prefix_similarity(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let matches = a.iter().zip(b).filter(|(x, y)| x == y).count();
    matches as f64 / len as f64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceReason {
    Matched,
    BelowThreshold,
}

/// Result of an ad-hoc verification.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceVerification {
    pub verified: bool,
    pub score: f64,
    /// `min(score * 100, 100)`.
    pub confidence: f64,
    pub reason: FaceReason,
}

impl FaceVerification {
    pub(crate) fn from_score(s: FaceScore) -> Self {
        Self {
            verified: s.matched,
            score: s.value,
            confidence: (s.value * 100.0).min(100.0),
            reason: if s.matched {
                FaceReason::Matched
            } else {
                FaceReason::BelowThreshold
            },
        }
    }
}

pub struct FaceMatcher {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    verify_threshold: f64,
    scan_threshold: f64,
}

impl FaceMatcher {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, params: &PipelineParams) -> Self {
        Self {
            store,
            clock,
            verify_threshold: params.face_match_threshold,
            scan_threshold: params.scan_face_threshold,
        }
    }

    pub fn verify_threshold(&self) -> f64 {
        self.verify_threshold
    }

    pub fn scan_threshold(&self) -> f64 {
        self.scan_threshold
    }

    /// Create or replace the user's profile. The verification count restarts at zero.
    pub fn register(&self, user: &UserId, image: &[u8]) -> Result<FaceProfile, VerificationError> {
        if image.is_empty() {
            return Err(VerificationError::MissingInput("face image"));
        }
        let profile = FaceProfile {
            user_id: user.clone(),
            encoding: encode(image),
            registered_at: self.clock.now(),
            last_verified_at: None,
            verification_count: 0,
        };
        self.store.put_face_profile(&profile)?;
        info!(user = %user, "face profile registered");
        Ok(profile)
    }

    /// Score `image` against the user's profile without touching it.
    pub fn assess(
        &self,
        user: &UserId,
        image: &[u8],
        threshold: f64,
    ) -> Result<FaceScore, VerificationError> {
        let profile = self
            .store
            .get_face_profile(user)?
            .ok_or_else(|| VerificationError::NoFaceRegistered(user.to_string()))?;
        Ok(score(&profile.encoding, &encode(image), threshold))
    }

    /// Stamp a successful match on the profile.
    pub fn record_match(&self, user: &UserId) -> Result<FaceProfile, VerificationError> {
        Ok(self.store.record_face_match(user, self.clock.now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_nullables::{NullClock, NullStore};
    use presence_store::FaceStore;
    use presence_types::{ErrorCode, Timestamp};

    fn matcher() -> (Arc<NullStore>, FaceMatcher) {
        let store = Arc::new(NullStore::new());
        let matcher = FaceMatcher::new(
            store.clone(),
            Arc::new(NullClock::new(500)),
            &PipelineParams::default(),
        );
        (store, matcher)
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(encode(b"selfie"), encode(b"selfie"));
        assert_ne!(encode(b"selfie"), encode(b"selfie2"));
        assert_eq!(encode(b"selfie").len(), 64);
    }

    #[test]
    fn score_of_self_is_one() {
        let d = encode(b"x");
        let s = score(&d, &d, 0.7);
        assert_eq!(s.value, 1.0);
        assert!(s.matched);
    }

    #[test]
    fn score_uses_shared_prefix() {
        assert_eq!(prefix_similarity(&[1, 2, 3, 4], &[1, 9, 3]), 2.0 / 3.0);
        assert_eq!(prefix_similarity(&[], &[1]), 0.0);
        // Not hex: compared as raw bytes.
        assert_eq!(score("abcz", "abcy", 0.6).value, 0.75);
    }

    #[test]
    fn assess_without_profile_fails() {
        let (_, m) = matcher();
        let err = m.assess(&UserId::new("u1"), b"img", 0.6).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoFaceRegistered);
    }

    #[test]
    fn assess_leaves_profile_alone() {
        let (store, m) = matcher();
        let user = UserId::new("u1");
        m.register(&user, b"img").unwrap();
        assert!(m.assess(&user, b"img", m.scan_threshold()).unwrap().matched);
        let miss = m.assess(&user, b"other", m.verify_threshold()).unwrap();
        assert!(!miss.matched);
        assert_eq!(
            FaceVerification::from_score(miss).reason,
            FaceReason::BelowThreshold
        );
        assert_eq!(store.get_face_profile(&user).unwrap().unwrap().verification_count, 0);
    }

    #[test]
    fn record_match_stamps_profile() {
        let (_, m) = matcher();
        let user = UserId::new("u1");
        m.register(&user, b"img").unwrap();
        let profile = m.record_match(&user).unwrap();
        assert_eq!(profile.verification_count, 1);
        assert_eq!(profile.last_verified_at, Some(Timestamp::new(500)));
        assert_eq!(
            m.record_match(&UserId::new("nobody")).unwrap_err().code(),
            ErrorCode::StorageError
        );
    }

    #[test]
    fn re_registering_resets_count() {
        let (store, m) = matcher();
        let user = UserId::new("u1");
        m.register(&user, b"img").unwrap();
        m.record_match(&user).unwrap();
        m.register(&user, b"new-img").unwrap();
        let profile = store.get_face_profile(&user).unwrap().unwrap();
        assert_eq!(profile.verification_count, 0);
        assert_eq!(profile.encoding, encode(b"new-img"));
    }

    #[test]
    fn empty_image_cannot_be_registered() {
        let (_, m) = matcher();
        let err = m.register(&UserId::new("u1"), b"").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingInput);
    }
}
