//! Scan token issuance, read-only validation, atomic consumption and release.

use crate::error::VerificationError;
use crate::identity::Principal;
use presence_crypto::random_id;
use presence_store::{ConsumeOutcome, PresenceStore, ScanToken, TokenKind};
use presence_types::{Clock, GeoPoint, PipelineParams, TokenId};
use std::sync::Arc;
use tracing::{info, warn};

/// Parameters of a token issue. `None` fields take the pipeline defaults.
#[derive(Clone, Debug)]
pub struct IssueRequest {
    pub kind: TokenKind,
    pub location: GeoPoint,
    pub max_usage: Option<u32>,
    pub ttl_secs: Option<u64>,
}

pub struct TokenRegistry {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    default_ttl_secs: u64,
    default_max_usage: u32,
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, params: &PipelineParams) -> Self {
        Self {
            store,
            clock,
            default_ttl_secs: params.default_token_ttl_secs,
            default_max_usage: params.default_token_max_usage,
        }
    }

    /// Issue a fresh, active token. Only roles with the issue capability may call this.
    pub fn issue(&self, issuer: &Principal, request: IssueRequest) -> Result<ScanToken, VerificationError> {
        if !issuer.role.can_issue_tokens() {
            return Err(VerificationError::Unauthorized {
                actor: issuer.user_id.to_string(),
                action: "issue scan tokens",
            });
        }
        if !request.location.is_valid() {
            return Err(VerificationError::InvalidLocation);
        }
        let max_usage = request.max_usage.unwrap_or(self.default_max_usage);
        if max_usage == 0 {
            return Err(VerificationError::InvalidToken(
                "max usage must be at least 1".into(),
            ));
        }
        let ttl = request.ttl_secs.unwrap_or(self.default_ttl_secs);
        if ttl == 0 {
            return Err(VerificationError::InvalidToken(
                "lifetime must be at least one second".into(),
            ));
        }

        let now = self.clock.now();
        let token = ScanToken {
            id: TokenId::new(random_id("qr_")?),
            kind: request.kind,
            location: request.location,
            active: true,
            issued_at: now,
            expires_at: now.plus_secs(ttl),
            usage_count: 0,
            max_usage,
            issued_by: issuer.user_id.clone(),
        };
        self.store.put_token(&token)?;
        info!(
            token = %token.id,
            kind = ?token.kind,
            max_usage,
            expires_at = token.expires_at.as_secs(),
            issued_by = %token.issued_by,
            "scan token issued"
        );
        Ok(token)
    }

    pub fn lookup(&self, id: &TokenId) -> Result<Option<ScanToken>, VerificationError> {
        Ok(self.store.get_token(id)?)
    }

    /// Read-only check that `id` could be consumed right now. Nothing is written.
    pub fn validate(&self, id: &TokenId) -> Result<ScanToken, VerificationError> {
        let token = self
            .store
            .get_token(id)?
            .ok_or_else(|| VerificationError::TokenNotFound(id.to_string()))?;
        match token.rejection(self.clock.now()) {
            None => Ok(token),
            Some(outcome) => Err(rejection_error(id, outcome)),
        }
    }

    /// Atomically check and increment the token's usage.
    pub fn consume(&self, id: &TokenId) -> Result<ScanToken, VerificationError> {
        match self.store.consume_token(id, self.clock.now())? {
            ConsumeOutcome::Consumed(token) => {
                info!(
                    token = %id,
                    usage = token.usage_count,
                    max_usage = token.max_usage,
                    "scan token consumed"
                );
                Ok(token)
            }
            outcome => {
                warn!(token = %id, ?outcome, "scan token rejected at consume");
                Err(rejection_error(id, outcome))
            }
        }
    }

    /// Give back a use taken by [`TokenRegistry::consume`] for an attempt that
    /// was not recorded.
    pub fn release(&self, id: &TokenId) -> Result<ScanToken, VerificationError> {
        let token = self
            .store
            .release_token(id)?
            .ok_or_else(|| VerificationError::TokenNotFound(id.to_string()))?;
        info!(token = %id, usage = token.usage_count, "scan token use released");
        Ok(token)
    }
}

fn rejection_error(id: &TokenId, outcome: ConsumeOutcome) -> VerificationError {
    match outcome {
        ConsumeOutcome::Expired => VerificationError::TokenExpired(id.to_string()),
        ConsumeOutcome::Exhausted => VerificationError::TokenExhausted(id.to_string()),
        ConsumeOutcome::NotFound | ConsumeOutcome::Inactive | ConsumeOutcome::Consumed(_) => {
            VerificationError::TokenNotFound(id.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_nullables::{NullClock, NullStore};
    use presence_store::TokenStore;
    use presence_types::{ErrorCode, Role, DEFAULT_GEOFENCE_CENTER};

    struct Fixture {
        store: Arc<NullStore>,
        clock: Arc<NullClock>,
        registry: TokenRegistry,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(10_000));
        let registry = TokenRegistry::new(store.clone(), clock.clone(), &PipelineParams::default());
        Fixture {
            store,
            clock,
            registry,
        }
    }

    fn request(max_usage: Option<u32>) -> IssueRequest {
        IssueRequest {
            kind: TokenKind::Attendance,
            location: DEFAULT_GEOFENCE_CENTER,
            max_usage,
            ttl_secs: None,
        }
    }

    fn faculty() -> Principal {
        Principal::new("prof-1", Role::Faculty)
    }

    #[test]
    fn issue_applies_defaults() {
        let f = fixture();
        let token = f.registry.issue(&faculty(), request(None)).unwrap();
        assert!(token.active);
        assert_eq!(token.usage_count, 0);
        assert_eq!(token.max_usage, 100);
        assert_eq!(token.expires_at.as_secs(), 10_300);
        assert!(token.id.as_str().starts_with("qr_"));
        assert_eq!(f.store.get_token(&token.id).unwrap(), Some(token));
    }

    #[test]
    fn students_cannot_issue() {
        let f = fixture();
        let err = f
            .registry
            .issue(&Principal::new("s1", Role::Student), request(None))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn zero_usage_is_rejected() {
        let f = fixture();
        let err = f.registry.issue(&faculty(), request(Some(0))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn validate_does_not_consume() {
        let f = fixture();
        let token = f.registry.issue(&faculty(), request(Some(1))).unwrap();
        f.registry.validate(&token.id).unwrap();
        f.registry.validate(&token.id).unwrap();
        assert_eq!(f.registry.lookup(&token.id).unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn lifecycle_errors() {
        let f = fixture();
        let unknown = TokenId::new("qr_missing");
        assert_eq!(f.registry.validate(&unknown).unwrap_err().code(), ErrorCode::TokenNotFound);
        assert_eq!(f.registry.consume(&unknown).unwrap_err().code(), ErrorCode::TokenNotFound);

        let token = f.registry.issue(&faculty(), request(Some(2))).unwrap();
        f.registry.consume(&token.id).unwrap();
        f.registry.consume(&token.id).unwrap();
        assert_eq!(
            f.registry.consume(&token.id).unwrap_err().code(),
            ErrorCode::TokenExhausted
        );

        let fresh = f.registry.issue(&faculty(), request(Some(2))).unwrap();
        f.clock.advance(301);
        assert_eq!(f.registry.validate(&fresh.id).unwrap_err().code(), ErrorCode::TokenExpired);
        assert_eq!(f.registry.consume(&fresh.id).unwrap_err().code(), ErrorCode::TokenExpired);
    }

    #[test]
    fn released_use_can_be_consumed_again() {
        let f = fixture();
        let token = f.registry.issue(&faculty(), request(Some(1))).unwrap();
        f.registry.consume(&token.id).unwrap();
        assert_eq!(
            f.registry.validate(&token.id).unwrap_err().code(),
            ErrorCode::TokenExhausted
        );
        assert_eq!(f.registry.release(&token.id).unwrap().usage_count, 0);
        assert_eq!(f.registry.consume(&token.id).unwrap().usage_count, 1);
        assert_eq!(
            f.registry.release(&TokenId::new("qr_missing")).unwrap_err().code(),
            ErrorCode::TokenNotFound
        );
    }

    #[test]
    fn inactive_token_reads_as_not_found() {
        let f = fixture();
        let mut token = f.registry.issue(&faculty(), request(Some(2))).unwrap();
        token.active = false;
        token.id = TokenId::new("qr_inactive");
        f.store.put_token(&token).unwrap();
        assert_eq!(
            f.registry.validate(&token.id).unwrap_err().code(),
            ErrorCode::TokenNotFound
        );
    }
}
