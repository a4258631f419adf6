//! Per-user security policies and proxy authorization.

use crate::error::VerificationError;
use crate::identity::Principal;
use presence_store::{PresenceStore, SecurityPolicy};
use presence_types::{PipelineParams, UserId};
use std::sync::Arc;
use tracing::{info, warn};

/// Proof that `actor` may mark attendance for `subject`.
///
/// Only [`SecurityPolicies::authorize_proxy`] constructs one, so holding a
/// grant means both the role check and the subject's opt-in passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyGrant {
    actor: UserId,
    subject: UserId,
    reason: String,
}

impl ProxyGrant {
    pub fn actor(&self) -> &UserId {
        &self.actor
    }

    pub fn subject(&self) -> &UserId {
        &self.subject
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub struct SecurityPolicies {
    store: Arc<dyn PresenceStore>,
    default_policy: SecurityPolicy,
}

impl SecurityPolicies {
    pub fn new(store: Arc<dyn PresenceStore>, params: &PipelineParams) -> Self {
        Self {
            store,
            default_policy: SecurityPolicy {
                max_verification_attempts: params.default_max_verification_attempts,
                ..SecurityPolicy::default()
            },
        }
    }

    /// The stored policy, or the defaults when the user never set one.
    pub fn policy_for(&self, user: &UserId) -> Result<SecurityPolicy, VerificationError> {
        Ok(self
            .store
            .get_policy(user)?
            .unwrap_or_else(|| self.default_policy.clone()))
    }

    /// A user opting in to (or out of) proxy attendance. Only the owner may do this.
    pub fn set_proxy_opt_in(
        &self,
        actor: &Principal,
        user: &UserId,
        allow: bool,
    ) -> Result<SecurityPolicy, VerificationError> {
        if &actor.user_id != user {
            return Err(VerificationError::Unauthorized {
                actor: actor.user_id.to_string(),
                action: "change another user's proxy opt-in",
            });
        }
        let mut policy = self.policy_for(user)?;
        policy.allow_proxy_attendance = allow;
        self.store.put_policy(user, &policy)?;
        info!(user = %user, allow, "proxy opt-in changed");
        Ok(policy)
    }

    /// Replace a user's policy wholesale. Admin only.
    pub fn set_policy(
        &self,
        actor: &Principal,
        user: &UserId,
        policy: SecurityPolicy,
    ) -> Result<SecurityPolicy, VerificationError> {
        if !actor.role.can_administer() {
            return Err(VerificationError::Unauthorized {
                actor: actor.user_id.to_string(),
                action: "edit security policies",
            });
        }
        self.store.put_policy(user, &policy)?;
        info!(user = %user, by = %actor.user_id, ?policy, "security policy replaced");
        Ok(policy)
    }

    /// Check that `actor` may mark attendance on behalf of `subject`.
    ///
    /// The role check runs before the subject's policy is read.
    pub fn authorize_proxy(
        &self,
        actor: &Principal,
        subject: &UserId,
        reason: Option<String>,
    ) -> Result<ProxyGrant, VerificationError> {
        if !actor.role.can_proxy_attend() {
            warn!(actor = %actor.user_id, role = %actor.role, "proxy attempt by unauthorized role");
            return Err(VerificationError::UnauthorizedProxy(actor.user_id.to_string()));
        }
        if !self.policy_for(subject)?.allow_proxy_attendance {
            warn!(actor = %actor.user_id, subject = %subject, "proxy attempt without opt-in");
            return Err(VerificationError::ProxyNotAllowed(subject.to_string()));
        }
        Ok(ProxyGrant {
            actor: actor.user_id.clone(),
            subject: subject.clone(),
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "Proxy attendance".to_string()),
        })
    }
}
