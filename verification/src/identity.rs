//! Acting principals and the role directory seam.

use presence_store::StoreError;
use presence_types::{Role, UserId};
use std::collections::HashMap;

/// A resolved caller: who is acting and with which role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Resolves the role of a user. Backed by the identity provider in production.
pub trait Directory: Send + Sync {
    fn role_of(&self, user: &UserId) -> Result<Option<Role>, StoreError>;

    /// Resolve `user` into a principal. Users unknown to the directory act as students.
    fn principal(&self, user: &UserId) -> Result<Principal, StoreError> {
        let role = self.role_of(user)?.unwrap_or(Role::Student);
        Ok(Principal {
            user_id: user.clone(),
            role,
        })
    }
}

/// A directory built from a fixed user-to-role table.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    roles: HashMap<UserId, Role>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user: impl Into<UserId>, role: Role) -> Self {
        self.insert(user, role);
        self
    }

    pub fn insert(&mut self, user: impl Into<UserId>, role: Role) {
        self.roles.insert(user.into(), role);
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl FromIterator<(UserId, Role)> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = (UserId, Role)>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

impl Directory for StaticDirectory {
    fn role_of(&self, user: &UserId) -> Result<Option<Role>, StoreError> {
        Ok(self.roles.get(user).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_users_resolve_to_student() {
        let dir = StaticDirectory::new().with("prof-1", Role::Faculty);
        assert_eq!(dir.principal(&UserId::new("prof-1")).unwrap().role, Role::Faculty);
        assert_eq!(dir.principal(&UserId::new("stranger")).unwrap().role, Role::Student);
    }

    #[test]
    fn collects_from_pairs() {
        let dir: StaticDirectory = vec![
            (UserId::new("a"), Role::Admin),
            (UserId::new("d"), Role::Dean),
        ]
        .into_iter()
        .collect();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.role_of(&UserId::new("d")).unwrap(), Some(Role::Dean));
    }
}
