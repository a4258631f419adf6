//! Principal roles and the capabilities they carry.
//!
//! Call sites ask for a capability (`can_proxy_attend`, ...) instead of
//! matching on role lists, so the role matrix lives in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    /// Head of department.
    Hod,
    Dean,
    Admin,
}

impl Role {
    /// May mark attendance on behalf of another user who opted in.
    pub fn can_proxy_attend(&self) -> bool {
        matches!(self, Role::Faculty | Role::Hod | Role::Dean | Role::Admin)
    }

    /// May issue scan tokens.
    pub fn can_issue_tokens(&self) -> bool {
        matches!(self, Role::Faculty | Role::Hod | Role::Dean | Role::Admin)
    }

    /// May replace the geofence and edit other users' security policies.
    pub fn can_administer(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Hod => "hod",
            Role::Dean => "dean",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "hod" => Ok(Role::Hod),
            "dean" => Ok(Role::Dean),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
