//! String identifiers for users, scan tokens and verification sessions.
//!
//! Identifiers are opaque: the pipeline never parses them, it only compares,
//! hashes and stores them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Return the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Identifier of a user account, as resolved by the identity provider.
    UserId
);

string_id!(
    /// Identifier of a scan token. This is the payload encoded into the QR code.
    TokenId
);

string_id!(
    /// Identifier of one verification session.
    SessionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(UserId::new("").is_blank());
        assert!(UserId::new("  ").is_blank());
        assert!(!UserId::new("u-1").is_blank());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&TokenId::new("tok_ab12")).unwrap();
        assert_eq!(json, "\"tok_ab12\"");
        let back: TokenId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "tok_ab12");
    }
}
