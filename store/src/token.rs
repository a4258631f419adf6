//! Scan token storage.

use crate::StoreError;
use presence_types::{GeoPoint, Timestamp, TokenId, UserId};
use serde::{Deserialize, Serialize};

/// What a scan of the token records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Attendance,
    Checkin,
    Checkout,
}

impl TokenKind {
    /// Whether a scan of this kind checks the subject out (otherwise in).
    pub fn is_checkout(&self) -> bool {
        matches!(self, TokenKind::Checkout)
    }
}

/// A time-boxed, usage-limited credential rendered into a QR code by the issuer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanToken {
    pub id: TokenId,
    pub kind: TokenKind,
    /// Where the token is displayed.
    pub location: GeoPoint,
    pub active: bool,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub usage_count: u32,
    pub max_usage: u32,
    pub issued_by: UserId,
}

/// Result of an atomic consume attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsumeOutcome {
    /// Usage was incremented; carries the token as stored afterwards.
    Consumed(ScanToken),
    NotFound,
    Inactive,
    Expired,
    Exhausted,
}

impl ScanToken {
    /// Past `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// `usage_count` has reached `max_usage`.
    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.max_usage
    }

    /// Why the token cannot be used at `now`, or `None` if it can.
    ///
    /// Expiry and exhaustion are terminal regardless of `active`.
    pub fn rejection(&self, now: Timestamp) -> Option<ConsumeOutcome> {
        if !self.active {
            Some(ConsumeOutcome::Inactive)
        } else if self.is_expired(now) {
            Some(ConsumeOutcome::Expired)
        } else if self.is_exhausted() {
            Some(ConsumeOutcome::Exhausted)
        } else {
            None
        }
    }

    /// Check usability and increment `usage_count` in place.
    ///
    /// Backends call this inside their atomic section (under the collection
    /// lock, or within one write transaction) and persist the token only when
    /// the outcome is [`ConsumeOutcome::Consumed`].
    pub fn consume(&mut self, now: Timestamp) -> ConsumeOutcome {
        if let Some(rejected) = self.rejection(now) {
            return rejected;
        }
        self.usage_count += 1;
        ConsumeOutcome::Consumed(self.clone())
    }

    /// Hand back one use taken by [`ScanToken::consume`]. Returns false at zero.
    pub fn release(&mut self) -> bool {
        match self.usage_count.checked_sub(1) {
            Some(count) => {
                self.usage_count = count;
                true
            }
            None => false,
        }
    }
}

/// Trait for scan token storage operations.
pub trait TokenStore {
    /// Insert a new token. Fails with [`StoreError::Duplicate`] if the id exists.
    fn put_token(&self, token: &ScanToken) -> Result<(), StoreError>;

    fn get_token(&self, id: &TokenId) -> Result<Option<ScanToken>, StoreError>;

    /// Atomically check and increment usage, see [`ScanToken::consume`].
    ///
    /// Under concurrent calls on one token, at most `max_usage` calls in total
    /// ever return [`ConsumeOutcome::Consumed`].
    fn consume_token(&self, id: &TokenId, now: Timestamp) -> Result<ConsumeOutcome, StoreError>;

    /// Atomically undo one successful consume, see [`ScanToken::release`].
    ///
    /// Returns the token as stored afterwards, or `None` if it does not exist.
    fn release_token(&self, id: &TokenId) -> Result<Option<ScanToken>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(max_usage: u32) -> ScanToken {
        ScanToken {
            id: TokenId::new("tok_1"),
            kind: TokenKind::Attendance,
            location: GeoPoint::new(15.797113, 78.077443),
            active: true,
            issued_at: Timestamp::new(1_000),
            expires_at: Timestamp::new(1_300),
            usage_count: 0,
            max_usage,
            issued_by: UserId::new("faculty-1"),
        }
    }

    #[test]
    fn consume_until_exhausted() {
        let mut t = token(2);
        assert!(matches!(t.consume(Timestamp::new(1_001)), ConsumeOutcome::Consumed(_)));
        assert!(matches!(t.consume(Timestamp::new(1_002)), ConsumeOutcome::Consumed(_)));
        assert_eq!(t.consume(Timestamp::new(1_003)), ConsumeOutcome::Exhausted);
        assert_eq!(t.usage_count, 2);
    }

    #[test]
    fn expiry_boundary_is_inclusive_of_expires_at() {
        let mut t = token(5);
        assert!(matches!(t.consume(Timestamp::new(1_300)), ConsumeOutcome::Consumed(_)));
        assert_eq!(t.consume(Timestamp::new(1_301)), ConsumeOutcome::Expired);
    }

    #[test]
    fn inactive_token_is_rejected_without_increment() {
        let mut t = token(5);
        t.active = false;
        assert_eq!(t.consume(Timestamp::new(1_001)), ConsumeOutcome::Inactive);
        assert_eq!(t.usage_count, 0);
    }

    #[test]
    fn release_reopens_an_exhausted_token() {
        let mut t = token(1);
        assert!(matches!(t.consume(Timestamp::new(1_001)), ConsumeOutcome::Consumed(_)));
        assert_eq!(t.consume(Timestamp::new(1_002)), ConsumeOutcome::Exhausted);
        assert!(t.release());
        assert!(matches!(t.consume(Timestamp::new(1_003)), ConsumeOutcome::Consumed(_)));
        assert!(t.release());
        assert!(!t.release());
        assert_eq!(t.usage_count, 0);
    }

    #[test]
    fn exhausted_wins_over_active_flag() {
        let mut t = token(1);
        t.usage_count = 1;
        assert!(t.active);
        assert_eq!(t.rejection(Timestamp::new(1_001)), Some(ConsumeOutcome::Exhausted));
    }
}
