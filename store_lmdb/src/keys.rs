//! Composite key layouts.
//!
//! String components are written as `len_be32 ++ bytes`, so a prefix scan for
//! one user never matches another id, whatever bytes either contains.
//! Timestamps are big-endian so keys sort chronologically.

use presence_types::{SessionId, Timestamp, TokenId, UserId};

fn push_component(key: &mut Vec<u8>, component: &str) {
    key.extend_from_slice(&(component.len() as u32).to_be_bytes());
    key.extend_from_slice(component.as_bytes());
}

/// `[user]`, the prefix of every key owned by `user`.
pub fn user_prefix(user: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + user.as_str().len());
    push_component(&mut key, user.as_str());
    key
}

/// `[user] ++ day_be`.
pub fn attendance_key(user: &UserId, date: Timestamp) -> Vec<u8> {
    let mut key = user_prefix(user);
    key.extend_from_slice(&date.as_secs().to_be_bytes());
    key
}

/// `[subject] ++ [token]`.
pub fn session_pair_prefix(subject: &UserId, token: &TokenId) -> Vec<u8> {
    let mut key = user_prefix(subject);
    push_component(&mut key, token.as_str());
    key
}

/// `[subject] ++ [token] ++ started_be ++ session`.
pub fn session_key(subject: &UserId, token: &TokenId, started: Timestamp, id: &SessionId) -> Vec<u8> {
    let mut key = session_pair_prefix(subject, token);
    key.extend_from_slice(&started.as_secs().to_be_bytes());
    key.extend_from_slice(id.as_str().as_bytes());
    key
}

/// Turn `prefix` into the smallest key greater than every key starting with it.
pub fn increment_prefix(prefix: &mut Vec<u8>) {
    while let Some(last) = prefix.pop() {
        if last < u8::MAX {
            prefix.push(last + 1);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_carries_over_max_bytes() {
        let mut p = vec![1, 2, 0xff];
        increment_prefix(&mut p);
        assert_eq!(p, vec![1, 3]);

        let mut all_max = vec![0xff, 0xff];
        increment_prefix(&mut all_max);
        assert!(all_max.is_empty());
    }

    #[test]
    fn attendance_keys_sort_by_day() {
        let u = UserId::new("s1");
        assert!(attendance_key(&u, Timestamp::new(86_400)) < attendance_key(&u, Timestamp::new(172_800)));
    }

    #[test]
    fn user_prefix_does_not_cover_longer_ids() {
        let short = user_prefix(&UserId::new("s1"));
        let long = attendance_key(&UserId::new("s10"), Timestamp::new(0));
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn embedded_nul_does_not_alias_another_user() {
        let short = user_prefix(&UserId::new("a"));
        let nul = attendance_key(&UserId::new("a\u{0}x"), Timestamp::new(0));
        assert!(!nul.starts_with(&short));

        let pair = session_pair_prefix(&UserId::new("a"), &TokenId::new("t"));
        let other = session_pair_prefix(&UserId::new("a\u{0}\u{0}\u{0}\u{1}t"), &TokenId::new(""));
        assert!(!other.starts_with(&pair));
    }
}
