//! Integration tests for the LMDB backend.

use std::sync::Arc;
use std::thread;

use presence_store::{
    AttendanceStatus, AttendanceStore, AttendanceUpdate, ConsumeOutcome, FaceProfile, FaceStore,
    GeofenceSource, GeofenceStore, PolicyStore, ScanToken, SecurityPolicy, SessionStatus,
    SessionStore, SessionUpdate, StoreError, TokenKind, TokenStore,
};
use presence_store_lmdb::LmdbStore;
use presence_types::{GeoPoint, SessionId, Timestamp, TokenId, UserId, SECS_PER_DAY};

fn temp_store() -> (tempfile::TempDir, LmdbStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).expect("open env");
    (dir, store)
}

fn token(id: &str, max_usage: u32) -> ScanToken {
    ScanToken {
        id: TokenId::new(id),
        kind: TokenKind::Attendance,
        location: GeoPoint::new(15.797113, 78.077443),
        active: true,
        issued_at: Timestamp::new(1_000),
        expires_at: Timestamp::new(1_300),
        usage_count: 0,
        max_usage,
        issued_by: UserId::new("prof"),
    }
}

#[test]
fn geofence_revisions_increase() {
    let (_dir, store) = temp_store();
    assert!(store.get_geofence().unwrap().is_none());
    let first = store
        .replace_geofence(GeoPoint::new(1.0, 2.0), 100.0, Timestamp::new(10))
        .unwrap();
    let second = store
        .replace_geofence(GeoPoint::new(3.0, 4.0), 200.0, Timestamp::new(20))
        .unwrap();
    assert_eq!(first.revision, 1);
    assert_eq!(second.revision, 2);
    let current = store.get_geofence().unwrap().unwrap();
    assert_eq!(current, second);
    assert_eq!(current.source, GeofenceSource::Persisted);
}

#[test]
fn duplicate_token_is_rejected() {
    let (_dir, store) = temp_store();
    store.put_token(&token("qr_1", 3)).unwrap();
    assert!(matches!(
        store.put_token(&token("qr_1", 3)),
        Err(StoreError::Duplicate(_))
    ));
}

#[test]
fn consume_reports_lifecycle() {
    let (_dir, store) = temp_store();
    store.put_token(&token("qr_1", 1)).unwrap();
    let id = TokenId::new("qr_1");
    assert!(matches!(
        store.consume_token(&id, Timestamp::new(1_100)).unwrap(),
        ConsumeOutcome::Consumed(_)
    ));
    assert_eq!(
        store.consume_token(&id, Timestamp::new(1_101)).unwrap(),
        ConsumeOutcome::Exhausted
    );
    assert_eq!(
        store
            .consume_token(&TokenId::new("qr_missing"), Timestamp::new(1_100))
            .unwrap(),
        ConsumeOutcome::NotFound
    );

    store.put_token(&token("qr_2", 5)).unwrap();
    assert_eq!(
        store
            .consume_token(&TokenId::new("qr_2"), Timestamp::new(1_301))
            .unwrap(),
        ConsumeOutcome::Expired
    );
    assert_eq!(store.get_token(&TokenId::new("qr_2")).unwrap().unwrap().usage_count, 0);
}

#[test]
fn release_hands_back_one_use() {
    let (_dir, store) = temp_store();
    store.put_token(&token("qr_1", 1)).unwrap();
    let id = TokenId::new("qr_1");
    assert!(matches!(
        store.consume_token(&id, Timestamp::new(1_100)).unwrap(),
        ConsumeOutcome::Consumed(_)
    ));

    let released = store.release_token(&id).unwrap().unwrap();
    assert_eq!(released.usage_count, 0);
    assert_eq!(store.get_token(&id).unwrap().unwrap().usage_count, 0);
    assert!(matches!(
        store.consume_token(&id, Timestamp::new(1_101)).unwrap(),
        ConsumeOutcome::Consumed(_)
    ));

    store.release_token(&id).unwrap();
    assert_eq!(store.release_token(&id).unwrap().unwrap().usage_count, 0);
    assert!(store.release_token(&TokenId::new("qr_missing")).unwrap().is_none());
}

#[test]
fn concurrent_consumers_never_exceed_max_usage() {
    let (_dir, store) = temp_store();
    store.put_token(&token("qr_hot", 7)).unwrap();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                matches!(
                    store
                        .consume_token(&TokenId::new("qr_hot"), Timestamp::new(1_100))
                        .unwrap(),
                    ConsumeOutcome::Consumed(_)
                )
            })
        })
        .collect();
    let consumed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(consumed, 7);
    assert_eq!(
        store.get_token(&TokenId::new("qr_hot")).unwrap().unwrap().usage_count,
        7
    );
}

#[test]
fn attendance_upserts_one_record_per_day() {
    let (_dir, store) = temp_store();
    let user = UserId::new("s1");
    let day = Timestamp::new(5 * SECS_PER_DAY);
    let present = AttendanceUpdate {
        status: Some(AttendanceStatus::Present),
        check_in_at: Some(Timestamp::new(5 * SECS_PER_DAY + 10)),
        ..Default::default()
    };
    store
        .upsert_attendance(&user, day, &present, Timestamp::new(5 * SECS_PER_DAY + 10))
        .unwrap();
    let second = store
        .upsert_attendance(&user, day, &present, Timestamp::new(5 * SECS_PER_DAY + 20))
        .unwrap();
    assert_eq!(second.created_at, Timestamp::new(5 * SECS_PER_DAY + 10));
    assert_eq!(second.updated_at, Timestamp::new(5 * SECS_PER_DAY + 20));

    let earlier = Timestamp::new(4 * SECS_PER_DAY);
    store
        .upsert_attendance(&user, earlier, &present, Timestamp::new(4 * SECS_PER_DAY + 5))
        .unwrap();
    // A user whose id extends "s1" must not leak into its history.
    store
        .upsert_attendance(&UserId::new("s10"), day, &present, Timestamp::new(5 * SECS_PER_DAY))
        .unwrap();

    let history = store.attendance_history(&user).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].date, earlier);
    assert_eq!(history[1].date, day);
    assert_eq!(store.get_attendance(&user, day).unwrap().unwrap().status, AttendanceStatus::Present);
}

#[test]
fn sessions_reopen_only_after_terminal_status() {
    let (_dir, store) = temp_store();
    let (u, t) = (UserId::new("s1"), TokenId::new("qr_1"));
    let first = store
        .upsert_session(&u, &t, &SessionId::new("ses_a"), &SessionUpdate::default(), Timestamp::new(100))
        .unwrap();
    let again = store
        .upsert_session(&u, &t, &SessionId::new("ses_b"), &SessionUpdate::default(), Timestamp::new(110))
        .unwrap();
    assert_eq!(first.session_id, again.session_id);

    let closed = SessionUpdate {
        status: Some(SessionStatus::Completed),
        ..Default::default()
    };
    store
        .upsert_session(&u, &t, &SessionId::new("ses_c"), &closed, Timestamp::new(120))
        .unwrap();
    assert!(store.get_open_session(&u, &t).unwrap().is_none());

    let fresh = store
        .upsert_session(&u, &t, &SessionId::new("ses_d"), &SessionUpdate::default(), Timestamp::new(130))
        .unwrap();
    assert_eq!(fresh.session_id, SessionId::new("ses_d"));
    assert_eq!(store.sessions_since(&u, Timestamp::new(0)).unwrap().len(), 2);
    assert_eq!(store.sessions_since(&u, Timestamp::new(125)).unwrap().len(), 1);
}

#[test]
fn ids_with_control_bytes_stay_in_their_own_keyspace() {
    let (_dir, store) = temp_store();
    let (a, nul) = (UserId::new("a"), UserId::new("a\u{0}x"));
    let day = Timestamp::new(5 * SECS_PER_DAY);
    let present = AttendanceUpdate {
        status: Some(AttendanceStatus::Present),
        ..Default::default()
    };
    store.upsert_attendance(&nul, day, &present, day).unwrap();
    store
        .upsert_session(&nul, &TokenId::new("qr_1"), &SessionId::new("ses_n"), &SessionUpdate::default(), day)
        .unwrap();

    assert!(store.attendance_history(&a).unwrap().is_empty());
    assert!(store.get_attendance(&a, day).unwrap().is_none());
    assert!(store.sessions_since(&a, Timestamp::new(0)).unwrap().is_empty());
    assert_eq!(store.attendance_history(&nul).unwrap().len(), 1);
    assert_eq!(store.sessions_since(&nul, Timestamp::new(0)).unwrap().len(), 1);
}

#[test]
fn face_match_requires_profile() {
    let (_dir, store) = temp_store();
    let user = UserId::new("s1");
    assert!(matches!(
        store.record_face_match(&user, Timestamp::new(5)),
        Err(StoreError::NotFound(_))
    ));
    store
        .put_face_profile(&FaceProfile {
            user_id: user.clone(),
            encoding: "ab".repeat(32),
            registered_at: Timestamp::new(1),
            last_verified_at: None,
            verification_count: 0,
        })
        .unwrap();
    let touched = store.record_face_match(&user, Timestamp::new(5)).unwrap();
    assert_eq!(touched.verification_count, 1);
    assert_eq!(touched.last_verified_at, Some(Timestamp::new(5)));
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let user = UserId::new("s1");
    {
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        store
            .put_policy(
                &user,
                &SecurityPolicy {
                    allow_proxy_attendance: true,
                    ..SecurityPolicy::default()
                },
            )
            .unwrap();
    }
    let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
    assert!(store.get_policy(&user).unwrap().unwrap().allow_proxy_attendance);
}
