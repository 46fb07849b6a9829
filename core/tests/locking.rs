//! Persisted-lock tests — two independent admin sessions racing on one
//! period. Sessions share nothing but the database: each test opens a
//! second connection over a shared-cache URI, exactly how concurrent
//! operator processes meet in production.

use settle_core::{
    freeze::NoCutoff,
    lifecycle::ArchiveOutcome,
    rates::ACTIVE_SCOPE,
    store::{AcquireOutcome, PeriodState, SettleStore},
    Period, PeriodLifecycleManager, RateSet, SettleConfig, SettleError,
};

fn rates() -> RateSet {
    RateSet {
        eur_usd: 1.01,
        gbp_usd: 1.21,
        usd_cop: 4000.0,
    }
}

/// Two sessions over the same shared-memory database.
fn two_sessions(tag: &str) -> (PeriodLifecycleManager, PeriodLifecycleManager, Period) {
    let uri = format!("file:{tag}?mode=memory&cache=shared");
    let store_a = SettleStore::open(&uri).unwrap();
    store_a.migrate().unwrap();
    store_a.upsert_sede("s", "Sede").unwrap();
    store_a.upsert_group("g", "s", "Grupo", None).unwrap();
    store_a.upsert_model("m1", "Model One", "g", true).unwrap();
    store_a.upsert_rates(ACTIVE_SCOPE, &rates()).unwrap();

    let store_b = store_a.reopen().unwrap();
    let config = SettleConfig::builtin();
    let a = PeriodLifecycleManager::new(store_a, &config);
    let b = PeriodLifecycleManager::new(store_b, &config);

    let period = Period::parse("2026-08-01").unwrap();
    a.record_raw_value("m1", "big7", &period, 100.0, &NoCutoff)
        .unwrap();
    (a, b, period)
}

/// While one admin holds the archive lock, the other's attempt is
/// rejected as informational, not re-applied.
#[test]
fn second_session_sees_lock_held() {
    let (a, b, period) = two_sessions("lock_held");

    // Session A holds the lock, as if mid-archive.
    match a
        .store()
        .try_acquire_lock(&period, "archive", "alice", "token-a", 0)
        .unwrap()
    {
        AcquireOutcome::Acquired { .. } => {}
        other => panic!("expected to acquire, got {other:?}"),
    }

    let err = b.archive(&period, "bob").unwrap_err();
    match err {
        SettleError::LockHeld { operation, holder } => {
            assert_eq!(operation, "archive");
            assert_eq!(holder, "alice");
        }
        other => panic!("expected LockHeld, got {other}"),
    }

    // B can still poll status without blocking.
    let status = b.status(&period).unwrap();
    assert!(status.in_progress);
    assert_eq!(status.lock.unwrap().holder, "alice");
}

/// A lock left behind by a crashed session is reclaimed once stale.
#[test]
fn stale_lock_is_reclaimed() {
    let store = SettleStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.upsert_sede("s", "Sede").unwrap();
    store.upsert_group("g", "s", "Grupo", None).unwrap();
    store.upsert_model("m1", "Model One", "g", true).unwrap();
    store.upsert_rates(ACTIVE_SCOPE, &rates()).unwrap();

    // Zero staleness: any existing lock is immediately reclaimable.
    let mut config = SettleConfig::builtin();
    config.params.lock_stale_minutes = 0;
    let manager = PeriodLifecycleManager::new(store, &config);

    let period = Period::parse("2026-08-01").unwrap();
    manager
        .record_raw_value("m1", "big7", &period, 100.0, &NoCutoff)
        .unwrap();

    // The crashed session's lock, never released.
    manager
        .store()
        .try_acquire_lock(&period, "archive", "crashed", "dead-token", 0)
        .unwrap();

    let outcome = manager.archive(&period, "alice").unwrap();
    assert!(matches!(outcome, ArchiveOutcome::Complete { models: 1 }));

    let trail = manager.audit_trail(&period).unwrap();
    assert!(
        trail.iter().any(|e| e.event_type == "lock_reclaimed"),
        "reclaim must be audited"
    );
}

/// Releasing requires the acquiring session's token, so a session whose
/// stale lock was reclaimed cannot release the new holder's lock.
#[test]
fn release_requires_matching_token() {
    let store = SettleStore::in_memory().unwrap();
    store.migrate().unwrap();
    let period = Period::parse("2026-08-01").unwrap();
    store.ensure_period(&period).unwrap();

    store
        .try_acquire_lock(&period, "cleanup", "alice", "token-a", 0)
        .unwrap();

    assert!(!store.release_lock(&period, "token-b").unwrap());
    assert!(store.release_lock(&period, "token-a").unwrap());
    assert!(store
        .period_state(&period)
        .unwrap()
        .unwrap()
        .lock
        .is_none());
}

/// One session archives; the other observes the result and is refused
/// a second archive — exactly one record set exists.
#[test]
fn archive_race_yields_single_record_set() {
    let (a, b, period) = two_sessions("archive_race");

    let outcome = a.archive(&period, "alice").unwrap();
    assert!(matches!(outcome, ArchiveOutcome::Complete { models: 1 }));

    let err = b.archive(&period, "bob").unwrap_err();
    assert!(matches!(err, SettleError::Precedence { .. }));

    assert_eq!(a.store().archive_model_count(&period).unwrap(), 1);
    assert_eq!(b.store().archive_model_count(&period).unwrap(), 1);
    assert_eq!(b.status(&period).unwrap().state, PeriodState::Archived);
}

/// Cleanup raced from a second session is rejected after the first wins.
#[test]
fn cleanup_race_is_not_double_applied() {
    let (a, b, period) = two_sessions("cleanup_race");
    a.archive(&period, "alice").unwrap();

    a.cleanup(&period, "alice").unwrap();
    let err = b.cleanup(&period, "bob").unwrap_err();
    assert!(matches!(err, SettleError::Precedence { .. }));

    // The next period was opened exactly once.
    let next = period.next();
    assert_eq!(b.status(&next).unwrap().state, PeriodState::Open);
}
