//! Archive lifecycle tests — closing a period and its idempotence.

use settle_core::{
    freeze::NoCutoff,
    lifecycle::ArchiveOutcome,
    rates::ACTIVE_SCOPE,
    store::PeriodState,
    Period, PeriodLifecycleManager, RateSet, SettleError,
};

fn rates() -> RateSet {
    RateSet {
        eur_usd: 1.01,
        gbp_usd: 1.21,
        usd_cop: 4000.0,
    }
}

/// Manager over an in-memory store with a small seeded roster.
fn setup() -> (PeriodLifecycleManager, Period) {
    let manager = PeriodLifecycleManager::in_memory().unwrap();
    let store = manager.store();
    store.upsert_sede("medellin", "Medellín").unwrap();
    store.upsert_group("g1", "medellin", "Grupo 1", None).unwrap();
    store.upsert_model("m1", "Model One", "g1", true).unwrap();
    store.upsert_model("m2", "Model Two", "g1", true).unwrap();
    store.upsert_rates(ACTIVE_SCOPE, &rates()).unwrap();

    let period = Period::parse("2026-08-01").unwrap();
    manager
        .record_raw_value("m1", "big7", &period, 100.0, &NoCutoff)
        .unwrap();
    manager
        .record_raw_value("m2", "chaturbate", &period, 1000.0, &NoCutoff)
        .unwrap();
    (manager, period)
}

#[test]
fn archive_snapshots_every_model() {
    let (manager, period) = setup();

    let outcome = manager.archive(&period, "alice").unwrap();
    assert!(matches!(outcome, ArchiveOutcome::Complete { models: 2 }));

    let status = manager.status(&period).unwrap();
    assert_eq!(status.state, PeriodState::Archived);
    assert!(status.archived);
    assert!(!status.in_progress, "lock must be released after archive");

    assert_eq!(manager.store().archive_model_count(&period).unwrap(), 2);

    // Rates were pinned under the period's own scope at closure.
    let pinned = manager.store().get_rates(&period.key()).unwrap().unwrap();
    assert_eq!(pinned, rates());

    // The snapshot holds the computed earnings, not raw inputs alone.
    let archived = manager.archived_earnings(&period).unwrap();
    let m1 = archived.iter().find(|e| e.model_id == "m1").unwrap();
    assert!((m1.total_model_usd - 67.872).abs() < 1e-9);
}

/// The second archive of the same period is rejected and no second
/// record set appears.
#[test]
fn double_archive_is_rejected() {
    let (manager, period) = setup();
    manager.archive(&period, "alice").unwrap();

    let err = manager.archive(&period, "bob").unwrap_err();
    assert!(
        matches!(err, SettleError::Precedence { .. }),
        "expected precedence rejection, got {err}"
    );
    assert_eq!(manager.store().archive_model_count(&period).unwrap(), 2);
}

/// An archive that dies before completion leaves the period in
/// 'archiving' with in_progress status, and a retry finishes the job.
#[test]
fn interrupted_archive_is_resumable() {
    let (manager, period) = setup();

    // No active rates: the attempt fails after entering 'archiving'.
    let bare = PeriodLifecycleManager::in_memory().unwrap();
    bare.store().upsert_sede("s", "S").unwrap();
    bare.store().upsert_group("g", "s", "G", None).unwrap();
    bare.store().upsert_model("m", "M", "g", true).unwrap();
    let p = Period::parse("2026-08-01").unwrap();
    bare.record_raw_value("m", "big7", &p, 10.0, &NoCutoff).unwrap();

    let err = bare.archive(&p, "alice").unwrap_err();
    assert!(matches!(err, SettleError::MissingRate { .. }));

    let status = bare.status(&p).unwrap();
    assert_eq!(status.state, PeriodState::Archiving);
    assert!(status.in_progress);
    assert!(!status.archived);

    // Provide rates and retry: the run resumes and completes.
    bare.store().upsert_rates(ACTIVE_SCOPE, &rates()).unwrap();
    let outcome = bare.archive(&p, "alice").unwrap();
    assert!(matches!(outcome, ArchiveOutcome::Complete { models: 1 }));

    // The fully set-up manager still archives normally.
    manager.archive(&period, "alice").unwrap();
}

/// Once a period leaves 'open', model input is read-only.
#[test]
fn raw_values_are_read_only_after_archive() {
    let (manager, period) = setup();
    manager.archive(&period, "alice").unwrap();

    let err = manager
        .record_raw_value("m1", "big7", &period, 500.0, &NoCutoff)
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation { .. }));

    let stored = manager
        .store()
        .get_raw_value("m1", "big7", &period.key())
        .unwrap()
        .unwrap();
    assert!((stored.amount - 100.0).abs() < 1e-9, "value must be unchanged");
}

/// A period nobody touched reads as open with no lock.
#[test]
fn untouched_period_reads_open() {
    let manager = PeriodLifecycleManager::in_memory().unwrap();
    let period = Period::parse("2027-01-16").unwrap();
    let status = manager.status(&period).unwrap();
    assert_eq!(status.state, PeriodState::Open);
    assert!(!status.archived);
    assert!(!status.in_progress);
    assert!(status.lock.is_none());
}

/// Every archive leaves an audit trail of who closed the period.
#[test]
fn archive_appends_audit_entries() {
    let (manager, period) = setup();
    manager.archive(&period, "alice").unwrap();

    let trail = manager.audit_trail(&period).unwrap();
    let types: Vec<&str> = trail.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"archive_started"));
    assert!(types.contains(&"archive_completed"));
    assert!(trail.iter().all(|e| e.actor == "alice"));
}
