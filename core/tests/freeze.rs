//! Freeze tests — cutoff windows and read-only raw values.

use settle_core::{
    freeze::{NoCutoff, StaticCutoff},
    rates::ACTIVE_SCOPE,
    Period, PeriodLifecycleManager, RateSet, SettleError,
};

fn setup() -> (PeriodLifecycleManager, Period) {
    let manager = PeriodLifecycleManager::in_memory().unwrap();
    let store = manager.store();
    store.upsert_sede("s", "Sede").unwrap();
    store.upsert_group("g", "s", "Grupo", None).unwrap();
    store.upsert_model("m1", "Model One", "g", true).unwrap();
    store
        .upsert_rates(
            ACTIVE_SCOPE,
            &RateSet {
                eur_usd: 1.01,
                gbp_usd: 1.21,
                usd_cop: 4000.0,
            },
        )
        .unwrap();
    (manager, Period::parse("2026-08-01").unwrap())
}

/// A persisted freeze makes that platform's raw value read-only while
/// other platforms stay editable.
#[test]
fn frozen_platform_rejects_writes() {
    let (manager, period) = setup();
    manager
        .record_raw_value("m1", "big7", &period, 100.0, &NoCutoff)
        .unwrap();
    manager
        .freeze_platform(&period, "m1", "big7", "cutoff")
        .unwrap();

    let err = manager
        .record_raw_value("m1", "big7", &period, 200.0, &NoCutoff)
        .unwrap_err();
    assert!(matches!(err, SettleError::Frozen { .. }));

    // The stored value is untouched and other platforms still accept input.
    let v = manager
        .store()
        .get_raw_value("m1", "big7", &period.key())
        .unwrap()
        .unwrap();
    assert!((v.amount - 100.0).abs() < 1e-9);
    manager
        .record_raw_value("m1", "mondo", &period, 50.0, &NoCutoff)
        .unwrap();
}

/// The collaborator-supplied cutoff predicate is honored even without
/// a persisted freeze row.
#[test]
fn policy_cutoff_rejects_writes() {
    let (manager, period) = setup();
    let policy = StaticCutoff::new(["big7".to_string()]);

    let err = manager
        .record_raw_value("m1", "big7", &period, 100.0, &policy)
        .unwrap_err();
    assert!(matches!(err, SettleError::Frozen { .. }));

    manager
        .record_raw_value("m1", "mondo", &period, 100.0, &policy)
        .unwrap();
}

/// Negative raw input is rejected at the write boundary.
#[test]
fn negative_raw_value_is_rejected() {
    let (manager, period) = setup();
    let err = manager
        .record_raw_value("m1", "big7", &period, -10.0, &NoCutoff)
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation { .. }));
}

/// Unknown or disabled models cannot write values.
#[test]
fn unknown_model_is_rejected() {
    let (manager, period) = setup();
    let err = manager
        .record_raw_value("ghost", "big7", &period, 10.0, &NoCutoff)
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation { .. }));

    manager
        .store()
        .upsert_model("m2", "Disabled", "g", false)
        .unwrap();
    let err = manager
        .record_raw_value("m2", "big7", &period, 10.0, &NoCutoff)
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation { .. }));
}

/// Upserting twice keeps exactly one row per (model, platform, period).
#[test]
fn one_raw_value_per_key() {
    let (manager, period) = setup();
    manager
        .record_raw_value("m1", "big7", &period, 100.0, &NoCutoff)
        .unwrap();
    manager
        .record_raw_value("m1", "big7", &period, 150.0, &NoCutoff)
        .unwrap();

    assert_eq!(manager.store().count_raw_values(&period.key()).unwrap(), 1);
    let v = manager
        .store()
        .get_raw_value("m1", "big7", &period.key())
        .unwrap()
        .unwrap();
    assert!((v.amount - 150.0).abs() < 1e-9);
}
