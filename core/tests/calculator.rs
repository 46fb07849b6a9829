//! Earnings calculator tests — the worked examples and sum invariants.

use settle_core::{
    calculator::compute_model_earnings,
    config::SettlementParams,
    rules::PlatformRuleSet,
    store::RawValue,
    RateSet, SettleConfig, SettleError,
};

fn rules() -> PlatformRuleSet {
    PlatformRuleSet::from_config(&SettleConfig::builtin())
}

fn params() -> SettlementParams {
    SettlementParams::default()
}

fn rates() -> RateSet {
    RateSet {
        eur_usd: 1.01,
        gbp_usd: 1.21,
        usd_cop: 4000.0,
    }
}

fn raw(model: &str, platform: &str, amount: f64) -> RawValue {
    RawValue {
        model_id: model.to_string(),
        platform_id: platform.to_string(),
        period_date: "2026-08-01".to_string(),
        amount,
        updated_at: 0,
    }
}

/// 1000 chaturbate tokens at 80%: presplit 50, model share 40.
#[test]
fn chaturbate_tokens_at_eighty_percent() {
    let values = [raw("m1", "chaturbate", 1000.0)];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    assert!((e.total_gross_usd - 50.0).abs() < 1e-9);
    assert!(
        (e.total_model_usd - 40.0).abs() < 1e-9,
        "expected 40, got {}",
        e.total_model_usd
    );
}

/// 100 EUR on big7 at 80% and eur_usd 1.01: 84.84 presplit, 67.872 model.
#[test]
fn big7_at_eighty_percent() {
    let values = [raw("m1", "big7", 100.0)];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    assert!((e.total_model_usd - 67.872).abs() < 1e-9);
}

/// superfoon pays the full converted amount regardless of percentage.
#[test]
fn superfoon_bypasses_percentage_split() {
    let values = [raw("m1", "superfoon", 50.0)];
    let e = compute_model_earnings(
        "m1",
        &values,
        &rules(),
        Some(60.0), // group override must NOT apply
        &params(),
        Some(&rates()),
    )
    .unwrap();
    assert!((e.total_model_usd - 50.5).abs() < 1e-9);
}

/// Per-platform model shares always sum to the model total.
#[test]
fn per_platform_model_usd_sums_to_total() {
    let values = [
        raw("m1", "big7", 320.0),
        raw("m1", "chaturbate", 4100.0),
        raw("m1", "adultwork", 75.5),
        raw("m1", "superfoon", 12.0),
        raw("m1", "streamate", 240.0),
    ];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    let sum: f64 = e.per_platform.iter().map(|p| p.model_usd).sum();
    assert!(
        (sum - e.total_model_usd).abs() < 1e-6,
        "per-platform sum {sum} != total {}",
        e.total_model_usd
    );
    // Agency margin is the residual of the same totals.
    assert!((e.agency_usd() - (e.total_gross_usd - e.total_model_usd)).abs() < 1e-9);
}

/// COP totals derive from the model USD total and the pinned rate.
#[test]
fn cop_total_uses_usd_cop_rate() {
    let values = [raw("m1", "manyvids", 100.0)];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    assert!((e.total_cop_model - 80.0 * 4000.0).abs() < 1e-6);
}

/// Values at or below zero contribute nothing.
#[test]
fn non_positive_values_are_skipped() {
    let values = [raw("m1", "big7", 0.0), raw("m1", "mondo", -5.0)];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    assert!(e.per_platform.is_empty());
    assert_eq!(e.total_gross_usd, 0.0);
}

/// Quota alert: 300 gross against a 470 quota leaves ~36.17% to reach.
#[test]
fn quota_alert_below_threshold() {
    let values = [raw("m1", "manyvids", 300.0)];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    assert!(e.quota.below);
    assert!(
        (e.quota.percent_to_reach - 36.17).abs() < 0.01,
        "expected ~36.17, got {}",
        e.quota.percent_to_reach
    );
}

/// Hitting the quota exactly clears the alert.
#[test]
fn quota_met_at_threshold() {
    let values = [raw("m1", "manyvids", 470.0)];
    let e = compute_model_earnings("m1", &values, &rules(), None, &params(), Some(&rates()))
        .unwrap();
    assert!(!e.quota.below);
    assert_eq!(e.quota.percent_to_reach, 0.0);
}

/// Absent rates are a hard calculation failure.
#[test]
fn missing_rates_fail_the_call() {
    let values = [raw("m1", "big7", 100.0)];
    let err = compute_model_earnings("m1", &values, &rules(), None, &params(), None).unwrap_err();
    assert!(matches!(err, SettleError::MissingRate { .. }));
}

/// Group override applies when the platform has none.
#[test]
fn group_override_changes_split() {
    let values = [raw("m1", "manyvids", 100.0)];
    let e = compute_model_earnings(
        "m1",
        &values,
        &rules(),
        Some(70.0),
        &params(),
        Some(&rates()),
    )
    .unwrap();
    assert!((e.total_model_usd - 70.0).abs() < 1e-9);
}
