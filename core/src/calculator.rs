//! Earnings calculation for a single model.
//!
//! RULE: pure and reentrant. This module never touches the store and
//! never caches anything across calls — dashboards re-invoke it on
//! every poll, so it must stay cheap and side-effect free.
//!
//! All arithmetic is double precision; rounding happens only at
//! presentation boundaries via round_usd / round_cop.

use crate::{
    config::SettlementParams,
    error::{SettleError, SettleResult},
    rates::RateSet,
    rules::PlatformRuleSet,
    store::RawValue,
    types::ModelId,
};
use serde::{Deserialize, Serialize};

/// One platform's contribution to a model's period earnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEarnings {
    pub platform_id: String,
    pub raw_amount: f64,
    pub gross_usd: f64,
    pub model_usd: f64,
    pub cop_model: f64,
    /// Effective share percentage applied (kept for archived recomputes).
    pub share_pct: f64,
    pub full_share: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub min_quota_usd: f64,
    pub below: bool,
    /// Percent of the quota still missing; 0 when the quota is met.
    pub percent_to_reach: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEarnings {
    pub model_id: ModelId,
    pub per_platform: Vec<PlatformEarnings>,
    pub total_gross_usd: f64,
    pub total_model_usd: f64,
    pub total_cop_model: f64,
    pub quota: QuotaStatus,
}

impl ModelEarnings {
    /// Agency margin is always the residual, never stored independently.
    pub fn agency_usd(&self) -> f64 {
        self.total_gross_usd - self.total_model_usd
    }
}

/// Compute one model's earnings from its raw per-platform values.
///
/// Values at or below zero contribute nothing. Full-share platforms
/// keep the entire presplit amount; everything else is split by the
/// resolved share percentage (platform -> group -> default).
pub fn compute_model_earnings(
    model_id: &str,
    raw_values: &[RawValue],
    rules: &PlatformRuleSet,
    group_share: Option<f64>,
    params: &SettlementParams,
    rates: Option<&RateSet>,
) -> SettleResult<ModelEarnings> {
    let rates = rates.ok_or_else(|| SettleError::MissingRate {
        scope: "active".to_string(),
    })?;

    let mut per_platform = Vec::new();
    let mut total_gross_usd = 0.0;
    let mut total_model_usd = 0.0;

    for raw in raw_values {
        if raw.amount <= 0.0 {
            continue;
        }
        let converted = rules.convert(&raw.platform_id, raw.amount, rates);
        let share_pct = rules.share_pct(&raw.platform_id, group_share, params.default_share_pct);
        let model_usd = if converted.full_share {
            converted.presplit_usd
        } else {
            converted.presplit_usd * share_pct / 100.0
        };

        total_gross_usd += converted.gross_usd;
        total_model_usd += model_usd;
        per_platform.push(PlatformEarnings {
            platform_id: raw.platform_id.clone(),
            raw_amount: raw.amount,
            gross_usd: converted.gross_usd,
            model_usd,
            cop_model: model_usd * rates.usd_cop,
            share_pct,
            full_share: converted.full_share,
        });
    }

    Ok(ModelEarnings {
        model_id: model_id.to_string(),
        per_platform,
        total_gross_usd,
        total_model_usd,
        total_cop_model: total_model_usd * rates.usd_cop,
        quota: quota_status(total_gross_usd, params.min_quota_usd),
    })
}

fn quota_status(total_gross_usd: f64, min_quota_usd: f64) -> QuotaStatus {
    let below = min_quota_usd > 0.0 && total_gross_usd < min_quota_usd;
    let percent_to_reach = if below {
        ((min_quota_usd - total_gross_usd) / min_quota_usd * 100.0).max(0.0)
    } else {
        0.0
    };
    QuotaStatus {
        min_quota_usd,
        below,
        percent_to_reach,
    }
}

/// Presentation rounding: USD to 2 decimals.
pub fn round_usd(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Presentation rounding: COP to whole pesos.
pub fn round_cop(v: f64) -> f64 {
    v.round()
}
