//! Platform conversion rules — the per-platform formula table.
//!
//! RULE: one data-driven table, one generic evaluator. No platform is
//! special-cased in code; everything a platform does differently is
//! expressed in its PlatformRule row.

use crate::{
    config::{Currency, PlatformRule, SettleConfig},
    rates::RateSet,
    types::PlatformId,
};
use std::collections::HashMap;

/// Result of converting one raw platform amount to USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Converted {
    /// Platform revenue in USD before the model/agency split.
    pub gross_usd: f64,
    /// Gross after the platform's own deduction; the split applies to this.
    pub presplit_usd: f64,
    /// Full-share platforms skip the percentage split downstream.
    pub full_share: bool,
}

pub struct PlatformRuleSet {
    rules: HashMap<PlatformId, PlatformRule>,
}

impl PlatformRuleSet {
    pub fn new(rules: Vec<PlatformRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|r| (r.platform_id.clone(), r))
                .collect(),
        }
    }

    pub fn from_config(config: &SettleConfig) -> Self {
        Self::new(config.platforms.clone())
    }

    pub fn get(&self, platform_id: &str) -> Option<&PlatformRule> {
        self.rules.get(platform_id)
    }

    pub fn platform_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Convert a raw platform amount to USD. Pure and deterministic.
    ///
    /// Amounts at or below zero contribute nothing (negative input is
    /// clamped, never propagated). An unrecognized platform id is a
    /// USD pass-through. No rounding happens here.
    pub fn convert(&self, platform_id: &str, amount: f64, rates: &RateSet) -> Converted {
        let amount = amount.max(0.0);
        let Some(rule) = self.rules.get(platform_id) else {
            return Converted {
                gross_usd: amount,
                presplit_usd: amount,
                full_share: false,
            };
        };

        let fx = match rule.currency {
            Currency::Usd => 1.0,
            Currency::Eur => rates.eur_usd,
            Currency::Gbp => rates.gbp_usd,
        };

        let gross_usd = amount * fx * rule.conversion_factor;
        Converted {
            gross_usd,
            presplit_usd: gross_usd * rule.deduction_factor,
            full_share: rule.full_share,
        }
    }

    /// Resolve the model share percentage for a platform:
    /// platform override -> group override -> configured default.
    pub fn share_pct(
        &self,
        platform_id: &str,
        group_override: Option<f64>,
        default_pct: f64,
    ) -> f64 {
        self.rules
            .get(platform_id)
            .and_then(|r| r.share_override)
            .or(group_override)
            .unwrap_or(default_pct)
    }
}
