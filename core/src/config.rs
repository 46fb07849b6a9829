//! Configuration: platform catalog and settlement parameters.
//!
//! Loaded from JSON files under a data directory, with a built-in
//! catalog for tests and zero-config use. Platform formulas are pure
//! data here; the evaluator lives in rules.rs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

fn default_factor() -> f64 {
    1.0
}

/// One platform's conversion and deduction rule.
///
/// gross_usd    = amount x fx(currency) x conversion_factor
/// presplit_usd = gross_usd x deduction_factor
///
/// `conversion_factor` covers token-denominated platforms (tokens to
/// dollars); `deduction_factor` is the platform's cut taken before the
/// model/agency split. `full_share` platforms skip the split entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformRule {
    pub platform_id: String,
    pub label: String,
    pub currency: Currency,
    #[serde(default = "default_factor")]
    pub conversion_factor: f64,
    #[serde(default = "default_factor")]
    pub deduction_factor: f64,
    #[serde(default)]
    pub full_share: bool,
    /// Per-platform share override; first link of the override chain.
    #[serde(default)]
    pub share_override: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlatformCatalogFile {
    platforms: Vec<PlatformRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementParams {
    /// Default model share percentage when neither platform nor group override.
    pub default_share_pct: f64,
    /// Minimum half-month gross quota (USD) driving the quota alert.
    pub min_quota_usd: f64,
    /// A lifecycle lock older than this is considered abandoned and reclaimable.
    pub lock_stale_minutes: i64,
}

impl Default for SettlementParams {
    fn default() -> Self {
        Self {
            default_share_pct: 80.0,
            min_quota_usd: 470.0,
            lock_stale_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SettlementFile {
    settlement: SettlementParams,
}

#[derive(Debug, Clone)]
pub struct SettleConfig {
    pub platforms: Vec<PlatformRule>,
    pub params: SettlementParams,
}

impl SettleConfig {
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let catalog_path = format!("{data_dir}/platforms/platform_catalog.json");
        let catalog_content = std::fs::read_to_string(&catalog_path)
            .map_err(|e| anyhow::anyhow!("reading {catalog_path}: {e}"))?;
        let catalog: PlatformCatalogFile = serde_json::from_str(&catalog_content)?;

        let params_path = format!("{data_dir}/settlement/settlement.json");
        let params = match std::fs::read_to_string(&params_path) {
            Ok(content) => serde_json::from_str::<SettlementFile>(&content)?.settlement,
            Err(_) => SettlementParams::default(),
        };

        Ok(Self {
            platforms: catalog.platforms,
            params,
        })
    }

    /// The built-in catalog, mirroring data/platforms/platform_catalog.json.
    pub fn builtin() -> Self {
        let rule = |platform_id: &str,
                    label: &str,
                    currency: Currency,
                    conversion_factor: f64,
                    deduction_factor: f64,
                    full_share: bool| PlatformRule {
            platform_id: platform_id.to_string(),
            label: label.to_string(),
            currency,
            conversion_factor,
            deduction_factor,
            full_share,
            share_override: None,
        };

        let platforms = vec![
            // EUR platforms
            rule("big7", "Big7", Currency::Eur, 1.0, 0.84, false),
            rule("mondo", "Mondo", Currency::Eur, 1.0, 0.78, false),
            rule("superfoon", "Superfoon", Currency::Eur, 1.0, 1.0, true),
            rule("visitx", "VisitX", Currency::Eur, 1.0, 1.0, false),
            rule("xmodels", "XModels", Currency::Eur, 1.0, 1.0, false),
            // GBP platforms
            rule("adultwork", "AdultWork", Currency::Gbp, 1.0, 0.677, false),
            // USD platforms with fixed deductions
            rule("streamray", "Streamray", Currency::Usd, 1.0, 0.75, false),
            rule("streamate", "Streamate", Currency::Usd, 1.0, 0.60, false),
            rule("flirt4free", "Flirt4Free", Currency::Usd, 1.0, 0.50, false),
            // Token-denominated USD platforms (tokens x 0.05 = dollars)
            rule("chaturbate", "Chaturbate", Currency::Usd, 0.05, 1.0, false),
            rule("stripchat", "Stripchat", Currency::Usd, 0.05, 1.0, false),
            rule("bongacams", "BongaCams", Currency::Usd, 0.05, 1.0, false),
            rule("camsoda", "CamSoda", Currency::Usd, 0.05, 1.0, false),
            rule("myfreecams", "MyFreeCams", Currency::Usd, 0.05, 1.0, false),
            // USD pass-through
            rule("manyvids", "ManyVids", Currency::Usd, 1.0, 1.0, false),
        ];

        Self {
            platforms,
            params: SettlementParams::default(),
        }
    }
}
