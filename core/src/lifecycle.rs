//! Period lifecycle — archive, cleanup, restore, rate correction.
//!
//! States: open -> archiving -> archived -> cleaning -> cleaned, with
//! cleanup opening the next half-month period. The manager is invoked
//! by independent admin sessions; every transition is a conditional
//! store update and the persisted lock serializes archive/cleanup, so
//! two sessions racing on one period cannot double-apply anything.
//!
//! Lock-held and out-of-order rejections are informational: callers
//! re-poll status() rather than treating them as hard failures.

use crate::{
    calculator::{compute_model_earnings, ModelEarnings},
    config::{SettleConfig, SettlementParams},
    error::{SettleError, SettleResult},
    event::AuditEvent,
    freeze::FreezePolicy,
    period::Period,
    rates::{RateProvider, RateSet, StoreRates, ACTIVE_SCOPE},
    rules::PlatformRuleSet,
    store::{AcquireOutcome, ArchiveRow, LockInfo, PeriodState, SettleStore},
    types::ModelId,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

const ARCHIVE_OP: &str = "archive";
const CLEANUP_OP: &str = "cleanup";

#[derive(Debug, Clone, Serialize)]
pub struct PeriodStatus {
    pub period: Period,
    pub state: PeriodState,
    pub archived: bool,
    pub in_progress: bool,
    pub lock: Option<LockInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    /// Every model with values snapshotted.
    Complete { models: usize },
    /// Some models failed; state stays 'archiving' and a retry is expected.
    Partial {
        archived: usize,
        failed: Vec<ArchiveFailure>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveFailure {
    pub model_id: ModelId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub cleared_values: usize,
    pub unfrozen: usize,
    pub next_period: Period,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupStats {
    pub raw_value_rows: i64,
    pub models_with_values: i64,
    pub archived_models: i64,
    pub frozen_platforms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupValidation {
    pub can_cleanup: bool,
    pub validation_errors: Vec<String>,
    pub stats: CleanupStats,
}

pub struct PeriodLifecycleManager {
    store: SettleStore,
    rules: PlatformRuleSet,
    params: SettlementParams,
}

impl PeriodLifecycleManager {
    pub fn new(store: SettleStore, config: &SettleConfig) -> Self {
        Self {
            store,
            rules: PlatformRuleSet::from_config(config),
            params: config.params.clone(),
        }
    }

    /// In-memory manager with the built-in catalog (used in tests).
    pub fn in_memory() -> SettleResult<Self> {
        let store = SettleStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, &SettleConfig::builtin()))
    }

    pub fn store(&self) -> &SettleStore {
        &self.store
    }

    fn stale_cutoff(&self) -> i64 {
        Utc::now().timestamp() - self.params.lock_stale_minutes * 60
    }

    // ── Status ─────────────────────────────────────────────────

    /// Read-only; never blocks on writers. A period without a state
    /// row has simply never been touched and reads as open.
    pub fn status(&self, period: &Period) -> SettleResult<PeriodStatus> {
        let row = self.store.period_state(period)?;
        let (state, lock) = match row {
            Some(row) => (row.state, row.lock),
            None => (PeriodState::Open, None),
        };
        Ok(PeriodStatus {
            period: *period,
            archived: matches!(
                state,
                PeriodState::Archived | PeriodState::Cleaning | PeriodState::Cleaned
            ),
            in_progress: lock.is_some()
                || matches!(state, PeriodState::Archiving | PeriodState::Cleaning),
            state,
            lock,
        })
    }

    // ── Live input ─────────────────────────────────────────────

    /// Record a model's raw value for one platform. Rejected when the
    /// period is past open (closing periods take no more edits) or the
    /// platform's connection window has closed.
    pub fn record_raw_value(
        &self,
        model_id: &str,
        platform_id: &str,
        period: &Period,
        amount: f64,
        policy: &dyn FreezePolicy,
    ) -> SettleResult<()> {
        if amount < 0.0 {
            return Err(SettleError::Validation {
                reasons: vec![format!("negative amount {amount} rejected")],
            });
        }

        self.store.ensure_period(period)?;
        let row = self
            .store
            .period_state(period)?
            .ok_or_else(|| SettleError::UnknownPeriod {
                period: period.key(),
            })?;
        if row.state != PeriodState::Open {
            return Err(SettleError::Validation {
                reasons: vec![format!(
                    "period {} is {}; raw values are read-only",
                    period.key(),
                    row.state.as_str()
                )],
            });
        }

        match self.store.get_model(model_id)? {
            Some(model) if model.enabled => {}
            Some(_) => {
                return Err(SettleError::Validation {
                    reasons: vec![format!("model '{model_id}' is disabled")],
                })
            }
            None => {
                return Err(SettleError::Validation {
                    reasons: vec![format!("unknown model '{model_id}'")],
                })
            }
        }

        if self.store.is_platform_frozen(model_id, platform_id)?
            || policy.is_frozen(platform_id, Utc::now())
        {
            return Err(SettleError::Frozen {
                model_id: model_id.to_string(),
                platform_id: platform_id.to_string(),
            });
        }

        self.store
            .upsert_raw_value(model_id, platform_id, &period.key(), amount)
    }

    /// Persist a platform cutoff for one model, making its raw value
    /// read-only until cleanup unfreezes everything.
    pub fn freeze_platform(
        &self,
        period: &Period,
        model_id: &str,
        platform_id: &str,
        actor: &str,
    ) -> SettleResult<()> {
        self.store.freeze_platform(model_id, platform_id)?;
        self.store.append_audit(
            period,
            actor,
            &AuditEvent::PlatformFrozen {
                model_id: model_id.to_string(),
                platform_id: platform_id.to_string(),
            },
        )
    }

    // ── Live earnings (dashboard read path) ────────────────────

    /// Compute current earnings for every enabled model with values in
    /// the period. Pure derivation from live rows and active rates —
    /// nothing is cached, so concurrent edits show up on the next poll.
    pub fn compute_live_earnings(&self, period: &Period) -> SettleResult<Vec<ModelEarnings>> {
        let rates = StoreRates::new(&self.store).active_rates()?;
        let hierarchy = self.store.load_hierarchy()?;
        let by_model = self.store.raw_values_by_model(&period.key())?;

        let mut earnings = Vec::new();
        for model in self.store.enabled_models()? {
            let Some(raw_values) = by_model.get(&model.model_id) else {
                continue;
            };
            let group_share = hierarchy.group_share(&model.group_id);
            earnings.push(compute_model_earnings(
                &model.model_id,
                raw_values,
                &self.rules,
                group_share,
                &self.params,
                rates.as_ref(),
            )?);
        }
        Ok(earnings)
    }

    /// Historical earnings for an archived period, straight from the
    /// archive records.
    pub fn archived_earnings(&self, period: &Period) -> SettleResult<Vec<ModelEarnings>> {
        self.store
            .archive_records(period)?
            .iter()
            .map(|row| Ok(serde_json::from_str(&row.earnings)?))
            .collect()
    }

    // ── Archive ────────────────────────────────────────────────

    /// Close the period: pin the active rates and snapshot every
    /// enabled model's raw values plus computed earnings.
    ///
    /// Requires state open (or archiving, to resume an interrupted
    /// run) and the archive lock. Per-model failures do not abort the
    /// whole run; they are returned as a partial outcome, the state
    /// stays 'archiving' and the call can be retried.
    pub fn archive(&self, period: &Period, admin: &str) -> SettleResult<ArchiveOutcome> {
        self.store.ensure_period(period)?;
        let row = self
            .store
            .period_state(period)?
            .ok_or_else(|| SettleError::UnknownPeriod {
                period: period.key(),
            })?;
        match row.state {
            PeriodState::Open | PeriodState::Archiving => {}
            other => {
                return Err(SettleError::Precedence {
                    expected: "open".to_string(),
                    actual: other.as_str().to_string(),
                })
            }
        }

        let token = Uuid::new_v4().to_string();
        match self
            .store
            .try_acquire_lock(period, ARCHIVE_OP, admin, &token, self.stale_cutoff())?
        {
            AcquireOutcome::Acquired { reclaimed_from } => {
                if let Some(previous) = reclaimed_from {
                    log::warn!(
                        "reclaimed stale {ARCHIVE_OP} lock on {} from {previous}",
                        period.key()
                    );
                    self.store.append_audit(
                        period,
                        admin,
                        &AuditEvent::LockReclaimed {
                            admin: admin.to_string(),
                            previous_holder: previous,
                            operation: ARCHIVE_OP.to_string(),
                        },
                    )?;
                }
            }
            AcquireOutcome::Held { operation, holder } => {
                return Err(SettleError::LockHeld { operation, holder })
            }
        }

        let result = self.archive_locked(period, admin);
        if !self.store.release_lock(period, &token).unwrap_or(false) {
            log::warn!("archive lock on {} was not released cleanly", period.key());
        }
        result
    }

    fn archive_locked(&self, period: &Period, admin: &str) -> SettleResult<ArchiveOutcome> {
        // Re-check under the lock: another session may have finished the
        // archive between our first look and the acquire.
        let row = self
            .store
            .period_state(period)?
            .ok_or_else(|| SettleError::UnknownPeriod {
                period: period.key(),
            })?;
        match row.state {
            PeriodState::Open | PeriodState::Archiving => {}
            other => {
                return Err(SettleError::Precedence {
                    expected: "open".to_string(),
                    actual: other.as_str().to_string(),
                })
            }
        }

        self.store
            .transition_state(period, PeriodState::Open, PeriodState::Archiving)?;
        self.store.append_audit(
            period,
            admin,
            &AuditEvent::ArchiveStarted {
                admin: admin.to_string(),
            },
        )?;

        // Pin rates once per period; a resumed run reuses the pinned set
        // so a mid-archive rate change cannot split the snapshot.
        let rates = match self.store.get_rates(&period.key())? {
            Some(rates) => rates,
            None => {
                let rates = self.store.get_rates(ACTIVE_SCOPE)?.ok_or_else(|| {
                    SettleError::MissingRate {
                        scope: ACTIVE_SCOPE.to_string(),
                    }
                })?;
                self.store.upsert_rates(&period.key(), &rates)?;
                rates
            }
        };

        let hierarchy = self.store.load_hierarchy()?;
        let by_model = self.store.raw_values_by_model(&period.key())?;
        let now = Utc::now().timestamp();

        let mut rows: Vec<ArchiveRow> = Vec::new();
        let mut failed: Vec<ArchiveFailure> = Vec::new();
        for model in self.store.enabled_models()? {
            let Some(raw_values) = by_model.get(&model.model_id) else {
                continue;
            };
            let group_share = hierarchy.group_share(&model.group_id);

            let snapshot = compute_model_earnings(
                &model.model_id,
                raw_values,
                &self.rules,
                group_share,
                &self.params,
                Some(&rates),
            )
            .and_then(|earnings| {
                let raw_map: BTreeMap<&str, f64> = raw_values
                    .iter()
                    .map(|v| (v.platform_id.as_str(), v.amount))
                    .collect();
                Ok(ArchiveRow {
                    period_date: period.key(),
                    period_type: period.kind().as_str().to_string(),
                    model_id: model.model_id.clone(),
                    raw_values: serde_json::to_string(&raw_map)?,
                    earnings: serde_json::to_string(&earnings)?,
                    eur_usd: rates.eur_usd,
                    gbp_usd: rates.gbp_usd,
                    usd_cop: rates.usd_cop,
                    archived_at: now,
                    archived_by: admin.to_string(),
                })
            });

            match snapshot {
                Ok(row) => rows.push(row),
                Err(SettleError::MissingRate { scope }) => {
                    // Rates are period-global; nothing model-specific to record.
                    return Err(SettleError::MissingRate { scope });
                }
                Err(e) => failed.push(ArchiveFailure {
                    model_id: model.model_id.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        self.store.insert_archive_records(&rows)?;

        if failed.is_empty() {
            if !self.store.mark_archived(period, admin)? {
                let actual = self
                    .store
                    .period_state(period)?
                    .map(|r| r.state.as_str().to_string())
                    .unwrap_or_else(|| "missing".to_string());
                return Err(SettleError::Precedence {
                    expected: "archiving".to_string(),
                    actual,
                });
            }
            self.store.append_audit(
                period,
                admin,
                &AuditEvent::ArchiveCompleted {
                    admin: admin.to_string(),
                    models: rows.len(),
                },
            )?;
            log::info!("period {} archived: {} models", period.key(), rows.len());
            Ok(ArchiveOutcome::Complete { models: rows.len() })
        } else {
            self.store.append_audit(
                period,
                admin,
                &AuditEvent::ArchivePartial {
                    admin: admin.to_string(),
                    archived: rows.len(),
                    failed: failed.iter().map(|f| f.model_id.clone()).collect(),
                },
            )?;
            log::warn!(
                "period {} archive partial: {} archived, {} failed",
                period.key(),
                rows.len(),
                failed.len()
            );
            Ok(ArchiveOutcome::Partial {
                archived: rows.len(),
                failed,
            })
        }
    }

    // ── Cleanup ────────────────────────────────────────────────

    /// Clear the archived period's live rows, unfreeze every platform
    /// and open the next half-month period. Requires state archived;
    /// a second concurrent call observes the changed state and is
    /// rejected, never double-applied.
    pub fn cleanup(&self, period: &Period, admin: &str) -> SettleResult<CleanupReport> {
        let row = self
            .store
            .period_state(period)?
            .ok_or_else(|| SettleError::UnknownPeriod {
                period: period.key(),
            })?;
        if row.state != PeriodState::Archived {
            return Err(SettleError::Precedence {
                expected: "archived".to_string(),
                actual: row.state.as_str().to_string(),
            });
        }

        let token = Uuid::new_v4().to_string();
        match self
            .store
            .try_acquire_lock(period, CLEANUP_OP, admin, &token, self.stale_cutoff())?
        {
            AcquireOutcome::Acquired { reclaimed_from } => {
                if let Some(previous) = reclaimed_from {
                    log::warn!(
                        "reclaimed stale {CLEANUP_OP} lock on {} from {previous}",
                        period.key()
                    );
                }
            }
            AcquireOutcome::Held { operation, holder } => {
                return Err(SettleError::LockHeld { operation, holder })
            }
        }

        let result = self.cleanup_locked(period, admin);
        if !self.store.release_lock(period, &token).unwrap_or(false) {
            log::warn!("cleanup lock on {} was not released cleanly", period.key());
        }
        result
    }

    fn cleanup_locked(&self, period: &Period, admin: &str) -> SettleResult<CleanupReport> {
        if !self
            .store
            .transition_state(period, PeriodState::Archived, PeriodState::Cleaning)?
        {
            let actual = self
                .store
                .period_state(period)?
                .map(|r| r.state.as_str().to_string())
                .unwrap_or_else(|| "missing".to_string());
            return Err(SettleError::Precedence {
                expected: "archived".to_string(),
                actual,
            });
        }

        let next = period.next();
        let (cleared_values, unfrozen) = self.store.apply_cleanup(period, &next, admin)?;

        self.store.append_audit(
            period,
            admin,
            &AuditEvent::CleanupApplied {
                admin: admin.to_string(),
                cleared_values,
                unfrozen,
                next_period: next.key(),
            },
        )?;
        log::info!(
            "period {} cleaned: {} values cleared, next period {} open",
            period.key(),
            cleared_values,
            next.key()
        );
        Ok(CleanupReport {
            cleared_values,
            unfrozen,
            next_period: next,
        })
    }

    /// Dry-run report for the operator surface: whether cleanup would
    /// be accepted right now, and why not if it wouldn't.
    pub fn cleanup_validation(&self, period: &Period) -> SettleResult<CleanupValidation> {
        let row = self.store.period_state(period)?;
        let mut errors = Vec::new();

        match row.as_ref().map(|r| r.state) {
            None | Some(PeriodState::Open) | Some(PeriodState::Archiving) => {
                errors.push("period has not been archived yet".to_string());
            }
            Some(PeriodState::Cleaning) => {
                errors.push("cleanup already in progress".to_string());
            }
            Some(PeriodState::Cleaned) => {
                errors.push("period already cleaned".to_string());
            }
            Some(PeriodState::Archived) => {}
        }
        if let Some(lock) = row.and_then(|r| r.lock) {
            if lock.acquired_at > self.stale_cutoff() {
                errors.push(format!(
                    "{} lock held by {}",
                    lock.operation, lock.holder
                ));
            }
        }

        let archived_models = self.store.archive_model_count(period)?;
        if archived_models == 0 {
            errors.push("no archive records for this period".to_string());
        }

        let stats = CleanupStats {
            raw_value_rows: self.store.count_raw_values(&period.key())?,
            models_with_values: self.store.count_models_with_values(&period.key())?,
            archived_models,
            frozen_platforms: self.store.count_frozen_platforms()?,
        };

        Ok(CleanupValidation {
            can_cleanup: errors.is_empty(),
            validation_errors: errors,
            stats,
        })
    }

    // ── Restore (emergency) ────────────────────────────────────

    /// Reverse a cleanup by repopulating live raw values from the
    /// archive records. Non-idempotent and operator-gated: running it
    /// while models have already entered new data rewrites history.
    /// Returns the number of raw values written back.
    pub fn restore(&self, period: &Period, admin: &str) -> SettleResult<usize> {
        let row = self
            .store
            .period_state(period)?
            .ok_or_else(|| SettleError::UnknownPeriod {
                period: period.key(),
            })?;
        if row.state != PeriodState::Cleaned {
            return Err(SettleError::Validation {
                reasons: vec![format!(
                    "restore requires a cleaned period, found '{}'",
                    row.state.as_str()
                )],
            });
        }

        let records = self.store.archive_records(period)?;
        if records.is_empty() {
            return Err(SettleError::Validation {
                reasons: vec!["no archive records to restore from".to_string()],
            });
        }

        let mut values_by_model = Vec::with_capacity(records.len());
        for record in &records {
            let values: std::collections::HashMap<String, f64> =
                serde_json::from_str(&record.raw_values)?;
            values_by_model.push((record.model_id.clone(), values));
        }

        let restored = self.store.apply_restore(period, &values_by_model)?;
        self.store.append_audit(
            period,
            admin,
            &AuditEvent::RestoreApplied {
                admin: admin.to_string(),
                models: records.len(),
            },
        )?;
        log::warn!(
            "period {} restored from archive: {} values repopulated by {admin}",
            period.key(),
            restored
        );
        Ok(restored)
    }

    // ── Rate correction ────────────────────────────────────────

    /// Replace an archived period's pinned rates and recompute every
    /// stored earnings snapshot with them. The live period is never
    /// touched; raw inputs are never altered. Rejected while the
    /// period is still open.
    pub fn recompute_archived_period(
        &self,
        period: &Period,
        new_rates: &RateSet,
        admin: &str,
    ) -> SettleResult<usize> {
        let row = self
            .store
            .period_state(period)?
            .ok_or_else(|| SettleError::UnknownPeriod {
                period: period.key(),
            })?;
        match row.state {
            PeriodState::Archived | PeriodState::Cleaning | PeriodState::Cleaned => {}
            PeriodState::Open | PeriodState::Archiving => {
                return Err(SettleError::Validation {
                    reasons: vec![
                        "rate correction applies only to archived periods".to_string()
                    ],
                })
            }
        }

        let records = self.store.archive_records(period)?;
        if records.is_empty() {
            return Err(SettleError::Validation {
                reasons: vec!["no archive records for this period".to_string()],
            });
        }

        let mut earnings_by_model = Vec::with_capacity(records.len());
        for record in &records {
            let raw: BTreeMap<String, f64> = serde_json::from_str(&record.raw_values)?;
            let old: ModelEarnings = serde_json::from_str(&record.earnings)?;
            let recomputed = self.recompute_earnings(&record.model_id, &raw, &old, new_rates);
            earnings_by_model.push((record.model_id.clone(), serde_json::to_string(&recomputed)?));
        }

        self.store
            .rewrite_archive(period, new_rates, &earnings_by_model)?;
        self.store.append_audit(
            period,
            admin,
            &AuditEvent::RatesCorrected {
                admin: admin.to_string(),
                eur_usd: new_rates.eur_usd,
                gbp_usd: new_rates.gbp_usd,
                usd_cop: new_rates.usd_cop,
            },
        )?;
        log::info!(
            "period {} rates corrected by {admin}: {} models recomputed",
            period.key(),
            earnings_by_model.len()
        );
        Ok(earnings_by_model.len())
    }

    /// Re-derive one archived snapshot under new rates, keeping the
    /// share percentages that were in force at closure time.
    fn recompute_earnings(
        &self,
        model_id: &str,
        raw: &BTreeMap<String, f64>,
        old: &ModelEarnings,
        rates: &RateSet,
    ) -> ModelEarnings {
        let archived_shares: BTreeMap<&str, f64> = old
            .per_platform
            .iter()
            .map(|p| (p.platform_id.as_str(), p.share_pct))
            .collect();

        let mut per_platform = Vec::new();
        let mut total_gross_usd = 0.0;
        let mut total_model_usd = 0.0;
        for (platform_id, &amount) in raw {
            if amount <= 0.0 {
                continue;
            }
            let converted = self.rules.convert(platform_id, amount, rates);
            let share_pct = archived_shares
                .get(platform_id.as_str())
                .copied()
                .unwrap_or(self.params.default_share_pct);
            let model_usd = if converted.full_share {
                converted.presplit_usd
            } else {
                converted.presplit_usd * share_pct / 100.0
            };
            total_gross_usd += converted.gross_usd;
            total_model_usd += model_usd;
            per_platform.push(crate::calculator::PlatformEarnings {
                platform_id: platform_id.clone(),
                raw_amount: amount,
                gross_usd: converted.gross_usd,
                model_usd,
                cop_model: model_usd * rates.usd_cop,
                share_pct,
                full_share: converted.full_share,
            });
        }

        let min_quota = old.quota.min_quota_usd;
        let below = min_quota > 0.0 && total_gross_usd < min_quota;
        ModelEarnings {
            model_id: model_id.to_string(),
            per_platform,
            total_gross_usd,
            total_model_usd,
            total_cop_model: total_model_usd * rates.usd_cop,
            quota: crate::calculator::QuotaStatus {
                min_quota_usd: min_quota,
                below,
                percent_to_reach: if below {
                    ((min_quota - total_gross_usd) / min_quota * 100.0).max(0.0)
                } else {
                    0.0
                },
            },
        }
    }

    /// The audit trail for one period, oldest first.
    pub fn audit_trail(&self, period: &Period) -> SettleResult<Vec<crate::event::AuditLogEntry>> {
        self.store.audit_for_period(period)
    }
}
