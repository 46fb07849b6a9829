//! Period state machine rows and the persisted lifecycle lock.
//!
//! RULE: every transition is a single conditional UPDATE. Two admin
//! sessions racing on the same period are serialized by SQLite; the
//! loser's UPDATE matches zero rows and the caller sees a clean
//! rejection. Nothing here depends on in-process memory.

use super::{unix_now, SettleStore};
use crate::{
    error::{SettleError, SettleResult},
    period::Period,
};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodState {
    Open,
    Archiving,
    Archived,
    Cleaning,
    Cleaned,
}

impl PeriodState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Archiving => "archiving",
            Self::Archived => "archived",
            Self::Cleaning => "cleaning",
            Self::Cleaned => "cleaned",
        }
    }

    pub fn parse(s: &str) -> SettleResult<Self> {
        match s {
            "open" => Ok(Self::Open),
            "archiving" => Ok(Self::Archiving),
            "archived" => Ok(Self::Archived),
            "cleaning" => Ok(Self::Cleaning),
            "cleaned" => Ok(Self::Cleaned),
            other => Err(SettleError::Validation {
                reasons: vec![format!("unknown period state '{other}'")],
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LockInfo {
    pub operation: String,
    pub holder: String,
    pub token: String,
    pub acquired_at: i64,
}

#[derive(Debug, Clone)]
pub struct PeriodStateRow {
    pub period_date: String,
    pub period_type: String,
    pub state: PeriodState,
    pub lock: Option<LockInfo>,
    pub archived_at: Option<i64>,
    pub archived_by: Option<String>,
    pub cleaned_at: Option<i64>,
    pub cleaned_by: Option<String>,
}

/// Result of an acquire-if-unheld attempt.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Acquired { reclaimed_from: Option<String> },
    Held { operation: String, holder: String },
}

impl SettleStore {
    /// Make sure the period has a state row; new rows start 'open'.
    pub fn ensure_period(&self, period: &Period) -> SettleResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO period_state (period_date, period_type, state)
             VALUES (?1, ?2, 'open')",
            params![period.key(), period.kind().as_str()],
        )?;
        Ok(())
    }

    pub fn period_state(&self, period: &Period) -> SettleResult<Option<PeriodStateRow>> {
        #[allow(clippy::type_complexity)]
        let raw: Option<(
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<i64>,
            Option<String>,
            Option<i64>,
            Option<String>,
        )> = self
            .conn()
            .query_row(
                "SELECT period_date, period_type, state,
                        lock_operation, lock_holder, lock_token, lock_acquired_at,
                        archived_at, archived_by, cleaned_at, cleaned_by
                 FROM period_state
                 WHERE period_date = ?1 AND period_type = ?2",
                params![period.key(), period.kind().as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            period_date,
            period_type,
            state,
            lock_operation,
            lock_holder,
            lock_token,
            lock_acquired_at,
            archived_at,
            archived_by,
            cleaned_at,
            cleaned_by,
        )) = raw
        else {
            return Ok(None);
        };

        let lock = match (lock_operation, lock_holder, lock_token, lock_acquired_at) {
            (Some(operation), Some(holder), Some(token), Some(acquired_at)) => Some(LockInfo {
                operation,
                holder,
                token,
                acquired_at,
            }),
            _ => None,
        };

        Ok(Some(PeriodStateRow {
            period_date,
            period_type,
            state: PeriodState::parse(&state)?,
            lock,
            archived_at,
            archived_by,
            cleaned_at,
            cleaned_by,
        }))
    }

    /// Atomic acquire-if-unheld. A lock older than `stale_cutoff` is
    /// treated as abandoned by a crashed session and reclaimed.
    pub fn try_acquire_lock(
        &self,
        period: &Period,
        operation: &str,
        holder: &str,
        token: &str,
        stale_cutoff: i64,
    ) -> SettleResult<AcquireOutcome> {
        let prior = self.period_state(period)?.and_then(|row| row.lock);

        let changed = self.conn().execute(
            "UPDATE period_state
             SET lock_operation = ?1, lock_holder = ?2, lock_token = ?3, lock_acquired_at = ?4
             WHERE period_date = ?5 AND period_type = ?6
               AND (lock_operation IS NULL OR lock_acquired_at <= ?7)",
            params![
                operation,
                holder,
                token,
                unix_now(),
                period.key(),
                period.kind().as_str(),
                stale_cutoff,
            ],
        )?;

        if changed == 1 {
            Ok(AcquireOutcome::Acquired {
                reclaimed_from: prior.map(|l| l.holder),
            })
        } else {
            match self.period_state(period)?.and_then(|row| row.lock) {
                Some(lock) => Ok(AcquireOutcome::Held {
                    operation: lock.operation,
                    holder: lock.holder,
                }),
                // Lock vanished between the UPDATE and the read; the
                // period row itself must be missing.
                None => Err(SettleError::UnknownPeriod {
                    period: period.key(),
                }),
            }
        }
    }

    /// Release only succeeds with the acquiring session's token, so a
    /// session whose stale lock was reclaimed cannot release the new one.
    pub fn release_lock(&self, period: &Period, token: &str) -> SettleResult<bool> {
        let changed = self.conn().execute(
            "UPDATE period_state
             SET lock_operation = NULL, lock_holder = NULL,
                 lock_token = NULL, lock_acquired_at = NULL
             WHERE period_date = ?1 AND period_type = ?2 AND lock_token = ?3",
            params![period.key(), period.kind().as_str(), token],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-swap state transition.
    pub fn transition_state(
        &self,
        period: &Period,
        from: PeriodState,
        to: PeriodState,
    ) -> SettleResult<bool> {
        let changed = self.conn().execute(
            "UPDATE period_state SET state = ?1
             WHERE period_date = ?2 AND period_type = ?3 AND state = ?4",
            params![
                to.as_str(),
                period.key(),
                period.kind().as_str(),
                from.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// archiving -> archived, stamping who closed the period.
    pub fn mark_archived(&self, period: &Period, admin: &str) -> SettleResult<bool> {
        let changed = self.conn().execute(
            "UPDATE period_state
             SET state = 'archived', archived_at = ?1, archived_by = ?2
             WHERE period_date = ?3 AND period_type = ?4 AND state = 'archiving'",
            params![unix_now(), admin, period.key(), period.kind().as_str()],
        )?;
        Ok(changed == 1)
    }

    /// The cleanup unit of work, atomic: cleaning -> cleaned, live rows
    /// deleted, freeze set emptied, next period opened. Either all of it
    /// applies or none of it does.
    pub fn apply_cleanup(
        &self,
        period: &Period,
        next: &Period,
        admin: &str,
    ) -> SettleResult<(usize, usize)> {
        let tx = self.conn().unchecked_transaction()?;

        let changed = tx.execute(
            "UPDATE period_state
             SET state = 'cleaned', cleaned_at = ?1, cleaned_by = ?2
             WHERE period_date = ?3 AND period_type = ?4 AND state = 'cleaning'",
            params![unix_now(), admin, period.key(), period.kind().as_str()],
        )?;
        if changed != 1 {
            let actual: String = tx
                .query_row(
                    "SELECT state FROM period_state
                     WHERE period_date = ?1 AND period_type = ?2",
                    params![period.key(), period.kind().as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or_else(|| "missing".to_string());
            return Err(SettleError::Precedence {
                expected: "cleaning".to_string(),
                actual,
            });
        }

        let cleared = tx.execute(
            "DELETE FROM raw_value WHERE period_date = ?1",
            params![period.key()],
        )?;
        let unfrozen = tx.execute("DELETE FROM frozen_platform", [])?;

        tx.execute(
            "INSERT OR IGNORE INTO period_state (period_date, period_type, state)
             VALUES (?1, ?2, 'open')",
            params![next.key(), next.kind().as_str()],
        )?;

        tx.commit()?;
        Ok((cleared, unfrozen))
    }

    /// The restore unit of work, atomic: cleaned -> archived and the
    /// archived raw values written back into the live table. The next
    /// period opened by cleanup is removed again if nothing was entered
    /// into it yet.
    pub fn apply_restore(
        &self,
        period: &Period,
        values_by_model: &[(String, HashMap<String, f64>)],
    ) -> SettleResult<usize> {
        let tx = self.conn().unchecked_transaction()?;

        let changed = tx.execute(
            "UPDATE period_state
             SET state = 'archived', cleaned_at = NULL, cleaned_by = NULL
             WHERE period_date = ?1 AND period_type = ?2 AND state = 'cleaned'",
            params![period.key(), period.kind().as_str()],
        )?;
        if changed != 1 {
            let actual: String = tx
                .query_row(
                    "SELECT state FROM period_state
                     WHERE period_date = ?1 AND period_type = ?2",
                    params![period.key(), period.kind().as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or_else(|| "missing".to_string());
            return Err(SettleError::Precedence {
                expected: "cleaned".to_string(),
                actual,
            });
        }

        let mut restored = 0usize;
        for (model_id, values) in values_by_model {
            for (platform_id, amount) in values {
                tx.execute(
                    "INSERT OR REPLACE INTO raw_value
                     (model_id, platform_id, period_date, amount, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![model_id, platform_id, period.key(), amount, unix_now()],
                )?;
                restored += 1;
            }
        }

        let next = period.next();
        let next_values: i64 = tx.query_row(
            "SELECT COUNT(*) FROM raw_value WHERE period_date = ?1",
            params![next.key()],
            |row| row.get(0),
        )?;
        if next_values == 0 {
            tx.execute(
                "DELETE FROM period_state
                 WHERE period_date = ?1 AND period_type = ?2 AND state = 'open'",
                params![next.key(), next.kind().as_str()],
            )?;
        }

        tx.commit()?;
        Ok(restored)
    }
}
