//! Archive snapshots and the lifecycle audit log.
//!
//! Archive rows are append-only history. The single sanctioned rewrite
//! is `rewrite_archive`, backing an admin rate correction, and it
//! touches only the rates and the derived earnings column — raw values
//! are never altered after closure.

use super::{ArchiveRow, SettleStore};
use crate::{
    error::SettleResult,
    event::{event_type_name, AuditEvent, AuditLogEntry},
    period::Period,
    rates::RateSet,
};
use rusqlite::params;

impl SettleStore {
    /// Write one period's snapshot rows in a single transaction.
    /// REPLACE semantics so a retried archive (state still 'archiving')
    /// overwrites its own partial output instead of duplicating it.
    pub fn insert_archive_records(&self, rows: &[ArchiveRow]) -> SettleResult<()> {
        let tx = self.conn().unchecked_transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO archive_record
                 (period_date, period_type, model_id, raw_values, earnings,
                  eur_usd, gbp_usd, usd_cop, archived_at, archived_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.period_date,
                    row.period_type,
                    row.model_id,
                    row.raw_values,
                    row.earnings,
                    row.eur_usd,
                    row.gbp_usd,
                    row.usd_cop,
                    row.archived_at,
                    row.archived_by,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn archive_model_count(&self, period: &Period) -> SettleResult<i64> {
        let n = self.conn().query_row(
            "SELECT COUNT(*) FROM archive_record
             WHERE period_date = ?1 AND period_type = ?2",
            params![period.key(), period.kind().as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn archive_records(&self, period: &Period) -> SettleResult<Vec<ArchiveRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT period_date, period_type, model_id, raw_values, earnings,
                    eur_usd, gbp_usd, usd_cop, archived_at, archived_by
             FROM archive_record
             WHERE period_date = ?1 AND period_type = ?2
             ORDER BY model_id ASC",
        )?;
        let rows = stmt
            .query_map(params![period.key(), period.kind().as_str()], |row| {
                Ok(ArchiveRow {
                    period_date: row.get(0)?,
                    period_type: row.get(1)?,
                    model_id: row.get(2)?,
                    raw_values: row.get(3)?,
                    earnings: row.get(4)?,
                    eur_usd: row.get(5)?,
                    gbp_usd: row.get(6)?,
                    usd_cop: row.get(7)?,
                    archived_at: row.get(8)?,
                    archived_by: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rate correction: replace the pinned rates and the recomputed
    /// earnings for every model of one period, atomically. The live
    /// period is untouched by design.
    pub fn rewrite_archive(
        &self,
        period: &Period,
        rates: &RateSet,
        earnings_by_model: &[(String, String)],
    ) -> SettleResult<()> {
        let tx = self.conn().unchecked_transaction()?;

        for (model_id, earnings_json) in earnings_by_model {
            tx.execute(
                "UPDATE archive_record
                 SET earnings = ?1, eur_usd = ?2, gbp_usd = ?3, usd_cop = ?4
                 WHERE period_date = ?5 AND period_type = ?6 AND model_id = ?7",
                params![
                    earnings_json,
                    rates.eur_usd,
                    rates.gbp_usd,
                    rates.usd_cop,
                    period.key(),
                    period.kind().as_str(),
                    model_id,
                ],
            )?;
        }

        tx.execute(
            "INSERT INTO exchange_rate_set (scope, eur_usd, gbp_usd, usd_cop, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope) DO UPDATE SET
               eur_usd = excluded.eur_usd,
               gbp_usd = excluded.gbp_usd,
               usd_cop = excluded.usd_cop,
               updated_at = excluded.updated_at",
            params![
                period.key(),
                rates.eur_usd,
                rates.gbp_usd,
                rates.usd_cop,
                super::unix_now(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn append_audit(
        &self,
        period: &Period,
        actor: &str,
        event: &AuditEvent,
    ) -> SettleResult<()> {
        self.conn().execute(
            "INSERT INTO audit_log
             (period_date, period_type, actor, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                period.key(),
                period.kind().as_str(),
                actor,
                event_type_name(event),
                serde_json::to_string(event)?,
                super::unix_now(),
            ],
        )?;
        Ok(())
    }

    pub fn audit_for_period(&self, period: &Period) -> SettleResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, period_date, period_type, actor, event_type, payload, created_at
             FROM audit_log
             WHERE period_date = ?1 AND period_type = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![period.key(), period.kind().as_str()], |row| {
                Ok(AuditLogEntry {
                    id: Some(row.get(0)?),
                    period_date: row.get(1)?,
                    period_type: row.get(2)?,
                    actor: row.get(3)?,
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
