//! Live raw-value CRUD and the persisted freeze set.

use super::{unix_now, RawValue, SettleStore};
use crate::error::SettleResult;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

impl SettleStore {
    /// Insert or overwrite the single raw value for (model, platform, period).
    /// The primary key guarantees exactly one row per key.
    pub fn upsert_raw_value(
        &self,
        model_id: &str,
        platform_id: &str,
        period_date: &str,
        amount: f64,
    ) -> SettleResult<()> {
        self.conn().execute(
            "INSERT INTO raw_value (model_id, platform_id, period_date, amount, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(model_id, platform_id, period_date) DO UPDATE SET
               amount = excluded.amount,
               updated_at = excluded.updated_at",
            params![model_id, platform_id, period_date, amount, unix_now()],
        )?;
        Ok(())
    }

    pub fn get_raw_value(
        &self,
        model_id: &str,
        platform_id: &str,
        period_date: &str,
    ) -> SettleResult<Option<RawValue>> {
        let row = self
            .conn()
            .query_row(
                "SELECT model_id, platform_id, period_date, amount, updated_at
                 FROM raw_value
                 WHERE model_id = ?1 AND platform_id = ?2 AND period_date = ?3",
                params![model_id, platform_id, period_date],
                |row| {
                    Ok(RawValue {
                        model_id: row.get(0)?,
                        platform_id: row.get(1)?,
                        period_date: row.get(2)?,
                        amount: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn raw_values_for_model(
        &self,
        model_id: &str,
        period_date: &str,
    ) -> SettleResult<Vec<RawValue>> {
        let mut stmt = self.conn().prepare(
            "SELECT model_id, platform_id, period_date, amount, updated_at
             FROM raw_value
             WHERE model_id = ?1 AND period_date = ?2
             ORDER BY platform_id ASC",
        )?;
        let rows = stmt
            .query_map(params![model_id, period_date], |row| {
                Ok(RawValue {
                    model_id: row.get(0)?,
                    platform_id: row.get(1)?,
                    period_date: row.get(2)?,
                    amount: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All raw values for a period, grouped per model.
    pub fn raw_values_by_model(
        &self,
        period_date: &str,
    ) -> SettleResult<BTreeMap<String, Vec<RawValue>>> {
        let mut stmt = self.conn().prepare(
            "SELECT model_id, platform_id, period_date, amount, updated_at
             FROM raw_value
             WHERE period_date = ?1
             ORDER BY model_id ASC, platform_id ASC",
        )?;
        let rows = stmt
            .query_map(params![period_date], |row| {
                Ok(RawValue {
                    model_id: row.get(0)?,
                    platform_id: row.get(1)?,
                    period_date: row.get(2)?,
                    amount: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_model: BTreeMap<String, Vec<RawValue>> = BTreeMap::new();
        for row in rows {
            by_model.entry(row.model_id.clone()).or_default().push(row);
        }
        Ok(by_model)
    }

    pub fn count_raw_values(&self, period_date: &str) -> SettleResult<i64> {
        let n = self.conn().query_row(
            "SELECT COUNT(*) FROM raw_value WHERE period_date = ?1",
            params![period_date],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn count_models_with_values(&self, period_date: &str) -> SettleResult<i64> {
        let n = self.conn().query_row(
            "SELECT COUNT(DISTINCT model_id) FROM raw_value WHERE period_date = ?1",
            params![period_date],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    // ── Freeze set ─────────────────────────────────────────────

    pub fn freeze_platform(&self, model_id: &str, platform_id: &str) -> SettleResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO frozen_platform (model_id, platform_id, frozen_at)
             VALUES (?1, ?2, ?3)",
            params![model_id, platform_id, unix_now()],
        )?;
        Ok(())
    }

    pub fn is_platform_frozen(&self, model_id: &str, platform_id: &str) -> SettleResult<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM frozen_platform
             WHERE model_id = ?1 AND platform_id = ?2",
            params![model_id, platform_id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn frozen_platforms(&self, model_id: &str) -> SettleResult<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT platform_id FROM frozen_platform
             WHERE model_id = ?1 ORDER BY platform_id ASC",
        )?;
        let rows = stmt
            .query_map(params![model_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_frozen_platforms(&self) -> SettleResult<i64> {
        let n = self
            .conn()
            .query_row("SELECT COUNT(*) FROM frozen_platform", [], |row| row.get(0))?;
        Ok(n)
    }
}
