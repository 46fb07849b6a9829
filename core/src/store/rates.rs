//! Exchange-rate sets keyed by scope.

use super::{unix_now, SettleStore};
use crate::{error::SettleResult, rates::RateSet};
use rusqlite::{params, OptionalExtension};

impl SettleStore {
    pub fn upsert_rates(&self, scope: &str, rates: &RateSet) -> SettleResult<()> {
        self.conn().execute(
            "INSERT INTO exchange_rate_set (scope, eur_usd, gbp_usd, usd_cop, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope) DO UPDATE SET
               eur_usd = excluded.eur_usd,
               gbp_usd = excluded.gbp_usd,
               usd_cop = excluded.usd_cop,
               updated_at = excluded.updated_at",
            params![scope, rates.eur_usd, rates.gbp_usd, rates.usd_cop, unix_now()],
        )?;
        Ok(())
    }

    pub fn get_rates(&self, scope: &str) -> SettleResult<Option<RateSet>> {
        let rates = self
            .conn()
            .query_row(
                "SELECT eur_usd, gbp_usd, usd_cop FROM exchange_rate_set WHERE scope = ?1",
                params![scope],
                |row| {
                    Ok(RateSet {
                        eur_usd: row.get(0)?,
                        gbp_usd: row.get(1)?,
                        usd_cop: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(rates)
    }
}
