//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Domain modules call
//! store methods — they never execute SQL directly. Every admin
//! session opens its own connection; cross-session correctness rests
//! on the conditional updates in lock.rs, never on in-process state.

mod archive;
mod live;
mod lock;
mod rates;

pub use lock::{AcquireOutcome, LockInfo, PeriodState, PeriodStateRow};

use crate::{
    error::SettleResult,
    types::{GroupId, ModelId, SedeId},
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct SettleStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file/URI
}

impl SettleStore {
    pub fn open(path: &str) -> SettleResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SettleResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a second connection to the same database — a second admin
    /// session. For plain in-memory databases this is a fresh isolated
    /// database; concurrency tests use shared-cache URIs instead.
    pub fn reopen(&self) -> SettleResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SettleResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_period_state.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_archive.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Roster ─────────────────────────────────────────────────

    pub fn upsert_sede(&self, sede_id: &str, label: &str) -> SettleResult<()> {
        self.conn.execute(
            "INSERT INTO sede (sede_id, label) VALUES (?1, ?2)
             ON CONFLICT(sede_id) DO UPDATE SET label = excluded.label",
            params![sede_id, label],
        )?;
        Ok(())
    }

    pub fn upsert_group(
        &self,
        group_id: &str,
        sede_id: &str,
        label: &str,
        share_override: Option<f64>,
    ) -> SettleResult<()> {
        self.conn.execute(
            "INSERT INTO model_group (group_id, sede_id, label, share_override)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id) DO UPDATE SET
               sede_id = excluded.sede_id,
               label = excluded.label,
               share_override = excluded.share_override",
            params![group_id, sede_id, label, share_override],
        )?;
        Ok(())
    }

    pub fn upsert_model(
        &self,
        model_id: &str,
        display_name: &str,
        group_id: &str,
        enabled: bool,
    ) -> SettleResult<()> {
        self.conn.execute(
            "INSERT INTO model (model_id, display_name, group_id, enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(model_id) DO UPDATE SET
               display_name = excluded.display_name,
               group_id = excluded.group_id,
               enabled = excluded.enabled",
            params![model_id, display_name, group_id, enabled as i64],
        )?;
        Ok(())
    }

    pub fn get_model(&self, model_id: &str) -> SettleResult<Option<ModelRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT model_id, display_name, group_id, enabled
                 FROM model WHERE model_id = ?1",
                params![model_id],
                |row| {
                    Ok(ModelRow {
                        model_id: row.get(0)?,
                        display_name: row.get(1)?,
                        group_id: row.get(2)?,
                        enabled: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn enabled_models(&self) -> SettleResult<Vec<ModelRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT model_id, display_name, group_id, enabled
             FROM model WHERE enabled = 1 ORDER BY model_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ModelRow {
                    model_id: row.get(0)?,
                    display_name: row.get(1)?,
                    group_id: row.get(2)?,
                    enabled: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Load the full roster tree in one shot for aggregation.
    pub fn load_hierarchy(&self) -> SettleResult<Hierarchy> {
        let mut stmt = self.conn.prepare("SELECT sede_id, label FROM sede")?;
        let sedes = stmt
            .query_map([], |row| {
                Ok(SedeRow {
                    sede_id: row.get(0)?,
                    label: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT group_id, sede_id, label, share_override FROM model_group")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(GroupRow {
                    group_id: row.get(0)?,
                    sede_id: row.get(1)?,
                    label: row.get(2)?,
                    share_override: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT model_id, display_name, group_id, enabled FROM model")?;
        let models = stmt
            .query_map([], |row| {
                Ok(ModelRow {
                    model_id: row.get(0)?,
                    display_name: row.get(1)?,
                    group_id: row.get(2)?,
                    enabled: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Hierarchy::new(sedes, groups, models))
    }
}

/// Current wall-clock time as unix seconds, the store's timestamp unit.
pub(crate) fn unix_now() -> i64 {
    Utc::now().timestamp()
}

// ── Row types ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawValue {
    pub model_id: ModelId,
    pub platform_id: String,
    pub period_date: String,
    pub amount: f64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRow {
    pub model_id: ModelId,
    pub display_name: String,
    pub group_id: GroupId,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: GroupId,
    pub sede_id: SedeId,
    pub label: String,
    pub share_override: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SedeRow {
    pub sede_id: SedeId,
    pub label: String,
}

/// The roster tree with the lookups aggregation needs.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub sedes: Vec<SedeRow>,
    pub groups: Vec<GroupRow>,
    pub models: Vec<ModelRow>,
    model_group: HashMap<ModelId, GroupId>,
    group_sede: HashMap<GroupId, SedeId>,
    group_share: HashMap<GroupId, Option<f64>>,
}

impl Hierarchy {
    pub fn new(sedes: Vec<SedeRow>, groups: Vec<GroupRow>, models: Vec<ModelRow>) -> Self {
        let model_group = models
            .iter()
            .map(|m| (m.model_id.clone(), m.group_id.clone()))
            .collect();
        let group_sede = groups
            .iter()
            .map(|g| (g.group_id.clone(), g.sede_id.clone()))
            .collect();
        let group_share = groups
            .iter()
            .map(|g| (g.group_id.clone(), g.share_override))
            .collect();
        Self {
            sedes,
            groups,
            models,
            model_group,
            group_sede,
            group_share,
        }
    }

    pub fn group_of(&self, model_id: &str) -> Option<&str> {
        self.model_group.get(model_id).map(String::as_str)
    }

    pub fn sede_of(&self, group_id: &str) -> Option<&str> {
        self.group_sede.get(group_id).map(String::as_str)
    }

    /// The group-level share override, the middle link of the chain.
    pub fn group_share(&self, group_id: &str) -> Option<f64> {
        self.group_share.get(group_id).copied().flatten()
    }
}

/// One model's archived snapshot for a period.
#[derive(Debug, Clone)]
pub struct ArchiveRow {
    pub period_date: String,
    pub period_type: String,
    pub model_id: ModelId,
    pub raw_values: String, // JSON: platform_id -> raw amount
    pub earnings: String,   // JSON: ModelEarnings
    pub eur_usd: f64,
    pub gbp_usd: f64,
    pub usd_cop: f64,
    pub archived_at: i64,
    pub archived_by: String,
}
