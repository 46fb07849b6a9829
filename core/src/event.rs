//! Lifecycle audit events.
//!
//! RULE: every mutating lifecycle operation appends exactly one entry
//! to the audit log, recording who did what to which period. The log
//! is append-only history for operators; nothing in the core reads it
//! back to make decisions.

use crate::types::{AdminId, ModelId, PlatformId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    ArchiveStarted {
        admin: AdminId,
    },
    ArchiveCompleted {
        admin: AdminId,
        models: usize,
    },
    ArchivePartial {
        admin: AdminId,
        archived: usize,
        failed: Vec<ModelId>,
    },
    CleanupApplied {
        admin: AdminId,
        cleared_values: usize,
        unfrozen: usize,
        next_period: String,
    },
    RestoreApplied {
        admin: AdminId,
        models: usize,
    },
    RatesCorrected {
        admin: AdminId,
        eur_usd: f64,
        gbp_usd: f64,
        usd_cop: f64,
    },
    PlatformFrozen {
        model_id: ModelId,
        platform_id: PlatformId,
    },
    LockReclaimed {
        admin: AdminId,
        previous_holder: AdminId,
        operation: String,
    },
}

/// Stable string name for the event_type column.
pub fn event_type_name(event: &AuditEvent) -> &'static str {
    match event {
        AuditEvent::ArchiveStarted { .. } => "archive_started",
        AuditEvent::ArchiveCompleted { .. } => "archive_completed",
        AuditEvent::ArchivePartial { .. } => "archive_partial",
        AuditEvent::CleanupApplied { .. } => "cleanup_applied",
        AuditEvent::RestoreApplied { .. } => "restore_applied",
        AuditEvent::RatesCorrected { .. } => "rates_corrected",
        AuditEvent::PlatformFrozen { .. } => "platform_frozen",
        AuditEvent::LockReclaimed { .. } => "lock_reclaimed",
    }
}

/// The audit entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub period_date: String,
    pub period_type: String,
    pub actor: AdminId,
    pub event_type: String,
    pub payload: String, // JSON-serialized AuditEvent
    pub created_at: i64, // unix seconds
}
