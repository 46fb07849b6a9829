//! Period aggregation — model totals rolled up Group -> Sede -> Global.
//!
//! RULE: pure and cache-free. Every call re-derives from the inputs it
//! is handed; cached aggregates would drift from concurrent raw-value
//! edits. Agency margin is a residual method at every level, never a
//! stored field.

use crate::{
    calculator::ModelEarnings,
    store::Hierarchy,
    types::{GroupId, SedeId},
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Which part of the tree a caller may see.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Super-admin: the full tree.
    Global,
    /// A regular admin sees only their assigned groups.
    Groups(HashSet<GroupId>),
}

impl Scope {
    fn allows(&self, group_id: &str) -> bool {
        match self {
            Self::Global => true,
            Self::Groups(groups) => groups.contains(group_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub sede_id: SedeId,
    pub model_count: usize,
    pub total_gross_usd: f64,
    pub total_model_usd: f64,
    pub total_cop_model: f64,
}

impl GroupSummary {
    pub fn agency_usd(&self) -> f64 {
        self.total_gross_usd - self.total_model_usd
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SedeSummary {
    pub sede_id: SedeId,
    pub groups: Vec<GroupSummary>,
    pub total_gross_usd: f64,
    pub total_model_usd: f64,
    pub total_cop_model: f64,
}

impl SedeSummary {
    pub fn agency_usd(&self) -> f64 {
        self.total_gross_usd - self.total_model_usd
    }

    pub fn model_count(&self) -> usize {
        self.groups.iter().map(|g| g.model_count).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalSummary {
    pub sede_count: usize,
    pub model_count: usize,
    pub total_gross_usd: f64,
    pub total_model_usd: f64,
    pub total_cop_model: f64,
}

impl GlobalSummary {
    pub fn agency_usd(&self) -> f64 {
        self.total_gross_usd - self.total_model_usd
    }
}

/// Roll per-model earnings up into per-sede summaries, restricted to
/// the caller's scope. Models whose group is not in the hierarchy are
/// skipped with a warning rather than silently mis-bucketed.
pub fn aggregate(
    earnings: &[ModelEarnings],
    hierarchy: &Hierarchy,
    scope: &Scope,
) -> Vec<SedeSummary> {
    let mut by_group: BTreeMap<GroupId, GroupSummary> = BTreeMap::new();

    for e in earnings {
        let Some(group_id) = hierarchy.group_of(&e.model_id) else {
            log::warn!("model '{}' has no group assignment, skipping", e.model_id);
            continue;
        };
        if !scope.allows(group_id) {
            continue;
        }
        let Some(sede_id) = hierarchy.sede_of(group_id) else {
            log::warn!("group '{group_id}' has no sede assignment, skipping");
            continue;
        };

        let entry = by_group
            .entry(group_id.to_string())
            .or_insert_with(|| GroupSummary {
                group_id: group_id.to_string(),
                sede_id: sede_id.to_string(),
                model_count: 0,
                total_gross_usd: 0.0,
                total_model_usd: 0.0,
                total_cop_model: 0.0,
            });
        entry.model_count += 1;
        entry.total_gross_usd += e.total_gross_usd;
        entry.total_model_usd += e.total_model_usd;
        entry.total_cop_model += e.total_cop_model;
    }

    let mut by_sede: BTreeMap<SedeId, SedeSummary> = BTreeMap::new();
    for (_, group) in by_group {
        let sede = by_sede
            .entry(group.sede_id.clone())
            .or_insert_with(|| SedeSummary {
                sede_id: group.sede_id.clone(),
                groups: Vec::new(),
                total_gross_usd: 0.0,
                total_model_usd: 0.0,
                total_cop_model: 0.0,
            });
        sede.total_gross_usd += group.total_gross_usd;
        sede.total_model_usd += group.total_model_usd;
        sede.total_cop_model += group.total_cop_model;
        sede.groups.push(group);
    }

    by_sede.into_values().collect()
}

/// Collapse sede summaries into the global view.
pub fn global_totals(sedes: &[SedeSummary]) -> GlobalSummary {
    GlobalSummary {
        sede_count: sedes.len(),
        model_count: sedes.iter().map(|s| s.model_count()).sum(),
        total_gross_usd: sedes.iter().map(|s| s.total_gross_usd).sum(),
        total_model_usd: sedes.iter().map(|s| s.total_model_usd).sum(),
        total_cop_model: sedes.iter().map(|s| s.total_cop_model).sum(),
    }
}
