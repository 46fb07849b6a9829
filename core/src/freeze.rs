//! Platform freeze predicate — the connection-window cutoff seam.
//!
//! The cutoff schedule (per-platform, timezone dependent) is external
//! configuration; the core only asks a collaborator-supplied predicate
//! whether a platform's window has closed. The persisted frozen set in
//! the store records cutoffs already applied to a model.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

pub trait FreezePolicy {
    fn is_frozen(&self, platform_id: &str, now: DateTime<Utc>) -> bool;
}

/// No platform ever freezes. Default for tests and ad-hoc tooling.
pub struct NoCutoff;

impl FreezePolicy for NoCutoff {
    fn is_frozen(&self, _platform_id: &str, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// A fixed set of frozen platform ids, independent of the clock.
pub struct StaticCutoff {
    frozen: HashSet<String>,
}

impl StaticCutoff {
    pub fn new<I: IntoIterator<Item = String>>(frozen: I) -> Self {
        Self {
            frozen: frozen.into_iter().collect(),
        }
    }
}

impl FreezePolicy for StaticCutoff {
    fn is_frozen(&self, platform_id: &str, _now: DateTime<Utc>) -> bool {
        self.frozen.contains(platform_id)
    }
}
