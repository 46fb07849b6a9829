//! Exchange rates and the rate-provider seam.
//!
//! Rate discovery is a collaborator concern: the core only reads
//! whatever set is stored under the `active` scope, and pins a copy
//! under the period's own scope at archive time.

use crate::{error::SettleResult, store::SettleStore};
use serde::{Deserialize, Serialize};

/// Scope key of the mutable current rate set.
pub const ACTIVE_SCOPE: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSet {
    pub eur_usd: f64,
    pub gbp_usd: f64,
    pub usd_cop: f64,
}

/// Read-only source of the current exchange rates.
pub trait RateProvider {
    fn active_rates(&self) -> SettleResult<Option<RateSet>>;
}

/// The store-backed provider used in production: reads scope `active`.
pub struct StoreRates<'a> {
    store: &'a SettleStore,
}

impl<'a> StoreRates<'a> {
    pub fn new(store: &'a SettleStore) -> Self {
        Self { store }
    }
}

impl RateProvider for StoreRates<'_> {
    fn active_rates(&self) -> SettleResult<Option<RateSet>> {
        self.store.get_rates(ACTIVE_SCOPE)
    }
}
