//! settle-core — per-platform earnings settlement and period lifecycle.
//!
//! RULES:
//!   - Platform formulas are data (one rule table, one evaluator),
//!     never string-keyed branches scattered through call sites.
//!   - Calculator and aggregator are pure: no store access, no caches.
//!     Agency margin is always the residual gross minus model share.
//!   - Only the store talks to SQLite; every lifecycle transition is a
//!     single conditional update, because independent admin sessions
//!     share nothing but the database.
//!   - Rounding happens at presentation boundaries only.

pub mod aggregator;
pub mod calculator;
pub mod config;
pub mod error;
pub mod event;
pub mod freeze;
pub mod lifecycle;
pub mod period;
pub mod rates;
pub mod rules;
pub mod store;
pub mod types;

pub use config::SettleConfig;
pub use error::{SettleError, SettleResult};
pub use lifecycle::PeriodLifecycleManager;
pub use period::{Period, PeriodKind};
pub use rates::RateSet;
