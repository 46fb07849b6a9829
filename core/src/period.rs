//! Half-month billing periods.
//!
//! A period is identified by its start day: day 1 ("P1", days 1-15)
//! or day 16 ("P2", day 16 to end of month). All period math lives
//! here; nothing else in the crate computes period boundaries.

use crate::error::{SettleError, SettleResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodKind {
    P1,
    P2,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
        }
    }
}

/// A half-month billing window, keyed by its start date.
/// Invariant: the start day is always 1 or 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    start: NaiveDate,
}

impl Period {
    /// Build a period from its start date. Rejects any day other than 1 or 16.
    pub fn from_start(start: NaiveDate) -> SettleResult<Self> {
        match start.day() {
            1 | 16 => Ok(Self { start }),
            _ => Err(SettleError::InvalidPeriodDate {
                date: start.to_string(),
            }),
        }
    }

    /// The period containing an arbitrary calendar date.
    pub fn containing(date: NaiveDate) -> Self {
        let day = if date.day() < 16 { 1 } else { 16 };
        let start = NaiveDate::from_ymd_opt(date.year(), date.month(), day)
            .expect("day 1 and 16 exist in every month");
        Self { start }
    }

    /// Parse a stored period key, '%Y-%m-%d'.
    pub fn parse(s: &str) -> SettleResult<Self> {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            SettleError::InvalidPeriodDate {
                date: s.to_string(),
            }
        })?;
        Self::from_start(date)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn kind(&self) -> PeriodKind {
        if self.start.day() == 1 {
            PeriodKind::P1
        } else {
            PeriodKind::P2
        }
    }

    /// The next period in the fixed half-month cadence:
    /// P1 -> P2 of the same month, P2 -> P1 of the next month.
    pub fn next(&self) -> Self {
        let start = match self.kind() {
            PeriodKind::P1 => {
                NaiveDate::from_ymd_opt(self.start.year(), self.start.month(), 16)
            }
            PeriodKind::P2 => {
                let (year, month) = if self.start.month() == 12 {
                    (self.start.year() + 1, 1)
                } else {
                    (self.start.year(), self.start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
            }
        }
        .expect("half-month cadence always lands on a valid date");
        Self { start }
    }

    /// Stable storage key, '%Y-%m-%d'.
    pub fn key(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// Human label, e.g. "2026-08 P1".
    pub fn label(&self) -> String {
        format!("{} {}", self.start.format("%Y-%m"), self.kind().as_str())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containing_maps_days_to_halves() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(Period::containing(d(2026, 8, 1)).kind(), PeriodKind::P1);
        assert_eq!(Period::containing(d(2026, 8, 15)).kind(), PeriodKind::P1);
        assert_eq!(Period::containing(d(2026, 8, 16)).kind(), PeriodKind::P2);
        assert_eq!(Period::containing(d(2026, 8, 31)).kind(), PeriodKind::P2);
    }

    #[test]
    fn next_advances_half_month_cadence() {
        let p1 = Period::parse("2026-12-01").unwrap();
        let p2 = p1.next();
        assert_eq!(p2.key(), "2026-12-16");
        assert_eq!(p2.next().key(), "2027-01-01");
    }

    #[test]
    fn rejects_mid_month_start() {
        assert!(Period::parse("2026-08-07").is_err());
    }
}
