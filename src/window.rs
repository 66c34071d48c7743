//! Picks a sample week for trimming a feed, away from holiday periods.

use anyhow::{Result, bail};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weeks to look ahead before giving up.
pub const MAX_ATTEMPTS: usize = 52;

/// A yearly period, by month and day. Wraps into the next year when it ends
/// in an earlier month than it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutPeriod {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl BlackoutPeriod {
    /// December and January.
    pub const WINTER: Self = Self {
        start_month: 12,
        start_day: 1,
        end_month: 1,
        end_day: 31,
    };

    fn wraps(&self) -> bool {
        self.end_month < self.start_month
    }

    /// The concrete dates of the period starting in `year`.
    fn in_year(&self, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(year, self.start_month, self.start_day)?;
        let end_year = if self.wraps() { year + 1 } else { year };
        let end = NaiveDate::from_ymd_opt(end_year, self.end_month, self.end_day)?;
        Some((start, end))
    }

    /// True when any day of the week starting on `monday` falls in the period.
    pub fn overlaps_week(&self, monday: NaiveDate) -> bool {
        let Some(sunday) = monday.checked_add_days(Days::new(6)) else {
            return false;
        };
        (monday.year() - 1..=monday.year() + 1)
            .filter_map(|year| self.in_year(year))
            .any(|(start, end)| !(sunday < start || monday > end))
    }
}

/// `today` if it is a Monday, otherwise the Monday after.
pub fn next_monday(today: NaiveDate) -> NaiveDate {
    let days = (7 - today.weekday().num_days_from_monday()) % 7;
    today + Days::new(u64::from(days))
}

/// The first Monday on or after `today` whose week avoids every period.
pub fn select_week(today: NaiveDate, blackouts: &[BlackoutPeriod]) -> Result<NaiveDate> {
    let mut candidate = next_monday(today);
    for _ in 0..MAX_ATTEMPTS {
        if !blackouts.iter().any(|b| b.overlaps_week(candidate)) {
            return Ok(candidate);
        }
        debug!(week = %candidate, "Week overlaps a blackout period");
        candidate = candidate + Days::new(7);
    }
    bail!("no suitable week within the next {MAX_ATTEMPTS} weeks of {today}")
}
