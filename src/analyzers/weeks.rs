//! Expands a validity interval into the ISO weeks it touches.

use crate::analyzers::types::WeekKey;
use chrono::{Datelike, Days, NaiveDate};
use std::collections::BTreeSet;

/// Iterator over the ISO weeks touched by an inclusive date interval.
///
/// Samples the start date, then the Monday of every following week while it
/// is still inside the interval, so each week is yielded exactly once and a
/// week the interval only clips still counts.
#[derive(Debug, Clone)]
pub struct WeekCursor {
    cursor: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for WeekCursor {
    type Item = WeekKey;

    fn next(&mut self) -> Option<WeekKey> {
        let current = self.cursor?;
        if current > self.end {
            self.cursor = None;
            return None;
        }

        let to_next_monday = 7 - u64::from(current.weekday().num_days_from_monday());
        self.cursor = current.checked_add_days(Days::new(to_next_monday));

        Some(WeekKey::from_date(current))
    }
}

/// Every week touched by `[start, end]`. Empty when `start > end`.
pub fn weeks_touched(start: NaiveDate, end: NaiveDate) -> WeekCursor {
    WeekCursor {
        cursor: Some(start),
        end,
    }
}

/// Weeks touched by `[start, end]` minus `excluded`.
///
/// Excluded weeks are dropped in place; the cursor still walks through them,
/// so nothing is merged into a neighbouring week.
pub fn expand_weeks(start: NaiveDate, end: NaiveDate, excluded: &BTreeSet<WeekKey>) -> Vec<WeekKey> {
    weeks_touched(start, end)
        .filter(|week| !excluded.contains(week))
        .collect()
}
