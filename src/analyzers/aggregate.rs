use crate::analyzers::types::{Category, StabilityRecord, WeekKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Publishable-share thresholds for the overall recommendation, as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationBands {
    pub excellent: f64,
    pub good: f64,
}

impl Default for RecommendationBands {
    fn default() -> Self {
        Self {
            excellent: 0.8,
            good: 0.6,
        }
    }
}

/// What the feed as a whole supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Excellent,
    Good,
    NeedsDateQueries,
}

impl Recommendation {
    pub fn text(&self) -> &'static str {
        match self {
            Self::Excellent => {
                "Excellent: most routes can publish a static timetable with a disclaimer for exception weeks"
            }
            Self::Good => "Good: publish static timetables for most routes, query by date for the rest",
            Self::NeedsDateQueries => {
                "Too much variation for static timetables: use date-specific queries"
            }
        }
    }
}

/// Grades the publishable share. `None` when nothing was classified.
pub fn recommend(
    publishable: usize,
    total: usize,
    bands: &RecommendationBands,
) -> Option<Recommendation> {
    if total == 0 {
        return None;
    }
    let share = publishable as f64 / total as f64;
    Some(match share {
        s if s >= bands.excellent => Recommendation::Excellent,
        s if s >= bands.good => Recommendation::Good,
        _ => Recommendation::NeedsDateQueries,
    })
}

/// Routes per category, in the order of first appearance in `categories`.
pub fn category_counts(
    records: &[StabilityRecord],
    categories: &[Category],
) -> Vec<(Category, usize)> {
    categories
        .iter()
        .map(|c| (*c, records.iter().filter(|r| r.category == *c).count()))
        .collect()
}

/// How many distinct routes flag each week as exceptional.
///
/// Only routes that are not fully stable contribute. Sorted by count, most
/// flagged first, then chronologically.
pub fn exceptional_week_counts(records: &[StabilityRecord]) -> Vec<(WeekKey, usize)> {
    let mut counts: BTreeMap<WeekKey, usize> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| r.category != Category::FullyStable)
    {
        let unique: BTreeSet<&WeekKey> = record.exceptional_weeks.iter().collect();
        for week in unique {
            *counts.entry(*week).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(WeekKey, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Weeks flagged by at least `threshold` routes.
pub fn systemic_exclusions(counts: &[(WeekKey, usize)], threshold: usize) -> BTreeSet<WeekKey> {
    counts
        .iter()
        .filter(|(_, n)| *n >= threshold)
        .map(|(week, _)| *week)
        .collect()
}
