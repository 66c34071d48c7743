//! Decision tables mapping a route's cluster shape to a [`Category`].
//!
//! Every policy is a pure function of the [`ClusterSet`]; thresholds are
//! plain data so they can be tuned from configuration.

use crate::analyzers::cluster::ClusterSet;
use crate::analyzers::types::{Category, PolicyKind};
use serde::{Deserialize, Serialize};

/// Five-category policy over cluster count, dominance and contiguity.
///
/// Evaluated top to bottom, first match wins:
///
/// | Rule | Category                  |
/// |------|---------------------------|
/// | exactly one cluster | `fully_stable` |
/// | two clusters, both contiguous, one after the other | `timetable_changeover` |
/// | dominant ≥ 85% and ≤ 5 clusters | `holiday_exceptions` |
/// | ≤ 5 clusters and top two ≥ 75% | `multiple_stable_periods` |
/// | otherwise | `chaotic` |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigorousPolicy {
    pub min_weeks: usize,
    pub holiday_dominant_pct: f64,
    pub max_clusters: usize,
    pub top_two_coverage_pct: f64,
}

impl Default for RigorousPolicy {
    fn default() -> Self {
        Self {
            min_weeks: 3,
            holiday_dominant_pct: 85.0,
            max_clusters: 5,
            top_two_coverage_pct: 75.0,
        }
    }
}

impl RigorousPolicy {
    pub fn classify(&self, set: &ClusterSet) -> Category {
        let count = set.len();

        if count == 1 {
            return Category::FullyStable;
        }

        if let (2, Some(first), Some(second)) = (count, set.dominant(), set.runner_up()) {
            if first.contiguity().contiguous
                && second.contiguity().contiguous
                && first.is_ordered_with(second)
            {
                return Category::TimetableChangeover;
            }
        }

        if set.dominant_pct() >= self.holiday_dominant_pct && count <= self.max_clusters {
            return Category::HolidayExceptions;
        }

        if count <= self.max_clusters && set.top_two_coverage_pct() >= self.top_two_coverage_pct {
            return Category::MultipleStablePeriods;
        }

        Category::Chaotic
    }
}

/// Four buckets on the dominant cluster's share of weeks.
///
/// | Dominant share | Category         |
/// |----------------|------------------|
/// | 100%           | `fully_stable`   |
/// | >= 90%         | `mostly_stable`  |
/// | >= 70%         | `some_variation` |
/// | < 70%          | `high_variation` |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarsePolicy {
    pub min_weeks: usize,
    pub mostly_stable_pct: f64,
    pub some_variation_pct: f64,
}

impl Default for CoarsePolicy {
    fn default() -> Self {
        Self {
            min_weeks: 4,
            mostly_stable_pct: 90.0,
            some_variation_pct: 70.0,
        }
    }
}

impl CoarsePolicy {
    pub fn classify(&self, set: &ClusterSet) -> Category {
        self.grade(set.dominant_pct())
    }

    pub fn grade(&self, dominant_pct: f64) -> Category {
        match dominant_pct {
            p if p >= 100.0 => Category::FullyStable,
            p if p >= self.mostly_stable_pct => Category::MostlyStable,
            p if p >= self.some_variation_pct => Category::SomeVariation,
            _ => Category::HighVariation,
        }
    }
}

/// Does the route have one typical week with only a few kinds of exception?
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypicalWeekPolicy {
    pub min_weeks: usize,
    pub typical_pct: f64,
    pub max_exceptional_patterns: usize,
}

impl Default for TypicalWeekPolicy {
    fn default() -> Self {
        Self {
            min_weeks: 3,
            typical_pct: 80.0,
            max_exceptional_patterns: 3,
        }
    }
}

impl TypicalWeekPolicy {
    pub fn classify(&self, set: &ClusterSet) -> Category {
        match set.dominant_pct() {
            p if p >= 100.0 => Category::FullyStable,
            p if p >= self.typical_pct
                && set.exceptional_pattern_count() <= self.max_exceptional_patterns =>
            {
                Category::StableWithExceptions
            }
            _ => Category::MultiplePatterns,
        }
    }
}

/// One of the interchangeable decision tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassificationPolicy {
    Rigorous(RigorousPolicy),
    Coarse(CoarsePolicy),
    TypicalWeek(TypicalWeekPolicy),
}

impl ClassificationPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Rigorous(_) => PolicyKind::Rigorous,
            Self::Coarse(_) => PolicyKind::Coarse,
            Self::TypicalWeek(_) => PolicyKind::TypicalWeek,
        }
    }

    /// Routes with fewer observed weeks are left unclassified.
    pub fn min_weeks(&self) -> usize {
        match self {
            Self::Rigorous(p) => p.min_weeks,
            Self::Coarse(p) => p.min_weeks,
            Self::TypicalWeek(p) => p.min_weeks,
        }
    }

    /// Labels a route, or `None` when it has too few weeks to judge.
    pub fn classify(&self, set: &ClusterSet) -> Option<Category> {
        if set.is_empty() || set.total_weeks() < self.min_weeks() {
            return None;
        }
        Some(match self {
            Self::Rigorous(p) => p.classify(set),
            Self::Coarse(p) => p.classify(set),
            Self::TypicalWeek(p) => p.classify(set),
        })
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::Rigorous(RigorousPolicy::default())
    }
}
