//! Groups a route's weeks by signature and measures how contiguous each group is.

use crate::analyzers::types::{Cluster, ClusterSpan, Signature, WeekKey};
use crate::analyzers::utility::pct;
use std::collections::{BTreeMap, HashMap};

/// Average adjusted gap at or below which a cluster counts as one run.
pub const MAX_CONTIGUOUS_AVG_GAP: f64 = 1.5;

/// Ordinal differences treated as "next week" across a year boundary.
/// `2025-W52 → 2026-W01` is 49, `2026-W53 → 2027-W01` is 48.
const YEAR_WRAP_GAPS: std::ops::RangeInclusive<i64> = 48..=51;

/// How the weeks of a cluster are spread in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contiguity {
    pub avg_gap: f64,
    pub max_gap: i64,
    pub contiguous: bool,
}

/// Human label for a [`Contiguity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalShape {
    Block,
    MostlyContiguous,
    Scattered,
}

impl Contiguity {
    /// Measures a set of weeks. Zero or one week is trivially contiguous.
    pub fn of(weeks: &[WeekKey]) -> Self {
        let mut ordinals: Vec<i64> = weeks.iter().map(WeekKey::ordinal).collect();
        ordinals.sort_unstable();

        let gaps: Vec<i64> = ordinals
            .windows(2)
            .map(|pair| adjusted_gap(pair[1] - pair[0]))
            .collect();

        if gaps.is_empty() {
            return Self {
                avg_gap: 0.0,
                max_gap: 0,
                contiguous: true,
            };
        }

        let avg_gap = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;
        Self {
            avg_gap,
            max_gap: gaps.iter().copied().max().unwrap_or(0),
            contiguous: avg_gap <= MAX_CONTIGUOUS_AVG_GAP,
        }
    }

    pub fn shape(&self) -> TemporalShape {
        if self.max_gap <= 1 {
            TemporalShape::Block
        } else if self.contiguous {
            TemporalShape::MostlyContiguous
        } else {
            TemporalShape::Scattered
        }
    }
}

fn adjusted_gap(diff: i64) -> i64 {
    if YEAR_WRAP_GAPS.contains(&diff) { 1 } else { diff }
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.weeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    pub fn first(&self) -> Option<WeekKey> {
        self.weeks.first().copied()
    }

    pub fn last(&self) -> Option<WeekKey> {
        self.weeks.last().copied()
    }

    pub fn contiguity(&self) -> Contiguity {
        Contiguity::of(&self.weeks)
    }

    /// True when every week of one cluster comes before every week of the other.
    pub fn is_ordered_with(&self, other: &Cluster) -> bool {
        match (self.first(), self.last(), other.first(), other.last()) {
            (Some(a_first), Some(a_last), Some(b_first), Some(b_last)) => {
                a_last < b_first || b_last < a_first
            }
            _ => true,
        }
    }

    pub fn span(&self) -> Option<ClusterSpan> {
        Some(ClusterSpan {
            first: self.first()?,
            last: self.last()?,
            weeks: self.len(),
            contiguous: self.contiguity().contiguous,
        })
    }
}

/// A route's weeks partitioned by signature, largest cluster first.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSet {
    clusters: Vec<Cluster>,
    total_weeks: usize,
}

impl ClusterSet {
    /// Partitions `signatures` into clusters of identical signature.
    ///
    /// Ranked by size; equal sizes keep the order of their earliest week, so
    /// the result depends only on the week → signature mapping.
    pub fn from_signatures(signatures: &BTreeMap<WeekKey, Signature>) -> Self {
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut index: HashMap<&Signature, usize> = HashMap::new();

        for (week, signature) in signatures {
            match index.get(signature) {
                Some(&i) => clusters[i].weeks.push(*week),
                None => {
                    index.insert(signature, clusters.len());
                    clusters.push(Cluster {
                        signature: signature.clone(),
                        weeks: vec![*week],
                    });
                }
            }
        }

        clusters.sort_by(|a, b| b.len().cmp(&a.len()));

        Self {
            clusters,
            total_weeks: signatures.len(),
        }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn total_weeks(&self) -> usize {
        self.total_weeks
    }

    pub fn dominant(&self) -> Option<&Cluster> {
        self.clusters.first()
    }

    pub fn runner_up(&self) -> Option<&Cluster> {
        self.clusters.get(1)
    }

    fn size_at(&self, i: usize) -> usize {
        self.clusters.get(i).map_or(0, Cluster::len)
    }

    pub fn dominant_size(&self) -> usize {
        self.size_at(0)
    }

    pub fn runner_up_size(&self) -> usize {
        self.size_at(1)
    }

    /// Share of weeks in the dominant cluster, 0–100.
    pub fn dominant_pct(&self) -> f64 {
        pct(self.dominant_size(), self.total_weeks)
    }

    pub fn runner_up_pct(&self) -> f64 {
        pct(self.runner_up_size(), self.total_weeks)
    }

    pub fn top_two_coverage_pct(&self) -> f64 {
        pct(self.dominant_size() + self.runner_up_size(), self.total_weeks)
    }

    /// Number of distinct signatures outside the dominant one.
    pub fn exceptional_pattern_count(&self) -> usize {
        self.clusters.len().saturating_sub(1)
    }

    /// Weeks in the dominant cluster, chronological.
    pub fn typical_weeks(&self) -> Vec<WeekKey> {
        self.dominant().map(|c| c.weeks.clone()).unwrap_or_default()
    }

    /// Weeks outside the dominant cluster, chronological.
    pub fn exceptional_weeks(&self) -> Vec<WeekKey> {
        let mut weeks: Vec<WeekKey> = self
            .clusters
            .iter()
            .skip(1)
            .flat_map(|c| c.weeks.iter().copied())
            .collect();
        weeks.sort_unstable();
        weeks
    }

    pub fn spans(&self) -> Vec<ClusterSpan> {
        self.clusters.iter().filter_map(Cluster::span).collect()
    }
}
