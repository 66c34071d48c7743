//! The parameterised stability pipeline.
//!
//! One traversal serves every variant: the signature mode, the decision
//! table and the set of excluded weeks are inputs rather than separate code
//! paths.

use crate::analyzers::aggregate::{
    Recommendation, RecommendationBands, category_counts, exceptional_week_counts, recommend,
    systemic_exclusions,
};
use crate::analyzers::cluster::ClusterSet;
use crate::analyzers::grade::ClassificationPolicy;
use crate::analyzers::signature::{RouteWeeks, WeekTable};
use crate::analyzers::types::{Category, PolicyKind, SignatureMode, StabilityRecord, WeekKey};
use crate::config::AnalysisConfig;
use crate::feed::{Feed, ResolvedTrips};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Result of one pass over a feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityReport {
    pub policy: PolicyKind,
    pub signature_mode: SignatureMode,
    pub excluded_weeks: BTreeSet<WeekKey>,
    /// Earliest start and latest end over the calendar.
    pub data_range: Option<(NaiveDate, NaiveDate)>,
    /// Classified routes in route id order.
    pub records: Vec<StabilityRecord>,
    /// Routes left out for having too few weeks.
    pub insufficient_data: usize,
    /// Trips that could not be resolved against the calendar.
    pub skipped_trips: usize,
}

impl StabilityReport {
    pub fn classified(&self) -> usize {
        self.records.len()
    }

    pub fn publishable(&self) -> usize {
        self.records.iter().filter(|r| r.is_publishable()).count()
    }

    pub fn category_counts(&self) -> Vec<(Category, usize)> {
        category_counts(&self.records, self.policy.categories())
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &StabilityRecord> {
        self.records.iter().filter(move |r| r.category == category)
    }

    pub fn recommendation(&self, bands: &RecommendationBands) -> Option<Recommendation> {
        recommend(self.publishable(), self.classified(), bands)
    }

    pub fn exceptional_week_counts(&self) -> Vec<(WeekKey, usize)> {
        exceptional_week_counts(&self.records)
    }

    pub fn record(&self, route_id: &str) -> Option<&StabilityRecord> {
        self.records.iter().find(|r| r.route_id == route_id)
    }
}

/// First pass, the weeks it found to be systemic, and the rerun without them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwoPassOutcome {
    pub first: StabilityReport,
    pub systemic_weeks: BTreeSet<WeekKey>,
    /// `None` when no week reached the threshold.
    pub second: Option<StabilityReport>,
}

impl TwoPassOutcome {
    pub fn final_report(&self) -> &StabilityReport {
        self.second.as_ref().unwrap_or(&self.first)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer {
    mode: SignatureMode,
    policy: ClassificationPolicy,
}

impl Analyzer {
    pub fn new(mode: SignatureMode, policy: ClassificationPolicy) -> Self {
        Self { mode, policy }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.signature_mode, config.classification_policy())
    }

    pub fn mode(&self) -> SignatureMode {
        self.mode
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    /// Runs the pipeline once. `None` when the feed has no calendar.
    #[tracing::instrument(skip_all, fields(policy = %self.policy.kind(), excluded = excluded.len()))]
    pub fn analyze(&self, feed: &Feed, excluded: &BTreeSet<WeekKey>) -> Option<StabilityReport> {
        if !feed.has_calendar() {
            warn!("Feed has no calendar data, nothing to analyze");
            return None;
        }
        let resolved = feed.resolve_trips();
        Some(self.run(feed, &resolved, &feed.route_names(), excluded))
    }

    /// Runs the pipeline, then again without every week that at least
    /// `threshold` routes flagged as exceptional.
    #[tracing::instrument(skip_all, fields(policy = %self.policy.kind(), threshold = threshold))]
    pub fn analyze_two_pass(
        &self,
        feed: &Feed,
        base_excluded: &BTreeSet<WeekKey>,
        threshold: usize,
    ) -> Option<TwoPassOutcome> {
        if !feed.has_calendar() {
            warn!("Feed has no calendar data, nothing to analyze");
            return None;
        }
        let resolved = feed.resolve_trips();
        let names = feed.route_names();

        let first = self.run(feed, &resolved, &names, base_excluded);

        let counts = first.exceptional_week_counts();
        let systemic: BTreeSet<WeekKey> = systemic_exclusions(&counts, threshold)
            .difference(base_excluded)
            .copied()
            .collect();

        if systemic.is_empty() {
            info!("No systemic exception weeks found, skipping second pass");
            return Some(TwoPassOutcome {
                first,
                systemic_weeks: systemic,
                second: None,
            });
        }

        let listed: Vec<String> = systemic.iter().map(ToString::to_string).collect();
        info!(
            weeks = %listed.join(", "),
            "Excluding systemic exception weeks for second pass"
        );

        let excluded: BTreeSet<WeekKey> = base_excluded.union(&systemic).copied().collect();
        let second = self.run(feed, &resolved, &names, &excluded);

        Some(TwoPassOutcome {
            first,
            systemic_weeks: systemic,
            second: Some(second),
        })
    }

    fn run(
        &self,
        feed: &Feed,
        resolved: &ResolvedTrips,
        route_names: &HashMap<String, String>,
        excluded: &BTreeSet<WeekKey>,
    ) -> StabilityReport {
        if resolved.skipped > 0 {
            info!(skipped = resolved.skipped, "Skipped trips without usable service dates");
        }

        let table = WeekTable::build(&resolved.trips, route_names, excluded);

        let mut records = Vec::new();
        let mut insufficient_data = 0;
        for (route_id, weeks) in table.routes() {
            match self.classify_route(route_id, weeks) {
                Some(record) => records.push(record),
                None => {
                    debug!(route_id, weeks = weeks.weeks.len(), "Too few weeks to classify");
                    insufficient_data += 1;
                }
            }
        }

        info!(
            routes = table.len(),
            classified = records.len(),
            insufficient_data,
            "Classification complete"
        );

        StabilityReport {
            policy: self.policy.kind(),
            signature_mode: self.mode,
            excluded_weeks: excluded.clone(),
            data_range: feed.date_range(),
            records,
            insufficient_data,
            skipped_trips: resolved.skipped,
        }
    }

    /// Clusters and labels one route. `None` when it has too few weeks.
    pub fn classify_route(&self, route_id: &str, route: &RouteWeeks) -> Option<StabilityRecord> {
        let set = ClusterSet::from_signatures(&route.signatures(self.mode));
        let category = self.policy.classify(&set)?;

        Some(StabilityRecord {
            route_id: route_id.to_string(),
            route_name: route.route_name.clone(),
            policy: self.policy.kind(),
            category,
            total_weeks: set.total_weeks(),
            cluster_count: set.len(),
            largest_cluster_size: set.dominant_size(),
            largest_cluster_pct: set.dominant_pct(),
            second_cluster_size: set.runner_up_size(),
            second_cluster_pct: set.runner_up_pct(),
            top_two_coverage_pct: set.top_two_coverage_pct(),
            largest_contiguous: set.dominant().is_some_and(|c| c.contiguity().contiguous),
            second_contiguous: set.runner_up().is_some_and(|c| c.contiguity().contiguous),
            typical_weeks: set.typical_weeks(),
            exceptional_weeks: set.exceptional_weeks(),
            clusters: set.spans(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::grade::CoarsePolicy;
    use crate::feed::{CalendarRow, RouteRow, TripRow};

    fn calendar(service: &str, start: &str, end: &str) -> CalendarRow {
        CalendarRow {
            service_id: service.to_string(),
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
            start_date: start.to_string(),
            end_date: end.to_string(),
        }
    }

    /// `routes` routes, each running WK over 2025-W01..W10 plus its own
    /// reduced service in W05.
    fn holiday_feed(routes: usize) -> Feed {
        let mut feed = Feed {
            calendar: vec![calendar("WK", "20241230", "20250309")],
            ..Feed::default()
        };
        for i in 0..routes {
            let route_id = format!("R{i}");
            let holiday = format!("HOL{i}");
            feed.routes.push(RouteRow {
                route_id: route_id.clone(),
                route_short_name: Some(format!("Route {i}")),
            });
            feed.trips.push(TripRow {
                route_id: route_id.clone(),
                service_id: "WK".to_string(),
                trip_id: format!("T{i}a"),
            });
            feed.trips.push(TripRow {
                route_id,
                service_id: holiday.clone(),
                trip_id: format!("T{i}b"),
            });
            feed.calendar.push(calendar(&holiday, "20250127", "20250202"));
        }
        feed
    }

    #[test]
    fn test_no_calendar_is_no_result() {
        let feed = Feed::default();
        let analyzer = Analyzer::default();
        assert!(analyzer.analyze(&feed, &BTreeSet::new()).is_none());
        assert!(analyzer.analyze_two_pass(&feed, &BTreeSet::new(), 10).is_none());
    }

    #[test]
    fn test_single_route_holiday_week() {
        let feed = holiday_feed(1);
        let report = Analyzer::default().analyze(&feed, &BTreeSet::new()).unwrap();

        let record = report.record("R0").unwrap();
        assert_eq!(record.total_weeks, 10);
        assert_eq!(record.cluster_count, 2);
        assert_eq!(record.largest_cluster_pct, 90.0);
        assert_eq!(record.category, Category::HolidayExceptions);
        assert_eq!(record.exceptional_weeks, vec![WeekKey::new(2025, 5)]);
        assert_eq!(report.publishable(), 1);
    }

    #[test]
    fn test_two_pass_below_threshold_has_no_second_pass() {
        let feed = holiday_feed(3);
        let outcome = Analyzer::default()
            .analyze_two_pass(&feed, &BTreeSet::new(), 10)
            .unwrap();

        assert!(outcome.systemic_weeks.is_empty());
        assert!(outcome.second.is_none());
        assert_eq!(outcome.final_report(), &outcome.first);
    }

    #[test]
    fn test_two_pass_removes_systemic_week() {
        let feed = holiday_feed(3);
        let outcome = Analyzer::default()
            .analyze_two_pass(&feed, &BTreeSet::new(), 3)
            .unwrap();

        assert_eq!(outcome.systemic_weeks, BTreeSet::from([WeekKey::new(2025, 5)]));
        let second = outcome.second.as_ref().unwrap();
        for record in &second.records {
            assert_eq!(record.cluster_count, 1);
            assert_eq!(record.total_weeks, 9);
            assert_eq!(record.category, Category::FullyStable);
        }
    }

    #[test]
    fn test_insufficient_weeks_counted_not_classified() {
        let mut feed = holiday_feed(1);
        feed.routes.push(RouteRow {
            route_id: "SHORT".to_string(),
            route_short_name: None,
        });
        feed.trips.push(TripRow {
            route_id: "SHORT".to_string(),
            service_id: "BRIEF".to_string(),
            trip_id: "TS".to_string(),
        });
        feed.calendar.push(calendar("BRIEF", "20250106", "20250119"));

        let analyzer = Analyzer::new(
            SignatureMode::ServicePattern,
            ClassificationPolicy::Coarse(CoarsePolicy::default()),
        );
        let report = analyzer.analyze(&feed, &BTreeSet::new()).unwrap();

        assert_eq!(report.classified(), 1);
        assert_eq!(report.insufficient_data, 1);
        assert!(report.record("SHORT").is_none());
        assert_eq!(report.record("R0").unwrap().category, Category::MostlyStable);
    }
}
