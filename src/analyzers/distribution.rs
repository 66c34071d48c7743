//! How routes spread over their distinct weekly timetables.
//!
//! Groups routes by how many signatures they run and, within each group, by
//! how strongly the dominant one covers the weeks.

use crate::analyzers::cluster::ClusterSet;
use crate::analyzers::signature::WeekTable;
use crate::analyzers::types::SignatureMode;
use crate::analyzers::utility::{mean, min_max, pct};
use serde::Serialize;
use std::collections::BTreeMap;

/// Routes with fewer weeks carry no distribution.
pub const MIN_WEEKS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDistribution {
    pub route_id: String,
    pub route_name: String,
    pub total_weeks: usize,
    /// Weeks per signature, largest first.
    pub week_counts: Vec<usize>,
    pub dominant_pct: f64,
}

/// Routes sharing a schedule count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleGroup {
    pub schedules: usize,
    pub routes: Vec<RouteDistribution>,
    pub avg_dominant_pct: f64,
    pub min_dominant_pct: f64,
    pub max_dominant_pct: f64,
    /// Dominant schedule covers at least 60% of weeks.
    pub clear_dominant: usize,
    /// 40% to 60%.
    pub somewhat_dominant: usize,
    /// Below 40%.
    pub balanced: usize,
}

/// Split of the two-schedule routes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TwoScheduleSplit {
    /// At least 80%, e.g. 20 weeks against 2.
    pub highly_dominant: Vec<RouteDistribution>,
    /// 60% to 80%.
    pub moderately_dominant: Vec<RouteDistribution>,
    /// Below 60%.
    pub near_even: Vec<RouteDistribution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    /// Most multi-schedule routes have a clear dominant schedule.
    DominantWithExceptions,
    Mixed,
    Complex,
}

impl Finding {
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::DominantWithExceptions => "Publish the dominant schedule with a note about exceptions",
            Self::Mixed => "About half have a dominant schedule; consider segmenting by route importance",
            Self::Complex => "Many routes lack a dominant schedule; may need multiple versions or date-specific queries",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub groups: Vec<ScheduleGroup>,
    pub two_schedule: TwoScheduleSplit,
    pub multi_schedule_routes: usize,
    pub multi_schedule_clear_dominant: usize,
    /// `None` when every route runs a single schedule.
    pub finding: Option<Finding>,
}

impl Distribution {
    pub fn route_count(&self) -> usize {
        self.groups.iter().map(|g| g.routes.len()).sum()
    }
}

fn finding_for(clear_dominant_pct: f64) -> Finding {
    match clear_dominant_pct {
        p if p >= 70.0 => Finding::DominantWithExceptions,
        p if p >= 50.0 => Finding::Mixed,
        _ => Finding::Complex,
    }
}

fn group(schedules: usize, routes: Vec<RouteDistribution>) -> ScheduleGroup {
    let shares: Vec<f64> = routes.iter().map(|r| r.dominant_pct).collect();
    let (min_dominant_pct, max_dominant_pct) = min_max(&shares).unwrap_or((0.0, 0.0));
    ScheduleGroup {
        schedules,
        avg_dominant_pct: mean(&shares),
        min_dominant_pct,
        max_dominant_pct,
        clear_dominant: shares.iter().filter(|p| **p >= 60.0).count(),
        somewhat_dominant: shares.iter().filter(|p| (40.0..60.0).contains(*p)).count(),
        balanced: shares.iter().filter(|p| **p < 40.0).count(),
        routes,
    }
}

/// Computes the distribution over every route in `table` with enough weeks.
pub fn schedule_distribution(table: &WeekTable, mode: SignatureMode) -> Distribution {
    let mut by_count: BTreeMap<usize, Vec<RouteDistribution>> = BTreeMap::new();

    for (route_id, route) in table.routes() {
        if route.weeks.len() < MIN_WEEKS {
            continue;
        }
        let set = ClusterSet::from_signatures(&route.signatures(mode));
        by_count.entry(set.len()).or_default().push(RouteDistribution {
            route_id: route_id.to_string(),
            route_name: route.route_name.clone(),
            total_weeks: set.total_weeks(),
            week_counts: set.clusters().iter().map(|c| c.len()).collect(),
            dominant_pct: set.dominant_pct(),
        });
    }

    let mut two_schedule = TwoScheduleSplit::default();
    for route in by_count.get(&2).into_iter().flatten() {
        let bucket = match route.dominant_pct {
            p if p >= 80.0 => &mut two_schedule.highly_dominant,
            p if p >= 60.0 => &mut two_schedule.moderately_dominant,
            _ => &mut two_schedule.near_even,
        };
        bucket.push(route.clone());
    }

    let multi: Vec<&RouteDistribution> = by_count
        .range(2..)
        .flat_map(|(_, routes)| routes.iter())
        .collect();
    let multi_schedule_clear_dominant = multi.iter().filter(|r| r.dominant_pct >= 60.0).count();
    let finding = (!multi.is_empty())
        .then(|| finding_for(pct(multi_schedule_clear_dominant, multi.len())));
    let multi_schedule_routes = multi.len();

    Distribution {
        groups: by_count
            .into_iter()
            .map(|(schedules, routes)| group(schedules, routes))
            .collect(),
        two_schedule,
        multi_schedule_routes,
        multi_schedule_clear_dominant,
        finding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::{Trip, WeekKey, WeekdayPattern};

    /// One route whose weeks run `services[i]` in week i+1 of 2025.
    fn add_route(table: &mut WeekTable, route_id: &str, services: &[&str]) {
        for (i, service) in services.iter().enumerate() {
            let week = WeekKey::new(2025, i as u32 + 1);
            let monday = week.monday().unwrap();
            let trip = Trip {
                trip_id: format!("{route_id}-{i}"),
                route_id: route_id.to_string(),
                service_id: service.to_string(),
                weekdays: WeekdayPattern::from_bools([true; 7]),
                start_date: monday,
                end_date: monday,
                departures: 1,
            };
            table.fold_trip(&trip, route_id, &[week]);
        }
    }

    fn sample_table() -> WeekTable {
        let mut table = WeekTable::new();
        add_route(&mut table, "STEADY", &["A"; 6]);
        add_route(&mut table, "HOLIDAY", &["A", "A", "A", "A", "B"]);
        add_route(&mut table, "EVEN", &["A", "A", "B", "B"]);
        add_route(&mut table, "THREE", &["A", "A", "A", "B", "C"]);
        add_route(&mut table, "SHORT", &["A"]);
        table
    }

    #[test]
    fn test_groups_by_schedule_count() {
        let dist = schedule_distribution(&sample_table(), SignatureMode::ServicePattern);

        let counts: Vec<_> = dist.groups.iter().map(|g| (g.schedules, g.routes.len())).collect();
        assert_eq!(counts, vec![(1, 1), (2, 2), (3, 1)]);
        assert_eq!(dist.route_count(), 4);

        let two = &dist.groups[1];
        assert_eq!(two.max_dominant_pct, 80.0);
        assert_eq!(two.min_dominant_pct, 50.0);
        assert_eq!(two.avg_dominant_pct, 65.0);
        assert_eq!(two.clear_dominant, 1);
        assert_eq!(two.somewhat_dominant, 1);
        assert_eq!(two.balanced, 0);
    }

    #[test]
    fn test_two_schedule_split() {
        let dist = schedule_distribution(&sample_table(), SignatureMode::ServicePattern);

        assert_eq!(dist.two_schedule.highly_dominant.len(), 1);
        assert_eq!(dist.two_schedule.highly_dominant[0].route_id, "HOLIDAY");
        assert_eq!(dist.two_schedule.highly_dominant[0].week_counts, vec![4, 1]);
        assert!(dist.two_schedule.moderately_dominant.is_empty());
        assert_eq!(dist.two_schedule.near_even[0].route_id, "EVEN");
    }

    #[test]
    fn test_finding() {
        let dist = schedule_distribution(&sample_table(), SignatureMode::ServicePattern);

        // HOLIDAY 80% and THREE 60% are clear, EVEN 50% is not: 2 of 3
        assert_eq!(dist.multi_schedule_routes, 3);
        assert_eq!(dist.multi_schedule_clear_dominant, 2);
        assert_eq!(dist.finding, Some(Finding::Mixed));

        assert_eq!(finding_for(70.0), Finding::DominantWithExceptions);
        assert_eq!(finding_for(50.0), Finding::Mixed);
        assert_eq!(finding_for(49.9), Finding::Complex);
    }

    #[test]
    fn test_single_schedule_only_has_no_finding() {
        let mut table = WeekTable::new();
        add_route(&mut table, "STEADY", &["A"; 4]);
        let dist = schedule_distribution(&table, SignatureMode::ServicePattern);
        assert_eq!(dist.finding, None);
    }
}
