//! Deep dive into one route: every distinct weekly timetable it runs and
//! when.

use crate::analyzers::cluster::{ClusterSet, Contiguity, TemporalShape};
use crate::analyzers::signature::WeekTable;
use crate::analyzers::types::{SignatureMode, WeekKey, WeekdayPattern};
use crate::feed::Feed;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// Routes with at most this many patterns can publish each with its dates.
pub const PUBLISHABLE_PATTERN_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteMatch {
    pub route_id: String,
    pub route_name: String,
}

/// One cluster of the route, largest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternDetail {
    pub weeks: Vec<WeekKey>,
    pub holiday_weeks: Vec<WeekKey>,
    pub patterns: BTreeSet<WeekdayPattern>,
    pub service_ids: BTreeSet<String>,
    /// Departures and distinct trips in the pattern's first week.
    pub departures: u64,
    pub trips: usize,
    #[serde(skip)]
    pub contiguity: Contiguity,
}

impl PatternDetail {
    pub fn shape(&self) -> TemporalShape {
        self.contiguity.shape()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDetail {
    pub route_id: String,
    pub route_name: String,
    /// Every route whose name matched, the analysed one first.
    pub matches: Vec<RouteMatch>,
    /// Trips defined for the route, resolvable or not.
    pub trips_defined: usize,
    pub total_weeks: usize,
    pub non_holiday_weeks: usize,
    pub patterns: Vec<PatternDetail>,
}

impl RouteDetail {
    pub fn is_publishable(&self) -> bool {
        self.patterns.len() <= PUBLISHABLE_PATTERN_LIMIT
    }
}

/// Routes whose short name contains `pattern`, ignoring case, in table order.
pub fn matching_routes(feed: &Feed, pattern: &str) -> Vec<RouteMatch> {
    let needle = pattern.to_lowercase();
    feed.routes
        .iter()
        .filter(|r| {
            r.route_short_name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
        })
        .map(|r| RouteMatch {
            route_id: r.route_id.clone(),
            route_name: r.route_short_name.clone().unwrap_or_default(),
        })
        .collect()
}

/// Breaks down the first route matching `pattern`. `None` when no route
/// matches.
#[tracing::instrument(skip(feed, holiday_weeks))]
pub fn route_detail(
    feed: &Feed,
    pattern: &str,
    mode: SignatureMode,
    holiday_weeks: &BTreeSet<WeekKey>,
) -> Option<RouteDetail> {
    let matches = matching_routes(feed, pattern);
    let target = matches.first()?.clone();
    info!(route_id = %target.route_id, matches = matches.len(), "Analysing route");

    let trips_defined = feed
        .trips
        .iter()
        .filter(|t| t.route_id == target.route_id)
        .count();

    let mut resolved = feed.resolve_trips();
    resolved.trips.retain(|t| t.route_id == target.route_id);
    let table = WeekTable::build(&resolved.trips, &feed.route_names(), &BTreeSet::new());

    let Some(route) = table.route(&target.route_id) else {
        return Some(RouteDetail {
            route_id: target.route_id,
            route_name: target.route_name,
            matches,
            trips_defined,
            total_weeks: 0,
            non_holiday_weeks: 0,
            patterns: Vec::new(),
        });
    };

    let set = ClusterSet::from_signatures(&route.signatures(mode));
    let patterns = set
        .clusters()
        .iter()
        .map(|cluster| {
            let first_week = cluster
                .first()
                .and_then(|w| route.weeks.get(&w))
                .cloned()
                .unwrap_or_default();
            PatternDetail {
                weeks: cluster.weeks.clone(),
                holiday_weeks: cluster
                    .weeks
                    .iter()
                    .filter(|w| holiday_weeks.contains(*w))
                    .copied()
                    .collect(),
                patterns: cluster.signature.patterns.clone(),
                service_ids: cluster.signature.service_ids.clone(),
                departures: first_week.departures,
                trips: first_week.trips,
                contiguity: cluster.contiguity(),
            }
        })
        .collect();

    let non_holiday_weeks = route
        .weeks
        .keys()
        .filter(|w| !holiday_weeks.contains(*w))
        .count();

    Some(RouteDetail {
        route_id: target.route_id,
        route_name: target.route_name,
        matches,
        trips_defined,
        total_weeks: route.weeks.len(),
        non_holiday_weeks,
        patterns,
    })
}
