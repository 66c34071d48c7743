//! Folds trips into per-route, per-week records and reduces each week to a
//! [`Signature`].

use crate::analyzers::types::{Signature, SignatureMode, Trip, WeekKey, WeekRecord};
use crate::analyzers::weeks::expand_weeks;
use std::collections::{BTreeMap, BTreeSet, HashMap};

impl WeekRecord {
    /// Adds one trip's contribution. Commutative and associative over trips.
    pub fn absorb(&mut self, trip: &Trip) {
        self.service_ids.insert(trip.service_id.clone());
        self.patterns.insert(trip.weekdays);
        self.departures += u64::from(trip.departures);
        self.trips += 1;
    }

    pub fn signature(&self, mode: SignatureMode) -> Signature {
        let volume_bucket = match mode {
            SignatureMode::ServicePattern => None,
            SignatureMode::WithVolume { granularity } => {
                Some(volume_bucket(self.departures, granularity))
            }
        };
        Signature {
            patterns: self.patterns.clone(),
            service_ids: self.service_ids.clone(),
            volume_bucket,
        }
    }
}

/// Rounds `departures` to the nearest multiple of `granularity`, halves up.
pub fn volume_bucket(departures: u64, granularity: u64) -> u64 {
    if granularity == 0 {
        return departures;
    }
    (departures + granularity / 2) / granularity * granularity
}

/// All weeks observed for one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteWeeks {
    pub route_name: String,
    pub weeks: BTreeMap<WeekKey, WeekRecord>,
}

impl RouteWeeks {
    pub fn new(route_name: &str) -> Self {
        Self {
            route_name: route_name.to_string(),
            weeks: BTreeMap::new(),
        }
    }

    pub fn signatures(&self, mode: SignatureMode) -> BTreeMap<WeekKey, Signature> {
        self.weeks
            .iter()
            .map(|(week, record)| (*week, record.signature(mode)))
            .collect()
    }
}

/// Route id → week → record. Written once while folding trips, read-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct WeekTable {
    routes: BTreeMap<String, RouteWeeks>,
}

impl WeekTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands every trip and folds it into its route's weeks.
    ///
    /// Routes missing from `route_names` are named by their id.
    pub fn build(
        trips: &[Trip],
        route_names: &HashMap<String, String>,
        excluded: &BTreeSet<WeekKey>,
    ) -> Self {
        let mut table = Self::new();
        for trip in trips {
            let weeks = expand_weeks(trip.start_date, trip.end_date, excluded);
            let name = route_names
                .get(&trip.route_id)
                .map(String::as_str)
                .unwrap_or(&trip.route_id);
            table.fold_trip(trip, name, &weeks);
        }
        table
    }

    /// Folds `trip` into each of `weeks`, creating the route and week
    /// entries the first time they are touched.
    pub fn fold_trip(&mut self, trip: &Trip, route_name: &str, weeks: &[WeekKey]) {
        if weeks.is_empty() {
            return;
        }

        let route = self
            .routes
            .entry(trip.route_id.clone())
            .or_insert_with(|| RouteWeeks::new(route_name));

        for week in weeks {
            route.weeks.entry(*week).or_default().absorb(trip);
        }
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteWeeks> {
        self.routes.get(route_id)
    }

    /// Routes in id order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &RouteWeeks)> {
        self.routes.iter().map(|(id, weeks)| (id.as_str(), weeks))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
