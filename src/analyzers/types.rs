//! Data types shared by the stability pipeline.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Which days of the week a service runs, Monday first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekdayPattern([bool; 7]);

impl WeekdayPattern {
    pub const DAY_NAMES: [&'static str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    pub fn from_bools(days: [bool; 7]) -> Self {
        Self(days)
    }

    pub fn runs_on(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|d| *d)
    }

    /// GTFS-style `0`/`1` flags, e.g. `1111100`.
    pub fn flags(&self) -> String {
        self.0.iter().map(|d| if *d { '1' } else { '0' }).collect()
    }
}

impl fmt::Display for WeekdayPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("No service");
        }
        let days: Vec<&str> = Self::DAY_NAMES
            .iter()
            .zip(self.0)
            .filter_map(|(name, active)| active.then_some(*name))
            .collect();
        f.write_str(&days.join(", "))
    }
}

impl Serialize for WeekdayPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.flags())
    }
}

/// An ISO 8601 week, `"{year}-W{week:02}"`. Ordering is chronological.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekKey {
    year: i32,
    week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// The ISO week `date` falls in.
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// `year * 100 + week`, the comparable form used for gap arithmetic.
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.week)
    }

    /// Monday of this week, if the week exists in its ISO year.
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, week) = s
            .trim()
            .split_once("-W")
            .ok_or_else(|| anyhow::anyhow!("week key '{s}' is not of the form YYYY-Www"))?;
        let year: i32 = year.parse()?;
        let week: u32 = week.parse()?;
        if !(1..=53).contains(&week) {
            anyhow::bail!("week number {week} out of range in '{s}'");
        }
        Ok(Self { year, week })
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A trip joined with its service calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub weekdays: WeekdayPattern,
    /// Inclusive validity interval.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Stop-time rows for the trip, 1 when unknown.
    pub departures: u32,
}

/// Everything folded into one (route, week).
///
/// Weekday patterns are kept as a set: when a route's trips disagree on which
/// days they run, every pattern becomes part of the week's signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekRecord {
    pub service_ids: BTreeSet<String>,
    pub patterns: BTreeSet<WeekdayPattern>,
    pub departures: u64,
    pub trips: usize,
}

/// How much of a week goes into its signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SignatureMode {
    /// Weekday patterns and active service ids.
    #[default]
    ServicePattern,
    /// As above plus total departures rounded to `granularity`.
    WithVolume { granularity: u64 },
}

impl fmt::Display for SignatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServicePattern => f.write_str("weekday pattern + service ids"),
            Self::WithVolume { granularity } => write!(
                f,
                "weekday pattern + service ids + departures (nearest {granularity})"
            ),
        }
    }
}

/// Canonical summary of a route-week. Equal signatures mean the weeks run
/// the same timetable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Signature {
    pub patterns: BTreeSet<WeekdayPattern>,
    pub service_ids: BTreeSet<String>,
    pub volume_bucket: Option<u64>,
}

/// Weeks of one route sharing a signature, in chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub signature: Signature,
    pub weeks: Vec<WeekKey>,
}

/// Which decision table produced a label.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Five categories driven by cluster count, share and contiguity
    #[default]
    Rigorous,
    /// Four buckets on the dominant share alone
    Coarse,
    /// Three buckets on dominant share and the number of exceptional patterns
    TypicalWeek,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rigorous => "rigorous",
            Self::Coarse => "coarse",
            Self::TypicalWeek => "typical-week",
        }
    }

    /// Categories this policy can assign, in report order.
    pub fn categories(&self) -> &'static [Category] {
        use Category::*;
        match self {
            Self::Rigorous => &[
                FullyStable,
                TimetableChangeover,
                HolidayExceptions,
                MultipleStablePeriods,
                Chaotic,
            ],
            Self::Coarse => &[FullyStable, MostlyStable, SomeVariation, HighVariation],
            Self::TypicalWeek => &[FullyStable, StableWithExceptions, MultiplePatterns],
        }
    }

    /// Categories that count towards the publishable share.
    pub fn publishable(&self) -> &'static [Category] {
        use Category::*;
        match self {
            Self::Rigorous => &[FullyStable, TimetableChangeover, HolidayExceptions],
            Self::Coarse => &[FullyStable, MostlyStable],
            Self::TypicalWeek => &[FullyStable, StableWithExceptions],
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as clap::ValueEnum>::from_str(s.trim(), true)
            .map_err(|e| anyhow::anyhow!("unknown policy '{s}': {e}"))
    }
}

/// Stability label assigned to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FullyStable,
    TimetableChangeover,
    HolidayExceptions,
    MultipleStablePeriods,
    Chaotic,
    MostlyStable,
    SomeVariation,
    HighVariation,
    StableWithExceptions,
    MultiplePatterns,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyStable => "fully_stable",
            Self::TimetableChangeover => "timetable_changeover",
            Self::HolidayExceptions => "holiday_exceptions",
            Self::MultipleStablePeriods => "multiple_stable_periods",
            Self::Chaotic => "chaotic",
            Self::MostlyStable => "mostly_stable",
            Self::SomeVariation => "some_variation",
            Self::HighVariation => "high_variation",
            Self::StableWithExceptions => "stable_with_exceptions",
            Self::MultiplePatterns => "multiple_patterns",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FullyStable => "Fully stable (1 pattern)",
            Self::TimetableChangeover => "Timetable changeover (2 periods)",
            Self::HolidayExceptions => "Holiday exceptions only",
            Self::MultipleStablePeriods => "Multiple stable periods",
            Self::Chaotic => "Chaotic variation",
            Self::MostlyStable => "Mostly stable",
            Self::SomeVariation => "Some variation",
            Self::HighVariation => "High variation",
            Self::StableWithExceptions => "Stable with exceptions",
            Self::MultiplePatterns => "Multiple patterns",
        }
    }

    /// How routes in this category should be published.
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::FullyStable => "Publish a single timetable, valid all year",
            Self::TimetableChangeover => "Publish two versions with their date ranges",
            Self::HolidayExceptions | Self::MostlyStable | Self::StableWithExceptions => {
                "Publish the typical week with a disclaimer listing the exception weeks"
            }
            Self::MultipleStablePeriods | Self::SomeVariation => {
                "Review individually; may need two or three versions"
            }
            Self::Chaotic | Self::HighVariation | Self::MultiplePatterns => {
                "Not publishable as a static timetable; needs date-specific queries"
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First and last week of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpan {
    pub first: WeekKey,
    pub last: WeekKey,
    pub weeks: usize,
    pub contiguous: bool,
}

/// Classification of one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityRecord {
    pub route_id: String,
    pub route_name: String,
    pub policy: PolicyKind,
    pub category: Category,
    pub total_weeks: usize,
    pub cluster_count: usize,
    pub largest_cluster_size: usize,
    pub largest_cluster_pct: f64,
    pub second_cluster_size: usize,
    pub second_cluster_pct: f64,
    pub top_two_coverage_pct: f64,
    pub largest_contiguous: bool,
    pub second_contiguous: bool,
    pub typical_weeks: Vec<WeekKey>,
    /// Weeks outside the dominant cluster, chronological.
    pub exceptional_weeks: Vec<WeekKey>,
    /// One span per cluster, largest first.
    pub clusters: Vec<ClusterSpan>,
}

impl StabilityRecord {
    pub fn is_publishable(&self) -> bool {
        self.policy.publishable().contains(&self.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_key_format() {
        assert_eq!(WeekKey::new(2025, 5).to_string(), "2025-W05");
        assert_eq!(WeekKey::new(2026, 52).to_string(), "2026-W52");
    }

    #[test]
    fn test_week_key_parse() {
        let key: WeekKey = "2025-W09".parse().unwrap();
        assert_eq!(key, WeekKey::new(2025, 9));
        assert!("2025-09".parse::<WeekKey>().is_err());
        assert!("2025-W54".parse::<WeekKey>().is_err());
        assert!("abcd-W01".parse::<WeekKey>().is_err());
    }

    #[test]
    fn test_week_key_from_date_crosses_year() {
        // 2024-12-30 is the Monday of ISO week 2025-W01
        let d = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(WeekKey::from_date(d), WeekKey::new(2025, 1));
        // 2027-01-01 still belongs to 2026-W53
        let d = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(WeekKey::from_date(d), WeekKey::new(2026, 53));
    }

    #[test]
    fn test_week_key_ordering_and_ordinal() {
        let a = WeekKey::new(2025, 52);
        let b = WeekKey::new(2026, 1);
        assert!(a < b);
        assert_eq!(b.ordinal() - a.ordinal(), 49);
        assert_eq!(a.monday(), NaiveDate::from_ymd_opt(2025, 12, 22));
    }

    #[test]
    fn test_week_key_serde() {
        let json = serde_json::to_string(&WeekKey::new(2025, 3)).unwrap();
        assert_eq!(json, "\"2025-W03\"");
        let back: WeekKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WeekKey::new(2025, 3));
    }

    #[test]
    fn test_weekday_pattern_display() {
        let weekdays = WeekdayPattern::from_bools([true, true, true, true, true, false, false]);
        assert_eq!(weekdays.to_string(), "Mon, Tue, Wed, Thu, Fri");
        assert_eq!(weekdays.flags(), "1111100");
        assert!(weekdays.runs_on(Weekday::Fri));
        assert!(!weekdays.runs_on(Weekday::Sun));
        assert_eq!(WeekdayPattern::default().to_string(), "No service");
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("typical-week".parse::<PolicyKind>().unwrap(), PolicyKind::TypicalWeek);
        assert_eq!("Coarse".parse::<PolicyKind>().unwrap(), PolicyKind::Coarse);
        assert!("fine".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_publishable_sets_are_subsets_of_categories() {
        for policy in [PolicyKind::Rigorous, PolicyKind::Coarse, PolicyKind::TypicalWeek] {
            for c in policy.publishable() {
                assert!(policy.categories().contains(c));
            }
            assert!(policy.publishable().contains(&Category::FullyStable));
        }
    }
}
