//! Static GTFS feed access.
//!
//! Reads the four tables the stability pipeline consumes (`routes.txt`,
//! `trips.txt`, `calendar.txt`, `stop_times.txt`) from a directory or a zip
//! archive, and resolves each trip against its service calendar.

use crate::analyzers::types::{Trip, WeekdayPattern};
use crate::error::FeedError;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;
use zip::result::ZipError;

const ROUTES: &str = "routes.txt";
const TRIPS: &str = "trips.txt";
const CALENDAR: &str = "calendar.txt";
const STOP_TIMES: &str = "stop_times.txt";

/// GTFS dates are always `YYYYMMDD`.
pub const GTFS_DATE_FORMAT: &str = "%Y%m%d";

/// A row of `routes.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRow {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: Option<String>,
}

/// A row of `trips.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct TripRow {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
}

/// A row of `calendar.txt`. Dates stay raw so a malformed one only skips
/// the trips that reference it.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarRow {
    pub service_id: String,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub monday: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub tuesday: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub wednesday: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub thursday: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub friday: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub saturday: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub sunday: bool,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

impl CalendarRow {
    pub fn weekdays(&self) -> WeekdayPattern {
        WeekdayPattern::from_bools([
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
            self.sunday,
        ])
    }
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
}

/// Blank or non-numeric weekday cells read as "not running".
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.trim().parse::<u8>().ok())
        .is_some_and(|v| v != 0))
}

/// Somewhere the raw GTFS tables can be read from.
pub trait TableSource {
    /// Returns the bytes of `name`, or `None` when the table is absent.
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, FeedError>;
}

/// An unpacked feed on disk.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TableSource for DirSource {
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, FeedError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }
}

/// A zipped feed. Tables nested one directory deep are found as well.
pub struct ZipSource<R> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self, FeedError> {
        Ok(Self {
            archive: ZipArchive::new(reader)?,
        })
    }
}

impl<R: Read + Seek> TableSource for ZipSource<R> {
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, FeedError> {
        let suffix = format!("/{name}");
        let entry_name = self
            .archive
            .file_names()
            .find(|n| *n == name || n.ends_with(&suffix))
            .map(str::to_string);

        let Some(entry_name) = entry_name else {
            return Ok(None);
        };

        let mut file = match self.archive.by_name(&entry_name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}

fn read_rows<T: DeserializeOwned>(bytes: &[u8], table: &'static str) -> Result<Vec<T>, FeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(|source| FeedError::Csv { table, source })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Trips resolved against the calendar, plus how many could not be.
#[derive(Debug, Default)]
pub struct ResolvedTrips {
    pub trips: Vec<Trip>,
    pub skipped: usize,
}

/// The tables of one static feed.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub routes: Vec<RouteRow>,
    pub trips: Vec<TripRow>,
    pub calendar: Vec<CalendarRow>,
    /// Number of `stop_times.txt` rows per trip.
    pub departure_counts: HashMap<String, u32>,
}

impl Feed {
    /// Opens a feed from a directory or a zip file on disk.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, FeedError> {
        if path.is_dir() {
            Self::from_source(DirSource::new(path))
        } else {
            Self::from_zip_bytes(std::fs::read(path)?)
        }
    }

    pub fn from_zip_bytes(bytes: Vec<u8>) -> Result<Self, FeedError> {
        Self::from_source(ZipSource::new(Cursor::new(bytes))?)
    }

    pub fn from_source<S: TableSource>(mut source: S) -> Result<Self, FeedError> {
        let routes_bytes = source
            .read_table(ROUTES)?
            .ok_or(FeedError::MissingTable(ROUTES))?;
        let trips_bytes = source
            .read_table(TRIPS)?
            .ok_or(FeedError::MissingTable(TRIPS))?;

        let routes: Vec<RouteRow> = read_rows(&routes_bytes, ROUTES)?;
        let trips: Vec<TripRow> = read_rows(&trips_bytes, TRIPS)?;

        let calendar: Vec<CalendarRow> = match source.read_table(CALENDAR)? {
            Some(bytes) => read_rows(&bytes, CALENDAR)?,
            None => Vec::new(),
        };

        let mut departure_counts: HashMap<String, u32> = HashMap::new();
        if let Some(bytes) = source.read_table(STOP_TIMES)? {
            for row in read_rows::<StopTimeRow>(&bytes, STOP_TIMES)? {
                *departure_counts.entry(row.trip_id).or_insert(0) += 1;
            }
        }

        info!(
            routes = routes.len(),
            trips = trips.len(),
            services = calendar.len(),
            "Feed loaded"
        );

        Ok(Self {
            routes,
            trips,
            calendar,
            departure_counts,
        })
    }

    pub fn has_calendar(&self) -> bool {
        !self.calendar.is_empty()
    }

    /// Display name per route; the short name, or the id when that is blank.
    pub fn route_names(&self) -> HashMap<String, String> {
        self.routes
            .iter()
            .map(|r| {
                let name = r
                    .route_short_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(&r.route_id);
                (r.route_id.clone(), name.to_string())
            })
            .collect()
    }

    /// Earliest start and latest end date over the parseable calendar rows.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let starts = self
            .calendar
            .iter()
            .filter_map(|c| NaiveDate::parse_from_str(&c.start_date, GTFS_DATE_FORMAT).ok());
        let ends = self
            .calendar
            .iter()
            .filter_map(|c| NaiveDate::parse_from_str(&c.end_date, GTFS_DATE_FORMAT).ok());
        Some((starts.min()?, ends.max()?))
    }

    /// Joins every trip with its service calendar.
    ///
    /// Trips whose service has no calendar row, or whose dates do not parse
    /// or run backwards, are skipped and counted rather than failing the run.
    pub fn resolve_trips(&self) -> ResolvedTrips {
        let services: HashMap<&str, &CalendarRow> = self
            .calendar
            .iter()
            .map(|c| (c.service_id.as_str(), c))
            .collect();

        let mut resolved = ResolvedTrips::default();

        for row in &self.trips {
            let Some(cal) = services.get(row.service_id.as_str()) else {
                debug!(trip_id = %row.trip_id, service_id = %row.service_id, "No calendar row for trip");
                resolved.skipped += 1;
                continue;
            };

            let dates = (
                NaiveDate::parse_from_str(&cal.start_date, GTFS_DATE_FORMAT),
                NaiveDate::parse_from_str(&cal.end_date, GTFS_DATE_FORMAT),
            );
            let (start_date, end_date) = match dates {
                (Ok(start), Ok(end)) if start <= end => (start, end),
                _ => {
                    debug!(
                        trip_id = %row.trip_id,
                        start_date = %cal.start_date,
                        end_date = %cal.end_date,
                        "Unusable service dates, skipping trip"
                    );
                    resolved.skipped += 1;
                    continue;
                }
            };

            resolved.trips.push(Trip {
                trip_id: row.trip_id.clone(),
                route_id: row.route_id.clone(),
                service_id: row.service_id.clone(),
                weekdays: cal.weekdays(),
                start_date,
                end_date,
                departures: self.departure_counts.get(&row.trip_id).copied().unwrap_or(1),
            });
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::io::Write;

    const ROUTES_TXT: &str = "route_id,route_short_name,route_type\nR1,Edinburgh - Glasgow,2\nR2,,2\n";
    const TRIPS_TXT: &str = "route_id,service_id,trip_id\nR1,WK,T1\nR1,SAT,T2\nR2,WK,T3\nR2,NOPE,T4\n";
    const CALENDAR_TXT: &str = "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
WK,1,1,1,1,1,0,0,20250106,20250309\n\
SAT,0,0,0,0,0,1,,2025-01-11,20250308\n";
    const STOP_TIMES_TXT: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
T1,08:00:00,08:00:00,A,1\nT1,08:50:00,08:51:00,B,2\nT1,09:30:00,09:30:00,C,3\nT3,10:00:00,10:00:00,A,1\n";

    fn temp_feed_dir(name: &str, with_calendar: bool) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(ROUTES), ROUTES_TXT).unwrap();
        fs::write(dir.join(TRIPS), TRIPS_TXT).unwrap();
        fs::write(dir.join(STOP_TIMES), STOP_TIMES_TXT).unwrap();
        if with_calendar {
            fs::write(dir.join(CALENDAR), CALENDAR_TXT).unwrap();
        }
        dir
    }

    #[test]
    fn test_open_directory() {
        let dir = temp_feed_dir("timetable_stability_feed_dir", true);
        let feed = Feed::open(&dir).unwrap();

        assert_eq!(feed.routes.len(), 2);
        assert_eq!(feed.trips.len(), 4);
        assert_eq!(feed.calendar.len(), 2);
        assert_eq!(feed.departure_counts.get("T1"), Some(&3));
        assert!(feed.has_calendar());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_route_name_falls_back_to_id() {
        let dir = temp_feed_dir("timetable_stability_feed_names", true);
        let feed = Feed::open(&dir).unwrap();
        let names = feed.route_names();

        assert_eq!(names["R1"], "Edinburgh - Glasgow");
        assert_eq!(names["R2"], "R2");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resolve_skips_bad_dates_and_unknown_services() {
        let dir = temp_feed_dir("timetable_stability_feed_resolve", true);
        let feed = Feed::open(&dir).unwrap();
        let resolved = feed.resolve_trips();

        // T2 has a malformed start date, T4 references an unknown service
        assert_eq!(resolved.skipped, 2);
        let ids: Vec<_> = resolved.trips.iter().map(|t| t.trip_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T3"]);

        let t1 = &resolved.trips[0];
        assert_eq!(t1.departures, 3);
        assert_eq!(t1.weekdays.to_string(), "Mon, Tue, Wed, Thu, Fri");
        // Missing stop times default to one departure
        let t3 = &resolved.trips[1];
        assert_eq!(t3.departures, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_calendar_is_empty_not_error() {
        let dir = temp_feed_dir("timetable_stability_feed_nocal", false);
        let feed = Feed::open(&dir).unwrap();

        assert!(!feed.has_calendar());
        assert!(feed.date_range().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_trips_is_error() {
        let dir = env::temp_dir().join("timetable_stability_feed_notrips");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(ROUTES), ROUTES_TXT).unwrap();

        let err = Feed::open(&dir).unwrap_err();
        assert!(matches!(err, FeedError::MissingTable("trips.txt")));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_zip_with_nested_directory() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for (name, body) in [
                (ROUTES, ROUTES_TXT),
                (TRIPS, TRIPS_TXT),
                (CALENDAR, CALENDAR_TXT),
            ] {
                zip.start_file(format!("gtfs/{name}"), options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }

        let feed = Feed::from_zip_bytes(buf.into_inner()).unwrap();
        assert_eq!(feed.routes.len(), 2);
        assert_eq!(feed.calendar.len(), 2);
        assert!(feed.departure_counts.is_empty());
    }

    #[test]
    fn test_date_range() {
        let dir = temp_feed_dir("timetable_stability_feed_range", true);
        let feed = Feed::open(&dir).unwrap();

        let (start, end) = feed.date_range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());

        fs::remove_dir_all(&dir).unwrap();
    }
}
