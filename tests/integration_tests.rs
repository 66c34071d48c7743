use std::collections::BTreeSet;
use std::path::Path;
use timetable_stability::analyzers::analyzer::Analyzer;
use timetable_stability::analyzers::cluster::ClusterSet;
use timetable_stability::analyzers::detail::route_detail;
use timetable_stability::analyzers::distribution::{Finding, schedule_distribution};
use timetable_stability::analyzers::grade::{
    ClassificationPolicy, CoarsePolicy, RigorousPolicy, TypicalWeekPolicy,
};
use timetable_stability::analyzers::signature::WeekTable;
use timetable_stability::analyzers::types::{Category, SignatureMode, WeekKey};
use timetable_stability::feed::{CalendarRow, Feed, RouteRow, TripRow};
use timetable_stability::holidays::{holiday_weeks, parse_ics};
use timetable_stability::output::render_report;

const FIXTURE: &str = "tests/fixtures/scotrail_sample";

fn fixture() -> Feed {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(FIXTURE);
    Feed::open(&path).expect("Failed to open fixture feed")
}

fn analyzer(policy: ClassificationPolicy) -> Analyzer {
    Analyzer::new(SignatureMode::ServicePattern, policy)
}

fn rigorous() -> Analyzer {
    analyzer(ClassificationPolicy::Rigorous(RigorousPolicy::default()))
}

fn weekday_calendar(service: &str, start: &str, end: &str) -> CalendarRow {
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

/// `routes` routes sharing a weekday service over 2025-W01..W10, each with
/// its own reduced service in W05.
fn shared_holiday_feed(routes: usize) -> Feed {
    let mut feed = Feed {
        calendar: vec![weekday_calendar("WEEKDAY", "20241230", "20250309")],
        ..Feed::default()
    };
    for i in 0..routes {
        let route_id = format!("R{i:02}");
        feed.routes.push(RouteRow {
            route_id: route_id.clone(),
            route_short_name: Some(format!("Line {i}")),
        });
        feed.trips.push(TripRow {
            route_id: route_id.clone(),
            service_id: "WEEKDAY".to_string(),
            trip_id: format!("{route_id}-a"),
        });
        let holiday = format!("HOLIDAY-{i}");
        feed.trips.push(TripRow {
            route_id,
            service_id: holiday.clone(),
            trip_id: format!("R{i:02}-b"),
        });
        feed.calendar
            .push(weekday_calendar(&holiday, "20250127", "20250202"));
    }
    feed
}

#[test]
fn test_fixture_rigorous() {
    let feed = fixture();
    let report = rigorous().analyze(&feed, &BTreeSet::new()).unwrap();

    assert_eq!(report.skipped_trips, 1);
    assert_eq!(report.insufficient_data, 1);
    assert_eq!(report.classified(), 3);

    let r1 = report.record("R1").unwrap();
    assert_eq!(r1.route_name, "Edinburgh - Glasgow Queen Street");
    assert_eq!(r1.total_weeks, 10);
    assert_eq!(r1.cluster_count, 2);
    assert_eq!(r1.largest_cluster_size, 9);
    assert_eq!(r1.second_cluster_size, 1);
    assert_eq!(r1.largest_cluster_pct, 90.0);
    assert_eq!(r1.category, Category::HolidayExceptions);
    assert_eq!(r1.exceptional_weeks, vec![WeekKey::new(2025, 5)]);

    assert_eq!(report.record("R2").unwrap().category, Category::FullyStable);

    let r3 = report.record("R3").unwrap();
    assert_eq!(r3.category, Category::TimetableChangeover);
    assert_eq!(r3.clusters[0].first, WeekKey::new(2025, 1));
    assert_eq!(r3.clusters[0].last, WeekKey::new(2025, 5));
    assert_eq!(r3.clusters[1].first, WeekKey::new(2025, 6));

    assert!(report.record("R4").is_none());
    assert_eq!(report.publishable(), 3);
}

#[test]
fn test_fixture_coarse_and_typical_week() {
    let feed = fixture();

    let coarse = analyzer(ClassificationPolicy::Coarse(CoarsePolicy::default()))
        .analyze(&feed, &BTreeSet::new())
        .unwrap();
    assert_eq!(coarse.record("R1").unwrap().category, Category::MostlyStable);
    assert_eq!(coarse.record("R2").unwrap().category, Category::FullyStable);
    assert_eq!(coarse.record("R3").unwrap().category, Category::HighVariation);
    assert_eq!(coarse.publishable(), 2);

    let typical = analyzer(ClassificationPolicy::TypicalWeek(TypicalWeekPolicy::default()))
        .analyze(&feed, &BTreeSet::new())
        .unwrap();
    assert_eq!(
        typical.record("R1").unwrap().category,
        Category::StableWithExceptions
    );
    assert_eq!(typical.record("R3").unwrap().category, Category::MultiplePatterns);
}

#[test]
fn test_volume_signature_on_fixture() {
    let feed = fixture();
    let report = analyzer(ClassificationPolicy::Rigorous(RigorousPolicy::default()))
        .analyze(&feed, &BTreeSet::new())
        .unwrap();
    let by_pattern = report.record("R2").unwrap().cluster_count;

    let volume = Analyzer::new(
        SignatureMode::WithVolume { granularity: 5 },
        ClassificationPolicy::Rigorous(RigorousPolicy::default()),
    )
    .analyze(&feed, &BTreeSet::new())
    .unwrap();

    // One trip a week never moves between buckets
    assert_eq!(volume.record("R2").unwrap().cluster_count, by_pattern);
    // The holiday trip lifts W05 from 5 to 7 departures, same bucket of 5
    assert_eq!(volume.record("R1").unwrap().cluster_count, 2);
}

#[test]
fn test_two_pass_excludes_shared_holiday_week() {
    let feed = shared_holiday_feed(12);
    let outcome = rigorous()
        .analyze_two_pass(&feed, &BTreeSet::new(), 10)
        .unwrap();

    assert_eq!(outcome.systemic_weeks, BTreeSet::from([WeekKey::new(2025, 5)]));

    let second = outcome.second.as_ref().unwrap();
    assert!(second.excluded_weeks.contains(&WeekKey::new(2025, 5)));
    for first in &outcome.first.records {
        let again = second.record(&first.route_id).unwrap();
        assert_eq!(again.cluster_count, first.cluster_count - 1);
        assert_eq!(again.total_weeks, 9);
        assert_eq!(again.largest_cluster_pct, 100.0);
        assert_eq!(again.category, Category::FullyStable);
    }
    assert_eq!(outcome.final_report().publishable(), 12);
}

#[test]
fn test_two_pass_needs_enough_routes() {
    let feed = shared_holiday_feed(9);
    let outcome = rigorous()
        .analyze_two_pass(&feed, &BTreeSet::new(), 10)
        .unwrap();

    assert!(outcome.systemic_weeks.is_empty());
    assert!(outcome.second.is_none());
}

#[test]
fn test_row_order_does_not_change_result() {
    let feed = fixture();
    let mut reversed = feed.clone();
    reversed.routes.reverse();
    reversed.trips.reverse();
    reversed.calendar.reverse();

    let forward = rigorous().analyze(&feed, &BTreeSet::new()).unwrap();
    let backward = rigorous().analyze(&reversed, &BTreeSet::new()).unwrap();

    assert_eq!(forward.records, backward.records);
}

#[test]
fn test_excluding_untouched_week_is_noop() {
    let feed = fixture();
    let excluded = BTreeSet::from([WeekKey::new(2024, 30)]);

    let plain = rigorous().analyze(&feed, &BTreeSet::new()).unwrap();
    let with_exclusion = rigorous().analyze(&feed, &excluded).unwrap();

    assert_eq!(plain.records, with_exclusion.records);
}

#[test]
fn test_clusters_partition_route_weeks() {
    let feed = fixture();
    let analyzer = rigorous();
    let resolved = feed.resolve_trips();
    let table = WeekTable::build(&resolved.trips, &feed.route_names(), &BTreeSet::new());

    for (_, route) in table.routes() {
        let set = ClusterSet::from_signatures(&route.signatures(analyzer.mode()));

        let mut seen: Vec<WeekKey> = set.clusters().iter().flat_map(|c| c.weeks.clone()).collect();
        let total = seen.len();
        seen.sort();
        seen.dedup();

        assert_eq!(total, seen.len(), "clusters overlap");
        let all: Vec<WeekKey> = route.weeks.keys().copied().collect();
        assert_eq!(seen, all);
    }
}

#[test]
fn test_holiday_calendar_exclusion() {
    let ics = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nDTSTART;VALUE=DATE:20250129\nSUMMARY:Works closure\nEND:VEVENT\nEND:VCALENDAR\n";
    let weeks = holiday_weeks(&parse_ics(ics).unwrap());
    assert_eq!(weeks, BTreeSet::from([WeekKey::new(2025, 5)]));

    let report = rigorous().analyze(&fixture(), &weeks).unwrap();
    let r1 = report.record("R1").unwrap();
    assert_eq!(r1.total_weeks, 9);
    assert_eq!(r1.category, Category::FullyStable);
}

#[test]
fn test_route_detail_from_fixture() {
    let holidays = BTreeSet::from([WeekKey::new(2025, 5)]);
    let detail = route_detail(&fixture(), "queen street", SignatureMode::ServicePattern, &holidays)
        .unwrap();

    assert_eq!(detail.route_id, "R1");
    assert_eq!(detail.trips_defined, 3);
    assert_eq!(detail.patterns.len(), 2);
    assert_eq!(detail.patterns[0].departures, 5);
    assert_eq!(detail.patterns[1].departures, 7);
    assert_eq!(detail.non_holiday_weeks, 9);
}

#[test]
fn test_report_renders_fixture() {
    let report = rigorous().analyze(&fixture(), &BTreeSet::new()).unwrap();
    let text = render_report(&report, &Default::default());

    assert!(text.contains("Routes classified: 3"));
    assert!(text.contains("2025-W01 to 2025-W05 (5w) then 2025-W06 to 2025-W10 (5w)"));
    assert!(text.contains("Data range: 2024-12-30 to 2025-03-09"));
}

#[test]
fn test_distribution_from_fixture() {
    let feed = fixture();
    let resolved = feed.resolve_trips();
    let table = WeekTable::build(&resolved.trips, &feed.route_names(), &BTreeSet::new());
    let dist = schedule_distribution(&table, SignatureMode::ServicePattern);

    assert_eq!(dist.route_count(), 4);
    assert_eq!(dist.groups[0].schedules, 1);
    assert_eq!(dist.groups[0].routes.len(), 2);
    assert_eq!(dist.groups[1].schedules, 2);

    assert_eq!(dist.two_schedule.highly_dominant.len(), 1);
    assert_eq!(dist.two_schedule.highly_dominant[0].route_id, "R1");
    assert_eq!(dist.two_schedule.near_even[0].route_id, "R3");
    assert_eq!(dist.multi_schedule_clear_dominant, 1);
    assert_eq!(dist.finding, Some(Finding::Mixed));
}
