//! Output formatting and persistence for stability results.
//!
//! Renders human-readable reports, writes JSON and appends per-route CSV rows.

use crate::analyzers::aggregate::RecommendationBands;
use crate::analyzers::analyzer::{StabilityReport, TwoPassOutcome};
use crate::analyzers::cluster::TemporalShape;
use crate::analyzers::detail::RouteDetail;
use crate::analyzers::distribution::Distribution;
use crate::analyzers::types::{Category, StabilityRecord, WeekKey};
use crate::analyzers::utility::pct;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// Examples listed per category.
const EXAMPLES: usize = 10;
/// Most common exceptional weeks listed.
const TOP_WEEKS: usize = 15;
/// Exception weeks are spelled out for routes with at most this many.
const LISTED_EXCEPTIONS: usize = 5;

fn join_weeks(weeks: &[WeekKey]) -> String {
    weeks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "\n{RULE}\n  {title}\n{RULE}")
}

fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "\n{THIN_RULE}\n{title}\n{THIN_RULE}")
}

/// Full text report for one pass.
pub struct ReportView<'a> {
    pub report: &'a StabilityReport,
    pub bands: &'a RecommendationBands,
}

impl ReportView<'_> {
    fn examples(&self, f: &mut fmt::Formatter<'_>, category: Category) -> fmt::Result {
        let records: Vec<&StabilityRecord> = self.report.in_category(category).collect();
        if records.is_empty() {
            return Ok(());
        }
        writeln!(f, "\n{} examples:", category.label())?;

        match category {
            Category::TimetableChangeover => {
                for r in records.iter().take(EXAMPLES) {
                    let mut spans: Vec<_> = r.clusters.iter().collect();
                    spans.sort_by_key(|c| c.first);
                    let periods: Vec<String> = spans
                        .iter()
                        .map(|c| format!("{} to {} ({}w)", c.first, c.last, c.weeks))
                        .collect();
                    writeln!(f, "  {:30} {}", r.route_name, periods.join(" then "))?;
                }
            }
            Category::Chaotic | Category::HighVariation | Category::MultiplePatterns => {
                let mut fragmented = records.clone();
                fragmented.sort_by(|a, b| b.cluster_count.cmp(&a.cluster_count));
                for r in fragmented.iter().take(EXAMPLES) {
                    writeln!(
                        f,
                        "  {:30} {} patterns over {} weeks (largest {:.0}%)",
                        r.route_name, r.cluster_count, r.total_weeks, r.largest_cluster_pct
                    )?;
                }
            }
            _ => {
                for r in records.iter().take(EXAMPLES) {
                    write!(
                        f,
                        "  {:30} {}/{} weeks typical ({:.0}%)",
                        r.route_name, r.largest_cluster_size, r.total_weeks, r.largest_cluster_pct
                    )?;
                    if !r.exceptional_weeks.is_empty()
                        && r.exceptional_weeks.len() <= LISTED_EXCEPTIONS
                    {
                        write!(f, ", exceptions: {}", join_weeks(&r.exceptional_weeks))?;
                    }
                    writeln!(f)?;
                }
            }
        }
        if records.len() > EXAMPLES {
            writeln!(f, "  ... and {} more", records.len() - EXAMPLES)?;
        }
        Ok(())
    }
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        heading(f, "Timetable Stability Analysis")?;

        writeln!(f, "\nPolicy:    {}", report.policy)?;
        writeln!(f, "Signature: {}", report.signature_mode)?;
        if let Some((start, end)) = report.data_range {
            writeln!(f, "Data range: {start} to {end}")?;
        }
        if !report.excluded_weeks.is_empty() {
            let excluded: Vec<WeekKey> = report.excluded_weeks.iter().copied().collect();
            writeln!(
                f,
                "Excluded weeks ({}): {}",
                excluded.len(),
                join_weeks(&excluded)
            )?;
        }
        if report.skipped_trips > 0 {
            writeln!(f, "Skipped trips without usable dates: {}", report.skipped_trips)?;
        }

        let total = report.classified();
        section(f, "Classification")?;
        writeln!(f, "\nRoutes classified: {total}")?;
        if report.insufficient_data > 0 {
            writeln!(
                f,
                "Routes with too few weeks (not classified): {}",
                report.insufficient_data
            )?;
        }
        writeln!(f)?;
        for (category, count) in report.category_counts() {
            writeln!(
                f,
                "  {:35} {:4} ({:5.1}%)",
                category.label(),
                count,
                pct(count, total)
            )?;
        }

        let publishable = report.publishable();
        writeln!(
            f,
            "\nPublishable as a static timetable: {} of {} ({:.1}%)",
            publishable,
            total,
            pct(publishable, total)
        )?;

        for category in report.policy.categories() {
            self.examples(f, *category)?;
        }

        let weeks = report.exceptional_week_counts();
        if !weeks.is_empty() {
            section(f, "Most common exception weeks")?;
            writeln!(f)?;
            for (week, routes) in weeks.iter().take(TOP_WEEKS) {
                let monday = week
                    .monday()
                    .map(|d| format!(" (w/c {d})"))
                    .unwrap_or_default();
                writeln!(f, "  {week}{monday}: {routes} routes")?;
            }
        }

        section(f, "Publication strategy")?;
        writeln!(f)?;
        for (category, count) in report.category_counts() {
            if count > 0 {
                writeln!(f, "  {:35} {}", category.label(), category.strategy())?;
            }
        }

        if let Some(recommendation) = report.recommendation(self.bands) {
            section(f, "Recommendation")?;
            writeln!(f, "\n{}", recommendation.text())?;
        }
        Ok(())
    }
}

pub fn render_report(report: &StabilityReport, bands: &RecommendationBands) -> String {
    ReportView { report, bands }.to_string()
}

/// Both passes, and what the second one changed.
pub struct TwoPassView<'a> {
    pub outcome: &'a TwoPassOutcome,
    pub bands: &'a RecommendationBands,
}

impl fmt::Display for TwoPassView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = &self.outcome.first;
        write!(f, "{}", ReportView { report: first, bands: self.bands })?;

        let Some(second) = &self.outcome.second else {
            writeln!(f, "\nNo week was exceptional for enough routes to exclude.")?;
            return Ok(());
        };

        let systemic: Vec<WeekKey> = self.outcome.systemic_weeks.iter().copied().collect();
        heading(f, "Second pass")?;
        writeln!(
            f,
            "\nAlso excluding {} systemic weeks: {}",
            systemic.len(),
            join_weeks(&systemic)
        )?;
        write!(f, "{}", ReportView { report: second, bands: self.bands })?;

        section(f, "Change after excluding systemic weeks")?;
        writeln!(f)?;
        let before = first.category_counts();
        let after = second.category_counts();
        for ((category, was), (_, now)) in before.iter().zip(after.iter()) {
            let delta = *now as i64 - *was as i64;
            writeln!(f, "  {:35} {:4} -> {:4} ({:+})", category.label(), was, now, delta)?;
        }
        writeln!(
            f,
            "\n  Publishable: {:.1}% -> {:.1}%",
            pct(first.publishable(), first.classified()),
            pct(second.publishable(), second.classified())
        )?;
        Ok(())
    }
}

pub fn render_two_pass(outcome: &TwoPassOutcome, bands: &RecommendationBands) -> String {
    TwoPassView { outcome, bands }.to_string()
}

pub struct RouteDetailView<'a>(pub &'a RouteDetail);

impl fmt::Display for RouteDetailView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = self.0;
        heading(f, &format!("Route detail: {}", detail.route_name))?;

        writeln!(f, "\nFound {} matching route(s):", detail.matches.len())?;
        for m in &detail.matches {
            writeln!(f, "  - {} (ID: {})", m.route_name, m.route_id)?;
        }
        writeln!(f, "\nTotal trips defined: {}", detail.trips_defined)?;
        writeln!(f, "Weeks covered: {}", detail.total_weeks)?;
        writeln!(f, "Distinct timetable patterns: {}", detail.patterns.len())?;

        for (i, pattern) in detail.patterns.iter().enumerate() {
            section(f, &format!("Pattern {}: {} weeks", i + 1, pattern.weeks.len()))?;

            match (pattern.weeks.first(), pattern.weeks.last()) {
                (Some(first), Some(last)) if pattern.weeks.len() > 10 => {
                    let n = pattern.weeks.len();
                    writeln!(f, "Weeks: {first} to {last} ({n} total)")?;
                    writeln!(f, "  First 5: {}", join_weeks(&pattern.weeks[..5]))?;
                    writeln!(f, "  Last 5:  {}", join_weeks(&pattern.weeks[n - 5..]))?;
                }
                _ => writeln!(f, "Weeks: {}", join_weeks(&pattern.weeks))?,
            }
            if !pattern.holiday_weeks.is_empty() {
                writeln!(
                    f,
                    "  Includes {} holiday weeks: {}",
                    pattern.holiday_weeks.len(),
                    join_weeks(&pattern.holiday_weeks)
                )?;
            }

            let days: Vec<String> = pattern.patterns.iter().map(ToString::to_string).collect();
            writeln!(f, "Days: {}", days.join(" | "))?;
            writeln!(f, "Departures in first week: {}", pattern.departures)?;
            writeln!(
                f,
                "Service IDs: {}",
                pattern.service_ids.iter().cloned().collect::<Vec<_>>().join(", ")
            )?;
            writeln!(f, "Trips in first week: {}", pattern.trips)?;

            if pattern.weeks.len() > 1 {
                let c = pattern.contiguity;
                match pattern.shape() {
                    TemporalShape::Block => writeln!(f, "Temporal: contiguous block")?,
                    TemporalShape::MostlyContiguous => {
                        writeln!(f, "Temporal: mostly contiguous (avg gap {:.1})", c.avg_gap)?
                    }
                    TemporalShape::Scattered => writeln!(
                        f,
                        "Temporal: scattered (max gap {}, avg gap {:.1})",
                        c.max_gap, c.avg_gap
                    )?,
                }
            }
        }

        heading(f, "Summary")?;
        writeln!(f, "\nTotal weeks: {}", detail.total_weeks)?;
        writeln!(f, "Non-holiday weeks: {}", detail.non_holiday_weeks)?;
        writeln!(f, "Distinct patterns: {}", detail.patterns.len())?;
        if detail.is_publishable() {
            writeln!(
                f,
                "\nPublishable: {} distinct timetable(s); publish each with its date range",
                detail.patterns.len()
            )?;
        } else {
            writeln!(
                f,
                "\nComplex: {} distinct patterns; check whether they are seasonal or scattered",
                detail.patterns.len()
            )?;
        }
        Ok(())
    }
}

pub fn render_route_detail(detail: &RouteDetail) -> String {
    RouteDetailView(detail).to_string()
}

pub struct DistributionView<'a>(pub &'a Distribution);

impl fmt::Display for DistributionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dist = self.0;
        heading(f, "Schedule Distribution")?;
        writeln!(f, "\nRoutes analysed: {}", dist.route_count())?;

        section(f, "Distribution by number of schedules")?;
        for group in &dist.groups {
            let n = group.routes.len();
            writeln!(f, "\n{}-schedule routes ({} routes):", group.schedules, n)?;
            writeln!(f, "  Dominant schedule covers:")?;
            writeln!(f, "    Average: {:.1}% of weeks", group.avg_dominant_pct)?;
            writeln!(
                f,
                "    Range:   {:.1}% - {:.1}%",
                group.min_dominant_pct, group.max_dominant_pct
            )?;
            writeln!(f, "  Distribution:")?;
            writeln!(
                f,
                "    Clear dominant (>=60%):     {:3} ({:5.1}%)",
                group.clear_dominant,
                pct(group.clear_dominant, n)
            )?;
            writeln!(
                f,
                "    Somewhat dominant (40-60%): {:3} ({:5.1}%)",
                group.somewhat_dominant,
                pct(group.somewhat_dominant, n)
            )?;
            writeln!(
                f,
                "    Balanced (<40%):            {:3} ({:5.1}%)",
                group.balanced,
                pct(group.balanced, n)
            )?;

            if group.schedules > 1 && group.schedules <= 4 {
                writeln!(f, "\n  Examples:")?;
                for r in group.routes.iter().take(5) {
                    let counts: Vec<String> =
                        r.week_counts.iter().map(|c| format!("{c}w")).collect();
                    writeln!(
                        f,
                        "    {:25} {:2} weeks: {} ({:.0}% dominant)",
                        r.route_name,
                        r.total_weeks,
                        counts.join(" + "),
                        r.dominant_pct
                    )?;
                }
            }
        }

        let split = &dist.two_schedule;
        let two_total =
            split.highly_dominant.len() + split.moderately_dominant.len() + split.near_even.len();
        if two_total > 0 {
            section(f, "Two-schedule routes")?;
            writeln!(f, "\nTotal: {two_total}")?;
            for (label, routes) in [
                ("Highly dominant (>=80%)", &split.highly_dominant),
                ("Moderately dominant (60-80%)", &split.moderately_dominant),
                ("Near-even split (<60%)", &split.near_even),
            ] {
                writeln!(
                    f,
                    "  {:30} {:3} ({:5.1}%)",
                    label,
                    routes.len(),
                    pct(routes.len(), two_total)
                )?;
            }
        }

        if let Some(finding) = dist.finding {
            section(f, "Key findings")?;
            writeln!(
                f,
                "\nMulti-schedule routes: {}, with a clear dominant schedule: {} ({:.1}%)",
                dist.multi_schedule_routes,
                dist.multi_schedule_clear_dominant,
                pct(dist.multi_schedule_clear_dominant, dist.multi_schedule_routes)
            )?;
            writeln!(f, "Strategy: {}", finding.strategy())?;
        }
        Ok(())
    }
}

pub fn render_distribution(dist: &Distribution) -> String {
    DistributionView(dist).to_string()
}

/// Writes `value` as pretty JSON to `path`, replacing any existing file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// One CSV row per classified route.
#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    route_id: &'a str,
    route_name: &'a str,
    policy: &'static str,
    category: &'static str,
    total_weeks: usize,
    cluster_count: usize,
    largest_cluster_size: usize,
    largest_cluster_pct: f64,
    second_cluster_size: usize,
    second_cluster_pct: f64,
    top_two_coverage_pct: f64,
    largest_contiguous: bool,
    second_contiguous: bool,
    publishable: bool,
    exceptional_weeks: String,
}

impl<'a> From<&'a StabilityRecord> for RecordRow<'a> {
    fn from(r: &'a StabilityRecord) -> Self {
        Self {
            route_id: &r.route_id,
            route_name: &r.route_name,
            policy: r.policy.as_str(),
            category: r.category.as_str(),
            total_weeks: r.total_weeks,
            cluster_count: r.cluster_count,
            largest_cluster_size: r.largest_cluster_size,
            largest_cluster_pct: r.largest_cluster_pct,
            second_cluster_size: r.second_cluster_size,
            second_cluster_pct: r.second_cluster_pct,
            top_two_coverage_pct: r.top_two_coverage_pct,
            largest_contiguous: r.largest_contiguous,
            second_contiguous: r.second_contiguous,
            publishable: r.is_publishable(),
            exceptional_weeks: r
                .exceptional_weeks
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

/// Appends one row per record to a CSV file.
///
/// Writes the header when the file is missing or empty. Nothing is created
/// for an empty slice.
pub fn append_records(path: &Path, records: &[StabilityRecord]) -> Result<()> {
    if records.is_empty() {
        debug!(path = %path.display(), "No records to append");
        return Ok(());
    }
    let has_content = fs::metadata(path).is_ok_and(|m| m.len() > 0);
    debug!(path = %path.display(), has_content, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!has_content)
        .from_writer(file);

    for record in records {
        writer.serialize(RecordRow::from(record))?;
    }
    writer.flush()?;

    Ok(())
}
