//! CLI entry point for the timetable stability tool.
//!
//! Provides subcommands for classifying every route of a GTFS feed, drilling
//! into a single route, summarising the schedule-count distribution and
//! picking a sample week for trimming.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use timetable_stability::analyzers::analyzer::Analyzer;
use timetable_stability::analyzers::detail::route_detail;
use timetable_stability::analyzers::distribution::schedule_distribution;
use timetable_stability::analyzers::signature::WeekTable;
use timetable_stability::analyzers::types::{PolicyKind, SignatureMode, WeekKey};
use timetable_stability::config::AnalysisConfig;
use timetable_stability::feed::Feed;
use timetable_stability::fetch::{BasicClient, fetch_bytes, is_remote};
use timetable_stability::holidays::{fetch_holidays, holiday_weeks};
use timetable_stability::output::{
    append_records, render_distribution, render_report, render_route_detail, render_two_pass,
    write_json,
};
use timetable_stability::window::{BlackoutPeriod, select_week};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "timetable_stability")]
#[command(about = "Classify how stable each route's weekly timetable is", long_about = None)]
struct Cli {
    /// JSON file with policy thresholds and defaults
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every route of a GTFS feed
    Analyze {
        /// GTFS directory, zip file or URL
        #[arg(value_name = "FEED")]
        source: String,

        /// Decision table to classify with
        #[arg(short, long, value_enum)]
        policy: Option<PolicyKind>,

        /// Add weekly departures, rounded to this multiple, to each signature (0 = off)
        #[arg(long)]
        volume_bucket: Option<u64>,

        /// Exclude public holiday weeks
        #[arg(long, default_value_t = false)]
        holidays: bool,

        /// Holiday calendar to use instead of the configured one (implies --holidays)
        #[arg(long, value_name = "FILE_OR_URL")]
        holidays_source: Option<String>,

        /// Extra weeks to exclude, e.g. 2025-W05
        #[arg(short, long, value_name = "WEEK")]
        exclude: Vec<WeekKey>,

        /// Rerun without weeks most routes treat as exceptional
        #[arg(long, default_value_t = false)]
        two_pass: bool,

        /// Routes that must flag a week before the second pass excludes it
        #[arg(long)]
        systemic_routes: Option<usize>,

        /// Write the full report as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,

        /// Append one row per classified route to a CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Show every weekly pattern of the first route whose name matches
    Route {
        /// GTFS directory, zip file or URL
        #[arg(value_name = "FEED")]
        source: String,

        /// Case-insensitive part of the route short name
        #[arg(default_value = "Glasgow Central")]
        pattern: String,

        /// Mark public holiday weeks
        #[arg(long, default_value_t = false)]
        holidays: bool,

        /// Holiday calendar to use instead of the configured one (implies --holidays)
        #[arg(long, value_name = "FILE_OR_URL")]
        holidays_source: Option<String>,
    },
    /// Group routes by how many distinct schedules they run
    Distribution {
        /// GTFS directory, zip file or URL
        #[arg(value_name = "FEED")]
        source: String,

        /// Departure rounding for signatures (0 = service pattern only)
        #[arg(long, default_value_t = 5)]
        volume_bucket: u64,
    },
    /// Print the next Monday whose week avoids December and January
    SelectWeek {
        /// Search from this date instead of today
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/timetable_stability.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("timetable_stability.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut config = AnalysisConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            source,
            policy,
            volume_bucket,
            holidays,
            holidays_source,
            exclude,
            two_pass,
            systemic_routes,
            json,
            csv,
        } => {
            if let Some(policy) = policy {
                config.policy = policy;
            }
            if let Some(granularity) = volume_bucket {
                config.signature_mode = signature_mode(granularity);
            }
            if let Some(threshold) = systemic_routes {
                config.systemic_route_threshold = threshold;
            }

            let mut excluded: BTreeSet<WeekKey> = exclude.into_iter().collect();
            if holidays || holidays_source.is_some() {
                excluded.extend(load_holiday_weeks(&config, holidays_source.as_deref()).await?);
            }

            let feed = load_feed(&source).await?;
            let analyzer = Analyzer::from_config(&config);
            let bands = &config.recommendation;

            let report = if two_pass {
                let Some(outcome) =
                    analyzer.analyze_two_pass(&feed, &excluded, config.systemic_route_threshold)
                else {
                    println!("No calendar data available");
                    return Ok(());
                };
                println!("{}", render_two_pass(&outcome, bands));
                if let Some(path) = &json {
                    write_json(path, &outcome)?;
                }
                outcome.second.unwrap_or(outcome.first)
            } else {
                let Some(report) = analyzer.analyze(&feed, &excluded) else {
                    println!("No calendar data available");
                    return Ok(());
                };
                println!("{}", render_report(&report, bands));
                if let Some(path) = &json {
                    write_json(path, &report)?;
                }
                report
            };

            if let Some(path) = &csv {
                append_records(path, &report.records)?;
                info!(path = %path.display(), rows = report.records.len(), "CSV written");
            }
        }
        Commands::Route {
            source,
            pattern,
            holidays,
            holidays_source,
        } => {
            let marked = if holidays || holidays_source.is_some() {
                load_holiday_weeks(&config, holidays_source.as_deref()).await?
            } else {
                BTreeSet::new()
            };

            let feed = load_feed(&source).await?;
            match route_detail(&feed, &pattern, config.signature_mode, &marked) {
                Some(detail) => println!("{}", render_route_detail(&detail)),
                None => println!("No routes found matching '{pattern}'"),
            }
        }
        Commands::Distribution {
            source,
            volume_bucket,
        } => {
            let feed = load_feed(&source).await?;
            if !feed.has_calendar() {
                println!("No calendar data available");
                return Ok(());
            }
            let resolved = feed.resolve_trips();
            let table = WeekTable::build(&resolved.trips, &feed.route_names(), &BTreeSet::new());
            let dist = schedule_distribution(&table, signature_mode(volume_bucket));
            println!("{}", render_distribution(&dist));
        }
        Commands::SelectWeek { from } => {
            let today = from.unwrap_or_else(|| Local::now().date_naive());
            let monday = select_week(today, &[BlackoutPeriod::WINTER])?;
            println!("{}", monday.format("%Y%m%d"));
            eprintln!("# Selected week: {} to {}", monday, monday + chrono::Days::new(6));
        }
    }

    Ok(())
}

fn signature_mode(granularity: u64) -> SignatureMode {
    if granularity == 0 {
        SignatureMode::ServicePattern
    } else {
        SignatureMode::WithVolume { granularity }
    }
}

/// Loads a GTFS feed from a local directory or zip, or downloads a zip.
#[tracing::instrument]
async fn load_feed(source: &str) -> Result<Feed> {
    let feed = if is_remote(source) {
        let client = BasicClient::new();
        let bytes = fetch_bytes(&client, source).await?;
        Feed::from_zip_bytes(bytes)?
    } else {
        Feed::open(Path::new(source)).with_context(|| format!("opening feed {source}"))?
    };
    if !feed.has_calendar() {
        warn!("Feed has no calendar.txt");
    }
    Ok(feed)
}

/// Weeks containing a public holiday. A failed fetch ends the run.
async fn load_holiday_weeks(
    config: &AnalysisConfig,
    source: Option<&str>,
) -> Result<BTreeSet<WeekKey>> {
    let source = source.unwrap_or(&config.holidays_url);
    let holidays = fetch_holidays(source, config.holidays_timeout()).await?;
    let weeks = holiday_weeks(&holidays);
    info!(holidays = holidays.len(), weeks = weeks.len(), "Holiday weeks loaded");
    Ok(weeks)
}
