//! Public holidays from an iCalendar feed, used to seed week exclusions.

use crate::analyzers::types::WeekKey;
use crate::fetch::{BasicClient, HttpClient, load_source};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

/// Joins folded content lines: a line starting with a space or tab
/// continues the previous one.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let raw = raw.trim_end_matches('\r');
        match (raw.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(rest), Some(previous)) => previous.push_str(rest),
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

/// Splits `NAME;PARAM=x:value` into the upper-cased name and the value.
fn property(line: &str) -> Option<(String, &str)> {
    let (head, value) = line.split_once(':')?;
    let name = head.split(';').next().unwrap_or(head);
    Some((name.trim().to_ascii_uppercase(), value))
}

fn unescape(value: &str) -> String {
    value
        .replace("\\n", " ")
        .replace("\\N", " ")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
        .trim()
        .to_string()
}

/// Reads the start date of a `DTSTART`, date or date-time form.
fn parse_dtstart(value: &str) -> Result<NaiveDate> {
    let digits = value.trim().get(..8).unwrap_or(value);
    NaiveDate::parse_from_str(digits, "%Y%m%d")
        .with_context(|| format!("unreadable DTSTART '{value}'"))
}

/// Extracts every `VEVENT` with a start date. Events without `SUMMARY` get
/// an empty name.
pub fn parse_ics(text: &str) -> Result<Vec<Holiday>> {
    let lines = unfold(text);
    if !lines
        .iter()
        .any(|l| l.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"))
    {
        bail!("not an iCalendar document");
    }

    let mut holidays = Vec::new();
    let mut in_event = false;
    let mut date: Option<NaiveDate> = None;
    let mut name = String::new();

    for line in &lines {
        let Some((key, value)) = property(line) else {
            continue;
        };
        match (key.as_str(), value.trim()) {
            ("BEGIN", "VEVENT") => {
                in_event = true;
                date = None;
                name.clear();
            }
            ("END", "VEVENT") if in_event => {
                in_event = false;
                match date.take() {
                    Some(date) => holidays.push(Holiday {
                        date,
                        name: std::mem::take(&mut name),
                    }),
                    None => debug!("Skipping event without DTSTART"),
                }
            }
            ("DTSTART", v) if in_event => date = Some(parse_dtstart(v)?),
            ("SUMMARY", _) if in_event => name = unescape(value),
            _ => {}
        }
    }

    Ok(holidays)
}

/// ISO weeks containing at least one holiday.
pub fn holiday_weeks(holidays: &[Holiday]) -> BTreeSet<WeekKey> {
    holidays.iter().map(|h| WeekKey::from_date(h.date)).collect()
}

/// Loads holidays from a local `.ics` file or a URL, in a single attempt.
#[tracing::instrument(skip(client))]
pub async fn load_holidays<C: HttpClient>(client: &C, source: &str) -> Result<Vec<Holiday>> {
    let bytes = load_source(client, source)
        .await
        .with_context(|| format!("fetching holidays from {source}"))?;
    let text = String::from_utf8_lossy(&bytes);
    let holidays = parse_ics(&text).with_context(|| format!("parsing holidays from {source}"))?;
    info!(count = holidays.len(), "Holidays loaded");
    Ok(holidays)
}

/// [`load_holidays`] with a fresh client bounded by `timeout`.
pub async fn fetch_holidays(source: &str, timeout: Duration) -> Result<Vec<Holiday>> {
    let client = BasicClient::with_timeout(timeout)?;
    load_holidays(&client, source).await
}
