//! Turns the date text scraped from an episode into a timestamp.
//!
//! Resolution order, first hit wins:
//!
//! 1. an archive datestamp embedded in a path (`/YYYY/MM/YYYYMMDD...`),
//! 2. a direct parse of the text (month-name, ISO, `M/D/YYYY`, RFC 2822, RFC 3339),
//! 3. the caller-supplied fallback.
//!
//! Parsed dates are not range-checked.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_PATH_DATESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{4})/(\d{2})/(\d{4})(\d{2})(\d{2})").unwrap());
static RE_SEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b\.?").unwrap());
static RE_MONTH_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]{3})\.").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const NAIVE_FORMATS: &[&str] = &["%B %d, %Y", "%B %d %Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Format used for `pubDate` and `lastBuildDate`.
const RFC1123: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Resolve `date_text` to an instant, or return `fallback`. Never fails.
pub fn resolve(date_text: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    parse(date_text).unwrap_or(fallback)
}

/// Steps 1 and 2 of [`resolve`], without the fallback.
pub fn parse(date_text: &str) -> Option<DateTime<Utc>> {
    path_datestamp(date_text).or_else(|| parse_date_text(date_text))
}

/// The calendar date encoded as `/YYYY/MM/YYYYMMDD` inside a URL or path.
pub fn datestamp_date(text: &str) -> Option<NaiveDate> {
    RE_PATH_DATESTAMP.captures_iter(text).find_map(|caps| {
        let year = caps[3].parse().ok()?;
        let month = caps[4].parse().ok()?;
        let day = caps[5].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

fn path_datestamp(text: &str) -> Option<DateTime<Utc>> {
    datestamp_date(text).map(midnight_utc)
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = RE_WHITESPACE.replace_all(text.trim(), " ");
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(&trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // "Sept. 3, 2025" and "Oct. 14, 2025" are how the archive abbreviates
    let normalized = RE_SEPT.replace(&trimmed, "Sep");
    let normalized = RE_MONTH_DOT.replace(&normalized, "$1");

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
        .map(midnight_utc)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// RFC 1123 civil timestamp, the form legacy podcast clients expect.
pub fn to_rfc1123(dt: &DateTime<Utc>) -> String {
    dt.format(RFC1123).to_string()
}
