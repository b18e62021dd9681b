//! Calendar-day helpers. The league organizes its schedule by the US Eastern
//! calendar day, regardless of where the caller runs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::America::New_York;

/// `YYYY-MM-DD` of `now` as observed in America/New_York.
pub fn eastern_date(now: DateTime<Utc>) -> String {
    now.with_timezone(&New_York).format("%Y-%m-%d").to_string()
}

/// Today's Eastern date, computed at call time.
pub fn eastern_today() -> String {
    eastern_date(Utc::now())
}

/// `YYYY-MM-DD` of a game's UTC start time. Used to look up a single game's
/// odds, which are keyed by the UTC day rather than the Eastern day.
pub fn utc_date_of(start_time_utc: &str) -> Option<String> {
    parse_timestamp(start_time_utc).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Parses RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Start time rendered as `07:30 PM ET`.
pub fn format_eastern_time(iso: &str) -> String {
    match parse_timestamp(iso) {
        Some(dt) => dt.with_timezone(&New_York).format("%I:%M %p ET").to_string(),
        None => "TBD".to_string(),
    }
}
