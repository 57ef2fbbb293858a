//! Timestamp utilities
//!
//! All stored timestamps are UTC with microsecond precision so the memory
//! and SQLite stores round-trip the same value. Day boundaries ("today",
//! "this week") are computed in the server's local time zone.

use chrono::{
    DateTime, Days, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    SubsecRound, TimeZone, Utc,
};

/// Get current UTC timestamp, truncated to microseconds
pub fn now() -> DateTime<Utc> {
    normalize(Utc::now())
}

/// Truncate to the precision every store keeps
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Fixed-width RFC 3339 encoding (`2025-01-31T09:30:00.000000Z`)
///
/// Fixed width keeps lexical order equal to chronological order in SQL.
pub fn encode(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`encode`] (any RFC 3339 string is accepted)
pub fn decode(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// `[startOfDay, endOfDay]` of the local calendar day containing `reference`
pub fn local_day_bounds(reference: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = reference.with_timezone(&Local).date_naive();
    (start_of_local_day(day), end_of_local_day(day))
}

/// Local midnight `days` calendar days before the day containing `reference`
pub fn local_days_back(reference: DateTime<Utc>, days: u64) -> DateTime<Utc> {
    let today = reference.with_timezone(&Local).date_naive();
    let day = today.checked_sub_days(Days::new(days)).unwrap_or(today);
    start_of_local_day(day)
}

/// Format in local time, e.g. `"%Y-%m-%d %H:%M:%S"`
pub fn format_local(ts: DateTime<Utc>, fmt: &str) -> String {
    ts.with_timezone(&Local).format(fmt).to_string()
}

fn start_of_local_day(day: NaiveDate) -> DateTime<Utc> {
    resolve_local(day.and_time(NaiveTime::MIN), true)
}

fn end_of_local_day(day: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    resolve_local(day.and_time(last), false)
}

// DST transitions can make a local wall-clock time ambiguous or nonexistent.
fn resolve_local(naive: NaiveDateTime, earliest: bool) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(ts) => ts.with_timezone(&Utc),
        LocalResult::Ambiguous(first, second) => {
            if earliest {
                first.with_timezone(&Utc)
            } else {
                second.with_timezone(&Utc)
            }
        }
        LocalResult::None => {
            let shifted = naive + chrono::Duration::hours(1);
            Local
                .from_local_datetime(&shifted)
                .earliest()
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}
