//! Conversions between timestamps and the strings shown to or typed by the user.
//!
//! All formatting uses the timestamp's own wall clock, so callers holding a
//! `DateTime<Local>` get local time.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Placeholder shown for an absent timestamp
pub const NOT_AVAILABLE: &str = "N/A";

const PICKER_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// `HH:MM`
pub fn format_time<Tz: TimeZone>(at: Option<&DateTime<Tz>>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match at {
        Some(at) => at.format("%H:%M").to_string(),
        None => NOT_AVAILABLE.into(),
    }
}

/// `YYYY-MM-DD HH:MM`
pub fn format_date_time<Tz: TimeZone>(at: Option<&DateTime<Tz>>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        None => NOT_AVAILABLE.into(),
    }
}

/// `YYYY-MM-DDTHH:MM`, the value a date-time input field expects. Empty when absent.
pub fn format_for_picker<Tz: TimeZone>(at: Option<&DateTime<Tz>>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.map(|at| at.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_default()
}

/// Parse a date-time input value as local wall-clock time
///
/// Returns `None` for empty or unparseable input.
pub fn parse_picker_value(value: &str) -> Option<DateTime<Local>> {
    parse_picker_value_in(value, &Local)
}

/// Parse a date-time input value in the given timezone
pub fn parse_picker_value_in<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let naive = PICKER_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())?;

    crate::schedule::resolve_wall_clock(tz, naive)
}
