// Date and relative-duration parsing
//
// Malformed input never fails a search: it is logged and the filter is dropped.

use chrono::{Duration, NaiveDate};
use tracing::warn;

/// Absolute date format of filters and `Email::received_date`
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Parse a "YYYY/MM/DD" date
///
/// Empty input is silently `None`; malformed input is logged and `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    match NaiveDate::parse_from_str(value, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(value, error = %e, "Invalid date format, expected YYYY/MM/DD");
            None
        }
    }
}

/// Parse a relative duration such as "3d", "2m" or "1y"
///
/// `m` is 30 days and `y` is 365 days. Empty input is a zero duration.
/// Unknown suffixes and malformed amounts are logged and `None`.
pub fn parse_relative_time(value: &str) -> Option<Duration> {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return Some(Duration::zero());
    };

    let amount = &value[..value.len() - unit.len_utf8()];
    let Ok(amount) = amount.trim().parse::<i64>() else {
        warn!(value, "Invalid relative time format");
        return None;
    };

    let days_per_unit = match unit.to_ascii_lowercase() {
        'd' => 1,
        'm' => 30,
        'y' => 365,
        other => {
            warn!(value, suffix = %other, "Unknown relative time suffix");
            return None;
        }
    };

    let duration = amount
        .checked_mul(days_per_unit)
        .and_then(Duration::try_days);
    if duration.is_none() {
        warn!(value, "Relative time out of range");
    }
    duration
}
