//! Time and money helpers

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// First day of the month after `date`'s month
pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Whole days between two instants, never negative
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_days().max(0)
}

/// Round to pennies
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_rollover() {
        let dec = NaiveDate::from_ymd_opt(2025, 12, 14).unwrap();
        assert_eq!(next_month_start(dec), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let feb = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(next_month_start(feb), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn rounding() {
        assert_eq!(round2(12.345_1), 12.35);
        assert_eq!(round2(-0.004), -0.0);
        assert_eq!(round_to(0.123_456, 4), 0.1235);
    }
}
