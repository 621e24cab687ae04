use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc};

/// Seconds in one man-day (an 8-hour working day).
pub const MAN_DAY_SECONDS: f64 = 8.0 * 3600.0;

/// Seconds in one calendar day.
pub const DAY_SECONDS: f64 = 86_400.0;

/// Day number of 1899-12-30 counted from 0001-01-01 (= day 1), the epoch
/// spreadsheet applications use for serial dates.
const SPREADSHEET_EPOCH_DAYS_FROM_CE: i32 = 693_594;

/// First day of the month containing `d`.
pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Shift a date by a signed number of calendar months.
/// Days past the end of the target month are clamped to its last day.
pub fn shift_months(d: NaiveDate, delta: i32) -> NaiveDate {
    let months = Months::new(delta.unsigned_abs());
    let shifted = if delta >= 0 {
        d.checked_add_months(months)
    } else {
        d.checked_sub_months(months)
    };
    shifted.unwrap_or(d)
}

/// Midnight UTC at the start of `d`.
pub fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))
}

/// ISO week key `(iso_year, week)` of a timestamp. Weeks start on Monday.
pub fn iso_week_key(ts: DateTime<Utc>) -> (i32, u32) {
    let w = ts.iso_week();
    (w.year(), w.week())
}

/// Display label for an ISO week, e.g. `2024-W05`.
pub fn iso_week_label(key: (i32, u32)) -> String {
    format!("{}-W{:02}", key.0, key.1)
}

/// Convert seconds to man-days (8h). Zero or negative input yields 0.
pub fn seconds_to_man_days(seconds: i64) -> f64 {
    if seconds <= 0 {
        return 0.0;
    }
    seconds as f64 / MAN_DAY_SECONDS
}

/// Convert seconds to calendar days.
pub fn seconds_to_days(seconds: i64) -> f64 {
    seconds as f64 / DAY_SECONDS
}

/// Round to two decimals, the precision used for chart series and tables.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Days elapsed since 1899-12-30, as spreadsheet serial dates count them.
pub fn spreadsheet_serial(d: NaiveDate) -> i64 {
    (d.num_days_from_ce() - SPREADSHEET_EPOCH_DAYS_FROM_CE) as i64
}

/// Parse a `YYYY-MM-DD` date as GitLab returns it for due/start dates.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
