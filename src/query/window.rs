use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use crate::date_util::{month_start, shift_months, start_of_day};
use crate::error::{Error, Result};

static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})$").unwrap());
static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)[dD]$").unwrap());
static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})$").unwrap()
});

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whole days `first..=last`.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self::new(start_of_day(first), start_of_day(last + Duration::days(1)))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Last calendar day touched by the window.
    pub fn last_date(&self) -> NaiveDate {
        (self.end - Duration::nanoseconds(1)).date_naive()
    }

    /// Parse a window expression relative to `today`.
    ///
    /// Supported formats:
    /// - `2025`: calendar year
    /// - `2025-Q1`: quarter
    /// - `2025-01`: month
    /// - `30d`: the last N days, today included
    /// - `2025-01-01..2025-03-31`: explicit inclusive day range
    pub fn parse(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        if let Some(caps) = RE_RANGE.captures(s) {
            let first = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
                .map_err(|e| Error::WindowParse(format!("{s}: {e}")))?;
            let last = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d")
                .map_err(|e| Error::WindowParse(format!("{s}: {e}")))?;
            if last < first {
                return Err(Error::WindowParse(format!("range ends before it starts: {s}")));
            }
            return Ok(Self::days(first, last));
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let n: i64 = caps[1]
                .parse()
                .map_err(|_| Error::WindowParse(format!("invalid day count: {s}")))?;
            if n == 0 {
                return Err(Error::WindowParse("rolling window needs at least 1 day".into()));
            }
            return Ok(Self::days(today - Duration::days(n - 1), today));
        }

        if let Some(caps) = RE_YEAR.captures(s) {
            let year = parse_year(&caps[1], s)?;
            let first = ymd(year, 1, s)?;
            return Ok(Self::new(start_of_day(first), start_of_day(shift_months(first, 12))));
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            let year = parse_year(&caps[1], s)?;
            let q: u32 = caps[2]
                .parse()
                .map_err(|_| Error::WindowParse(format!("invalid quarter: {s}")))?;
            let first = ymd(year, (q - 1) * 3 + 1, s)?;
            return Ok(Self::new(start_of_day(first), start_of_day(shift_months(first, 3))));
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year = parse_year(&caps[1], s)?;
            let month: u32 = caps[2]
                .parse()
                .map_err(|_| Error::WindowParse(format!("invalid month: {s}")))?;
            if !(1..=12).contains(&month) {
                return Err(Error::WindowParse(format!("invalid month: {s}")));
            }
            let first = ymd(year, month, s)?;
            return Ok(Self::new(start_of_day(first), start_of_day(shift_months(first, 1))));
        }

        Err(Error::WindowParse(format!("unrecognized window: {s}")))
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start_date(), self.last_date())
    }
}

fn parse_year(s: &str, whole: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| Error::WindowParse(format!("invalid year: {whole}")))
}

fn ymd(year: i32, month: u32, whole: &str) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::WindowParse(format!("date out of range: {whole}")))
}

/// One calendar-month window per month for the `months_back` months before
/// the month containing `today`, oldest first, each labelled `YYYY-MM`.
pub fn month_windows(today: NaiveDate, months_back: u32) -> Vec<(String, DateWindow)> {
    let current = month_start(today);
    (1..=months_back as i32)
        .rev()
        .map(|i| {
            let start = shift_months(current, -i);
            let end = shift_months(current, -(i - 1));
            let label = format!("{:04}-{:02}", start.year(), start.month());
            (label, DateWindow::new(start_of_day(start), start_of_day(end)))
        })
        .collect()
}

/// `[today - months_back months, today]`, today included.
pub fn trailing_months(today: NaiveDate, months_back: u32) -> DateWindow {
    DateWindow::days(shift_months(today, -(months_back as i32)), today)
}
