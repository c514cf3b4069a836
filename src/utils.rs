use crate::error::{ReportError, Result};
use chrono::{Datelike, NaiveDate};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ReportError::DateError(format!("no such month: {}-{:02}", year, month)))
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| ReportError::DateError(format!("no such month: {}-{:02}", year, month)))
}

/// Full English month name for 1..=12, empty otherwise.
pub fn month_name(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_NAMES[(month - 1) as usize],
        _ => "",
    }
}

/// Three-letter label used for trend buckets ("Jan", "Feb", ...).
pub fn month_abbrev(month: u32) -> &'static str {
    let name = month_name(month);
    name.get(..3).unwrap_or(name)
}

/// 0-based slot of a date inside its calendar year.
pub fn month_index(date: NaiveDate) -> usize {
    date.month0() as usize
}

pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid "-0.0" in payloads
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// `part / whole * 100`, or 0 when the denominator is not positive.
pub fn percentage_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

pub fn format_date_range(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
}
