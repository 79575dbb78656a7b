use std::collections::BTreeMap;

use anyhow::bail;
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use clap::ValueEnum;

use crate::models::{BranchActivity, BranchTotals, MonthBucketMap};

pub const ATTENDANCE_WINDOW_MONTHS: usize = 6;
pub const YEAR_WINDOW_MONTHS: usize = 12;

/// How dates and transaction types that fail to parse are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ParseMode {
    /// Bucket by the first seven characters of the raw value and count it as malformed.
    #[default]
    Lenient,
    /// Fail the whole aggregation.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthKey {
    Parsed(String),
    Fallback(String),
}

impl MonthKey {
    pub fn is_fallback(&self) -> bool {
        matches!(self, MonthKey::Fallback(_))
    }

    pub fn into_string(self) -> String {
        match self {
            MonthKey::Parsed(key) | MonthKey::Fallback(key) => key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets {
    pub totals: BranchTotals,
    pub by_month: MonthBucketMap,
    pub malformed_dates: usize,
    pub out_of_window: usize,
}

/// Accepts plain dates, RFC 3339 timestamps and naive timestamps.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(stamp.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|stamp| stamp.date())
}

pub fn month_key(raw: &str, mode: ParseMode) -> anyhow::Result<MonthKey> {
    if let Some(date) = parse_date(raw) {
        return Ok(MonthKey::Parsed(date.format("%Y-%m").to_string()));
    }
    match mode {
        ParseMode::Lenient => Ok(MonthKey::Fallback(raw.chars().take(7).collect())),
        ParseMode::Strict => bail!("unparseable date '{raw}'"),
    }
}

/// The `count` calendar months ending with the month of `today`, oldest first.
pub fn trailing_months(today: NaiveDate, count: usize) -> Vec<String> {
    let first = month_start(today);
    (0..count)
        .rev()
        .filter_map(|back| first.checked_sub_months(Months::new(back as u32)))
        .map(|date| date.format("%Y-%m").to_string())
        .collect()
}

/// First day of the oldest month in a trailing window.
pub fn window_floor(today: NaiveDate, count: usize) -> NaiveDate {
    let first = month_start(today);
    let back = count.saturating_sub(1) as u32;
    first.checked_sub_months(Months::new(back)).unwrap_or(first)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Buckets records into a fixed window. Every window month appears even when
/// it has no rows; records outside the window are counted and skipped.
pub fn bucket_window<R: BranchActivity>(
    records: &[R],
    months: &[String],
    mode: ParseMode,
) -> anyhow::Result<Buckets> {
    let mut buckets = Buckets::default();
    for month in months {
        buckets.by_month.insert(month.clone(), BTreeMap::new());
    }

    for record in records {
        let key = month_key(record.date_str(), mode)?;
        if key.is_fallback() {
            buckets.malformed_dates += 1;
        }
        let Some(slot) = buckets.by_month.get_mut(&key.into_string()) else {
            buckets.out_of_window += 1;
            continue;
        };

        let branch = record.branch_key();
        *slot.entry(branch.to_string()).or_default() += record.weight();
        buckets.totals.add(branch, record.weight());
    }

    Ok(buckets)
}
