//! Coarse business-time arithmetic for merge latency.
//!
//! Every weekday is worth a flat 8 hours and weekends are worth nothing. There
//! is no holiday calendar and all dates are taken in UTC. The rule is:
//!
//! - start and end on the same date: the whole hours between them, at most 8
//!   (0 on a weekend)
//! - otherwise: 8 hours for the start date and for every date in between, plus
//!   the whole hours from midnight to `end` on the end date, at most 8
//!
//! Only weekdays earn credit in either case. Historical reports depend on this
//! definition staying put.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};

pub const HOURS_PER_DAY: i64 = 8;

/// Whole business hours between `start` and `end`, `None` if `end` is earlier.
pub fn business_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<i64> {
  if start > end {
    return None;
  }

  let start_date = start.date_naive();
  let end_date = end.date_naive();

  if start_date == end_date {
    if !is_weekday(start_date) {
      return Some(0);
    }
    return Some((end - start).num_hours().min(HOURS_PER_DAY));
  }

  let mut hours = 0;
  let mut day = start_date;
  while day < end_date {
    if is_weekday(day) {
      hours += HOURS_PER_DAY;
    }
    day = day.succ_opt()?;
  }

  if is_weekday(end_date) {
    let since_midnight = i64::from(end.num_seconds_from_midnight() / 3600);
    hours += since_midnight.min(HOURS_PER_DAY);
  }

  Some(hours)
}

/// Business days (8-hour units) between `start` and `end`.
pub fn business_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<f64> {
  business_hours(start, end).map(|hours| hours as f64 / HOURS_PER_DAY as f64)
}

/// Business days from open to merge; unknown when either timestamp is missing.
pub fn business_days_to_merge(
  created_at: Option<DateTime<Utc>>,
  merged_at: Option<DateTime<Utc>>,
) -> Option<f64> {
  business_days(created_at?, merged_at?)
}

fn is_weekday(date: NaiveDate) -> bool {
  !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
