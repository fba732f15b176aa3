//! Weekly and flaky-test summaries, written as JSON.

use chrono::{Datelike, Duration, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use super::PullRequestMetrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
  /// Monday of the week the PRs were created in
  pub week_start: NaiveDate,
  pub pull_requests: usize,
  pub mean_business_days_to_merge: Option<f64>,
  pub mean_commenters: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlakyTest {
  pub name: String,
  pub pull_requests: usize,
}

fn week_start(date: NaiveDate) -> NaiveDate {
  date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
  let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
  (count > 0).then(|| sum / count as f64)
}

/// Bucket records by creation week, oldest week first. Records without a
/// creation date are left out. Means are taken over known values only.
pub fn weekly(records: &[PullRequestMetrics]) -> Vec<WeeklySummary> {
  let mut weeks: BTreeMap<NaiveDate, Vec<&PullRequestMetrics>> = BTreeMap::new();
  for record in records {
    if let Some(created) = record.created_at {
      weeks
        .entry(week_start(created.date_naive()))
        .or_default()
        .push(record);
    }
  }

  weeks
    .into_iter()
    .map(|(week_start, group)| WeeklySummary {
      week_start,
      pull_requests: group.len(),
      mean_business_days_to_merge: mean(group.iter().filter_map(|r| r.business_days_to_merge)),
      mean_commenters: mean(
        group
          .iter()
          .filter_map(|r| r.commenters)
          .map(|c| c as f64),
      ),
    })
    .collect()
}

/// How many PRs each failing test showed up in, most frequent first.
pub fn flaky_tests(records: &[PullRequestMetrics]) -> Vec<FlakyTest> {
  let mut counts: HashMap<&str, usize> = HashMap::new();
  for record in records {
    for name in &record.failing_tests {
      *counts.entry(name.as_str()).or_default() += 1;
    }
  }

  let mut tests: Vec<FlakyTest> = counts
    .into_iter()
    .map(|(name, pull_requests)| FlakyTest {
      name: name.to_string(),
      pull_requests,
    })
    .collect();
  tests.sort_by(|a, b| {
    b.pull_requests
      .cmp(&a.pull_requests)
      .then_with(|| a.name.cmp(&b.name))
  });
  tests
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value)
    .map_err(|e| eyre!("Failed to serialize {}: {}", path.display(), e))?;
  std::fs::write(path, json).map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))
}

/// Write `records.json`, `weekly.json` and `flaky_tests.json` into `dir`.
pub fn write_report(dir: &Path, records: &[PullRequestMetrics]) -> Result<()> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create output dir {}: {}", dir.display(), e))?;

  write_json(&dir.join("records.json"), records)?;
  write_json(&dir.join("weekly.json"), &weekly(records))?;
  write_json(&dir.join("flaky_tests.json"), &flaky_tests(records))?;

  info!(dir = %dir.display(), records = records.len(), "Wrote report");
  Ok(())
}
