//! Per-PR metrics and the reports built from them.

pub mod enrich;
pub mod report;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::github::api_types::ApiPullRequest;
use crate::github::transport::Transport;
use crate::github::CachedGitHubClient;

pub use report::{flaky_tests, weekly, write_report, FlakyTest, WeeklySummary};

/// Who opened the pull request, relative to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
  Maintainer,
  Contributor,
  Bot,
  Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestMetrics {
  pub number: u64,
  pub title: String,
  pub author: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
  pub merged_at: Option<DateTime<Utc>>,
  pub updated_at: Option<String>,
  pub category: Category,
  pub business_days_to_merge: Option<f64>,
  pub commenters: Option<usize>,
  pub comments: Option<usize>,
  pub pushes: Option<usize>,
  pub force_pushes: Option<usize>,
  pub ci_failures: Option<usize>,
  pub failing_tests: Vec<String>,
}

/// Fetch the sub-resources of one PR and derive its metrics.
///
/// A sub-resource that cannot be fetched is logged and its metrics come out
/// unknown; the PR itself is never dropped.
pub async fn enrich_pull_request<T: Transport, S: CacheStorage>(
  client: &CachedGitHubClient<T, S>,
  pr: &ApiPullRequest,
) -> PullRequestMetrics {
  let comments = client.comments(pr).await.unwrap_or_else(|e| {
    warn!(pr = pr.number, "Error fetching comments: {}", e);
    None
  });
  let timeline = client.timeline(pr).await.unwrap_or_else(|e| {
    warn!(pr = pr.number, "Error fetching timeline: {}", e);
    None
  });

  let mut reports = Vec::new();
  if let Some(comments) = &comments {
    for build_url in enrich::ci_failure_links(comments) {
      match client.test_report(pr, &build_url).await {
        Ok(Some(report)) => reports.push(report),
        Ok(None) => {}
        Err(e) => warn!(pr = pr.number, %build_url, "Error fetching test report: {}", e),
      }
    }
  }

  enrich::build_metrics(pr, comments.as_deref(), timeline.as_deref(), &reports)
}

/// Enrich every PR in order, one at a time.
pub async fn collect<T: Transport, S: CacheStorage>(
  client: &CachedGitHubClient<T, S>,
  prs: &[ApiPullRequest],
) -> Vec<PullRequestMetrics> {
  let mut records = Vec::with_capacity(prs.len());
  for (i, pr) in prs.iter().enumerate() {
    info!(pr = pr.number, "Processing PR {}/{}", i + 1, prs.len());
    records.push(enrich_pull_request(client, pr).await);
  }
  records
}
