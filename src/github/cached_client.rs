//! Cached GitHub client that wraps GitHubClient with transparent caching.

use color_eyre::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{CacheKey, CacheLayer, CacheStatsSnapshot, CacheStorage, Fetched};
use crate::config::{Config, FetchConfig};

use super::api_types::{
  decode_items, decode_one, ApiComment, ApiPullRequest, ApiTestReport, ApiTimelineEvent,
  ResourceKind,
};
use super::client::{test_report_url, GitHubClient};
use super::pagination::Completeness;
use super::transport::{ReqwestTransport, Transport};

/// GitHub client with a sub-resource cache.
///
/// Pull request listings are always fetched live; they carry the watermarks
/// that decide whether the cached comments, timelines and CI reports of each
/// PR are still current.
pub struct CachedGitHubClient<T: Transport, S: CacheStorage> {
  inner: GitHubClient<T>,
  cache: CacheLayer<S>,
  ci_delay: Duration,
}

impl<S: CacheStorage> CachedGitHubClient<ReqwestTransport, S> {
  pub fn new(config: &Config, storage: S) -> Result<Self> {
    let inner = GitHubClient::new(config)?;
    Ok(Self::with_parts(
      inner,
      CacheLayer::new(storage),
      config.fetch.ci_request_delay(),
    ))
  }
}

impl<T: Transport, S: CacheStorage> CachedGitHubClient<T, S> {
  pub fn with_parts(inner: GitHubClient<T>, cache: CacheLayer<S>, ci_delay: Duration) -> Self {
    Self {
      inner,
      cache,
      ci_delay,
    }
  }

  /// Pull requests selected by the fetch filters: one PR if a number is set,
  /// otherwise the closed PRs created since the configured date.
  pub async fn pull_requests(&self, filter: &FetchConfig) -> Vec<ApiPullRequest> {
    if let Some(number) = filter.pr_number {
      return self.inner.get_pull_request(number).await;
    }

    let (prs, completeness) = self.inner.list_pull_requests(filter.since).await;
    match completeness {
      Completeness::Complete => {}
      Completeness::PageLimit => warn!(
        page_limit = filter.page_limit,
        "Hit page limit while listing pull requests. Data may be incomplete."
      ),
      Completeness::Failed { status } => warn!(
        ?status,
        "Listing pull requests failed part way. Data is incomplete."
      ),
    }
    info!(count = prs.len(), "Loaded pull requests");
    prs
  }

  /// Issue comments of a PR, or `None` when the PR has no watermark.
  pub async fn comments(&self, pr: &ApiPullRequest) -> Result<Option<Vec<ApiComment>>> {
    let Some(key) = self.key(pr, self.inner.comments_url(pr.number)) else {
      return Ok(None);
    };

    let payload = self
      .cache
      .fetch_sub_resource(&key, |url| {
        let url = url.to_string();
        async move { Ok(Fetched::from(self.inner.fetch_pages(&url).await)) }
      })
      .await?;

    Ok(Some(decode_items(&payload, ResourceKind::Comment)))
  }

  /// Timeline events of a PR, or `None` when the PR has no watermark.
  pub async fn timeline(&self, pr: &ApiPullRequest) -> Result<Option<Vec<ApiTimelineEvent>>> {
    let Some(key) = self.key(pr, self.inner.timeline_url(pr.number)) else {
      return Ok(None);
    };

    let payload = self
      .cache
      .fetch_sub_resource(&key, |url| {
        let url = url.to_string();
        async move { Ok(Fetched::from(self.inner.fetch_pages(&url).await)) }
      })
      .await?;

    Ok(Some(decode_items(&payload, ResourceKind::TimelineEvent)))
  }

  /// Test report of a CI build linked from one of the PR's comments.
  ///
  /// The configured delay is applied before every request to the CI server.
  pub async fn test_report(
    &self,
    pr: &ApiPullRequest,
    build_url: &str,
  ) -> Result<Option<ApiTestReport>> {
    let Some(report_url) = test_report_url(build_url) else {
      warn!(pr = pr.number, build_url, "Unusable CI build link");
      return Ok(None);
    };
    let Some(key) = self.key(pr, report_url) else {
      return Ok(None);
    };

    let payload = self
      .cache
      .fetch_sub_resource(&key, |url| {
        let url = url.to_string();
        async move {
          tokio::time::sleep(self.ci_delay).await;
          Ok(self.inner.fetch_ci_json(&url).await)
        }
      })
      .await?;

    Ok(decode_one(&payload, ResourceKind::TestReport))
  }

  pub fn stats(&self) -> CacheStatsSnapshot {
    self.cache.stats()
  }

  pub fn clear_cache(&self) -> Result<()> {
    self.cache.clear()
  }

  fn key(&self, pr: &ApiPullRequest, url: String) -> Option<CacheKey> {
    let watermark = pr.updated_at.as_deref()?;
    Some(CacheKey::new(pr.number, url, watermark))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::FileStorage;
  use crate::github::transport::fake::{page, FakeTransport};
  use crate::github::transport::RawResponse;
  use serde_json::json;

  const COMMENTS: &str = "https://api.github.com/repos/o/r/issues/8/comments";
  const REPORT: &str = "https://ci/job/check/77/testReport/api/json";

  fn pr(updated_at: Option<&str>) -> ApiPullRequest {
    serde_json::from_value(json!({
      "number": 8,
      "created_at": "2024-01-08T09:00:00Z",
      "updated_at": updated_at,
    }))
    .unwrap()
  }

  fn client(
    dir: &std::path::Path,
    api: FakeTransport,
    ci: FakeTransport,
  ) -> CachedGitHubClient<FakeTransport, FileStorage> {
    client_with_delay(dir, api, ci, Duration::ZERO)
  }

  fn client_with_delay(
    dir: &std::path::Path,
    api: FakeTransport,
    ci: FakeTransport,
    ci_delay: Duration,
  ) -> CachedGitHubClient<FakeTransport, FileStorage> {
    let inner =
      GitHubClient::with_transports(api, ci, "https://api.github.com", "o", "r", 5).unwrap();
    CachedGitHubClient::with_parts(
      inner,
      CacheLayer::new(FileStorage::open(dir.join("cache"))),
      ci_delay,
    )
  }

  fn report_ci() -> FakeTransport {
    FakeTransport::routes(vec![(
      REPORT,
      RawResponse {
        status: 200,
        body: json!({"suites": [{"cases": [{"className": "A", "name": "b", "status": "FAILED"}]}]})
          .to_string(),
        next: None,
      },
    )])
  }

  fn comments_api() -> FakeTransport {
    FakeTransport::routes(vec![(
      COMMENTS,
      page(
        json!([
          {"id": 1, "user": {"login": "a"}, "body": "first"},
          {"id": 2, "user": {"login": "b"}, "body": "second"}
        ]),
        None,
      ),
    )])
  }

  #[tokio::test]
  async fn test_comments_are_cached_per_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(dir.path(), comments_api(), FakeTransport::routes(vec![]));

    let first = client.comments(&pr(Some("t1"))).await.unwrap().unwrap();
    let second = client.comments(&pr(Some("t1"))).await.unwrap().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(client.inner.transports().0.request_count(), 1);

    client.comments(&pr(Some("t2"))).await.unwrap();
    assert_eq!(client.inner.transports().0.request_count(), 2);

    let stats = client.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.stores, 2);
  }

  #[tokio::test]
  async fn test_second_run_is_network_free() {
    let dir = tempfile::tempdir().unwrap();

    let first_run = client(dir.path(), comments_api(), FakeTransport::routes(vec![]));
    first_run.comments(&pr(Some("t1"))).await.unwrap();

    let second_run = client(dir.path(), comments_api(), FakeTransport::routes(vec![]));
    let comments = second_run.comments(&pr(Some("t1"))).await.unwrap().unwrap();

    assert_eq!(comments.len(), 2);
    assert_eq!(second_run.inner.transports().0.request_count(), 0);
    assert_eq!(second_run.stats().hits, 1);
  }

  #[tokio::test]
  async fn test_missing_watermark_is_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(dir.path(), comments_api(), FakeTransport::routes(vec![]));

    assert!(client.comments(&pr(None)).await.unwrap().is_none());
    assert!(client.timeline(&pr(None)).await.unwrap().is_none());
    assert_eq!(client.inner.transports().0.request_count(), 0);
  }

  #[tokio::test]
  async fn test_test_report_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(dir.path(), FakeTransport::routes(vec![]), report_ci());

    for _ in 0..2 {
      let report = client
        .test_report(&pr(Some("t1")), "https://ci/job/check/77/")
        .await
        .unwrap()
        .unwrap();
      assert_eq!(report.suites[0].cases.len(), 1);
    }
    assert_eq!(client.inner.transports().1.request_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_ci_delay_only_before_network_requests() {
    let dir = tempfile::tempdir().unwrap();
    let delay = Duration::from_secs(2);
    let client = client_with_delay(
      dir.path(),
      FakeTransport::routes(vec![]),
      report_ci(),
      delay,
    );

    let start = tokio::time::Instant::now();
    client
      .test_report(&pr(Some("t1")), "https://ci/job/check/77/")
      .await
      .unwrap();
    assert_eq!(start.elapsed(), delay);

    let start = tokio::time::Instant::now();
    client
      .test_report(&pr(Some("t1")), "https://ci/job/check/77/")
      .await
      .unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(client.inner.transports().1.request_count(), 1);

    let start = tokio::time::Instant::now();
    client.comments(&pr(Some("t1"))).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
  }

  #[tokio::test]
  async fn test_failed_test_report_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(
      dir.path(),
      FakeTransport::routes(vec![]),
      FakeTransport::routes(vec![]),
    );

    for _ in 0..2 {
      let report = client
        .test_report(&pr(Some("t1")), "https://ci/job/check/77/")
        .await
        .unwrap()
        .unwrap();
      assert!(report.suites.is_empty());
    }
    assert_eq!(client.inner.transports().1.request_count(), 2);
    assert_eq!(client.stats().stores, 0);
  }

  #[tokio::test]
  async fn test_pull_requests_single_number() {
    let dir = tempfile::tempdir().unwrap();
    let api = FakeTransport::routes(vec![(
      "https://api.github.com/repos/o/r/pulls/8",
      page(json!({"number": 8, "updated_at": "t1"}), None),
    )]);
    let client = client(dir.path(), api, FakeTransport::routes(vec![]));

    let filter = FetchConfig {
      pr_number: Some(8),
      ..FetchConfig::default()
    };
    let prs = client.pull_requests(&filter).await;

    assert_eq!(prs.len(), 1);
    assert_eq!(
      client.inner.transports().0.requests()[0].0,
      "https://api.github.com/repos/o/r/pulls/8"
    );
  }
}
