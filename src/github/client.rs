use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::cache::Fetched;
use crate::config::Config;
use crate::github::api_types::{decode_items, decode_one, ApiPullRequest, ResourceKind};
use crate::github::pagination::{self, Completeness, FetchResult};
use crate::github::transport::{ReqwestTransport, Transport};

const PER_PAGE: &str = "100";

/// GitHub REST client for one repository.
///
/// `api` talks to the GitHub API; `ci` talks to CI servers linked from
/// comments and never carries the API token.
pub struct GitHubClient<T: Transport> {
  api: Arc<T>,
  ci: Arc<T>,
  repo_url: String,
  page_limit: u32,
}

impl GitHubClient<ReqwestTransport> {
  pub fn new(config: &Config) -> Result<Self> {
    let timeout = config.fetch.request_timeout();
    let api = ReqwestTransport::new(Config::get_api_token(), timeout)?;
    let ci = ReqwestTransport::anonymous(timeout)?;

    Self::with_transports(
      api,
      ci,
      &config.github.api_host,
      &config.github.owner,
      &config.github.repo,
      config.fetch.page_limit,
    )
  }
}

impl<T: Transport> GitHubClient<T> {
  pub fn with_transports(
    api: T,
    ci: T,
    api_host: &str,
    owner: &str,
    repo: &str,
    page_limit: u32,
  ) -> Result<Self> {
    // Keep owner/repo from escaping the repository path.
    let owner = owner.trim();
    let repo = repo.trim();
    let invalid = |part: &str| part.is_empty() || part.contains('/') || part.contains("..");
    if invalid(owner) || invalid(repo) {
      return Err(eyre!("Invalid repository '{}/{}'", owner, repo));
    }

    let host =
      url::Url::parse(api_host).map_err(|e| eyre!("Invalid API host {}: {}", api_host, e))?;
    let repo_url = format!(
      "{}/repos/{}/{}",
      host.as_str().trim_end_matches('/'),
      owner,
      repo
    );

    Ok(Self {
      api: Arc::new(api),
      ci: Arc::new(ci),
      repo_url,
      page_limit,
    })
  }

  #[cfg(test)]
  pub fn transports(&self) -> (&T, &T) {
    (&self.api, &self.ci)
  }

  pub fn repo_url(&self) -> &str {
    &self.repo_url
  }

  pub fn comments_url(&self, number: u64) -> String {
    format!("{}/issues/{}/comments", self.repo_url, number)
  }

  pub fn timeline_url(&self, number: u64) -> String {
    format!("{}/issues/{}/timeline", self.repo_url, number)
  }

  /// List closed pull requests, newest first, created on or after `since`.
  pub async fn list_pull_requests(
    &self,
    since: Option<NaiveDate>,
  ) -> (Vec<ApiPullRequest>, Completeness) {
    let query = [
      ("state", "closed"),
      ("sort", "created"),
      ("direction", "desc"),
      ("per_page", PER_PAGE),
    ]
    .map(|(k, v)| (k.to_string(), v.to_string()));

    let url = format!("{}/pulls", self.repo_url);
    let result = pagination::fetch_all(self.api.as_ref(), &url, &query, self.page_limit).await;
    let completeness = result.completeness;

    let mut prs: Vec<ApiPullRequest> =
      decode_items(&Value::Array(result.items), ResourceKind::PullRequest);
    if let Some(since) = since {
      // Records without a creation date are kept; their metrics come out unknown.
      prs.retain(|pr| pr.created_at.map_or(true, |c| c.date_naive() >= since));
    }

    (prs, completeness)
  }

  /// Fetch a single pull request. Failures yield an empty list.
  pub async fn get_pull_request(&self, number: u64) -> Vec<ApiPullRequest> {
    let url = format!("{}/pulls/{}", self.repo_url, number);

    let response = match self.api.get(&url, &[]).await {
      Ok(response) => response,
      Err(e) => {
        warn!("Error fetching PR #{}: {}", number, e);
        return Vec::new();
      }
    };
    if !response.is_success() {
      warn!("Error fetching PR #{}: {}", number, response.status);
      return Vec::new();
    }

    serde_json::from_str::<Value>(&response.body)
      .ok()
      .and_then(|payload| decode_one(&payload, ResourceKind::PullRequest))
      .into_iter()
      .collect()
  }

  /// Walk a paginated sub-resource.
  pub async fn fetch_pages(&self, url: &str) -> FetchResult {
    let query = [("per_page".to_string(), PER_PAGE.to_string())];
    pagination::fetch_all(self.api.as_ref(), url, &query, self.page_limit).await
  }

  /// Single-shot JSON fetch from a CI server.
  ///
  /// Any failure, including a body that is not JSON, yields an empty object
  /// that is not worth caching.
  pub async fn fetch_ci_json(&self, url: &str) -> Fetched {
    let empty = || Fetched::transient(Value::Object(Default::default()));

    let response = match self.ci.get(url, &[]).await {
      Ok(response) => response,
      Err(e) => {
        warn!(url, "Error fetching CI report: {}", e);
        return empty();
      }
    };
    if !response.is_success() {
      warn!(url, status = response.status, "Error fetching CI report");
      return empty();
    }

    match serde_json::from_str::<Value>(&response.body) {
      Ok(payload) => Fetched::complete(payload),
      Err(e) => {
        warn!(url, "CI report is not JSON: {}", e);
        empty()
      }
    }
  }
}

impl<T: Transport> Clone for GitHubClient<T> {
  fn clone(&self) -> Self {
    Self {
      api: Arc::clone(&self.api),
      ci: Arc::clone(&self.ci),
      repo_url: self.repo_url.clone(),
      page_limit: self.page_limit,
    }
  }
}

/// URL of the JSON test report for a Jenkins build page.
pub fn test_report_url(build_url: &str) -> Option<String> {
  let mut base = url::Url::parse(build_url).ok()?;
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base.set_query(None);
  base.set_fragment(None);
  base.join("testReport/api/json").ok().map(String::from)
}
