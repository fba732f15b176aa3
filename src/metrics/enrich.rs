//! Per-PR metrics derived from fetched sub-resources.

use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use crate::business_time::business_days_to_merge;
use crate::github::api_types::{ApiComment, ApiPullRequest, ApiTestReport, ApiTimelineEvent};

use super::{Category, PullRequestMetrics};

/// Markers CI bots put in comments about a failed check.
const CI_FAILURE_MARKERS: &[&str] = &[":x:", "\u{274c}", "FAILURE"];

const EVENT_COMMITTED: &str = "committed";
const EVENT_FORCE_PUSHED: &str = "head_ref_force_pushed";

fn markdown_link() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\((https?://[^)\s]+)\)").expect("valid pattern"))
}

/// URL of the first markdown link (`[text](http://...)`) in a comment body.
pub fn first_link_url(body: &str) -> Option<&str> {
  markdown_link()
    .captures(body)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str())
}

/// A CI failure comment carries a failure marker and a link to the build.
pub fn is_ci_failure(comment: &ApiComment) -> bool {
  comment.body.as_deref().is_some_and(|body| {
    CI_FAILURE_MARKERS.iter().any(|m| body.contains(m)) && first_link_url(body).is_some()
  })
}

/// Build URLs linked from CI failure comments, in comment order, deduplicated.
pub fn ci_failure_links(comments: &[ApiComment]) -> Vec<String> {
  let mut seen = HashSet::new();
  comments
    .iter()
    .filter(|c| is_ci_failure(c))
    .filter_map(|c| c.body.as_deref().and_then(first_link_url))
    .filter(|url| seen.insert(url.to_string()))
    .map(String::from)
    .collect()
}

pub fn category(pr: &ApiPullRequest) -> Category {
  if pr
    .user
    .as_ref()
    .and_then(|u| u.user_type.as_deref())
    .is_some_and(|t| t == "Bot")
  {
    return Category::Bot;
  }

  match pr.author_association.as_deref() {
    Some("OWNER") | Some("MEMBER") | Some("COLLABORATOR") => Category::Maintainer,
    Some("CONTRIBUTOR") | Some("FIRST_TIME_CONTRIBUTOR") | Some("FIRST_TIMER") | Some("NONE") => {
      Category::Contributor
    }
    _ => Category::Unknown,
  }
}

fn distinct_commenters(comments: &[ApiComment]) -> usize {
  comments
    .iter()
    .filter_map(|c| c.user.as_ref().map(|u| u.login.as_str()))
    .collect::<HashSet<_>>()
    .len()
}

fn count_events(events: &[ApiTimelineEvent], names: &[&str]) -> usize {
  events
    .iter()
    .filter(|e| e.event.as_deref().is_some_and(|name| names.contains(&name)))
    .count()
}

/// Sorted, deduplicated `Class.method` names of failed cases.
pub fn failing_tests(reports: &[ApiTestReport]) -> Vec<String> {
  reports
    .iter()
    .flat_map(|r| &r.suites)
    .flat_map(|s| &s.cases)
    .filter(|c| c.is_failure())
    .map(|c| c.full_name())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

/// Assemble the outbound record. `None` sub-resources mean "unknown" and
/// propagate to the counts derived from them.
pub fn build_metrics(
  pr: &ApiPullRequest,
  comments: Option<&[ApiComment]>,
  timeline: Option<&[ApiTimelineEvent]>,
  reports: &[ApiTestReport],
) -> PullRequestMetrics {
  PullRequestMetrics {
    number: pr.number,
    title: pr.title.clone(),
    author: pr.user.as_ref().map(|u| u.login.clone()),
    created_at: pr.created_at,
    merged_at: pr.merged_at,
    updated_at: pr.updated_at.clone(),
    category: category(pr),
    business_days_to_merge: business_days_to_merge(pr.created_at, pr.merged_at),
    commenters: comments.map(distinct_commenters),
    comments: comments.map(<[ApiComment]>::len),
    pushes: timeline.map(|t| count_events(t, &[EVENT_COMMITTED, EVENT_FORCE_PUSHED])),
    force_pushes: timeline.map(|t| count_events(t, &[EVENT_FORCE_PUSHED])),
    ci_failures: comments.map(|c| c.iter().filter(|c| is_ci_failure(c)).count()),
    failing_tests: failing_tests(reports),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn comment(login: &str, body: &str) -> ApiComment {
    serde_json::from_value(json!({"id": 1, "user": {"login": login}, "body": body})).unwrap()
  }

  fn pr(extra: serde_json::Value) -> ApiPullRequest {
    let mut base = json!({
      "number": 10,
      "title": "Add feature",
      "user": {"login": "alice", "type": "User"},
      "author_association": "MEMBER",
      "created_at": "2024-01-01T09:00:00Z",
      "merged_at": "2024-01-01T17:00:00Z",
      "updated_at": "2024-01-02T00:00:00Z"
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
      base.extend(extra.clone());
    }
    serde_json::from_value(base).unwrap()
  }

  #[test]
  fn test_first_link_url() {
    let body = ":x: Gradle check result for abc123: [FAILURE](https://build.ci.opensearch.org/job/gradle-check/31000/) see [logs](https://x/y)";
    assert_eq!(
      first_link_url(body),
      Some("https://build.ci.opensearch.org/job/gradle-check/31000/")
    );
    assert_eq!(first_link_url("no links [here](ftp://x)"), None);
    assert_eq!(first_link_url("plain https://x/y"), None);
  }

  #[test]
  fn test_ci_failure_links_dedup() {
    let comments = vec![
      comment("bot", ":x: result: [FAILURE](https://ci/job/1/)"),
      comment("bob", "LGTM [docs](https://docs/)"),
      comment("bot", ":x: result: [FAILURE](https://ci/job/1/)"),
      comment("bot", "\u{274c} result: [FAILURE](https://ci/job/2/)"),
      comment("bot", ":white_check_mark: result: [SUCCESS](https://ci/job/3/)"),
    ];

    assert_eq!(
      ci_failure_links(&comments),
      vec!["https://ci/job/1/", "https://ci/job/2/"]
    );
  }

  #[test]
  fn test_marker_without_link_is_not_ci_failure() {
    let comments = vec![
      comment("eve", "I saw a FAILURE locally, can you rebase?"),
      comment("frank", ":x: not sure about this naming"),
      comment("ci-bot", ":x: check [FAILURE](https://ci/job/4/)"),
    ];

    let metrics = build_metrics(&pr(json!({})), Some(comments.as_slice()), None, &[]);

    assert_eq!(metrics.ci_failures, Some(1));
    assert_eq!(ci_failure_links(&comments), vec!["https://ci/job/4/"]);
    assert!(!is_ci_failure(&comments[0]));
  }

  #[test]
  fn test_category() {
    assert_eq!(category(&pr(json!({}))), Category::Maintainer);
    assert_eq!(
      category(&pr(json!({"author_association": "FIRST_TIME_CONTRIBUTOR"}))),
      Category::Contributor
    );
    assert_eq!(
      category(&pr(json!({"user": {"login": "dependabot[bot]", "type": "Bot"}}))),
      Category::Bot
    );
    assert_eq!(
      category(&pr(json!({"author_association": null}))),
      Category::Unknown
    );
  }

  #[test]
  fn test_build_metrics() {
    let comments = vec![
      comment("alice", "please review"),
      comment("bob", "looks good"),
      comment("bob", "one nit"),
      comment("ci-bot", ":x: check [FAILURE](https://ci/job/9/)"),
    ];
    let timeline: Vec<ApiTimelineEvent> = serde_json::from_value(json!([
      {"event": "committed"},
      {"event": "commented"},
      {"event": "head_ref_force_pushed"},
      {"event": "committed"},
      {}
    ]))
    .unwrap();
    let report: ApiTestReport = serde_json::from_value(json!({
      "suites": [
        {"cases": [{"className": "A", "name": "b", "status": "FAILED"}]},
        {"cases": [{"className": "A", "name": "b", "status": "REGRESSION"},
                   {"className": "A", "name": "a", "status": "FIXED"}]}
      ]
    }))
    .unwrap();

    let metrics = build_metrics(
      &pr(json!({})),
      Some(comments.as_slice()),
      Some(timeline.as_slice()),
      &[report],
    );

    assert_eq!(metrics.business_days_to_merge, Some(1.0));
    assert_eq!(metrics.commenters, Some(3));
    assert_eq!(metrics.comments, Some(4));
    assert_eq!(metrics.pushes, Some(3));
    assert_eq!(metrics.force_pushes, Some(1));
    assert_eq!(metrics.ci_failures, Some(1));
    assert_eq!(metrics.failing_tests, vec!["A.b"]);
    assert_eq!(metrics.author.as_deref(), Some("alice"));
  }

  #[test]
  fn test_build_metrics_unknowns() {
    let metrics = build_metrics(&pr(json!({"merged_at": null})), None, None, &[]);

    assert_eq!(metrics.business_days_to_merge, None);
    assert_eq!(metrics.commenters, None);
    assert_eq!(metrics.comments, None);
    assert_eq!(metrics.pushes, None);
    assert_eq!(metrics.ci_failures, None);
    assert!(metrics.failing_tests.is_empty());
  }
}
