//! Serde-deserializable types matching GitHub and CI server responses.
//!
//! Cached payloads are stored raw; they are validated into these shapes when
//! read back, so a schema change never invalidates the cache itself.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The kinds of records the fetch layer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
  PullRequest,
  Comment,
  TimelineEvent,
  TestReport,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::PullRequest => "pull request",
      Self::Comment => "comment",
      Self::TimelineEvent => "timeline event",
      Self::TestReport => "test report",
    }
  }
}

// ============================================================================
// GitHub API
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
  pub login: String,
  #[serde(rename = "type")]
  pub user_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPullRequest {
  pub number: u64,
  #[serde(default)]
  pub title: String,
  pub user: Option<ApiUser>,
  pub state: Option<String>,
  pub author_association: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
  pub merged_at: Option<DateTime<Utc>>,
  /// Kept verbatim: it is the cache watermark for this PR's sub-resources.
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiComment {
  pub id: u64,
  pub user: Option<ApiUser>,
  pub body: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

/// Timeline items are heterogeneous; only the event name is common to all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTimelineEvent {
  pub event: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// CI test report (Jenkins `testReport/api/json`)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiTestReport {
  #[serde(default)]
  pub suites: Vec<ApiTestSuite>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiTestSuite {
  #[serde(default)]
  pub cases: Vec<ApiTestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTestCase {
  #[serde(rename = "className", default)]
  pub class_name: String,
  #[serde(default)]
  pub name: String,
  pub status: Option<String>,
}

impl ApiTestCase {
  pub fn is_failure(&self) -> bool {
    matches!(self.status.as_deref(), Some("FAILED") | Some("REGRESSION"))
  }

  pub fn full_name(&self) -> String {
    if self.class_name.is_empty() {
      self.name.clone()
    } else {
      format!("{}.{}", self.class_name, self.name)
    }
  }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate each element of an array payload, dropping the ones that don't fit.
pub fn decode_items<T: DeserializeOwned>(payload: &Value, kind: ResourceKind) -> Vec<T> {
  let Some(items) = payload.as_array() else {
    warn!("Expected a list of {} records", kind.as_str());
    return Vec::new();
  };

  items
    .iter()
    .filter_map(|item| match T::deserialize(item) {
      Ok(record) => Some(record),
      Err(e) => {
        warn!("Skipping malformed {}: {}", kind.as_str(), e);
        None
      }
    })
    .collect()
}

/// Validate an object payload.
pub fn decode_one<T: DeserializeOwned>(payload: &Value, kind: ResourceKind) -> Option<T> {
  match T::deserialize(payload) {
    Ok(record) => Some(record),
    Err(e) => {
      warn!("Malformed {}: {}", kind.as_str(), e);
      None
    }
  }
}
