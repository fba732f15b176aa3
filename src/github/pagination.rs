//! Cursor-following page walker.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::transport::Transport;
use crate::cache::Fetched;

/// Why a paginated walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
  /// The server ran out of pages (empty page or no next cursor)
  Complete,
  /// The page limit was reached while a next cursor was still present
  PageLimit,
  /// A page request failed; `status` is `None` for transport errors
  Failed { status: Option<u16> },
}

/// All items of a paginated resource, in server order.
#[derive(Debug, Clone)]
pub struct FetchResult {
  pub items: Vec<Value>,
  pub pages: u32,
  pub completeness: Completeness,
}

impl FetchResult {
  pub fn is_complete(&self) -> bool {
    self.completeness == Completeness::Complete
  }
}

impl From<FetchResult> for Fetched {
  /// Page-limit truncation is deterministic and may be cached; failures not.
  fn from(result: FetchResult) -> Self {
    let payload = Value::Array(result.items);
    match result.completeness {
      Completeness::Failed { .. } => Fetched::transient(payload),
      Completeness::Complete | Completeness::PageLimit => Fetched::complete(payload),
    }
  }
}

/// Walk a paginated resource starting at `initial_url`.
///
/// `query` is only sent with the first request; cursor URLs are already fully
/// parameterized. At most `page_limit` requests are issued.
pub async fn fetch_all<T: Transport + ?Sized>(
  transport: &T,
  initial_url: &str,
  query: &[(String, String)],
  page_limit: u32,
) -> FetchResult {
  let mut items = Vec::new();
  let mut pages = 0;
  let mut url = initial_url.to_string();
  let mut query = query;

  let completeness = loop {
    if pages >= page_limit {
      info!(url = initial_url, pages, "Stopping at page limit");
      break Completeness::PageLimit;
    }

    debug!(url = %url, "GET");
    let response = match transport.get(&url, query).await {
      Ok(response) => response,
      Err(e) => {
        warn!(url = %url, "Error fetching page: {}", e);
        break Completeness::Failed { status: None };
      }
    };
    pages += 1;

    if !response.is_success() {
      warn!(url = %url, status = response.status, "Error fetching page");
      break Completeness::Failed {
        status: Some(response.status),
      };
    }

    let page = match serde_json::from_str::<Value>(&response.body) {
      Ok(Value::Array(page)) => page,
      Ok(_) => {
        warn!(url = %url, "Page body is not a JSON array");
        break Completeness::Failed {
          status: Some(response.status),
        };
      }
      Err(e) => {
        warn!(url = %url, "Failed to parse page: {}", e);
        break Completeness::Failed {
          status: Some(response.status),
        };
      }
    };

    // An empty page ends the walk even if the server still sends a cursor.
    if page.is_empty() {
      break Completeness::Complete;
    }
    items.extend(page);

    match response.next {
      Some(next) => {
        url = next;
        query = &[];
      }
      None => break Completeness::Complete,
    }
  };

  info!(
    url = initial_url,
    pages,
    items = items.len(),
    "Loaded paginated resource"
  );

  FetchResult {
    items,
    pages,
    completeness,
  }
}
