//! HTTP seam for the GitHub client.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, LINK};
use std::time::Duration;

/// The parts of an HTTP response the fetch layer looks at.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: u16,
  pub body: String,
  /// Next-page cursor from the `Link` header
  pub next: Option<String>,
}

impl RawResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Issues GET requests. One call is exactly one outbound request; no retries.
pub trait Transport: Send + Sync {
  fn get<'a>(
    &'a self,
    url: &'a str,
    query: &'a [(String, String)],
  ) -> BoxFuture<'a, Result<RawResponse>>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
  client: reqwest::Client,
  token: Option<String>,
}

impl ReqwestTransport {
  /// Transport for the primary API host, authenticated when a token is given.
  pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("prtempo/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, token })
  }

  /// Transport for auxiliary hosts, which never receive the API token.
  pub fn anonymous(timeout: Duration) -> Result<Self> {
    Self::new(None, timeout)
  }
}

impl Transport for ReqwestTransport {
  fn get<'a>(
    &'a self,
    url: &'a str,
    query: &'a [(String, String)],
  ) -> BoxFuture<'a, Result<RawResponse>> {
    Box::pin(async move {
      let mut request = self
        .client
        .get(url)
        .header(ACCEPT, "application/vnd.github+json");
      if !query.is_empty() {
        request = request.query(query);
      }
      if let Some(token) = &self.token {
        request = request.bearer_auth(token);
      }

      let response = request
        .send()
        .await
        .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

      let status = response.status().as_u16();
      let next = response
        .headers()
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_next_link);
      let body = response
        .text()
        .await
        .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?;

      Ok(RawResponse { status, body, next })
    })
  }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
///
/// `<https://api.github.com/x?page=2>; rel="next", <...>; rel="last"`
pub fn parse_next_link(header: &str) -> Option<String> {
  header.split(',').find_map(|link| {
    let mut parts = link.split(';');
    let target = parts.next()?.trim();
    let is_next = parts.any(|param| {
      let param = param.trim();
      param
        .strip_prefix("rel=")
        .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
        .unwrap_or(false)
    });

    if is_next {
      target
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .map(String::from)
    } else {
      None
    }
  })
}
