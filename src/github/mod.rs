//! GitHub REST access: transport seam, pagination, typed records and the
//! cached client used by the metrics pipeline.

pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod pagination;
pub mod transport;

pub use cached_client::CachedGitHubClient;
pub use client::GitHubClient;
pub use pagination::{Completeness, FetchResult};
pub use transport::{RawResponse, ReqwestTransport, Transport};
