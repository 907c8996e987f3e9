//! HTTP implementations of the `qem-core` collaborator traits.
//!
//! One client per upstream service. All of them share a single
//! [`reqwest::Client`] built by [`http_client`], which is `Arc`-based and
//! cheap to clone.

pub mod dashboard;
pub mod error;
pub mod obs;
pub mod openqa;
pub mod repohash;
pub mod smelt;

use std::time::Duration;

pub use dashboard::DashboardClient;
pub use error::{Error, Result};
pub use obs::{ObsClient, ObsConfig};
pub use openqa::OpenQaClient;
pub use repohash::RepoHashClient;
pub use smelt::SmeltClient;

const TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by every service client.
pub fn http_client() -> Result<reqwest::Client> {
  Ok(reqwest::Client::builder().timeout(TIMEOUT).build()?)
}

/// `base` and `path` joined by exactly one `/`.
pub(crate) fn join(base: &str, path: &str) -> String {
  format!(
    "{}/{}",
    base.trim_end_matches('/'),
    path.trim_start_matches('/')
  )
}
