//! Client for the SMELT incident feed.

use qem_core::{raw::RawIncident, source::IncidentSource};
use reqwest::Client;
use tracing::info;

use crate::error::{Error, Result};

/// Reads the active incidents from a SMELT export returning a JSON array of
/// incident records.
#[derive(Clone)]
pub struct SmeltClient {
  client: Client,
  url:    String,
}

impl SmeltClient {
  pub fn new(client: Client, url: impl Into<String>) -> Self {
    Self {
      client,
      url: url.into(),
    }
  }
}

impl IncidentSource for SmeltClient {
  type Error = Error;

  async fn active_incidents(&self) -> Result<Vec<RawIncident>> {
    let resp = self.client.get(&self.url).send().await?;
    if !resp.status().is_success() {
      return Err(Error::status("GET", &self.url, resp.status()));
    }

    let incidents: Vec<RawIncident> = resp.json().await?;
    info!("Fetched {} active incidents from SMELT", incidents.len());
    Ok(incidents)
  }
}
