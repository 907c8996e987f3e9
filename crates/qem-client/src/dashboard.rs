//! Client for the QEM dashboard JSON API.

use qem_core::{
  source::{
    AggregateJobSource, DashboardIncident, DashboardIncidents, DashboardSink,
    JobResult, JobResultSource, Token,
  },
  sync::SyncRecord,
};
use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, error, info};

use crate::{
  error::{Error, Result},
  join,
};

/// Job settings the dashboard keeps per incident and release request.
#[derive(Debug, Clone, Deserialize)]
struct IncidentSettings {
  #[serde(rename = "withAggregate", default)]
  with_aggregate: bool,
  #[serde(default)]
  settings:       JobSettingsRef,
}

/// The part of an incident's job settings that names its release request.
#[derive(Debug, Clone, Default, Deserialize)]
struct JobSettingsRef {
  #[serde(rename = "RRID")]
  rrid: Option<String>,
}

/// Job settings of one aggregate run.
#[derive(Debug, Clone, Deserialize)]
struct UpdateSettings {
  id:    u64,
  build: String,
}

/// Settings of the newest release request only; settings that name no
/// request are always kept.
fn latest_request(settings: Vec<IncidentSettings>) -> Vec<IncidentSettings> {
  let Some(latest) = settings
    .iter()
    .filter_map(|s| s.settings.rrid.as_ref())
    .max()
    .cloned()
  else {
    return settings;
  };
  settings
    .into_iter()
    .filter(|s| s.settings.rrid.as_ref().is_none_or(|rrid| *rrid == latest))
    .collect()
}

/// Ids of every run built on the same day as the newest one.
///
/// Builds are named `YYYYMMDD-N`; runs scheduled once a day share the date
/// with the regular ones.
fn latest_day(mut settings: Vec<UpdateSettings>) -> Vec<u64> {
  settings.sort_by(|a, b| b.build.cmp(&a.build));
  let Some(newest) = settings.first() else {
    return Vec::new();
  };
  let day = newest
    .build
    .get(..newest.build.len().saturating_sub(2))
    .unwrap_or_default()
    .to_string();
  settings
    .into_iter()
    .filter(|s| s.build.contains(&day))
    .map(|s| s.id)
    .collect()
}

#[derive(Clone)]
pub struct DashboardClient {
  client:   Client,
  base_url: String,
}

impl DashboardClient {
  pub fn new(client: Client, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into(),
    }
  }

  fn url(&self, path: &str) -> String { join(&self.base_url, &format!("api/{path}")) }

  async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &Token) -> Result<T> {
    let url = self.url(path);
    debug!("GET {url}");
    let resp = self
      .client
      .get(&url)
      .header(AUTHORIZATION, token.header_value())
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(Error::status("GET", &url, resp.status()));
    }
    Ok(resp.json().await?)
  }
}

impl DashboardIncidents for DashboardClient {
  type Error = Error;

  /// `GET /api/incidents`
  async fn incidents<'a>(&'a self, token: &'a Token) -> Result<Vec<DashboardIncident>> {
    self.get_json("incidents", token).await
  }

  /// `GET /api/incidents/{number}`
  async fn incident<'a>(&'a self, number: u64, token: &'a Token) -> Result<DashboardIncident> {
    self.get_json(&format!("incidents/{number}"), token).await
  }
}

impl AggregateJobSource for DashboardClient {
  type Error = Error;

  /// `GET /api/incident_settings/{id}`, newest release request only.
  async fn requires_aggregate<'a>(&'a self, incident_id: u64, token: &'a Token) -> Result<bool> {
    let settings: Vec<IncidentSettings> = self
      .get_json(&format!("incident_settings/{incident_id}"), token)
      .await?;
    Ok(latest_request(settings).iter().any(|s| s.with_aggregate))
  }

  /// `GET /api/update_settings/{id}`, then `GET /api/jobs/update/{id}` for
  /// every run of the newest build day.
  async fn aggregate_jobs<'a>(
    &'a self,
    incident_id: u64,
    token: &'a Token,
  ) -> Result<Vec<JobResult>> {
    let settings: Vec<UpdateSettings> = self
      .get_json(&format!("update_settings/{incident_id}"), token)
      .await?;

    let mut results = Vec::new();
    for id in latest_day(settings) {
      let jobs: Vec<JobResult> = self.get_json(&format!("jobs/update/{id}"), token).await?;
      if jobs.is_empty() {
        debug!("Job setting {id} not found for incident {incident_id}");
      }
      results.extend(jobs);
    }
    Ok(results)
  }
}

impl JobResultSource for DashboardClient {
  type Error = Error;

  /// `GET /api/jobs/incident/{id}`
  async fn jobs_for_incident<'a>(
    &'a self,
    incident_id: u64,
    token: &'a Token,
  ) -> Result<Vec<JobResult>> {
    self
      .get_json(&format!("jobs/incident/{incident_id}"), token)
      .await
  }
}

impl DashboardSink for DashboardClient {
  /// `PATCH /api/incidents`
  ///
  /// A non-200 answer is retried up to `retry` more times; a transport
  /// failure is not retried. Returns 0 on success, 1 on a transport failure
  /// and 2 once the retries are used up.
  async fn update_incidents<'a>(
    &'a self,
    token: &'a Token,
    records: &'a [SyncRecord],
    retry: u32,
  ) -> i32 {
    let url = self.url("incidents");
    for _ in 0..=retry {
      let sent = self
        .client
        .patch(&url)
        .header(AUTHORIZATION, token.header_value())
        .json(records)
        .send()
        .await;

      match sent {
        Err(e) => {
          error!("PATCH {url} failed: {e}");
          return 1;
        }
        Ok(resp) if resp.status() == StatusCode::OK => {
          info!("Smelt Incidents updated");
          return 0;
        }
        Ok(resp) => error!(
          "Smelt Incidents were not synced to dashboard: error {}",
          resp.status().as_u16()
        ),
      }
    }
    2
  }
}
