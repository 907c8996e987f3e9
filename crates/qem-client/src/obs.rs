//! Accepting reviews on the Open Build Service.

use qem_core::{
  review::QAM_OPENQA_GROUP,
  source::{ApprovalOutcome, ReviewApprover},
};
use reqwest::{Client, StatusCode};
use tracing::{error, info};

use crate::join;

/// Connection settings for the build service API.
#[derive(Debug, Clone)]
pub struct ObsConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
  /// Where the approval decision came from, quoted in the review message.
  pub origin:   String,
}

#[derive(Clone)]
pub struct ObsClient {
  client: Client,
  config: ObsConfig,
}

impl ObsClient {
  pub fn new(client: Client, config: ObsConfig) -> Self { Self { client, config } }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  fn message(&self) -> String {
    format!(
      "Request accepted for '{QAM_OPENQA_GROUP}' based on data in {}",
      self.config.origin
    )
  }
}

impl ReviewApprover for ObsClient {
  /// `POST /request/{id}?cmd=changereviewstate&newstate=accepted&by_group=…`
  async fn approve(&self, incident: u64, request: u64) -> ApprovalOutcome {
    let url = join(&self.config.base_url, &format!("request/{request}"));
    let sent = self
      .auth(self.client.post(&url))
      .query(&[
        ("cmd", "changereviewstate"),
        ("newstate", "accepted"),
        ("by_group", QAM_OPENQA_GROUP),
      ])
      .body(self.message())
      .send()
      .await;

    let resp = match sent {
      Ok(resp) => resp,
      Err(e) => {
        error!("Accepting review of request {request} failed: {e}");
        return ApprovalOutcome::Rejected;
      }
    };

    match resp.status() {
      s if s.is_success() => ApprovalOutcome::Accepted,
      StatusCode::FORBIDDEN => ApprovalOutcome::AlreadyAccepted,
      StatusCode::NOT_FOUND => {
        info!(
          "Request {request} of incident {incident} removed or problem on OBS side: {}",
          resp.text().await.unwrap_or_default()
        );
        ApprovalOutcome::Rejected
      }
      s => {
        error!(
          "Received error {} for request {request} of incident {incident} - problem on OBS side",
          s.as_u16()
        );
        ApprovalOutcome::Rejected
      }
    }
  }
}
