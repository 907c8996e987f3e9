//! Client for the openQA REST API.

use qem_core::source::{Comment, CommentSource};
use reqwest::{Client, StatusCode};

use crate::{
  error::{Error, Result},
  join,
};

#[derive(Clone)]
pub struct OpenQaClient {
  client:   Client,
  base_url: String,
}

impl OpenQaClient {
  pub fn new(client: Client, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into(),
    }
  }
}

impl CommentSource for OpenQaClient {
  type Error = Error;

  /// `GET /api/v1/jobs/{id}/comments`. A job openQA no longer knows has no
  /// comments.
  async fn comments_for_job(&self, job_id: u64) -> Result<Vec<Comment>> {
    let url = join(&self.base_url, &format!("api/v1/jobs/{job_id}/comments"));
    let resp = self.client.get(&url).send().await?;

    match resp.status() {
      StatusCode::NOT_FOUND => Ok(Vec::new()),
      s if s.is_success() => Ok(resp.json().await?),
      s => Err(Error::status("GET", &url, s)),
    }
  }
}
