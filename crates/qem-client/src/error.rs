use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{method} {url} → {status}")]
  Status {
    method: &'static str,
    url:    String,
    status: StatusCode,
  },

  #[error("xml error: {0}")]
  Xml(String),
}

impl Error {
  pub(crate) fn status(method: &'static str, url: &str, status: StatusCode) -> Self {
    Self::Status {
      method,
      url: url.to_string(),
      status,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
