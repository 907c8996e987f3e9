//! Error types for `qem-core`.
//!
//! Each failure kind is its own enum so callers can tell a malformed incident
//! (skip it) from a missing test result (fail the gate). [`Error`] unifies
//! them for callers that only need to report.

use thiserror::Error;

/// Why an [`Incident`](crate::incident::Incident) could not be built.
#[derive(Debug, Error)]
pub enum IncidentError {
  #[error("incident {0} has no usable channels")]
  EmptyChannels(String),

  #[error("incident {0} has no packages")]
  EmptyPackages(String),

  #[error("no repository found for incident {project}: {source}")]
  NoRepoFound {
    project: String,
    #[source]
    source:  LookupError,
  },
}

/// Failure reported by a [`RevisionLookup`](crate::source::RevisionLookup).
#[derive(Debug, Error)]
pub enum LookupError {
  #[error("no repository matches {0}")]
  NoRepoFound(String),

  #[error("revision lookup failed: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Why the quality gate could not reach a verdict.
#[derive(Debug, Error)]
pub enum GateError {
  #[error("no job results found for incident {0}")]
  NoResults(u64),

  #[error("job result source failed: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A product configuration that cannot be used for scheduling.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid repository {0:?}, expected product:version")]
  InvalidRepo(String),

  #[error("product {product} has no {key} setting")]
  MissingSetting { product: String, key: &'static str },
}

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("project {0:?} does not end in an incident number")]
  InvalidProject(String),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Incident(#[from] IncidentError),

  #[error(transparent)]
  Gate(#[from] GateError),

  #[error(transparent)]
  Sync(#[from] SyncError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("dashboard error: {0}")]
  Dashboard(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("incident source error: {0}")]
  IncidentSource(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
