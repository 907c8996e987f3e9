//! Collaborator traits for the services the bot talks to.
//!
//! The traits are implemented over HTTP by `qem-client` and by in-memory
//! fakes in tests. Core logic depends on these abstractions only.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  error::LookupError,
  raw::RawIncident,
  sync::SyncRecord,
};

// ─── Shared types ────────────────────────────────────────────────────────────

/// Authorization token for the QEM dashboard.
#[derive(Clone)]
pub struct Token(pub String);

impl Token {
  /// The `Authorization` header value the dashboard expects.
  pub fn header_value(&self) -> String { format!("Token {}", self.0) }
}

impl std::fmt::Debug for Token {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("Token(***)")
  }
}

/// The outcome of one openQA job as stored by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
  pub job_id: u64,
  pub status: String,
}

impl JobResult {
  pub fn is_failure(&self) -> bool { self.status != "passed" }
}

/// A free-text comment on an openQA job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
  #[serde(default)]
  pub text: String,
}

/// An incident as the dashboard stores it: the synced record plus the
/// scheduling priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardIncident {
  #[serde(flatten)]
  pub record:   SyncRecord,
  #[serde(default)]
  pub priority: Option<i64>,
}

/// What happened when accepting a review on the build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
  Accepted,
  /// The review had already been accepted by someone else.
  AlreadyAccepted,
  Rejected,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Source of active raw incidents (SMELT).
pub trait IncidentSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn active_incidents(
    &self,
  ) -> impl Future<Output = Result<Vec<RawIncident>, Self::Error>> + Send + '_;
}

/// Maximum published revision for a set of repositories.
pub trait RevisionLookup: Send + Sync {
  /// Return the highest revision among `repos` (`(product, version)` pairs)
  /// built for `arch` in `project`.
  ///
  /// Fails with [`LookupError::NoRepoFound`] when a repository is missing.
  fn max_revision<'a>(
    &'a self,
    repos: &'a [(String, String)],
    arch: &'a str,
    project: &'a str,
  ) -> impl Future<Output = Result<u64, LookupError>> + Send + 'a;
}

/// Job results the dashboard has recorded for an incident.
pub trait JobResultSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn jobs_for_incident<'a>(
    &'a self,
    incident_id: u64,
    token: &'a Token,
  ) -> impl Future<Output = Result<Vec<JobResult>, Self::Error>> + Send + 'a;
}

/// Aggregate (update) test runs covering an incident.
pub trait AggregateJobSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether any of the incident's job settings also asks for aggregate
  /// tests.
  fn requires_aggregate<'a>(
    &'a self,
    incident_id: u64,
    token: &'a Token,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Results of the most recent aggregate runs that include the incident.
  ///
  /// Empty when no aggregate run includes it yet.
  fn aggregate_jobs<'a>(
    &'a self,
    incident_id: u64,
    token: &'a Token,
  ) -> impl Future<Output = Result<Vec<JobResult>, Self::Error>> + Send + 'a;
}

/// Comments attached to openQA jobs.
pub trait CommentSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn comments_for_job(
    &self,
    job_id: u64,
  ) -> impl Future<Output = Result<Vec<Comment>, Self::Error>> + Send + '_;
}

/// The dashboard's incident table.
pub trait DashboardSink: Send + Sync {
  /// Replace the dashboard's view of the active incidents with `records`.
  ///
  /// Returns a process status: 0 on success, non-zero otherwise. Retrying is
  /// up to the implementation, bounded by `retry`.
  fn update_incidents<'a>(
    &'a self,
    token: &'a Token,
    records: &'a [SyncRecord],
    retry: u32,
  ) -> impl Future<Output = i32> + Send + 'a;
}

/// Incidents as the dashboard currently knows them.
pub trait DashboardIncidents: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn incidents<'a>(
    &'a self,
    token: &'a Token,
  ) -> impl Future<Output = Result<Vec<DashboardIncident>, Self::Error>> + Send + 'a;

  /// A single incident by number.
  fn incident<'a>(
    &'a self,
    number: u64,
    token: &'a Token,
  ) -> impl Future<Output = Result<DashboardIncident, Self::Error>> + Send + 'a;
}

/// Accepts the bot's review of a release request.
pub trait ReviewApprover: Send + Sync {
  fn approve(
    &self,
    incident: u64,
    request: u64,
  ) -> impl Future<Output = ApprovalOutcome> + Send + '_;
}
