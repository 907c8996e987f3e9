//! The quality gate over an incident's openQA results.
//!
//! A failed job counts against the incident unless a reviewer marked it
//! acceptable with a comment of the form
//! `@review:acceptable_for:incident_<id>:<reason>`.

use regex::Regex;
use tracing::{Level, debug, enabled, info, warn};

use crate::{
  error::GateError,
  source::{Comment, CommentSource, JobResult, JobResultSource, Token},
};

/// Matches comments marking a job as an acceptable failure for `incident`.
pub fn acceptable_for_incident(incident: u64) -> Regex {
  Regex::new(&format!(r"^@review:acceptable_for:incident_{incident}:(.+)"))
    .expect("acceptable-for-incident pattern is valid for any integer")
}

/// Whether any of `comments` marks the job acceptable for `incident`.
pub fn has_acceptable_comment(comments: &[Comment], incident: u64) -> bool {
  let pattern = acceptable_for_incident(incident);
  comments.iter().any(|c| pattern.is_match(&c.text))
}

/// Result of [`QualityGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
  pub has_failures: bool,
  /// Failed jobs with no acceptable-failure comment.
  pub failures:     Vec<JobResult>,
}

pub struct QualityGate<'a, J, C> {
  jobs:     &'a J,
  comments: &'a C,
}

impl<'a, J, C> QualityGate<'a, J, C>
where
  J: JobResultSource,
  C: CommentSource,
{
  pub fn new(jobs: &'a J, comments: &'a C) -> Self { Self { jobs, comments } }

  /// Decide whether `incident_id` has failures that nobody has waived.
  ///
  /// An incident without any results is an error, not a pass.
  pub async fn evaluate(
    &self,
    incident_id: u64,
    token: &Token,
  ) -> Result<GateVerdict, GateError> {
    let results = self
      .jobs
      .jobs_for_incident(incident_id, token)
      .await
      .map_err(|e| GateError::Source(Box::new(e)))?;

    if results.is_empty() {
      return Err(GateError::NoResults(incident_id));
    }
    Ok(self.judge(incident_id, results).await)
  }

  /// Classify `results` already fetched for `incident_id`, such as the jobs
  /// of an aggregate run.
  pub async fn judge(&self, incident_id: u64, results: Vec<JobResult>) -> GateVerdict {
    let mut failures = Vec::new();
    for result in results.into_iter().filter(JobResult::is_failure) {
      if !self.is_waived(result.job_id, incident_id).await {
        failures.push(result);
      }
    }

    if !failures.is_empty() {
      info!(
        "Found {} failed jobs for incident {incident_id}:",
        failures.len()
      );
      if enabled!(Level::DEBUG) {
        for job in &failures {
          debug!(
            "Job {} is not marked as acceptable for incident {incident_id}",
            job.job_id
          );
        }
      }
    }

    GateVerdict {
      has_failures: !failures.is_empty(),
      failures,
    }
  }

  async fn is_waived(&self, job_id: u64, incident_id: u64) -> bool {
    match self.comments.comments_for_job(job_id).await {
      Ok(comments) => has_acceptable_comment(&comments, incident_id),
      Err(e) => {
        warn!("Cannot read comments of job {job_id}: {e}");
        false
      }
    }
  }
}
