//! Accepting the bot's review for incidents whose tests are green.

use std::fmt;

use tracing::{error, info, warn};

use crate::{
  error::GateError,
  gate::QualityGate,
  source::{
    AggregateJobSource, ApprovalOutcome, CommentSource, DashboardIncident,
    JobResultSource, ReviewApprover, Token,
  },
};

/// An incident and the release request the review belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncReq {
  pub incident: u64,
  pub request:  u64,
}

impl fmt::Display for IncReq {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "SUSE:Maintenance:{}:{}", self.incident, self.request)
  }
}

impl IncReq {
  /// The incident and its release request, if it has one.
  pub fn from_incident(incident: &DashboardIncident) -> Option<Self> {
    incident.record.rr_number.map(|request| Self {
      incident: incident.record.number,
      request,
    })
  }
}

/// Incidents with an open `qam-openqa` review.
pub fn in_qam_review(incidents: &[DashboardIncident]) -> Vec<IncReq> {
  incidents
    .iter()
    .filter(|i| i.record.in_review_qam)
    .filter_map(IncReq::from_incident)
    .collect()
}

pub struct Approver<'a, J, C, G, A> {
  gate:       QualityGate<'a, J, C>,
  aggregates: &'a G,
  approver:   &'a A,
  token:      &'a Token,
  dry:        bool,
}

impl<'a, J, C, G, A> Approver<'a, J, C, G, A>
where
  J: JobResultSource,
  C: CommentSource,
  G: AggregateJobSource,
  A: ReviewApprover,
{
  pub fn new(
    gate: QualityGate<'a, J, C>,
    aggregates: &'a G,
    approver: &'a A,
    token: &'a Token,
    dry: bool,
  ) -> Self {
    Self {
      gate,
      aggregates,
      approver,
      token,
      dry,
    }
  }

  /// Whether every incident job, and every aggregate job when the incident
  /// asks for aggregate tests, passed or was waived.
  pub async fn approvable(&self, inc: IncReq) -> bool {
    match self.gate.evaluate(inc.incident, self.token).await {
      Ok(verdict) if verdict.has_failures => {
        info!("{inc} has at least one failed job in incident tests");
        return false;
      }
      Ok(_) => {}
      Err(GateError::NoResults(_)) => {
        info!("{inc} has no job results yet");
        return false;
      }
      Err(e) => {
        error!("Cannot evaluate {inc}: {e}");
        return false;
      }
    }

    match self.aggregates.requires_aggregate(inc.incident, self.token).await {
      Ok(false) => return true,
      Ok(true) => {}
      Err(e) => {
        warn!("Cannot read job settings of {inc}: {e}");
        return false;
      }
    }

    let results = match self.aggregates.aggregate_jobs(inc.incident, self.token).await {
      Ok(results) if results.is_empty() => {
        info!("Aggregate missing for {inc}");
        return false;
      }
      Ok(results) => results,
      Err(e) => {
        error!("Cannot read aggregate results of {inc}: {e}");
        return false;
      }
    };

    if self.gate.judge(inc.incident, results).await.has_failures {
      info!("{inc} has at least one failed job in aggregate tests");
      return false;
    }
    true
  }

  /// Approve every approvable incident in `increqs`.
  ///
  /// Returns 0 when every approval went through (or nothing had to be done),
  /// 1 otherwise.
  pub async fn run(&self, increqs: &[IncReq]) -> i32 {
    info!("Start approving incidents");

    let mut to_approve = Vec::new();
    for inc in increqs {
      if self.approvable(*inc).await {
        to_approve.push(*inc);
      }
    }

    info!("Incidents to approve:");
    for inc in &to_approve {
      info!("* {inc}");
    }

    let mut overall = true;
    if !self.dry {
      for inc in &to_approve {
        info!("Accepting review for {inc}");
        match self.approver.approve(inc.incident, inc.request).await {
          ApprovalOutcome::Accepted => {}
          ApprovalOutcome::AlreadyAccepted => {
            info!("Request {} likely already approved, ignoring", inc.request)
          }
          ApprovalOutcome::Rejected => overall = false,
        }
      }
    }

    info!("End of bot run");
    if overall { 0 } else { 1 }
  }
}
