//! Flat incident records pushed to the QEM dashboard.
//!
//! Channel names are passed through unfiltered; the dashboard filters them
//! itself.

use serde::{Deserialize, Serialize};

use crate::{error::SyncError, raw::RawIncident, review};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
  #[serde(rename = "isActive")]
  pub is_active:     bool,
  pub project:       String,
  pub number:        u64,
  #[serde(default)]
  pub emu:           bool,
  #[serde(default)]
  pub packages:      Vec<String>,
  #[serde(default)]
  pub channels:      Vec<String>,
  #[serde(rename = "inReview")]
  pub in_review:     bool,
  pub approved:      bool,
  pub rr_number:     Option<u64>,
  #[serde(rename = "inReviewQAM")]
  pub in_review_qam: bool,
  #[serde(default)]
  pub embargoed:     bool,
}

/// The incident number is the last `:`-separated part of the project name.
pub fn incident_number(project: &str) -> Result<u64, SyncError> {
  project
    .rsplit(':')
    .next()
    .and_then(|n| n.parse().ok())
    .ok_or_else(|| SyncError::InvalidProject(project.to_string()))
}

pub fn to_record(raw: &RawIncident) -> Result<SyncRecord, SyncError> {
  let state = review::resolve(&raw.request_set);
  Ok(SyncRecord {
    is_active:     state.is_active,
    project:       raw.project.clone(),
    number:        incident_number(&raw.project)?,
    emu:           raw.emu,
    packages:      raw.package_names(),
    channels:      raw.channel_names(),
    in_review:     state.in_review,
    approved:      state.approved,
    rr_number:     state.selected_request_id,
    in_review_qam: state.in_review_qam,
    embargoed:     raw.is_embargoed(),
  })
}
