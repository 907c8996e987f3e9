//! Review-request state derivation.
//!
//! Both the incident builder and the dashboard sync records read their review
//! flags from [`resolve`].

use serde::{Deserialize, Serialize};

use crate::raw::RequestRecord;

/// Group whose open review marks an incident as waiting for the openQA bot.
pub const QAM_OPENQA_GROUP: &str = "qam-openqa";

const SELECTABLE: [&str; 4] = ["new", "review", "accepted", "revoked"];

/// Flags derived from an incident's request set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
  pub selected_request_id: Option<u64>,
  pub in_review:           bool,
  pub approved:            bool,
  pub revoked:             bool,
  pub in_review_qam:       bool,
  pub is_active:           bool,
}

impl Default for ReviewState {
  /// The state of an incident without a usable request.
  fn default() -> Self {
    Self {
      selected_request_id: None,
      in_review:           false,
      approved:            false,
      revoked:             false,
      in_review_qam:       false,
      is_active:           true,
    }
  }
}

/// Derive the review state from `requests`.
///
/// The request with the highest id among those in a selectable status wins;
/// input order does not matter.
pub fn resolve(requests: &[RequestRecord]) -> ReviewState {
  let Some(rr) = requests
    .iter()
    .filter(|r| SELECTABLE.contains(&r.status.name.as_str()))
    .max_by_key(|r| r.request_id)
  else {
    return ReviewState::default();
  };

  let status = rr.status.name.as_str();
  let has_reviews = !rr.review_set.is_empty();

  let in_review = has_reviews && status == "review";
  let revoked = has_reviews && status == "revoked";
  let approved = matches!(status, "accepted" | "new");
  // Only the first qam-openqa review in set order counts.
  let in_review_qam = rr
    .review_set
    .iter()
    .find(|r| {
      r.assigned_by_group
        .as_ref()
        .is_some_and(|g| g.name == QAM_OPENQA_GROUP)
    })
    .is_some_and(|r| matches!(r.status.name.as_str(), "review" | "new"));

  ReviewState {
    selected_request_id: Some(rr.request_id),
    in_review,
    approved,
    revoked,
    in_review_qam,
    is_active: !(approved || revoked),
  }
}
