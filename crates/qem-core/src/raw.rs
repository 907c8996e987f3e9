//! Raw incident records as delivered by SMELT.
//!
//! These mirror the upstream JSON shape and are never mutated; everything the
//! bot acts on is derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Requests and reviews ────────────────────────────────────────────────────

/// A `{ "name": ... }` wrapper, as SMELT uses for statuses, groups, packages
/// and repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Named {
  pub name: String,
}

impl Named {
  pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

/// One review attached to a release request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
  #[serde(default)]
  pub assigned_by_group: Option<Named>,
  pub status:            Named,
}

/// A release request for an incident together with its reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
  pub request_id: u64,
  pub status:     Named,
  #[serde(default)]
  pub review_set: Vec<ReviewRecord>,
}

// ─── Incident ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIncident {
  pub project:      String,
  pub number:       u64,
  #[serde(default)]
  pub emu:          bool,
  #[serde(default)]
  pub packages:     Vec<Named>,
  #[serde(default)]
  pub repositories: Vec<Named>,
  #[serde(default)]
  pub request_set:  Vec<RequestRecord>,
  /// Customer release date. Any truthy value marks the incident embargoed.
  #[serde(default)]
  pub crd:          Option<Value>,
  #[serde(default)]
  pub priority:     Option<i64>,
}

impl RawIncident {
  pub fn package_names(&self) -> Vec<String> {
    self.packages.iter().map(|p| p.name.clone()).collect()
  }

  pub fn channel_names(&self) -> Vec<String> {
    self.repositories.iter().map(|r| r.name.clone()).collect()
  }

  /// Whether the embargo marker is set to anything other than an empty value.
  pub fn is_embargoed(&self) -> bool { self.crd.as_ref().is_some_and(truthy) }
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}
