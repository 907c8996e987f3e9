//! The canonical [`Incident`] and its builder.
//!
//! An incident is built once per run from either a raw SMELT record or the
//! dashboard's synced copy of it, and is never modified afterwards.

use std::{collections::HashMap, fmt};

use futures::{StreamExt as _, stream};
use tracing::{debug, info};

use crate::{
  channel::{self, ArchVer, Channel},
  error::IncidentError,
  raw::RawIncident,
  review,
  revision::{DEFAULT_CONCURRENCY, RevisionResolver},
  source::{DashboardIncident, RevisionLookup},
};

const KERNEL_PREFIXES: [&str; 3] = ["kernel-default", "kernel-source", "kernel-azure"];
const LIVEPATCH_PREFIXES: [&str; 2] = ["kgraft-patch-", "kernel-livepatch"];

/// Never satisfies a package requirement, despite its livepatch-like name.
const LIVEPATCH_TOOLS: &str = "kernel-livepatch-tools";

// ─── Incident ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Incident {
  pub id:                u64,
  pub project:           String,
  /// `"{project}:{request id}"`, when a release request exists.
  pub request_review_id: Option<String>,
  /// Not yet in review; tests run against staging builds.
  pub staging:           bool,
  pub embargoed:         bool,
  pub priority:          Option<i64>,
  pub channels:          Vec<Channel>,
  /// Package names, shortest first.
  pub packages:          Vec<String>,
  pub is_emu:            bool,
  pub revisions:         HashMap<ArchVer, u64>,
  pub is_livepatch:      bool,
}

impl Incident {
  /// The revision published for `arch`/`version`.
  ///
  /// An unversioned SLE 12 module is stored under version `12` while the
  /// product asking may be any of `12`, `12-SP1` … `12-SP5`, so those fall
  /// back to the `12` entry.
  pub fn revision_with_fallback(&self, arch: &str, version: &str) -> Option<u64> {
    let exact = ArchVer::new(arch, version);
    let found = self.revisions.get(&exact).or_else(|| {
      version
        .starts_with("12")
        .then(|| self.revisions.get(&ArchVer::new(arch, "12")))
        .flatten()
    });
    if found.is_none() {
      debug!("Incident {} does not have {arch} arch in {version}", self.id);
    }
    found.copied()
  }

  /// Whether any package starts with one of `requires`.
  pub fn contains_package<S: AsRef<str>>(&self, requires: &[S]) -> bool {
    self.packages.iter().any(|package| {
      package != LIVEPATCH_TOOLS
        && requires.iter().any(|r| package.starts_with(r.as_ref()))
    })
  }

  /// Whether the incident ships a given `(product, version, arch)` channel.
  pub fn has_channel(&self, product: &str, version: &str, arch: &str) -> bool {
    self.channels.iter().any(|c| {
      c.product == product && c.version == version && c.architecture == arch
    })
  }
}

impl fmt::Display for Incident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.request_review_id {
      Some(rrid) => f.write_str(rrid),
      None => f.write_str(&self.project),
    }
  }
}

/// A kernel package in the incident means a full kernel update, never a
/// livepatch, whatever else it ships.
pub fn is_livepatch<S: AsRef<str>>(packages: &[S]) -> bool {
  let mut livepatch = false;
  for package in packages.iter().map(AsRef::as_ref) {
    if KERNEL_PREFIXES.iter().any(|p| package.starts_with(p)) {
      return false;
    }
    if LIVEPATCH_PREFIXES.iter().any(|p| package.starts_with(p)) {
      livepatch = true;
    }
  }
  livepatch
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Fields common to both input shapes.
struct Parts<'r> {
  id:            u64,
  project:       &'r str,
  request_id:    Option<u64>,
  in_review:     bool,
  embargoed:     bool,
  priority:      Option<i64>,
  channel_names: &'r [String],
  packages:      Vec<String>,
  is_emu:        bool,
}

/// Builds [`Incident`]s, resolving revisions through a [`RevisionLookup`].
pub struct IncidentBuilder<'a, L> {
  lookup:      &'a L,
  concurrency: usize,
}

impl<'a, L: RevisionLookup> IncidentBuilder<'a, L> {
  pub fn new(lookup: &'a L) -> Self {
    Self {
      lookup,
      concurrency: DEFAULT_CONCURRENCY,
    }
  }

  /// Bound on concurrent lookups, both per incident and across a batch.
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  /// Build an incident from a raw SMELT record.
  pub async fn build(&self, raw: &RawIncident) -> Result<Incident, IncidentError> {
    let state = review::resolve(&raw.request_set);
    let channel_names = raw.channel_names();
    self
      .assemble(Parts {
        id:            raw.number,
        project:       &raw.project,
        request_id:    state.selected_request_id,
        in_review:     state.in_review,
        embargoed:     raw.is_embargoed(),
        priority:      raw.priority,
        channel_names: &channel_names,
        packages:      raw.package_names(),
        is_emu:        raw.emu,
      })
      .await
  }

  /// Build an incident from the dashboard's record of it.
  pub async fn build_from_dashboard(
    &self,
    incident: &DashboardIncident,
  ) -> Result<Incident, IncidentError> {
    let record = &incident.record;
    self
      .assemble(Parts {
        id:            record.number,
        project:       &record.project,
        request_id:    record.rr_number,
        in_review:     record.in_review,
        embargoed:     record.embargoed,
        priority:      incident.priority,
        channel_names: &record.channels,
        packages:      record.packages.clone(),
        is_emu:        record.emu,
      })
      .await
  }

  async fn assemble(&self, parts: Parts<'_>) -> Result<Incident, IncidentError> {
    let project = parts.project.to_string();

    let channels = channel::parse(parts.channel_names);
    if channels.is_empty() {
      return Err(IncidentError::EmptyChannels(project));
    }

    let mut packages = parts.packages;
    if packages.is_empty() {
      return Err(IncidentError::EmptyPackages(project));
    }
    packages.sort_by_key(String::len);

    let revisions = RevisionResolver::new(self.lookup)
      .with_concurrency(self.concurrency)
      .resolve(&channels, &project)
      .await
      .map_err(|source| IncidentError::NoRepoFound {
        project: project.clone(),
        source,
      })?;

    let is_livepatch = is_livepatch(&packages);
    let request_review_id = parts.request_id.map(|rr| format!("{project}:{rr}"));

    Ok(Incident {
      id: parts.id,
      project,
      request_review_id,
      staging: !parts.in_review,
      embargoed: parts.embargoed,
      priority: parts.priority,
      channels,
      packages,
      is_emu: parts.is_emu,
      revisions,
      is_livepatch,
    })
  }

  /// Build every dashboard incident, skipping the ones that cannot be built.
  ///
  /// Incidents are independent; a failure is logged and affects only that
  /// incident. Output order is not significant.
  pub async fn build_all(&self, incidents: &[DashboardIncident]) -> Vec<Incident> {
    stream::iter(incidents)
      .map(|i| async move { (i, self.build_from_dashboard(i).await) })
      .buffer_unordered(self.concurrency)
      .filter_map(|(i, built)| async move {
        match built {
          Ok(incident) => Some(incident),
          Err(e) => {
            log_skipped(&i.record.project, &e);
            None
          }
        }
      })
      .collect()
      .await
  }
}

fn log_skipped(project: &str, err: &IncidentError) {
  match err {
    IncidentError::NoRepoFound { source, .. } => {
      info!("Project {project} can't calculate repohash {source} .. skipping")
    }
    IncidentError::EmptyChannels(_) => {
      info!("Project {project} has empty channels - check incident in SMELT")
    }
    IncidentError::EmptyPackages(_) => {
      info!("Project {project} has empty packages - check incident in SMELT")
    }
  }
}
