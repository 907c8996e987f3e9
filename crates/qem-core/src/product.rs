//! Product configurations and the openQA job settings they schedule.
//!
//! A product file describes how to test one product: per-incident flavors
//! (one job per incident) and an aggregate flavor (one job testing every
//! incident that touches the product at once). Each becomes a
//! [`ProductConf`] variant.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{error::ConfigError, incident::Incident};

/// Settings of one openQA job, ready to be posted.
pub type JobSettings = BTreeMap<String, String>;

/// Issue-settings key → repository it tracks, per flavor.
pub type RepoMap = BTreeMap<String, BTreeMap<String, ProdVer>>;

/// Jobs whose settings mention public-cloud keys run on public
/// infrastructure and must never see embargoed incidents.
pub fn filter_embargoed(settings: &BTreeMap<String, String>) -> bool {
  settings.keys().any(|k| k.starts_with("PUBLIC"))
}

/// A product and version, written `product:version` in configs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProdVer {
  pub product: String,
  pub version: String,
}

impl ProdVer {
  pub fn parse(spec: &str) -> Result<Self, ConfigError> {
    match spec.split_once(':') {
      Some((product, version)) if !product.is_empty() && !version.is_empty() => {
        Ok(Self {
          product: product.to_string(),
          version: version.to_string(),
        })
      }
      _ => Err(ConfigError::InvalidRepo(spec.to_string())),
    }
  }
}

// ─── Config files ────────────────────────────────────────────────────────────

/// One product configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductFile {
  pub product:   String,
  #[serde(default)]
  pub settings:  BTreeMap<String, String>,
  #[serde(default)]
  pub incidents: Option<IncidentsSection>,
  #[serde(default)]
  pub aggregate: Option<AggregateSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentsSection {
  #[serde(rename = "FLAVOR")]
  pub flavors: BTreeMap<String, FlavorConf>,
}

/// How one incident flavor is scheduled.
#[derive(Debug, Clone, Deserialize)]
pub struct FlavorConf {
  pub archs:             Vec<String>,
  /// `*_TEST_ISSUES` setting → `product:version` it tracks.
  pub issues:            BTreeMap<String, String>,
  /// Incident must ship one of these packages (prefix match).
  #[serde(default)]
  pub packages:          Vec<String>,
  /// Incident must ship none of these packages (prefix match).
  #[serde(default)]
  pub excluded_packages: Vec<String>,
  /// Only livepatch incidents are scheduled.
  #[serde(default)]
  pub livepatch:         bool,
  #[serde(default)]
  pub priority:          Option<i64>,
  #[serde(default)]
  pub settings:          BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateSection {
  #[serde(rename = "FLAVOR")]
  pub flavor:      String,
  pub archs:       Vec<String>,
  pub test_issues: BTreeMap<String, String>,
  /// Scheduled at most once a day.
  #[serde(default)]
  pub onetime:     bool,
}

impl ProductFile {
  pub fn into_confs(self) -> Vec<ProductConf> {
    let mut confs = Vec::new();
    if let Some(incidents) = self.incidents {
      confs.push(ProductConf::Incidents(IncidentsConf {
        product:  self.product.clone(),
        settings: self.settings.clone(),
        flavors:  incidents.flavors,
      }));
    }
    if let Some(aggregate) = self.aggregate {
      confs.push(ProductConf::Aggregate(AggregateConf {
        product:     self.product,
        settings:    self.settings,
        flavor:      aggregate.flavor,
        archs:       aggregate.archs,
        test_issues: aggregate.test_issues,
        onetime:     aggregate.onetime,
      }));
    }
    confs
  }
}

// ─── Variants ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IncidentsConf {
  pub product:  String,
  pub settings: BTreeMap<String, String>,
  pub flavors:  BTreeMap<String, FlavorConf>,
}

#[derive(Debug, Clone)]
pub struct AggregateConf {
  pub product:     String,
  pub settings:    BTreeMap<String, String>,
  pub flavor:      String,
  pub archs:       Vec<String>,
  pub test_issues: BTreeMap<String, String>,
  pub onetime:     bool,
}

/// A schedulable product configuration.
#[derive(Debug, Clone)]
pub enum ProductConf {
  Incidents(IncidentsConf),
  Aggregate(AggregateConf),
}

impl ProductConf {
  pub fn product(&self) -> &str {
    match self {
      Self::Incidents(c) => &c.product,
      Self::Aggregate(c) => &c.product,
    }
  }

  pub fn settings(&self) -> &BTreeMap<String, String> {
    match self {
      Self::Incidents(c) => &c.settings,
      Self::Aggregate(c) => &c.settings,
    }
  }

  pub fn filter_embargoed(&self) -> bool { filter_embargoed(self.settings()) }

  /// Parse every `product:version` reference, keyed by flavor.
  pub fn normalize_repos(&self) -> Result<RepoMap, ConfigError> {
    match self {
      Self::Incidents(c) => c
        .flavors
        .iter()
        .map(|(flavor, data)| {
          Ok::<_, ConfigError>((flavor.clone(), parse_issues(&data.issues)?))
        })
        .collect(),
      Self::Aggregate(c) => {
        Ok(BTreeMap::from([(c.flavor.clone(), parse_issues(&c.test_issues)?)]))
      }
    }
  }

  /// The openQA jobs this configuration wants for `incidents`.
  ///
  /// `ignore_onetime` leaves out configurations that are scheduled only once
  /// a day.
  pub fn build_schedule(
    &self,
    incidents: &[Incident],
    ci_url: Option<&str>,
    ignore_onetime: bool,
  ) -> Result<Vec<JobSettings>, ConfigError> {
    self.build_schedule_on(incidents, ci_url, ignore_onetime, Utc::now().date_naive())
  }

  /// [`build_schedule`](Self::build_schedule) with an explicit build date.
  pub fn build_schedule_on(
    &self,
    incidents: &[Incident],
    ci_url: Option<&str>,
    ignore_onetime: bool,
    today: NaiveDate,
  ) -> Result<Vec<JobSettings>, ConfigError> {
    let repos = self.normalize_repos()?;
    let version = self
      .settings()
      .get("VERSION")
      .ok_or_else(|| ConfigError::MissingSetting {
        product: self.product().to_string(),
        key:     "VERSION",
      })?;
    let candidates: Vec<&Incident> = incidents
      .iter()
      .filter(|i| {
        let hidden = i.embargoed && self.filter_embargoed();
        if hidden {
          debug!("{i} is embargoed, not scheduling it for {}", self.product());
        }
        !hidden
      })
      .collect();

    let mut jobs = match self {
      Self::Incidents(c) => c.schedule(&candidates, &repos, version),
      Self::Aggregate(c) if c.onetime && ignore_onetime => Vec::new(),
      Self::Aggregate(c) => c.schedule(&candidates, &repos, version, today),
    };
    if let Some(url) = ci_url {
      for job in &mut jobs {
        job.insert("__CI_JOB_URL".into(), url.to_string());
      }
    }
    Ok(jobs)
  }
}

fn parse_issues(
  issues: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ProdVer>, ConfigError> {
  issues
    .iter()
    .map(|(key, spec)| Ok::<_, ConfigError>((key.clone(), ProdVer::parse(spec)?)))
    .collect()
}

impl IncidentsConf {
  fn schedule(
    &self,
    incidents: &[&Incident],
    repos: &RepoMap,
    version: &str,
  ) -> Vec<JobSettings> {
    let mut jobs = Vec::new();
    for (flavor, data) in &self.flavors {
      let issues = &repos[flavor];
      for arch in &data.archs {
        for inc in incidents {
          if data.livepatch && !inc.is_livepatch {
            continue;
          }
          if !data.packages.is_empty() && !inc.contains_package(&data.packages) {
            continue;
          }
          if inc.contains_package(&data.excluded_packages) {
            continue;
          }

          let matched: Vec<&String> = issues
            .iter()
            .filter(|(_, pv)| inc.has_channel(&pv.product, &pv.version, arch))
            .map(|(key, _)| key)
            .collect();
          if matched.is_empty() {
            continue;
          }
          let Some(revision) = inc.revision_with_fallback(arch, version) else {
            continue;
          };

          let mut job = self.settings.clone();
          job.extend(data.settings.clone());
          job.insert("ARCH".into(), arch.clone());
          job.insert("FLAVOR".into(), flavor.clone());
          job.insert("INCIDENT_ID".into(), inc.id.to_string());
          job.insert("REPOHASH".into(), revision.to_string());
          let package = inc.packages.first().map_or("", String::as_str);
          job.insert("BUILD".into(), format!(":{}:{package}", inc.id));
          for key in matched {
            job.insert(key.clone(), inc.id.to_string());
          }
          if let Some(rrid) = &inc.request_review_id {
            job.insert("RRID".into(), rrid.clone());
          }
          if let Some(priority) = data.priority {
            job.insert("_PRIORITY".into(), priority.to_string());
          }
          jobs.push(job);
        }
      }
    }
    jobs
  }
}

impl AggregateConf {
  fn schedule(
    &self,
    incidents: &[&Incident],
    repos: &RepoMap,
    version: &str,
    today: NaiveDate,
  ) -> Vec<JobSettings> {
    let issues = &repos[&self.flavor];
    let mut jobs = Vec::new();
    for arch in &self.archs {
      let mut per_key: BTreeMap<&String, BTreeSet<u64>> = BTreeMap::new();
      let mut hashed: BTreeSet<String> = BTreeSet::new();

      for inc in incidents {
        for (key, pv) in issues {
          if inc.has_channel(&pv.product, &pv.version, arch) {
            per_key.entry(key).or_default().insert(inc.id);
            if let Some(rev) = inc.revision_with_fallback(arch, version) {
              hashed.insert(format!("{}{rev}", inc.project));
            }
          }
        }
      }
      if per_key.is_empty() {
        debug!("No incidents for {} {arch}", self.product);
        continue;
      }

      let mut job = self.settings.clone();
      job.insert("ARCH".into(), arch.clone());
      job.insert("FLAVOR".into(), self.flavor.clone());
      job.insert("BUILD".into(), format!("{}-1", today.format("%Y%m%d")));
      job.insert("REPOHASH".into(), repohash(&hashed));
      for (key, ids) in per_key {
        let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
        job.insert(key.clone(), ids.join(","));
      }
      jobs.push(job);
    }
    jobs
  }
}

/// Digest identifying the exact set of incident builds in an aggregate.
fn repohash(entries: &BTreeSet<String>) -> String {
  let mut hasher = Sha256::new();
  for entry in entries {
    hasher.update(entry.as_bytes());
  }
  hex::encode(hasher.finalize())
}
