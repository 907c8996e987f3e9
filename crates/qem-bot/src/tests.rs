//! Command runners against in-memory services.

use std::{
  io,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use qem_core::{
  error::LookupError,
  gate::QualityGate,
  product::ProductFile,
  raw::RawIncident,
  source::{
    AggregateJobSource, ApprovalOutcome, Comment, CommentSource,
    DashboardIncident, DashboardIncidents, DashboardSink, IncidentSource,
    JobResult, JobResultSource, ReviewApprover, RevisionLookup, Token,
  },
  sync::{self, SyncRecord},
};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use crate::{
  BotConfig,
  commands::{self, ScheduleOptions},
  load_products,
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

struct Smelt(Vec<RawIncident>);

impl IncidentSource for Smelt {
  type Error = io::Error;

  async fn active_incidents(&self) -> Result<Vec<RawIncident>, io::Error> {
    Ok(self.0.clone())
  }
}

#[derive(Default)]
struct Dashboard {
  incidents: Vec<DashboardIncident>,
  /// Job results for every incident.
  results:   Vec<JobResult>,
  /// Aggregate results; `None` when no incident needs an aggregate.
  aggregate: Option<Vec<JobResult>>,
  pushed:    Mutex<Vec<SyncRecord>>,
  updates:   AtomicUsize,
}

impl DashboardSink for Dashboard {
  async fn update_incidents<'a>(
    &'a self,
    _token: &'a Token,
    records: &'a [SyncRecord],
    _retry: u32,
  ) -> i32 {
    self.updates.fetch_add(1, Ordering::SeqCst);
    self.pushed.lock().unwrap().extend_from_slice(records);
    0
  }
}

impl DashboardIncidents for Dashboard {
  type Error = io::Error;

  async fn incidents<'a>(
    &'a self,
    _token: &'a Token,
  ) -> Result<Vec<DashboardIncident>, io::Error> {
    Ok(self.incidents.clone())
  }

  async fn incident<'a>(
    &'a self,
    number: u64,
    _token: &'a Token,
  ) -> Result<DashboardIncident, io::Error> {
    self
      .incidents
      .iter()
      .find(|i| i.record.number == number)
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such incident"))
  }
}

impl AggregateJobSource for Dashboard {
  type Error = io::Error;

  async fn requires_aggregate<'a>(
    &'a self,
    _incident_id: u64,
    _token: &'a Token,
  ) -> Result<bool, io::Error> {
    Ok(self.aggregate.is_some())
  }

  async fn aggregate_jobs<'a>(
    &'a self,
    _incident_id: u64,
    _token: &'a Token,
  ) -> Result<Vec<JobResult>, io::Error> {
    Ok(self.aggregate.clone().unwrap_or_default())
  }
}

impl JobResultSource for Dashboard {
  type Error = io::Error;

  async fn jobs_for_incident<'a>(
    &'a self,
    _incident_id: u64,
    _token: &'a Token,
  ) -> Result<Vec<JobResult>, io::Error> {
    Ok(self.results.clone())
  }
}

struct NoComments;

impl CommentSource for NoComments {
  type Error = io::Error;

  async fn comments_for_job(&self, _job_id: u64) -> Result<Vec<Comment>, io::Error> {
    Ok(Vec::new())
  }
}

struct Repos(u64);

impl RevisionLookup for Repos {
  async fn max_revision<'a>(
    &'a self,
    _repos: &'a [(String, String)],
    _arch: &'a str,
    _project: &'a str,
  ) -> Result<u64, LookupError> {
    Ok(self.0)
  }
}

#[derive(Default)]
struct Obs(Mutex<Vec<u64>>);

impl ReviewApprover for Obs {
  async fn approve(&self, _incident: u64, request: u64) -> ApprovalOutcome {
    self.0.lock().unwrap().push(request);
    ApprovalOutcome::Accepted
  }
}

fn token() -> Token { Token("secret".into()) }

/// Collects formatted log output.
#[derive(Clone, Default)]
struct Logs(Arc<Mutex<Vec<u8>>>);

impl Logs {
  fn contents(&self) -> String { String::from_utf8(self.0.lock().unwrap().clone()).unwrap() }
}

impl io::Write for Logs {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl<'a> MakeWriter<'a> for Logs {
  type Writer = Logs;

  fn make_writer(&'a self) -> Self::Writer { self.clone() }
}

fn raw(number: u64, packages: &[&str]) -> RawIncident {
  serde_json::from_value(json!({
    "project": format!("SUSE:Maintenance:{number}"),
    "number": number,
    "packages": packages.iter().map(|p| json!({ "name": p })).collect::<Vec<_>>(),
    "repositories": [{ "name": "SUSE:Updates:SLES:15-SP4:x86_64" }],
    "requestSet": [{
      "requestId": 274060,
      "status": { "name": "review" },
      "reviewSet": [{ "assignedByGroup": { "name": "qam-openqa" }, "status": { "name": "review" } }]
    }],
    "crd": null,
    "priority": 600
  }))
  .unwrap()
}

fn dashboard_incident(number: u64, packages: &[&str]) -> DashboardIncident {
  let raw = raw(number, packages);
  DashboardIncident {
    record:   sync::to_record(&raw).unwrap(),
    priority: raw.priority,
  }
}

fn passed(job_id: u64) -> JobResult {
  JobResult {
    job_id,
    status: "passed".into(),
  }
}

fn failed(job_id: u64) -> JobResult {
  JobResult {
    job_id,
    status: "failed".into(),
  }
}

// ─── smelt-sync ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_pushes_records() {
  let smelt = Smelt(vec![raw(1, &["curl"]), raw(2, &["vim"])]);
  let dashboard = Dashboard::default();

  let status = commands::smelt_sync(&smelt, &dashboard, &token(), 2, false)
    .await
    .unwrap();

  assert_eq!(status, 0);
  let pushed = dashboard.pushed.lock().unwrap();
  assert_eq!(pushed.len(), 2);
  assert_eq!(pushed[0].number, 1);
  assert_eq!(pushed[1].rr_number, Some(274060));
}

#[tokio::test]
async fn dry_sync_never_calls_dashboard() {
  let smelt = Smelt(vec![raw(1, &["curl"])]);
  let dashboard = Dashboard::default();

  let status = commands::smelt_sync(&smelt, &dashboard, &token(), 2, true)
    .await
    .unwrap();

  assert_eq!(status, 0);
  assert_eq!(dashboard.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sync_logs_records_at_info() {
  let logs = Logs::default();
  let subscriber = tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_ansi(false)
    .with_writer(logs.clone())
    .finish();
  let _guard = tracing::subscriber::set_default(subscriber);

  let smelt = Smelt(vec![raw(1, &["curl"])]);
  commands::smelt_sync(&smelt, &Dashboard::default(), &token(), 0, true)
    .await
    .unwrap();

  let out = logs.contents();
  assert!(out.contains("Data: ["));
  assert!(out.contains("\"project\": \"SUSE:Maintenance:1\""));
}

#[tokio::test]
async fn sync_skips_malformed_projects() {
  let mut bad = raw(1, &["curl"]);
  bad.project = "SUSE:Maintenance:oops".into();
  let smelt = Smelt(vec![bad, raw(2, &["curl"])]);
  let dashboard = Dashboard::default();

  commands::smelt_sync(&smelt, &dashboard, &token(), 0, false)
    .await
    .unwrap();

  let pushed = dashboard.pushed.lock().unwrap();
  assert_eq!(pushed.len(), 1);
  assert_eq!(pushed[0].number, 2);
}

// ─── incidents-check / approve ───────────────────────────────────────────────

#[tokio::test]
async fn check_passes_when_everything_is_green() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(1, &["curl"])],
    results: vec![passed(10)],
    ..Dashboard::default()
  };
  let gate = QualityGate::new(&dashboard, &NoComments);

  let status = commands::incidents_check(&dashboard, &Repos(5), &gate, &token(), 2)
    .await
    .unwrap();
  assert_eq!(status, 0);
}

#[tokio::test]
async fn check_fails_on_unwaived_failure() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(1, &["curl"])],
    results: vec![passed(10), failed(11)],
    ..Dashboard::default()
  };
  let gate = QualityGate::new(&dashboard, &NoComments);

  let status = commands::incidents_check(&dashboard, &Repos(5), &gate, &token(), 2)
    .await
    .unwrap();
  assert_eq!(status, 1);
}

#[tokio::test]
async fn check_ignores_unbuildable_incidents() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(1, &[]), dashboard_incident(2, &["curl"])],
    results: vec![passed(10)],
    ..Dashboard::default()
  };
  let gate = QualityGate::new(&dashboard, &NoComments);

  let status = commands::incidents_check(&dashboard, &Repos(5), &gate, &token(), 2)
    .await
    .unwrap();
  assert_eq!(status, 0);
}

#[tokio::test]
async fn approve_green_incidents() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(1, &["curl"])],
    results: vec![passed(10)],
    ..Dashboard::default()
  };
  let obs = Obs::default();

  let status = commands::approve(
    &dashboard,
    QualityGate::new(&dashboard, &NoComments),
    &dashboard,
    &obs,
    &token(),
    None,
    false,
  )
  .await
  .unwrap();

  assert_eq!(status, 0);
  assert_eq!(*obs.0.lock().unwrap(), vec![274060]);
}

#[tokio::test]
async fn approve_waits_for_green_aggregate() {
  let obs = Obs::default();
  for (aggregate, approved) in [
    (Some(vec![failed(20)]), false),
    (Some(Vec::new()), false),
    (Some(vec![passed(20)]), true),
  ] {
    let dashboard = Dashboard {
      incidents: vec![dashboard_incident(1, &["curl"])],
      results: vec![passed(10)],
      aggregate,
      ..Dashboard::default()
    };
    obs.0.lock().unwrap().clear();

    commands::approve(
      &dashboard,
      QualityGate::new(&dashboard, &NoComments),
      &dashboard,
      &obs,
      &token(),
      None,
      false,
    )
    .await
    .unwrap();

    assert_eq!(!obs.0.lock().unwrap().is_empty(), approved);
  }
}

#[tokio::test]
async fn approve_single_incident() {
  let mut outside = dashboard_incident(2, &["vim"]);
  outside.record.in_review_qam = false;
  outside.record.rr_number = Some(300000);
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(1, &["curl"]), outside],
    results: vec![passed(10)],
    ..Dashboard::default()
  };
  let obs = Obs::default();

  let status = commands::approve(
    &dashboard,
    QualityGate::new(&dashboard, &NoComments),
    &dashboard,
    &obs,
    &token(),
    Some(2),
    false,
  )
  .await
  .unwrap();

  assert_eq!(status, 0);
  assert_eq!(*obs.0.lock().unwrap(), vec![300000]);
}

#[tokio::test]
async fn approve_single_incident_needs_release_request() {
  let mut bare = dashboard_incident(3, &["curl"]);
  bare.record.rr_number = None;
  let dashboard = Dashboard {
    incidents: vec![bare],
    ..Dashboard::default()
  };
  let obs = Obs::default();

  // 3 has no release request, 4 is unknown to the dashboard.
  for number in [3, 4] {
    let result = commands::approve(
      &dashboard,
      QualityGate::new(&dashboard, &NoComments),
      &dashboard,
      &obs,
      &token(),
      Some(number),
      false,
    )
    .await;
    assert!(result.is_err());
  }
  assert!(obs.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_approve_changes_nothing() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(1, &["curl"])],
    results: vec![passed(10)],
    ..Dashboard::default()
  };
  let obs = Obs::default();

  commands::approve(
    &dashboard,
    QualityGate::new(&dashboard, &NoComments),
    &dashboard,
    &obs,
    &token(),
    None,
    true,
  )
  .await
  .unwrap();

  assert!(obs.0.lock().unwrap().is_empty());
}

// ─── schedule ────────────────────────────────────────────────────────────────

const SLES: &str = r#"
product = "SLES"

[settings]
VERSION = "15-SP4"
DISTRI = "sle"

[incidents.FLAVOR.Server-DVD-Incidents]
archs = ["x86_64", "aarch64"]
issues = { OS_TEST_ISSUES = "SLES:15-SP4" }
priority = 50

[aggregate]
FLAVOR = "Server-DVD-Updates"
archs = ["x86_64"]
test_issues = { OS_TEST_ISSUES = "SLES:15-SP4" }
onetime = true
"#;

#[tokio::test]
async fn schedule_incident_jobs() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(24618, &["curl"])],
    ..Dashboard::default()
  };
  let confs = toml::from_str::<ProductFile>(SLES).unwrap().into_confs();
  let opts = ScheduleOptions {
    concurrency:    2,
    ci_url:         Some("https://ci.example/1".into()),
    ignore_onetime: true,
  };

  let (status, jobs) = commands::schedule(&dashboard, &Repos(5), &token(), &confs, &opts)
    .await
    .unwrap();

  assert_eq!(status, 0);
  assert_eq!(jobs.len(), 1);
  let job = &jobs[0];
  assert_eq!(job["ARCH"], "x86_64");
  assert_eq!(job["FLAVOR"], "Server-DVD-Incidents");
  assert_eq!(job["DISTRI"], "sle");
  assert_eq!(job["INCIDENT_ID"], "24618");
  assert_eq!(job["REPOHASH"], "5");
  assert_eq!(job["BUILD"], ":24618:curl");
  assert_eq!(job["OS_TEST_ISSUES"], "24618");
  assert_eq!(job["RRID"], "SUSE:Maintenance:24618:274060");
  assert_eq!(job["_PRIORITY"], "50");
  assert_eq!(job["__CI_JOB_URL"], "https://ci.example/1");
}

#[tokio::test]
async fn schedule_includes_onetime_aggregates_on_request() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(24618, &["curl"])],
    ..Dashboard::default()
  };
  let confs = toml::from_str::<ProductFile>(SLES).unwrap().into_confs();
  let opts = ScheduleOptions {
    concurrency: 2,
    ..ScheduleOptions::default()
  };

  let (_, jobs) = commands::schedule(&dashboard, &Repos(5), &token(), &confs, &opts)
    .await
    .unwrap();

  assert_eq!(jobs.len(), 2);
  let aggregate = jobs
    .iter()
    .find(|j| j["FLAVOR"] == "Server-DVD-Updates")
    .unwrap();
  assert_eq!(aggregate["OS_TEST_ISSUES"], "24618");
  assert!(!aggregate.contains_key("__CI_JOB_URL"));
}

#[tokio::test]
async fn schedule_reports_broken_config() {
  let dashboard = Dashboard {
    incidents: vec![dashboard_incident(24618, &["curl"])],
    ..Dashboard::default()
  };
  let broken = SLES.replace("SLES:15-SP4", "SLES");
  let confs = toml::from_str::<ProductFile>(&broken).unwrap().into_confs();

  let (status, jobs) = commands::schedule(
    &dashboard,
    &Repos(5),
    &token(),
    &confs,
    &ScheduleOptions::default(),
  )
  .await
  .unwrap();

  assert_eq!(status, 1);
  assert!(jobs.is_empty());
}

// ─── config ──────────────────────────────────────────────────────────────────

fn scratch_dir(name: &str) -> std::path::PathBuf {
  let dir = std::env::temp_dir().join(format!("qem-bot-{name}-{}", std::process::id()));
  let _ = std::fs::remove_dir_all(&dir);
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

#[test]
fn loads_product_directory() {
  let dir = scratch_dir("products");
  std::fs::write(dir.join("sles.toml"), SLES).unwrap();
  std::fs::write(dir.join("broken.toml"), "product = ").unwrap();
  std::fs::write(dir.join("notes.txt"), "not a config").unwrap();

  let confs = load_products(&dir).unwrap();
  assert_eq!(confs.len(), 2);
  assert!(confs.iter().all(|c| c.product() == "SLES"));

  std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_product_directory_is_an_error() {
  let dir = scratch_dir("missing").join("nope");
  assert!(load_products(&dir).is_err());
}

#[test]
fn bot_config_file_and_defaults() {
  let dir = scratch_dir("config");
  let path = dir.join("qem-bot.toml");
  std::fs::write(
    &path,
    "dashboard_url = \"http://localhost:3000/\"\nretry = 5\n",
  )
  .unwrap();

  let cfg = BotConfig::load(&path).unwrap();
  assert_eq!(cfg.dashboard_url, "http://localhost:3000/");
  assert_eq!(cfg.retry, 5);
  assert_eq!(cfg.concurrency, 4);
  assert_eq!(cfg.openqa_url, "https://openqa.suse.de");

  let cfg = BotConfig::load(&dir.join("absent.toml")).unwrap();
  assert_eq!(cfg.retry, 2);

  std::fs::remove_dir_all(&dir).unwrap();
}
