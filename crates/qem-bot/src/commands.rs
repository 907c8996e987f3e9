//! One runner per subcommand.
//!
//! Runners take their collaborators as trait implementations and return the
//! process exit status.

use anyhow::Context as _;
use qem_core::{
  GateError,
  approve::{Approver, IncReq, in_qam_review},
  gate::QualityGate,
  incident::{Incident, IncidentBuilder},
  product::{JobSettings, ProductConf},
  source::{
    AggregateJobSource, CommentSource, DashboardIncidents, DashboardSink,
    IncidentSource, JobResultSource, ReviewApprover, RevisionLookup, Token,
  },
  sync::{self, SyncRecord},
};
use tracing::{debug, error, info, warn};

// ─── smelt-sync ──────────────────────────────────────────────────────────────

/// Push the active SMELT incidents to the dashboard.
pub async fn smelt_sync<S, D>(
  source: &S,
  sink: &D,
  token: &Token,
  retry: u32,
  dry: bool,
) -> anyhow::Result<i32>
where
  S: IncidentSource,
  D: DashboardSink,
{
  info!("Start syncing incidents from smelt to dashboard");

  let incidents = source
    .active_incidents()
    .await
    .context("failed to fetch active incidents")?;

  let records: Vec<SyncRecord> = incidents
    .iter()
    .filter_map(|raw| match sync::to_record(raw) {
      Ok(record) => Some(record),
      Err(e) => {
        warn!("Skipping {}: {e}", raw.project);
        None
      }
    })
    .collect();

  info!("Updating info about {} incidents", records.len());
  info!("Data: {}", serde_json::to_string_pretty(&records)?);

  if dry {
    info!("Dry run, nothing synced");
    return Ok(0);
  }
  Ok(sink.update_incidents(token, &records, retry).await)
}

// ─── incidents-check ─────────────────────────────────────────────────────────

async fn dashboard_incidents<D, L>(
  dashboard: &D,
  lookup: &L,
  token: &Token,
  concurrency: usize,
) -> anyhow::Result<Vec<Incident>>
where
  D: DashboardIncidents,
  L: RevisionLookup,
{
  let records = dashboard
    .incidents(token)
    .await
    .context("failed to fetch incidents from the dashboard")?;

  Ok(
    IncidentBuilder::new(lookup)
      .with_concurrency(concurrency)
      .build_all(&records)
      .await,
  )
}

/// Run the quality gate over every buildable dashboard incident.
///
/// Returns 1 when any incident has unwaived failures or cannot be evaluated.
pub async fn incidents_check<D, L, J, C>(
  dashboard: &D,
  lookup: &L,
  gate: &QualityGate<'_, J, C>,
  token: &Token,
  concurrency: usize,
) -> anyhow::Result<i32>
where
  D: DashboardIncidents,
  L: RevisionLookup,
  J: JobResultSource,
  C: CommentSource,
{
  let incidents = dashboard_incidents(dashboard, lookup, token, concurrency).await?;
  info!("Checking {} incidents", incidents.len());

  let mut failed = 0;
  for inc in &incidents {
    match gate.evaluate(inc.id, token).await {
      Ok(verdict) if verdict.has_failures => {
        info!("{inc}: {} unwaived failures", verdict.failures.len());
        failed += 1;
      }
      Ok(_) => info!("{inc}: all jobs passed or were waived"),
      Err(GateError::NoResults(_)) => {
        info!("{inc}: no job results yet");
        failed += 1;
      }
      Err(e) => {
        error!("{inc}: {e}");
        failed += 1;
      }
    }
  }

  info!("{failed} of {} incidents did not pass", incidents.len());
  Ok(if failed == 0 { 0 } else { 1 })
}

// ─── approve ─────────────────────────────────────────────────────────────────

/// Accept the bot's review on every incident in QAM review whose tests are
/// green, or only on `incident` when one is given.
pub async fn approve<D, J, C, G, A>(
  dashboard: &D,
  gate: QualityGate<'_, J, C>,
  aggregates: &G,
  approver: &A,
  token: &Token,
  incident: Option<u64>,
  dry: bool,
) -> anyhow::Result<i32>
where
  D: DashboardIncidents,
  J: JobResultSource,
  C: CommentSource,
  G: AggregateJobSource,
  A: ReviewApprover,
{
  let increqs = match incident {
    Some(number) => {
      let inc = dashboard
        .incident(number, token)
        .await
        .with_context(|| format!("failed to fetch incident {number} from the dashboard"))?;
      vec![
        IncReq::from_incident(&inc)
          .with_context(|| format!("incident {number} has no release request"))?,
      ]
    }
    None => {
      let incidents = dashboard
        .incidents(token)
        .await
        .context("failed to fetch incidents from the dashboard")?;
      in_qam_review(&incidents)
    }
  };

  Ok(
    Approver::new(gate, aggregates, approver, token, dry)
      .run(&increqs)
      .await,
  )
}

// ─── schedule ────────────────────────────────────────────────────────────────

/// Options of the `schedule` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
  pub concurrency:    usize,
  pub ci_url:         Option<String>,
  pub ignore_onetime: bool,
}

/// Compute the openQA jobs every product configuration wants.
///
/// Returns the jobs so callers can post or inspect them; each one is also
/// logged as the `openqa-cli` call that would schedule it.
pub async fn schedule<D, L>(
  dashboard: &D,
  lookup: &L,
  token: &Token,
  confs: &[ProductConf],
  opts: &ScheduleOptions,
) -> anyhow::Result<(i32, Vec<JobSettings>)>
where
  D: DashboardIncidents,
  L: RevisionLookup,
{
  let incidents = dashboard_incidents(dashboard, lookup, token, opts.concurrency).await?;
  info!(
    "Scheduling {} incidents over {} configurations",
    incidents.len(),
    confs.len()
  );

  let mut status = 0;
  let mut jobs = Vec::new();
  for conf in confs {
    match conf.build_schedule(&incidents, opts.ci_url.as_deref(), opts.ignore_onetime) {
      Ok(built) => {
        debug!("{} schedules {} jobs", conf.product(), built.len());
        jobs.extend(built);
      }
      Err(e) => {
        error!("Cannot schedule {}: {e}", conf.product());
        status = 1;
      }
    }
  }

  for job in &jobs {
    info!("openqa-cli api -X post isos {}", cli_args(job));
  }
  Ok((status, jobs))
}

fn cli_args(job: &JobSettings) -> String {
  job
    .iter()
    .map(|(k, v)| format!("{k}={v}"))
    .collect::<Vec<_>>()
    .join(" ")
}
