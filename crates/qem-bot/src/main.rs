//! qem-bot binary.
//!
//! Reads `qem-bot.toml` (or the path given with `--config`) layered under
//! `QEM_*` environment variables and runs one subcommand against the
//! configured services.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use qem_bot::{
  BotConfig,
  commands::{self, ScheduleOptions},
  load_products,
};
use qem_client::{
  DashboardClient, ObsClient, ObsConfig, OpenQaClient, RepoHashClient,
  SmeltClient, http_client,
};
use qem_core::{gate::QualityGate, source::Token};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "QEM incident bot")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "qem-bot.toml", global = true)]
  config: PathBuf,

  /// Log at debug level.
  #[arg(short, long, global = true)]
  debug: bool,

  /// Compute everything but change nothing upstream.
  #[arg(long, global = true)]
  dry: bool,

  /// Dashboard token; overrides the configured one.
  #[arg(short, long, global = true)]
  token: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sync the active SMELT incidents to the dashboard.
  SmeltSync {
    /// Extra attempts for a rejected update.
    #[arg(long)]
    retry: Option<u32>,
  },
  /// Run the quality gate over the dashboard incidents.
  IncidentsCheck,
  /// Approve incidents in QAM review whose tests are green.
  Approve {
    /// Approve only this incident, whether or not it is in QAM review.
    #[arg(long)]
    incident: Option<u64>,
  },
  /// Compute the openQA jobs for every product configuration.
  Schedule {
    /// Leave out configurations scheduled once a day.
    #[arg(long)]
    ignore_onetime: bool,

    /// CI job URL recorded in every job.
    #[arg(long, env = "CI_JOB_URL")]
    ci_url: Option<String>,

    /// Directory of product configurations; overrides the configured one.
    #[arg(long)]
    configs: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  let cli = Cli::parse();

  let level = if cli.debug {
    LevelFilter::DEBUG
  } else {
    LevelFilter::INFO
  };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy(),
    )
    .init();

  let cfg = BotConfig::load(&cli.config)?;
  let token = Token(
    cli
      .token
      .clone()
      .or_else(|| cfg.token.clone())
      .context("no dashboard token, pass --token or set QEM_TOKEN")?,
  );

  let http = http_client().context("failed to build HTTP client")?;
  let dashboard = DashboardClient::new(http.clone(), &cfg.dashboard_url);
  let openqa = OpenQaClient::new(http.clone(), &cfg.openqa_url);
  let repos = RepoHashClient::new(http.clone(), &cfg.download_url);

  let status = match cli.command {
    Command::SmeltSync { retry } => {
      let smelt = SmeltClient::new(http, &cfg.smelt_url);
      let retry = retry.unwrap_or(cfg.retry);
      commands::smelt_sync(&smelt, &dashboard, &token, retry, cli.dry).await?
    }
    Command::IncidentsCheck => {
      let gate = QualityGate::new(&dashboard, &openqa);
      commands::incidents_check(&dashboard, &repos, &gate, &token, cfg.concurrency)
        .await?
    }
    Command::Approve { incident } => {
      let obs = ObsClient::new(http, ObsConfig {
        base_url: cfg.obs_url.clone(),
        username: cfg.obs_username.clone(),
        password: cfg.obs_password.clone(),
        origin:   cfg.dashboard_url.clone(),
      });
      let gate = QualityGate::new(&dashboard, &openqa);
      commands::approve(&dashboard, gate, &dashboard, &obs, &token, incident, cli.dry)
        .await?
    }
    Command::Schedule {
      ignore_onetime,
      ci_url,
      configs,
    } => {
      let dir = configs.unwrap_or_else(|| cfg.configs_dir.clone());
      let confs = load_products(&dir)?;
      let opts = ScheduleOptions {
        concurrency: cfg.concurrency,
        ci_url,
        ignore_onetime,
      };
      let (status, _jobs) =
        commands::schedule(&dashboard, &repos, &token, &confs, &opts).await?;
      status
    }
  };

  Ok(ExitCode::from(u8::try_from(status).unwrap_or(1)))
}
