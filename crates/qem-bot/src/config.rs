//! Bot settings and product configuration loading.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use qem_core::product::{ProductConf, ProductFile};
use serde::Deserialize;
use tracing::{info, warn};

// ─── Bot settings ────────────────────────────────────────────────────────────

/// Runtime settings, read from `qem-bot.toml` and `QEM_*` environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  #[serde(default = "defaults::dashboard_url")]
  pub dashboard_url: String,
  #[serde(default = "defaults::smelt_url")]
  pub smelt_url:     String,
  #[serde(default = "defaults::openqa_url")]
  pub openqa_url:    String,
  #[serde(default = "defaults::download_url")]
  pub download_url:  String,
  #[serde(default = "defaults::obs_url")]
  pub obs_url:       String,
  #[serde(default)]
  pub obs_username:  String,
  #[serde(default)]
  pub obs_password:  String,
  /// Dashboard token. `--token` takes precedence.
  #[serde(default)]
  pub token:         Option<String>,
  /// Extra attempts for a rejected dashboard update.
  #[serde(default = "defaults::retry")]
  pub retry:         u32,
  /// Bound on concurrent upstream requests.
  #[serde(default = "defaults::concurrency")]
  pub concurrency:   usize,
  #[serde(default = "defaults::configs_dir")]
  pub configs_dir:   PathBuf,
}

mod defaults {
  use std::path::PathBuf;

  pub fn dashboard_url() -> String { "http://dashboard.qam.suse.de/".into() }
  pub fn smelt_url() -> String { "https://smelt.suse.de/api/incidents/active".into() }
  pub fn openqa_url() -> String { "https://openqa.suse.de".into() }
  pub fn download_url() -> String { "http://download.suse.de/ibs".into() }
  pub fn obs_url() -> String { "https://api.suse.de".into() }
  pub fn retry() -> u32 { 2 }
  pub fn concurrency() -> usize { 4 }
  pub fn configs_dir() -> PathBuf { PathBuf::from("/etc/openqabot") }
}

impl BotConfig {
  /// Layer the optional file at `path` under the `QEM_` environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("QEM"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise BotConfig")
  }
}

// ─── Product configs ─────────────────────────────────────────────────────────

/// Every product configuration in the `*.toml` files of `dir`.
///
/// A file that cannot be parsed is logged and skipped; an unreadable
/// directory is an error.
pub fn load_products(dir: &Path) -> anyhow::Result<Vec<ProductConf>> {
  let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
    .with_context(|| format!("failed to read config directory {dir:?}"))?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
    .collect();
  paths.sort();

  let mut confs = Vec::new();
  for path in paths {
    match read_product(&path) {
      Ok(file) => confs.extend(file.into_confs()),
      Err(e) => warn!("Skipping product config {path:?}: {e:#}"),
    }
  }
  info!("Loaded {} product configurations from {dir:?}", confs.len());
  Ok(confs)
}

fn read_product(path: &Path) -> anyhow::Result<ProductFile> {
  let text = std::fs::read_to_string(path).context("failed to read file")?;
  toml::from_str(&text).context("invalid product config")
}
