//! Repository channel parsing.
//!
//! SMELT lists an incident's target repositories as colon-delimited strings
//! such as `SUSE:Updates:SLE-Module-Basesystem:15-SP4:x86_64`. Only the
//! `SUSE:Updates` ones name an update channel.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UPDATES_PREFIX: &str = "SUSE:Updates";

/// Architecture assumed for channels that do not name one.
pub const DEFAULT_ARCH: &str = "x86_64";

const OBS_DEVTOOLS: &str = "SLE-Module-Development-Tools-OBS";
const MANAGER_SERVER: &str = "SLE-Module-SUSE-Manager-Server";

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^\d+(?:[.-](?:SP)?\d+)?").expect("static version pattern")
});

// ─── Types ───────────────────────────────────────────────────────────────────

/// A target update repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
  pub product:      String,
  pub version:      String,
  pub architecture: String,
}

impl Channel {
  pub fn new(
    product: impl Into<String>,
    version: impl Into<String>,
    architecture: impl Into<String>,
  ) -> Self {
    Self {
      product:      product.into(),
      version:      version.into(),
      architecture: architecture.into(),
    }
  }

  fn is_excluded(&self) -> bool {
    self.product == OBS_DEVTOOLS
      || (self.product == MANAGER_SERVER && self.architecture == "aarch64")
  }

  /// The revision grouping key for this channel.
  pub fn arch_ver(&self) -> ArchVer {
    ArchVer::new(&self.architecture, normalize_version(&self.version))
  }
}

/// Architecture plus normalized version; the key revisions are stored under.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ArchVer {
  pub arch:    String,
  pub version: String,
}

impl ArchVer {
  pub fn new(arch: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      arch:    arch.into(),
      version: version.into(),
    }
  }
}

impl fmt::Display for ArchVer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.arch, self.version)
  }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Strip a version down to its leading `N`, `N.M`, `N-M` or `N-SPM` part.
///
/// `12-SP3-TERADATA` becomes `12-SP3`; a version with no leading number is
/// returned unchanged.
pub fn normalize_version(version: &str) -> &str {
  VERSION_PATTERN
    .find(version)
    .map_or(version, |m| m.as_str())
}

/// Parse raw repository names into update channels.
///
/// Fully qualified `product:version:arch` entries come first, in input order,
/// followed by `product:version` entries with [`DEFAULT_ARCH`].
pub fn parse<S: AsRef<str>>(raw: &[S]) -> Vec<Channel> {
  let tails = || {
    raw
      .iter()
      .map(AsRef::as_ref)
      .filter(|r| r.starts_with(UPDATES_PREFIX))
      .map(|r| r.split(':').skip(2).collect::<Vec<_>>())
  };

  let qualified = tails().filter_map(|t| match t.as_slice() {
    [product, version, arch] => Some(Channel::new(*product, *version, *arch)),
    _ => None,
  });
  let short = tails().filter_map(|t| match t.as_slice() {
    [product, version] => Some(Channel::new(*product, *version, DEFAULT_ARCH)),
    _ => None,
  });

  qualified
    .chain(short)
    .filter(|c| !c.is_excluded())
    .collect()
}
