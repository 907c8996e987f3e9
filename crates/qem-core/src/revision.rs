//! Per-architecture revision resolution.

use std::collections::HashMap;

use futures::{StreamExt as _, TryStreamExt as _, stream};
use tracing::debug;

use crate::{
  channel::{ArchVer, Channel},
  error::LookupError,
  source::RevisionLookup,
};

/// Revision groups queried at once per incident unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Channels grouped by [`ArchVer`], each with its `(product, version)` list.
///
/// Groups keep the order in which their first channel appeared.
pub fn group(channels: &[Channel]) -> Vec<(ArchVer, Vec<(String, String)>)> {
  let mut groups: Vec<(ArchVer, Vec<(String, String)>)> = Vec::new();
  for channel in channels {
    let key = channel.arch_ver();
    let repo = (channel.product.clone(), channel.version.clone());
    match groups.iter_mut().find(|(k, _)| *k == key) {
      Some((_, repos)) => repos.push(repo),
      None => groups.push((key, vec![repo])),
    }
  }
  groups
}

/// Resolves the newest known revision of every channel group.
pub struct RevisionResolver<'a, L> {
  lookup:      &'a L,
  concurrency: usize,
}

impl<'a, L: RevisionLookup> RevisionResolver<'a, L> {
  pub fn new(lookup: &'a L) -> Self {
    Self {
      lookup,
      concurrency: DEFAULT_CONCURRENCY,
    }
  }

  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  /// Query the maximum revision of every group in `channels`.
  ///
  /// Groups without a positive revision are left out. The first failing
  /// lookup aborts the whole resolution.
  pub async fn resolve(
    &self,
    channels: &[Channel],
    project: &str,
  ) -> Result<HashMap<ArchVer, u64>, LookupError> {
    let groups = group(channels);

    let found: Vec<(ArchVer, u64)> = stream::iter(groups.iter())
      .map(|(key, repos)| async move {
        let rev = self.lookup.max_revision(repos, &key.arch, project).await?;
        Ok::<_, LookupError>((key.clone(), rev))
      })
      .buffer_unordered(self.concurrency)
      .try_collect()
      .await?;

    Ok(
      found
        .into_iter()
        .filter(|(key, rev)| {
          if *rev == 0 {
            debug!("{project} has no revision for {key}");
          }
          *rev > 0
        })
        .collect(),
    )
  }
}
