//! Revision lookup against the published update repositories.
//!
//! Every update repository carries a `repodata/repomd.xml` whose `<revision>`
//! element changes whenever the repository is republished.

use qem_core::{error::LookupError, source::RevisionLookup};
use quick_xml::events::Event;
use reqwest::Client;
use tracing::debug;

use crate::{error::Error, join};

#[derive(Clone)]
pub struct RepoHashClient {
  client:   Client,
  base_url: String,
}

impl RepoHashClient {
  pub fn new(client: Client, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into(),
    }
  }

  /// Location of the `repomd.xml` for one repository of `project`.
  ///
  /// openSUSE repositories are not split per architecture.
  pub fn repomd_url(&self, project: &str, product: &str, version: &str, arch: &str) -> String {
    let project = project.replace(':', ":/");
    let repo = if product.starts_with("openSUSE") {
      format!("SUSE_Updates_{product}_{version}")
    } else {
      format!("SUSE_Updates_{product}_{version}_{arch}")
    };
    join(&self.base_url, &format!("{project}/{repo}/repodata/repomd.xml"))
  }

  async fn revision(&self, url: &str) -> Result<u64, LookupError> {
    debug!("GET {url}");
    let resp = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| LookupError::Backend(Box::new(Error::from(e))))?;

    if !resp.status().is_success() {
      return Err(LookupError::NoRepoFound(url.to_string()));
    }

    let body = resp
      .bytes()
      .await
      .map_err(|e| LookupError::Backend(Box::new(Error::from(e))))?;

    match parse_revision(&body) {
      Ok(Some(revision)) => Ok(revision),
      Ok(None) => Err(LookupError::NoRepoFound(url.to_string())),
      Err(e) => {
        debug!("Unreadable repomd.xml at {url}: {e}");
        Err(LookupError::NoRepoFound(url.to_string()))
      }
    }
  }
}

impl RevisionLookup for RepoHashClient {
  async fn max_revision<'a>(
    &'a self,
    repos: &'a [(String, String)],
    arch: &'a str,
    project: &'a str,
  ) -> Result<u64, LookupError> {
    let mut max = 0;
    for (product, version) in repos {
      let url = self.repomd_url(project, product, version, arch);
      max = max.max(self.revision(&url).await?);
    }
    Ok(max)
  }
}

/// Read the `<revision>` of a `repomd.xml` document.
///
/// `Ok(None)` when the element is absent or not a number.
pub fn parse_revision(xml: &[u8]) -> Result<Option<u64>, Error> {
  let mut reader = quick_xml::Reader::from_reader(xml);
  reader.config_mut().trim_text(true);

  let mut in_revision = false;
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf) {
      Ok(Event::Start(ref e)) => {
        in_revision = local_name(e.name().as_ref()) == b"revision";
      }
      Ok(Event::Text(ref e)) if in_revision => {
        let text = e.unescape().map_err(|e| Error::Xml(e.to_string()))?;
        return Ok(text.trim().parse().ok());
      }
      Ok(Event::End(_)) => in_revision = false,
      Ok(Event::Eof) => return Ok(None),
      Err(e) => return Err(Error::Xml(e.to_string())),
      _ => {}
    }
    buf.clear();
  }
}

fn local_name(name: &[u8]) -> &[u8] {
  match name.iter().rposition(|&b| b == b':') {
    Some(pos) => &name[pos + 1..],
    None => name,
  }
}
