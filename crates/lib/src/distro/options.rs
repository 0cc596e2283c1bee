//! Per-request image options.

use serde::{Deserialize, Serialize};

use crate::disk::PartitioningMode;
use crate::error::{ManifestError, Result};

/// Where an OSTree based image type gets its commit from, or which ref a new
/// commit is written to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OstreeOptions {
  /// Ref of the commit to build or deploy. Defaults to the distribution's ref.
  #[serde(default, rename = "ref", skip_serializing_if = "String::is_empty")]
  pub image_ref: String,
  /// Ref of the commit a new commit is based on.
  #[serde(default, rename = "parent", skip_serializing_if = "String::is_empty")]
  pub parent_ref: String,
  /// Repository the commit (or parent) is fetched from.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub url: String,
  /// Alternative content location, used instead of `url` for fetching.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub content_url: String,
  /// Commit checksum, when already known.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub checksum: String,
}

impl OstreeOptions {
  /// Where commit content is fetched from: `content_url` if set, else `url`.
  pub fn fetch_url(&self) -> Option<&str> {
    [self.content_url.as_str(), self.url.as_str()].into_iter().find(|u| !u.is_empty())
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if !self.image_ref.is_empty() && !is_valid_ref(&self.image_ref) {
      return Err(ManifestError::InvalidOstreeOptions(format!("Invalid ostree ref {:?}", self.image_ref)));
    }
    if !self.parent_ref.is_empty() {
      if !is_valid_ref(&self.parent_ref) {
        return Err(ManifestError::InvalidOstreeOptions(format!(
          "Invalid ostree parent ref {:?}",
          self.parent_ref
        )));
      }
      if self.url.is_empty() {
        return Err(ManifestError::InvalidOstreeOptions(
          "ostree parent ref specified, but no URL to retrieve it".to_string(),
        ));
      }
    }
    if !self.checksum.is_empty() && !is_valid_checksum(&self.checksum) {
      return Err(ManifestError::InvalidOstreeOptions(format!(
        "Invalid ostree commit checksum {:?}",
        self.checksum
      )));
    }
    Ok(())
  }
}

/// Caller supplied options for one manifest request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
  /// Requested image size in bytes; 0 selects the image type's default.
  #[serde(default)]
  pub size: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ostree: Option<OstreeOptions>,
  #[serde(default)]
  pub partitioning_mode: PartitioningMode,
}

impl ImageOptions {
  /// The OSTree repository URL, if one was given.
  pub fn ostree_url(&self) -> Option<&str> {
    self.ostree.as_ref().map(|o| o.url.as_str()).filter(|u| !u.is_empty())
  }
}

/// Ref names are slash separated components of `[A-Za-z0-9_][A-Za-z0-9_.-]*`.
pub fn is_valid_ref(name: &str) -> bool {
  name.split('/').all(|component| {
    let mut chars = component.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
      && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
  })
}

fn is_valid_checksum(checksum: &str) -> bool {
  checksum.len() == 64 && checksum.chars().all(|c| c.is_ascii_hexdigit())
}
