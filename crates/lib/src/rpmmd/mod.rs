//! Package sets and the package resolver boundary.
//!
//! Image types declare package sets per pipeline. A pipeline's sets form a
//! [`PackageSetChain`] that an external resolver turns into concrete
//! [`PackageSpec`]s. This module never deduplicates or orders packages itself;
//! that is the resolver's job.

mod depsolve;
mod resolver;

use serde::{Deserialize, Serialize};

pub use depsolve::{DepsolveOptions, ResolvedPackages, depsolve};
pub use resolver::{PackageResolver, SnapshotPackage, StaticResolver};

/// Include and exclude rules for one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
  #[serde(default)]
  pub include: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub exclude: Vec<String>,
}

impl PackageSet {
  pub fn new<I, S>(include: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      include: include.into_iter().map(Into::into).collect(),
      exclude: Vec::new(),
    }
  }

  pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.exclude.extend(exclude.into_iter().map(Into::into));
    self
  }

  /// Concatenate another set onto this one, keeping order and duplicates.
  pub fn append(mut self, other: PackageSet) -> Self {
    self.include.extend(other.include);
    self.exclude.extend(other.exclude);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.include.is_empty() && self.exclude.is_empty()
  }
}

/// Ordered package sets resolved together, earlier sets first.
pub type PackageSetChain = Vec<PackageSet>;

/// A package as returned by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
  pub name: String,
  #[serde(default)]
  pub epoch: u32,
  pub version: String,
  pub release: String,
  pub arch: String,
  pub remote_location: String,
  /// Checksum in `<algorithm>:<hex>` form.
  pub checksum: String,
}

impl PackageSpec {
  /// The `name-[epoch:]version-release.arch` identifier.
  pub fn nevra(&self) -> String {
    if self.epoch == 0 {
      format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
    } else {
      format!("{}-{}:{}-{}.{}", self.name, self.epoch, self.version, self.release, self.arch)
    }
  }
}
