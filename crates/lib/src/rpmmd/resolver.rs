//! The package resolver boundary and a snapshot-backed implementation.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{PackageSet, PackageSpec};
use crate::error::BoxError;

/// Turns a package-set chain into concrete packages.
///
/// Implementations own transport, caching and retry policy. The manifest
/// generator calls them once per pipeline chain and propagates any error
/// unchanged.
#[async_trait]
pub trait PackageResolver: Send + Sync {
  async fn resolve(&self, arch: &str, chain: &[PackageSet]) -> Result<Vec<PackageSpec>, BoxError>;
}

/// A package entry in a repository snapshot file.
pub type SnapshotPackage = PackageSpec;

#[derive(Debug, Deserialize, Serialize)]
struct Snapshot {
  packages: Vec<SnapshotPackage>,
}

#[derive(Debug, Error)]
pub enum StaticResolverError {
  #[error("no package matches {name:?} for architecture {arch:?}")]
  NotFound { name: String, arch: String },

  #[error("package groups cannot be expanded from a snapshot: {0:?}")]
  GroupUnsupported(String),
}

/// Resolves package names by exact lookup in a fixed snapshot.
///
/// No dependency solving takes place: every requested name must be present in
/// the snapshot for the target architecture (or as `noarch`).
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
  packages: BTreeMap<String, Vec<PackageSpec>>,
}

impl StaticResolver {
  pub fn new(packages: impl IntoIterator<Item = PackageSpec>) -> Self {
    let mut map: BTreeMap<String, Vec<PackageSpec>> = BTreeMap::new();
    for pkg in packages {
      map.entry(pkg.name.clone()).or_default().push(pkg);
    }
    Self { packages: map }
  }

  /// Load a snapshot of the form `{"packages": [...]}`.
  pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
    let snapshot: Snapshot = serde_json::from_str(input)?;
    Ok(Self::new(snapshot.packages))
  }

  pub fn len(&self) -> usize {
    self.packages.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty()
  }

  fn lookup(&self, name: &str, arch: &str) -> Option<&PackageSpec> {
    let candidates = self.packages.get(name)?;
    candidates
      .iter()
      .find(|p| p.arch == arch)
      .or_else(|| candidates.iter().find(|p| p.arch == "noarch"))
  }

  fn resolve_chain(&self, arch: &str, chain: &[PackageSet]) -> Result<Vec<PackageSpec>, StaticResolverError> {
    let excluded: BTreeSet<&str> = chain.iter().flat_map(|set| set.exclude.iter().map(String::as_str)).collect();
    let mut seen = BTreeSet::new();
    let mut resolved = Vec::new();

    for name in chain.iter().flat_map(|set| set.include.iter()) {
      if name.starts_with('@') {
        return Err(StaticResolverError::GroupUnsupported(name.clone()));
      }
      if excluded.contains(name.as_str()) || !seen.insert(name.as_str()) {
        continue;
      }
      let spec = self.lookup(name, arch).ok_or_else(|| StaticResolverError::NotFound {
        name: name.clone(),
        arch: arch.to_string(),
      })?;
      resolved.push(spec.clone());
    }

    debug!(arch = %arch, count = resolved.len(), "resolved chain from snapshot");
    Ok(resolved)
  }
}

#[async_trait]
impl PackageResolver for StaticResolver {
  async fn resolve(&self, arch: &str, chain: &[PackageSet]) -> Result<Vec<PackageSpec>, BoxError> {
    Ok(self.resolve_chain(arch, chain)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec(name: &str, arch: &str) -> PackageSpec {
    PackageSpec {
      name: name.to_string(),
      epoch: 0,
      version: "1.0".to_string(),
      release: "1.fc37".to_string(),
      arch: arch.to_string(),
      remote_location: format!("https://mirror.example.com/{}.rpm", name),
      checksum: format!("sha256:{}", hex::encode(name)),
    }
  }

  fn resolver() -> StaticResolver {
    StaticResolver::new([
      spec("dnf", "noarch"),
      spec("systemd", "x86_64"),
      spec("systemd", "aarch64"),
      spec("grub2-pc", "x86_64"),
    ])
  }

  #[tokio::test]
  async fn resolves_in_chain_order_without_duplicates() {
    let chain = vec![PackageSet::new(["systemd", "dnf"]), PackageSet::new(["dnf"])];
    let resolved = resolver().resolve("x86_64", &chain).await.unwrap();
    let names: Vec<_> = resolved.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["systemd", "dnf"]);
    assert_eq!(resolved[0].arch, "x86_64");
    assert_eq!(resolved[1].arch, "noarch");
  }

  #[tokio::test]
  async fn excluded_packages_are_skipped() {
    let chain = vec![PackageSet::new(["systemd", "grub2-pc"]).with_exclude(["grub2-pc"])];
    let resolved = resolver().resolve("aarch64", &chain).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].arch, "aarch64");
  }

  #[tokio::test]
  async fn unknown_package_is_an_error() {
    let chain = vec![PackageSet::new(["grub2-pc"])];
    let err = resolver().resolve("aarch64", &chain).await.unwrap_err();
    assert_eq!(
      err.to_string(),
      r#"no package matches "grub2-pc" for architecture "aarch64""#
    );
  }

  #[tokio::test]
  async fn groups_are_rejected() {
    let chain = vec![PackageSet::new(["@core"])];
    assert!(resolver().resolve("x86_64", &chain).await.is_err());
  }

  #[test]
  fn loads_snapshot_json() {
    let json = serde_json::json!({ "packages": [spec("dnf", "noarch"), spec("xz", "x86_64")] }).to_string();
    let resolver = StaticResolver::from_json(&json).unwrap();
    assert_eq!(resolver.len(), 2);
    assert!(!resolver.is_empty());
  }
}
