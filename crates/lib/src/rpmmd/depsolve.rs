//! Resolution of a manifest's package-set chains.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::{PackageResolver, PackageSpec};
use crate::error::{ManifestError, Result};
use crate::manifest::Manifest;

/// Resolved packages keyed by pipeline name.
pub type ResolvedPackages = BTreeMap<String, Vec<PackageSpec>>;

/// Limits applied to a [`depsolve`] call.
#[derive(Debug, Clone, Default)]
pub struct DepsolveOptions {
  /// Upper bound for the whole resolution, across all chains.
  pub timeout: Option<Duration>,
  /// Resolution stops with [`ManifestError::ResolutionCancelled`] once this
  /// flag turns `true`.
  pub cancel: Option<watch::Receiver<bool>>,
}

/// Resolve every non-empty package-set chain of `manifest`.
///
/// Chains are resolved one after another in pipeline order. Resolver errors
/// are wrapped in [`ManifestError::ResolutionFailed`] and never retried.
pub async fn depsolve(
  resolver: &dyn PackageResolver,
  manifest: &Manifest,
  options: &DepsolveOptions,
) -> Result<ResolvedPackages> {
  let work = async {
    match options.timeout {
      Some(timeout) => tokio::time::timeout(timeout, resolve_chains(resolver, manifest))
        .await
        .map_err(|_| ManifestError::ResolutionTimedOut { timeout })?,
      None => resolve_chains(resolver, manifest).await,
    }
  };

  let Some(mut cancel) = options.cancel.clone() else {
    return work.await;
  };
  if *cancel.borrow_and_update() {
    return Err(ManifestError::ResolutionCancelled);
  }

  tokio::select! {
    result = work => result,
    _ = cancelled(&mut cancel) => Err(ManifestError::ResolutionCancelled),
  }
}

async fn resolve_chains(resolver: &dyn PackageResolver, manifest: &Manifest) -> Result<ResolvedPackages> {
  let mut resolved = ResolvedPackages::new();

  for pipeline in manifest.pipelines() {
    let chain = &pipeline.package_sets;
    if chain.iter().all(|set| set.is_empty()) {
      continue;
    }
    debug!(pipeline = %pipeline.name, sets = chain.len(), "resolving package set chain");
    let specs = resolver
      .resolve(manifest.arch(), chain)
      .await
      .map_err(|source| ManifestError::ResolutionFailed {
        pipeline: pipeline.name.clone(),
        source,
      })?;
    resolved.insert(pipeline.name.clone(), specs);
  }

  info!(
    image_type = %manifest.image_type(),
    pipelines = resolved.len(),
    packages = resolved.values().map(Vec::len).sum::<usize>(),
    "package resolution complete"
  );
  Ok(resolved)
}

/// Completes once the cancel flag is set. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
  if cancel.wait_for(|flag| *flag).await.is_err() {
    std::future::pending::<()>().await;
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;

  use super::*;
  use crate::blueprint::Blueprint;
  use crate::distro::{ImageOptions, registry};
  use crate::error::BoxError;
  use crate::rpmmd::PackageSet;

  fn qcow2_manifest() -> Manifest {
    let image_type = registry()
      .get_distro("fedora-37")
      .and_then(|d| d.get_arch("x86_64"))
      .and_then(|a| a.get_image_type("qcow2"))
      .unwrap();
    let (manifest, _) = image_type
      .manifest(&Blueprint::default(), &ImageOptions::default(), None, 0)
      .unwrap();
    manifest
  }

  fn fake_spec(name: &str) -> PackageSpec {
    PackageSpec {
      name: name.to_string(),
      epoch: 0,
      version: "1".to_string(),
      release: "1".to_string(),
      arch: "x86_64".to_string(),
      remote_location: format!("https://example.com/{}.rpm", name),
      checksum: format!("sha256:{}", name),
    }
  }

  /// Records the chains it was asked for and echoes the included names.
  #[derive(Default)]
  struct RecordingResolver {
    calls: Mutex<Vec<(String, usize)>>,
  }

  #[async_trait]
  impl PackageResolver for RecordingResolver {
    async fn resolve(&self, arch: &str, chain: &[PackageSet]) -> std::result::Result<Vec<PackageSpec>, BoxError> {
      self.calls.lock().unwrap().push((arch.to_string(), chain.len()));
      Ok(chain.iter().flat_map(|s| s.include.iter()).map(|n| fake_spec(n)).collect())
    }
  }

  struct FailingResolver;

  #[async_trait]
  impl PackageResolver for FailingResolver {
    async fn resolve(&self, _arch: &str, _chain: &[PackageSet]) -> std::result::Result<Vec<PackageSpec>, BoxError> {
      Err("repository unreachable".into())
    }
  }

  struct SlowResolver;

  #[async_trait]
  impl PackageResolver for SlowResolver {
    async fn resolve(&self, _arch: &str, _chain: &[PackageSet]) -> std::result::Result<Vec<PackageSpec>, BoxError> {
      tokio::time::sleep(Duration::from_secs(30)).await;
      Ok(Vec::new())
    }
  }

  #[tokio::test]
  async fn resolves_every_pipeline_with_packages() {
    let manifest = qcow2_manifest();
    let resolver = RecordingResolver::default();

    let resolved = depsolve(&resolver, &manifest, &DepsolveOptions::default()).await.unwrap();

    assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["build", "os"]);
    assert!(resolved["build"].iter().any(|p| p.name == "grub2-pc"));
    let calls = resolver.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(arch, _)| arch == "x86_64"));
  }

  #[tokio::test]
  async fn resolver_errors_are_wrapped_with_pipeline() {
    let err = depsolve(&FailingResolver, &qcow2_manifest(), &DepsolveOptions::default())
      .await
      .unwrap_err();
    assert!(matches!(err, ManifestError::ResolutionFailed { ref pipeline, .. } if pipeline == "build"));
    assert!(err.to_string().ends_with("repository unreachable"));
  }

  #[tokio::test]
  async fn timeout_is_reported_distinctly() {
    let options = DepsolveOptions {
      timeout: Some(Duration::from_millis(20)),
      cancel: None,
    };
    let err = depsolve(&SlowResolver, &qcow2_manifest(), &options).await.unwrap_err();
    assert!(matches!(err, ManifestError::ResolutionTimedOut { .. }));
  }

  #[tokio::test]
  async fn cancellation_stops_resolution() {
    let (tx, rx) = watch::channel(false);
    let options = DepsolveOptions {
      timeout: None,
      cancel: Some(rx),
    };

    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      let _ = tx.send(true);
    });

    let err = depsolve(&SlowResolver, &qcow2_manifest(), &options).await.unwrap_err();
    assert!(matches!(err, ManifestError::ResolutionCancelled));
  }

  #[tokio::test]
  async fn already_cancelled_fails_immediately() {
    let (_tx, rx) = watch::channel(true);
    let options = DepsolveOptions {
      timeout: None,
      cancel: Some(rx),
    };
    let err = depsolve(&RecordingResolver::default(), &qcow2_manifest(), &options)
      .await
      .unwrap_err();
    assert!(matches!(err, ManifestError::ResolutionCancelled));
  }
}
