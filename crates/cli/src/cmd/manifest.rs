//! Implementation of the `distrogen manifest` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use distrogen_lib::blueprint::Blueprint;
use distrogen_lib::disk::PartitioningMode;
use distrogen_lib::distro::{ImageOptions, OstreeOptions, registry};
use distrogen_lib::rpmmd::{DepsolveOptions, StaticResolver, depsolve};
use distrogen_lib::util::hash::Hashable;

use crate::output::{print_success, truncate_hash};

pub struct ManifestArgs {
  pub distro: String,
  pub arch: String,
  pub image_type: String,
  pub blueprint: Option<PathBuf>,
  pub seed: u64,
  pub size: u64,
  pub ostree_url: Option<String>,
  pub ostree_ref: Option<String>,
  pub ostree_parent: Option<String>,
  pub partitioning: PartitioningMode,
  pub packages: Option<PathBuf>,
  pub timeout: u64,
  pub output: Option<PathBuf>,
}

impl ManifestArgs {
  fn image_options(&self) -> ImageOptions {
    let ostree = (self.ostree_url.is_some() || self.ostree_ref.is_some() || self.ostree_parent.is_some())
      .then(|| OstreeOptions {
        image_ref: self.ostree_ref.clone().unwrap_or_default(),
        parent_ref: self.ostree_parent.clone().unwrap_or_default(),
        url: self.ostree_url.clone().unwrap_or_default(),
        ..Default::default()
      });
    ImageOptions {
      size: self.size,
      ostree,
      partitioning_mode: self.partitioning,
    }
  }
}

/// Generate a manifest and write it to stdout or `--output`.
///
/// Without `--packages` the unresolved manifest is written. With a package
/// snapshot every package-set chain is resolved first and the executor
/// document is written instead.
pub fn cmd_manifest(args: ManifestArgs) -> Result<()> {
  let blueprint = match &args.blueprint {
    Some(path) => {
      let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read blueprint: {}", path.display()))?;
      Blueprint::from_toml(&content).with_context(|| format!("Failed to parse blueprint: {}", path.display()))?
    }
    None => Blueprint::default(),
  };

  let image_type = registry()
    .get_distro(&args.distro)?
    .get_arch(&args.arch)?
    .get_image_type(&args.image_type)?;

  let (manifest, build_chain) = image_type.manifest(&blueprint, &args.image_options(), None, args.seed)?;
  let hash = manifest.compute_hash().context("Failed to hash manifest")?;
  debug!(hash = %hash, build_sets = build_chain.len(), "manifest generated");

  let document = match &args.packages {
    None => serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?,
    Some(path) => {
      let snapshot = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read package snapshot: {}", path.display()))?;
      let resolver = StaticResolver::from_json(&snapshot)
        .with_context(|| format!("Failed to parse package snapshot: {}", path.display()))?;
      info!(packages = resolver.len(), "loaded package snapshot");

      let options = DepsolveOptions {
        timeout: Some(Duration::from_secs(args.timeout)),
        cancel: None,
      };
      let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
      let resolved = rt.block_on(depsolve(&resolver, &manifest, &options))?;

      manifest.serialize(&resolved)?.to_json_pretty()?
    }
  };

  match &args.output {
    Some(path) => {
      std::fs::write(path, format!("{}\n", document))
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
      print_success(&format!(
        "Wrote {} manifest {} to {}",
        image_type.name(),
        truncate_hash(&hash.0),
        path.display()
      ));
    }
    None => println!("{}", document),
  }
  Ok(())
}
