//! Image type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{DistroInfo, ImageOptions, validate};
use crate::blueprint::{Blueprint, CustomizationKind};
use crate::consts::MIB;
use crate::disk::BaseTable;
use crate::error::Result;
use crate::manifest::{self, Manifest};
use crate::rpmmd::{PackageSet, PackageSetChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
  None,
  Legacy,
  Uefi,
  Hybrid,
}

impl BootMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Legacy => "legacy",
      Self::Uefi => "uefi",
      Self::Hybrid => "hybrid",
    }
  }

  pub fn has_bios(&self) -> bool {
    matches!(self, Self::Legacy | Self::Hybrid)
  }

  pub fn has_uefi(&self) -> bool {
    matches!(self, Self::Uefi | Self::Hybrid)
  }
}

impl fmt::Display for BootMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Output format of a disk image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
  Raw,
  Qcow2,
  Vpc,
  Vmdk,
  Ova,
  Xz,
}

/// How an image type is assembled. Each family has a fixed pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "kebab-case")]
pub enum ImageFamily {
  Disk { format: DiskFormat },
  /// A filesystem tree packed as a container (`true`) or a plain tarball.
  Archive { container: bool },
  OstreeCommit,
  OstreeContainer,
  OstreeDisk { format: DiskFormat },
  OstreeInstaller,
  OstreeSimplifiedInstaller,
  ImageInstaller,
  LiveInstaller,
}

impl ImageFamily {
  /// Names of the pipelines this family produces, in build order.
  pub fn pipeline_names(&self) -> Vec<&'static str> {
    let mut names = vec!["build"];
    match self {
      ImageFamily::Disk { format } => {
        names.extend(["os", "image"]);
        names.extend(format_pipelines(*format));
      }
      ImageFamily::Archive { container } => {
        names.push("os");
        names.push(if *container { "container" } else { "archive" });
      }
      ImageFamily::OstreeCommit => names.extend(["os", "ostree-commit", "commit-archive"]),
      ImageFamily::OstreeContainer => names.extend(["os", "ostree-commit", "container-tree", "container"]),
      ImageFamily::OstreeDisk { format } => {
        names.extend(["ostree-deployment", "image"]);
        names.extend(format_pipelines(*format));
      }
      ImageFamily::OstreeInstaller => {
        names.extend(["anaconda-tree", "rootfs-image", "efiboot-tree", "bootiso-tree", "bootiso"]);
      }
      ImageFamily::OstreeSimplifiedInstaller => names.extend([
        "ostree-deployment",
        "image",
        "xz",
        "coi-tree",
        "efiboot-tree",
        "bootiso-tree",
        "bootiso",
      ]),
      ImageFamily::ImageInstaller => names.extend([
        "os",
        "anaconda-tree",
        "rootfs-image",
        "efiboot-tree",
        "bootiso-tree",
        "bootiso",
      ]),
      ImageFamily::LiveInstaller => {
        names.extend(["os", "rootfs-image", "efiboot-tree", "bootiso-tree", "bootiso"]);
      }
    }
    names
  }

  /// True for the commit and container families that produce an OSTree commit.
  pub fn is_ostree_commit(&self) -> bool {
    matches!(self, ImageFamily::OstreeCommit | ImageFamily::OstreeContainer)
  }
}

fn format_pipelines(format: DiskFormat) -> Vec<&'static str> {
  match format {
    DiskFormat::Raw => vec![],
    DiskFormat::Qcow2 => vec!["qcow2"],
    DiskFormat::Vpc => vec!["vpc"],
    DiskFormat::Vmdk => vec!["vmdk"],
    DiskFormat::Ova => vec!["vmdk", "ovf", "archive"],
    DiskFormat::Xz => vec!["xz"],
  }
}

/// Which customizations an image type accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowedCustomizations {
  Unrestricted,
  /// Only these kinds; an empty list accepts none.
  Only(Vec<CustomizationKind>),
}

impl AllowedCustomizations {
  pub fn allows(&self, kind: CustomizationKind) -> bool {
    match self {
      Self::Unrestricted => true,
      Self::Only(kinds) => kinds.contains(&kind),
    }
  }
}

impl fmt::Display for AllowedCustomizations {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Unrestricted => f.write_str("all"),
      Self::Only(kinds) if kinds.is_empty() => f.write_str("None"),
      Self::Only(kinds) => {
        let names: Vec<_> = kinds.iter().map(|k| k.as_str()).collect();
        f.write_str(&names.join(", "))
      }
    }
  }
}

/// A buildable output format for one distribution and architecture.
#[derive(Debug, Clone, Serialize)]
pub struct ImageType {
  #[serde(skip)]
  pub(crate) distro: Arc<DistroInfo>,
  pub(crate) arch: String,
  pub(crate) name: String,
  pub(crate) filename: String,
  pub(crate) mime_type: String,
  pub(crate) boot_mode: BootMode,
  pub(crate) default_size: u64,
  pub(crate) bootable: bool,
  pub(crate) rpm_ostree: bool,
  pub(crate) boot_iso: bool,
  pub(crate) allowed: AllowedCustomizations,
  pub(crate) package_sets: BTreeMap<String, PackageSet>,
  pub(crate) enabled_services: Vec<String>,
  pub(crate) kernel_options: String,
  #[serde(skip)]
  pub(crate) base_table: Option<BaseTable>,
  pub(crate) family: ImageFamily,
}

impl ImageType {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn arch(&self) -> &str {
    &self.arch
  }

  pub fn distro(&self) -> &DistroInfo {
    &self.distro
  }

  pub fn filename(&self) -> &str {
    &self.filename
  }

  pub fn mime_type(&self) -> &str {
    &self.mime_type
  }

  pub fn boot_mode(&self) -> BootMode {
    self.boot_mode
  }

  pub fn bootable(&self) -> bool {
    self.bootable
  }

  pub fn rpm_ostree(&self) -> bool {
    self.rpm_ostree
  }

  pub fn boot_iso(&self) -> bool {
    self.boot_iso
  }

  pub fn family(&self) -> ImageFamily {
    self.family
  }

  pub fn allowed_customizations(&self) -> &AllowedCustomizations {
    &self.allowed
  }

  /// Base package sets keyed by stage (`build`, `os`, `installer`, ...).
  pub fn package_sets(&self) -> &BTreeMap<String, PackageSet> {
    &self.package_sets
  }

  pub fn enabled_services(&self) -> &[String] {
    &self.enabled_services
  }

  pub fn kernel_options(&self) -> &str {
    &self.kernel_options
  }

  pub fn base_table(&self) -> Option<BaseTable> {
    self.base_table
  }

  /// Image size for a request: the default for 0, otherwise `requested`.
  ///
  /// VHD images are rounded up to a whole MiB, or down when rounding up
  /// would leave the `u64` range. Oversized requests are rejected later by
  /// the partition planner.
  pub fn size(&self, requested: u64) -> u64 {
    let size = if requested == 0 { self.default_size } else { requested };
    if self.name == "vhd" {
      return size.checked_next_multiple_of(MIB).unwrap_or(size / MIB * MIB);
    }
    size
  }

  /// The OSTree ref used when the request names none.
  pub fn default_ostree_ref(&self) -> String {
    self.distro.ostree_ref(&self.arch)
  }

  /// Validate a request and assemble its manifest.
  ///
  /// `overrides` replaces the base package set of the named stages. Returns
  /// the manifest together with the build pipeline's package-set chain.
  pub fn manifest(
    &self,
    blueprint: &Blueprint,
    options: &ImageOptions,
    overrides: Option<&BTreeMap<String, PackageSet>>,
    seed: u64,
  ) -> Result<(Manifest, PackageSetChain)> {
    validate(self, blueprint, options)?;

    let manifest = manifest::build(self, blueprint, options, overrides, seed)?;
    let build_chain = manifest.chain("build");

    info!(
      distro = %self.distro.name,
      arch = %self.arch,
      image_type = %self.name,
      pipelines = manifest.pipelines().len(),
      seed,
      "generated manifest"
    );
    Ok((manifest, build_chain))
  }
}
