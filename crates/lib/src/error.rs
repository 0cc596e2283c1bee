//! Error types for manifest generation.
//!
//! Every failure of a manifest request maps to one [`ManifestError`] variant.
//! The `Display` output of each variant is a single line; several of them are
//! matched verbatim by downstream tooling.

use std::time::Duration;

use thiserror::Error;

use crate::blueprint::CustomizationKind;

/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Boxed error produced by a package resolver implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why an OSTree image type refused a customization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OstreeConflict {
  KernelArguments,
  Mountpoints,
}

impl std::fmt::Display for OstreeConflict {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OstreeConflict::KernelArguments => {
        write!(f, "kernel boot parameter customizations are not supported for ostree types")
      }
      OstreeConflict::Mountpoints => write!(f, "Custom mountpoints are not supported for ostree types"),
    }
  }
}

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("unsupported distribution: {0:?}")]
  UnsupportedDistro(String),

  #[error("invalid architecture {arch:?} for distribution {distro:?}")]
  UnsupportedArchitecture { distro: String, arch: String },

  #[error("invalid image type {name:?} for architecture {arch:?}")]
  UnsupportedImageType { arch: String, name: String },

  #[error(
    "unsupported blueprint customizations found for {}: (allowed: {})",
    describe_image_type(.image_type, *.boot_iso),
    join_kinds(.allowed)
  )]
  UnsupportedCustomization {
    image_type: String,
    boot_iso: bool,
    allowed: Vec<CustomizationKind>,
  },

  #[error("{0}")]
  OstreeCustomizationConflict(OstreeConflict),

  #[error("{}", missing_url_message(.image_type, *.boot_iso))]
  MissingOstreeUrl { image_type: String, boot_iso: bool },

  #[error("{0}")]
  InvalidOstreeOptions(String),

  #[error("boot ISO image type {image_type:?} {reason}")]
  InvalidInstallerCustomization { image_type: String, reason: String },

  #[error("The following custom mountpoints are not supported [{}]", quote_list(.paths))]
  DirtyMountpoint { paths: Vec<String> },

  #[error("The following custom mountpoints are not supported [{}]", quote_list(.paths))]
  UnsupportedMountpoint { paths: Vec<String> },

  #[error("mountpoint {mountpoint:?} is specified more than once")]
  DuplicateMountpoint { mountpoint: String },

  #[error("invalid customization for path {path:?}: {reason}")]
  InvalidPathCustomization { path: String, reason: String },

  #[error("{table} partition table is not large enough: layout requires {required} bytes but at most {limit} bytes are addressable")]
  InsufficientPartitionSize { table: String, required: u64, limit: u64 },

  #[error("too many partitions: {count} requested but a {table} partition table holds at most {max}")]
  TooManyPartitions { table: String, count: usize, max: usize },

  #[error("invalid pipeline graph: {0}")]
  InvalidPipelineGraph(String),

  #[error("package resolution failed for pipeline {pipeline:?}: {source}")]
  ResolutionFailed {
    pipeline: String,
    #[source]
    source: BoxError,
  },

  #[error("package resolution timed out after {timeout:?}")]
  ResolutionTimedOut { timeout: Duration },

  #[error("package resolution was cancelled")]
  ResolutionCancelled,

  #[error("no resolved packages provided for pipeline {pipeline:?}")]
  MissingPackageSpecs { pipeline: String },

  #[error("serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),
}

fn describe_image_type(name: &str, boot_iso: bool) -> String {
  if boot_iso {
    format!("boot ISO image type {:?}", name)
  } else {
    format!("image type {:?}", name)
  }
}

fn join_kinds(kinds: &[CustomizationKind]) -> String {
  if kinds.is_empty() {
    return "None".to_string();
  }
  kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

fn missing_url_message(name: &str, boot_iso: bool) -> String {
  if boot_iso {
    format!(
      "boot ISO image type {:?} requires specifying a URL from which to retrieve the OSTree commit",
      name
    )
  } else {
    format!(
      "{:?} image type requires specifying a URL from which to retrieve the OSTree commit",
      name
    )
  }
}

fn quote_list(paths: &[String]) -> String {
  paths.iter().map(|p| format!("{:?}", p)).collect::<Vec<_>>().join(" ")
}
