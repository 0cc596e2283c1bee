//! The image type registry.
//!
//! The registry is built once per process and never changes afterwards. It
//! maps `(distribution, architecture, image type)` to an immutable
//! [`ImageType`] and resolves image type aliases.
//!
//! ```ignore
//! let qcow2 = registry().get_distro("fedora-37")?.get_arch("x86_64")?.get_image_type("qcow2")?;
//! let (manifest, build_chain) = qcow2.manifest(&blueprint, &ImageOptions::default(), None, 0)?;
//! ```

mod fedora;
mod image_type;
mod options;
mod validate;

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ManifestError, Result};

pub use image_type::{AllowedCustomizations, BootMode, DiskFormat, ImageFamily, ImageType};
pub use options::{ImageOptions, OstreeOptions, is_valid_ref};
pub use validate::validate;

/// Static description of a distribution release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroInfo {
  pub name: String,
  pub product: String,
  pub releasever: String,
  pub module_platform_id: String,
  pub vendor: String,
  pub arches: Vec<String>,
}

impl DistroInfo {
  /// Default OSTree ref, e.g. `fedora/37/x86_64/iot`.
  pub fn ostree_ref(&self, arch: &str) -> String {
    format!("{}/{}/{}/iot", self.vendor, self.releasever, arch)
  }

  /// Runner the executor uses for this release, e.g. `org.osbuild.fedora37`.
  pub fn runner(&self) -> String {
    format!("org.osbuild.{}{}", self.vendor, self.releasever)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageTypeKey {
  pub distro: String,
  pub arch: String,
  pub name: String,
}

impl ImageTypeKey {
  pub fn new(distro: &str, arch: &str, name: &str) -> Self {
    Self {
      distro: distro.to_string(),
      arch: arch.to_string(),
      name: name.to_string(),
    }
  }
}

/// The frozen catalog of every known image type.
#[derive(Debug)]
pub struct Registry {
  distros: BTreeMap<String, Arc<DistroInfo>>,
  image_types: BTreeMap<ImageTypeKey, Arc<ImageType>>,
  /// Alias key to canonical image type name.
  aliases: BTreeMap<ImageTypeKey, String>,
}

/// The process wide registry.
pub fn registry() -> &'static Registry {
  static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::fedora);
  &REGISTRY
}

impl Registry {
  fn fedora() -> Self {
    let mut registry = Registry {
      distros: BTreeMap::new(),
      image_types: BTreeMap::new(),
      aliases: BTreeMap::new(),
    };

    for release in fedora::RELEASES {
      let info = Arc::new(fedora::distro_info(release));
      for arch in fedora::ARCHES {
        for image_type in fedora::image_types(&info, release, arch) {
          let key = ImageTypeKey::new(&info.name, arch, image_type.name());
          registry.image_types.insert(key, Arc::new(image_type));
        }
        for (alias, target) in fedora::ALIASES {
          if registry.image_types.contains_key(&ImageTypeKey::new(&info.name, arch, target)) {
            registry
              .aliases
              .insert(ImageTypeKey::new(&info.name, arch, alias), target.to_string());
          }
        }
      }
      registry.distros.insert(info.name.clone(), info);
    }

    debug!(
      distros = registry.distros.len(),
      image_types = registry.image_types.len(),
      "image type registry initialised"
    );
    registry
  }

  /// Names of every registered distribution, sorted.
  pub fn list_distros(&self) -> Vec<&str> {
    self.distros.keys().map(String::as_str).collect()
  }

  pub fn get_distro(&self, name: &str) -> Result<Distribution<'_>> {
    let info = self
      .distros
      .get(name)
      .ok_or_else(|| ManifestError::UnsupportedDistro(name.to_string()))?;
    Ok(Distribution { registry: self, info })
  }
}

/// A handle to one registered distribution.
#[derive(Debug, Clone, Copy)]
pub struct Distribution<'a> {
  registry: &'a Registry,
  info: &'a Arc<DistroInfo>,
}

impl<'a> Distribution<'a> {
  pub fn name(&self) -> &'a str {
    &self.info.name
  }

  pub fn product(&self) -> &'a str {
    &self.info.product
  }

  pub fn releasever(&self) -> &'a str {
    &self.info.releasever
  }

  pub fn module_platform_id(&self) -> &'a str {
    &self.info.module_platform_id
  }

  pub fn info(&self) -> &'a DistroInfo {
    self.info
  }

  pub fn ostree_ref(&self, arch: &str) -> String {
    self.info.ostree_ref(arch)
  }

  /// Architecture names, sorted.
  pub fn list_arches(&self) -> Vec<&'a str> {
    self.info.arches.iter().map(String::as_str).collect()
  }

  pub fn get_arch(&self, name: &str) -> Result<Architecture<'a>> {
    let arch = self
      .info
      .arches
      .iter()
      .find(|a| a.as_str() == name)
      .ok_or_else(|| ManifestError::UnsupportedArchitecture {
        distro: self.info.name.clone(),
        arch: name.to_string(),
      })?;
    Ok(Architecture {
      distro: *self,
      name: arch,
    })
  }
}

/// A handle to one architecture of a distribution.
#[derive(Debug, Clone, Copy)]
pub struct Architecture<'a> {
  distro: Distribution<'a>,
  name: &'a str,
}

impl<'a> Architecture<'a> {
  pub fn name(&self) -> &'a str {
    self.name
  }

  pub fn distro(&self) -> Distribution<'a> {
    self.distro
  }

  /// Canonical image type names, sorted. Aliases are not listed.
  pub fn list_image_types(&self) -> Vec<&'a str> {
    let distro = self.distro.name();
    self
      .distro
      .registry
      .image_types
      .keys()
      .filter(|key| key.distro == distro && key.arch == self.name)
      .map(|key| key.name.as_str())
      .collect()
  }

  /// Look up an image type by canonical name or alias.
  pub fn get_image_type(&self, name: &str) -> Result<Arc<ImageType>> {
    let registry = self.distro.registry;
    let mut key = ImageTypeKey::new(self.distro.name(), self.name, name);
    if let Some(canonical) = registry.aliases.get(&key) {
      key.name = canonical.clone();
    }
    registry
      .image_types
      .get(&key)
      .cloned()
      .ok_or_else(|| ManifestError::UnsupportedImageType {
        arch: self.name.to_string(),
        name: name.to_string(),
      })
  }
}
