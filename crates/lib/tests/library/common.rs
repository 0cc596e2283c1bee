//! Shared helpers for library integration tests.

use std::sync::Arc;

use distrogen_lib::blueprint::{Blueprint, Customizations, FilesystemCustomization};
use distrogen_lib::distro::{ImageType, registry};
use distrogen_lib::rpmmd::PackageSpec;

pub fn image_type(distro: &str, arch: &str, name: &str) -> Arc<ImageType> {
  registry()
    .get_distro(distro)
    .and_then(|d| d.get_arch(arch))
    .and_then(|a| a.get_image_type(name))
    .unwrap_or_else(|e| panic!("{}/{}/{}: {}", distro, arch, name, e))
}

/// Every image type of one release, as `(arch, image type)`.
pub fn all_image_types(distro: &str) -> Vec<(String, Arc<ImageType>)> {
  let distro = registry().get_distro(distro).unwrap();
  let mut all = Vec::new();
  for arch_name in distro.list_arches() {
    let arch = distro.get_arch(arch_name).unwrap();
    for name in arch.list_image_types() {
      all.push((arch_name.to_string(), arch.get_image_type(name).unwrap()));
    }
  }
  all
}

pub fn with_customizations(customizations: Customizations) -> Blueprint {
  Blueprint {
    customizations: Some(customizations),
    ..Default::default()
  }
}

/// A blueprint requesting each mountpoint with a 1 KiB minimum size.
pub fn with_mountpoints(mountpoints: &[&str]) -> Blueprint {
  with_customizations(Customizations {
    filesystem: mountpoints
      .iter()
      .map(|m| FilesystemCustomization::new(m, 1024))
      .collect(),
    ..Default::default()
  })
}

pub fn fake_spec(name: &str, arch: &str) -> PackageSpec {
  PackageSpec {
    name: name.to_string(),
    epoch: 0,
    version: "1.0".to_string(),
    release: "1.fc37".to_string(),
    arch: arch.to_string(),
    remote_location: format!("https://mirror.example.com/{}.rpm", name),
    checksum: format!("sha256:{:0>64}", name.len()),
  }
}
