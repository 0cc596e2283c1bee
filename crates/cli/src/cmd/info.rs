//! Implementation of the `distrogen info` command.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use distrogen_lib::distro::registry;
use distrogen_lib::rpmmd::PackageSet;

use crate::output::{OutputFormat, format_bytes, print_heading, print_json, print_stat};

#[derive(Serialize)]
struct ImageTypeInfo<'a> {
  distro: &'a str,
  arch: &'a str,
  name: &'a str,
  filename: &'a str,
  mime_type: &'a str,
  boot_mode: &'a str,
  bootable: bool,
  rpm_ostree: bool,
  boot_iso: bool,
  default_size: u64,
  allowed_customizations: String,
  enabled_services: &'a [String],
  kernel_options: &'a str,
  pipelines: Vec<&'static str>,
  package_sets: &'a BTreeMap<String, PackageSet>,
}

/// Show how one image type is defined.
pub fn cmd_info(distro: &str, arch: &str, image_type: &str, format: OutputFormat) -> Result<()> {
  let image_type = registry().get_distro(distro)?.get_arch(arch)?.get_image_type(image_type)?;

  let info = ImageTypeInfo {
    distro: &image_type.distro().name,
    arch: image_type.arch(),
    name: image_type.name(),
    filename: image_type.filename(),
    mime_type: image_type.mime_type(),
    boot_mode: image_type.boot_mode().as_str(),
    bootable: image_type.bootable(),
    rpm_ostree: image_type.rpm_ostree(),
    boot_iso: image_type.boot_iso(),
    default_size: image_type.size(0),
    allowed_customizations: image_type.allowed_customizations().to_string(),
    enabled_services: image_type.enabled_services(),
    kernel_options: image_type.kernel_options(),
    pipelines: image_type.family().pipeline_names(),
    package_sets: image_type.package_sets(),
  };

  if format.is_json() {
    return print_json(&info);
  }

  print_heading(&format!("{} ({} / {})", info.name, info.distro, info.arch));
  print_stat("Filename", info.filename);
  print_stat("MIME type", info.mime_type);
  print_stat("Boot mode", info.boot_mode);
  print_stat("Default size", &format_bytes(info.default_size));
  print_stat("Customizations", &info.allowed_customizations);
  if !info.kernel_options.is_empty() {
    print_stat("Kernel options", info.kernel_options);
  }
  if !info.enabled_services.is_empty() {
    print_stat("Services", &info.enabled_services.join(", "));
  }
  print_stat("Pipelines", &info.pipelines.join(" -> "));
  for (stage, set) in info.package_sets {
    print_stat(
      &format!("Packages ({})", stage),
      &format!("{} included, {} excluded", set.include.len(), set.exclude.len()),
    );
  }
  Ok(())
}
