//! Registry lookups: releases, architectures, image types and aliases.

use distrogen_lib::ManifestError;
use distrogen_lib::distro::registry;

use super::common::{all_image_types, image_type};

#[test]
fn fedora_37_is_registered() {
  let distro = registry().get_distro("fedora-37").unwrap();
  assert_eq!(distro.name(), "fedora-37");
  assert_eq!(distro.product(), "Fedora");
  assert_eq!(distro.releasever(), "37");
}

#[test]
fn lists_arches() {
  let distro = registry().get_distro("fedora-37").unwrap();
  assert_eq!(distro.list_arches(), vec!["aarch64", "ppc64le", "s390x", "x86_64"]);
}

#[test]
fn unknown_arch_is_rejected() {
  let err = registry().get_distro("fedora-37").unwrap().get_arch("mips").unwrap_err();
  assert_eq!(err.to_string(), r#"invalid architecture "mips" for distribution "fedora-37""#);
}

#[test]
fn filenames_and_mime_types() {
  let cases = [
    ("ami", "image.raw", "application/octet-stream"),
    ("container", "container.tar", "application/x-tar"),
    ("image-installer", "installer.iso", "application/x-iso9660-image"),
    ("iot-commit", "commit.tar", "application/x-tar"),
    ("iot-container", "container.tar", "application/x-tar"),
    ("iot-installer", "installer.iso", "application/x-iso9660-image"),
    ("iot-raw-image", "image.raw.xz", "application/xz"),
    ("iot-qcow2-image", "image.qcow2", "application/x-qemu-disk"),
    ("live-installer", "live-installer.iso", "application/x-iso9660-image"),
    ("minimal-raw", "raw.img.xz", "application/xz"),
    ("oci", "disk.qcow2", "application/x-qemu-disk"),
    ("openstack", "disk.qcow2", "application/x-qemu-disk"),
    ("ova", "image.ova", "application/ovf"),
    ("qcow2", "disk.qcow2", "application/x-qemu-disk"),
    ("vhd", "disk.vhd", "application/x-vhd"),
    ("vmdk", "disk.vmdk", "application/x-vmdk"),
    ("wsl", "wsl.tar", "application/x-tar"),
  ];
  for (name, filename, mime_type) in cases {
    let it = image_type("fedora-37", "x86_64", name);
    assert_eq!(it.filename(), filename, "{}", name);
    assert_eq!(it.mime_type(), mime_type, "{}", name);
  }
}

#[test]
fn aliases_resolve_to_canonical_types() {
  let arch = registry().get_distro("fedora-37").unwrap().get_arch("x86_64").unwrap();
  for (alias, canonical) in [
    ("fedora-iot-commit", "iot-commit"),
    ("fedora-iot-container", "iot-container"),
    ("fedora-iot-installer", "iot-installer"),
    ("fedora-image-installer", "image-installer"),
  ] {
    assert_eq!(arch.get_image_type(alias).unwrap().name(), canonical);
  }
  assert!(!arch.list_image_types().contains(&"fedora-iot-commit"));
}

#[test]
fn simplified_installer_starts_with_fedora_38() {
  let has = |release: &str| {
    let arch = registry().get_distro(release).unwrap().get_arch("x86_64").unwrap();
    arch.list_image_types().contains(&"iot-simplified-installer")
  };
  assert!(!has("fedora-37"));
  assert!(has("fedora-38"));
  assert!(has("fedora-40"));
}

#[test]
fn s390x_and_ppc64le_only_build_container_and_qcow2() {
  let distro = registry().get_distro("fedora-39").unwrap();
  for arch in ["ppc64le", "s390x"] {
    assert_eq!(distro.get_arch(arch).unwrap().list_image_types(), vec!["container", "qcow2"]);
  }
  let err = distro.get_arch("s390x").unwrap().get_image_type("ami").unwrap_err();
  assert!(matches!(err, ManifestError::UnsupportedImageType { .. }));
}

#[test]
fn x86_64_disk_builds_install_grub2_pc() {
  for (arch, it) in all_image_types("fedora-37") {
    if it.base_table().is_none() || it.rpm_ostree() {
      continue;
    }
    let build = &it.package_sets()["build"];
    assert_eq!(
      build.include.contains(&"grub2-pc".to_string()),
      arch == "x86_64",
      "{}/{}",
      arch,
      it.name()
    );
  }
}

#[test]
fn lists_image_types_exactly() {
  let shared = [
    "ami",
    "container",
    "image-installer",
    "iot-commit",
    "iot-container",
    "iot-installer",
    "iot-qcow2-image",
    "iot-raw-image",
    "live-installer",
    "minimal-raw",
    "oci",
    "openstack",
    "qcow2",
  ];

  for release in 37..=40 {
    let distro = registry().get_distro(&format!("fedora-{}", release)).unwrap();

    let mut aarch64 = shared.to_vec();
    if release >= 38 {
      aarch64.insert(8, "iot-simplified-installer");
    }
    let mut x86_64 = aarch64.clone();
    x86_64.insert(x86_64.len() - 1, "ova");
    x86_64.extend(["vhd", "vmdk", "wsl"]);

    for (arch, expected) in [
      ("aarch64", aarch64),
      ("ppc64le", vec!["container", "qcow2"]),
      ("s390x", vec!["container", "qcow2"]),
      ("x86_64", x86_64),
    ] {
      let arch = distro.get_arch(arch).unwrap();
      assert_eq!(arch.list_image_types(), expected, "{}/{}", distro.name(), arch.name());
      for name in expected {
        assert_eq!(arch.get_image_type(name).unwrap().name(), name);
      }
    }
  }
}
