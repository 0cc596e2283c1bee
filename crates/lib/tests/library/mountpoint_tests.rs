//! Blueprint validation across every Fedora 37 image type.

use distrogen_lib::blueprint::{Blueprint, Customizations, KernelCustomization};
use distrogen_lib::distro::{ImageOptions, ImageType};

use super::common::{all_image_types, with_customizations, with_mountpoints};

const IOT_DISK_ALLOWED: &str = "(allowed: User, Group, Directories, Files, Services)";

fn generate(it: &ImageType, blueprint: &Blueprint) -> Result<(), String> {
  it.manifest(blueprint, &ImageOptions::default(), None, 0)
    .map(|_| ())
    .map_err(|e| e.to_string())
}

fn live_installer_error() -> String {
  r#"unsupported blueprint customizations found for boot ISO image type "live-installer": (allowed: None)"#.to_string()
}

fn iot_disk_error(name: &str) -> String {
  format!("unsupported blueprint customizations found for image type {:?}: {}", name, IOT_DISK_ALLOWED)
}

/// Expected outcome for a mountpoint blueprint, `None` when the type is skipped.
fn expect_mountpoint_result(name: &str, otherwise: Result<(), String>) -> Option<Result<(), String>> {
  match name {
    "iot-commit" | "iot-container" => Some(Err("Custom mountpoints are not supported for ostree types".to_string())),
    "iot-raw-image" | "iot-qcow2-image" => Some(Err(iot_disk_error(name))),
    "iot-installer" | "iot-simplified-installer" | "image-installer" => None,
    "live-installer" => Some(Err(live_installer_error())),
    _ => Some(otherwise),
  }
}

#[test]
fn kernel_append_is_rejected_where_unsupported() {
  let bp = with_customizations(Customizations {
    kernel: Some(KernelCustomization {
      append: "debug".to_string(),
      ..Default::default()
    }),
    ..Default::default()
  });

  for (arch, it) in all_image_types("fedora-37") {
    let name = it.name();
    let options = ImageOptions {
      size: it.size(0),
      ..Default::default()
    };
    let result = it.manifest(&bp, &options, None, 0).map(|_| ()).map_err(|e| e.to_string());
    let expected = match name {
      "iot-commit" | "iot-container" => {
        Err("kernel boot parameter customizations are not supported for ostree types".to_string())
      }
      "iot-installer" | "iot-simplified-installer" => Err(format!(
        "boot ISO image type {:?} requires specifying a URL from which to retrieve the OSTree commit",
        name
      )),
      "image-installer" => Err(format!(
        "unsupported blueprint customizations found for boot ISO image type {:?}: (allowed: User, Group)",
        name
      )),
      "live-installer" => Err(live_installer_error()),
      "iot-raw-image" | "iot-qcow2-image" => Err(iot_disk_error(name)),
      _ => Ok(()),
    };
    assert_eq!(result, expected, "{}/{}", arch, name);
  }
}

#[test]
fn etc_mountpoint_is_rejected() {
  let bp = with_mountpoints(&["/etc"]);
  for (arch, it) in all_image_types("fedora-37") {
    let otherwise = Err(r#"The following custom mountpoints are not supported ["/etc"]"#.to_string());
    if let Some(expected) = expect_mountpoint_result(it.name(), otherwise) {
      assert_eq!(generate(&it, &bp), expected, "{}/{}", arch, it.name());
    }
  }
}

#[test]
fn root_mountpoint_is_accepted() {
  let bp = with_mountpoints(&["/"]);
  for (arch, it) in all_image_types("fedora-37") {
    if let Some(expected) = expect_mountpoint_result(it.name(), Ok(())) {
      assert_eq!(generate(&it, &bp), expected, "{}/{}", arch, it.name());
    }
  }
}

#[test]
fn usr_mountpoint_smaller_than_default_is_accepted() {
  let bp = with_mountpoints(&["/usr"]);
  for (arch, it) in all_image_types("fedora-37") {
    if let Some(expected) = expect_mountpoint_result(it.name(), Ok(())) {
      assert_eq!(generate(&it, &bp), expected, "{}/{}", arch, it.name());
    }
  }
}

/// Image types outside the iot and image-installer families.
fn plain_types() -> impl Iterator<Item = (String, std::sync::Arc<ImageType>)> {
  all_image_types("fedora-37")
    .into_iter()
    .filter(|(_, it)| !it.name().starts_with("iot-") && !it.name().starts_with("image-"))
}

#[test]
fn nested_mountpoints_are_accepted() {
  let nested = with_mountpoints(&["/var/log", "/var/log/audit"]);
  let deep = with_mountpoints(&["/var/a", "/var/a/b", "/var/a/b/c", "/var/a/b/c/d"]);
  for (arch, it) in plain_types() {
    let expected = if it.name() == "live-installer" { Err(live_installer_error()) } else { Ok(()) };
    assert_eq!(generate(&it, &nested), expected, "{}/{}", arch, it.name());
    assert_eq!(generate(&it, &deep), expected, "{}/{}", arch, it.name());
  }
}

#[test]
fn dirty_mountpoints_are_rejected() {
  let bp = with_mountpoints(&["//", "/var//", "/var//log/audit/"]);
  for (arch, it) in plain_types() {
    let expected = if it.name() == "live-installer" {
      Err(live_installer_error())
    } else {
      Err(r#"The following custom mountpoints are not supported ["//" "/var//" "/var//log/audit/"]"#.to_string())
    };
    assert_eq!(generate(&it, &bp), expected, "{}/{}", arch, it.name());
  }
}
