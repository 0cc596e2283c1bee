//! Checking a blueprint and options against an image type.
//!
//! Checks run in a fixed order and the first failure is returned, so callers
//! always see the same error for the same request.

use tracing::warn;

use super::{AllowedCustomizations, ImageFamily, ImageOptions, ImageType};
use crate::blueprint::policy::{check_mountpoints, check_paths};
use crate::blueprint::{Blueprint, Customizations, FdoCustomization};
use crate::error::{ManifestError, OstreeConflict, Result};

pub fn validate(image_type: &ImageType, blueprint: &Blueprint, options: &ImageOptions) -> Result<()> {
  let customizations = blueprint.customizations();
  let family = image_type.family();

  if let Some(ostree) = &options.ostree {
    ostree.validate()?;
  }

  if image_type.boot_iso() && image_type.rpm_ostree() && options.ostree_url().is_none() {
    return Err(ManifestError::MissingOstreeUrl {
      image_type: image_type.name().to_string(),
      boot_iso: true,
    });
  }

  check_allowed(image_type, customizations)?;

  if family == ImageFamily::OstreeSimplifiedInstaller {
    check_simplified_installer(image_type, customizations)?;
  }

  if family.is_ostree_commit() {
    if customizations.kernel_append().is_some() {
      return Err(ManifestError::OstreeCustomizationConflict(OstreeConflict::KernelArguments));
    }
    if !customizations.filesystem.is_empty() {
      return Err(ManifestError::OstreeCustomizationConflict(OstreeConflict::Mountpoints));
    }
  }

  if matches!(family, ImageFamily::OstreeDisk { .. }) && options.ostree_url().is_none() {
    return Err(ManifestError::MissingOstreeUrl {
      image_type: image_type.name().to_string(),
      boot_iso: false,
    });
  }

  check_mountpoints(&customizations.filesystem)?;
  check_paths(&customizations.directories, &customizations.files)?;

  if options.size != 0 && image_type.base_table().is_none() {
    warn!(image_type = %image_type.name(), size = options.size, "image type has no disk, requested size is ignored");
  }
  Ok(())
}

fn check_allowed(image_type: &ImageType, customizations: &Customizations) -> Result<()> {
  let AllowedCustomizations::Only(allowed) = image_type.allowed_customizations() else {
    return Ok(());
  };
  let rejected = customizations.present_kinds().into_iter().any(|kind| !allowed.contains(&kind));
  if rejected {
    return Err(ManifestError::UnsupportedCustomization {
      image_type: image_type.name().to_string(),
      boot_iso: image_type.boot_iso(),
      allowed: allowed.clone(),
    });
  }
  Ok(())
}

fn check_simplified_installer(image_type: &ImageType, customizations: &Customizations) -> Result<()> {
  let invalid = |reason: &str| ManifestError::InvalidInstallerCustomization {
    image_type: image_type.name().to_string(),
    reason: reason.to_string(),
  };

  if customizations.installation_device.as_deref().is_none_or(str::is_empty) {
    return Err(invalid("requires specifying an installation device to install to"));
  }

  if let Some(fdo) = &customizations.fdo {
    if fdo.manufacturing_server_url.is_empty() {
      return Err(invalid("requires specifying FDO.ManufacturingServerURL configuration to install to"));
    }
    if diun_options(fdo) != 1 {
      return Err(invalid(
        "requires specifying one of [FDO.DiunPubKeyHash,FDO.DiunPubKeyInsecure,FDO.DiunPubKeyRootCerts] configuration to install to",
      ));
    }
  }
  Ok(())
}

fn diun_options(fdo: &FdoCustomization) -> usize {
  [
    &fdo.diun_pub_key_insecure,
    &fdo.diun_pub_key_hash,
    &fdo.diun_pub_key_root_certs,
  ]
  .into_iter()
  .filter(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
  .count()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blueprint::{FilesystemCustomization, KernelCustomization, UserCustomization};
  use crate::distro::{OstreeOptions, registry};

  fn image_type(release: &str, arch: &str, name: &str) -> std::sync::Arc<ImageType> {
    registry()
      .get_distro(release)
      .and_then(|d| d.get_arch(arch))
      .and_then(|a| a.get_image_type(name))
      .unwrap()
  }

  fn with_customizations(c: Customizations) -> Blueprint {
    Blueprint {
      customizations: Some(c),
      ..Default::default()
    }
  }

  fn with_url() -> ImageOptions {
    ImageOptions {
      ostree: Some(OstreeOptions {
        url: "https://ostree.example.com/repo".to_string(),
        ..Default::default()
      }),
      ..Default::default()
    }
  }

  fn admin() -> Vec<UserCustomization> {
    vec![UserCustomization {
      name: "admin".to_string(),
      ..Default::default()
    }]
  }

  #[test]
  fn installer_url_check_precedes_allow_list() {
    let it = image_type("fedora-37", "x86_64", "iot-installer");
    let bp = with_customizations(Customizations {
      hostname: Some("box".to_string()),
      ..Default::default()
    });
    let err = validate(&it, &bp, &ImageOptions::default()).unwrap_err();
    assert!(matches!(err, ManifestError::MissingOstreeUrl { boot_iso: true, .. }));

    let err = validate(&it, &bp, &with_url()).unwrap_err();
    assert_eq!(
      err.to_string(),
      r#"unsupported blueprint customizations found for boot ISO image type "iot-installer": (allowed: User, Group)"#
    );
  }

  #[test]
  fn ostree_disk_allow_list_precedes_url_check() {
    let it = image_type("fedora-37", "aarch64", "iot-raw-image");
    let bp = with_customizations(Customizations {
      kernel: Some(KernelCustomization {
        append: "debug".to_string(),
        ..Default::default()
      }),
      ..Default::default()
    });
    let err = validate(&it, &bp, &ImageOptions::default()).unwrap_err();
    assert!(matches!(err, ManifestError::UnsupportedCustomization { boot_iso: false, .. }));

    let err = validate(&it, &Blueprint::default(), &ImageOptions::default()).unwrap_err();
    assert_eq!(
      err.to_string(),
      r#""iot-raw-image" image type requires specifying a URL from which to retrieve the OSTree commit"#
    );
    assert!(validate(&it, &Blueprint::default(), &with_url()).is_ok());
  }

  #[test]
  fn commit_types_reject_kernel_append_before_mountpoints() {
    let it = image_type("fedora-37", "x86_64", "iot-commit");
    let bp = with_customizations(Customizations {
      kernel: Some(KernelCustomization {
        append: "debug".to_string(),
        ..Default::default()
      }),
      filesystem: vec![FilesystemCustomization::new("/var", 1024)],
      ..Default::default()
    });
    let err = validate(&it, &bp, &ImageOptions::default()).unwrap_err();
    assert!(matches!(
      err,
      ManifestError::OstreeCustomizationConflict(OstreeConflict::KernelArguments)
    ));
  }

  #[test]
  fn simplified_installer_requires_installation_device() {
    let it = image_type("fedora-38", "x86_64", "iot-simplified-installer");
    let err = validate(&it, &Blueprint::default(), &with_url()).unwrap_err();
    assert_eq!(
      err.to_string(),
      r#"boot ISO image type "iot-simplified-installer" requires specifying an installation device to install to"#
    );

    let bp = with_customizations(Customizations {
      installation_device: Some("/dev/vda".to_string()),
      user: admin(),
      ..Default::default()
    });
    assert!(validate(&it, &bp, &with_url()).is_ok());
  }

  #[test]
  fn simplified_installer_fdo_needs_exactly_one_diun_option() {
    let it = image_type("fedora-39", "aarch64", "iot-simplified-installer");
    let mut fdo = FdoCustomization {
      manufacturing_server_url: "http://fdo.example.com:8080".to_string(),
      ..Default::default()
    };
    let bp = |fdo: FdoCustomization| {
      with_customizations(Customizations {
        installation_device: Some("/dev/vda".to_string()),
        fdo: Some(fdo),
        ..Default::default()
      })
    };

    assert!(validate(&it, &bp(fdo.clone()), &with_url()).is_err());
    fdo.diun_pub_key_insecure = Some("true".to_string());
    assert!(validate(&it, &bp(fdo.clone()), &with_url()).is_ok());
    fdo.diun_pub_key_hash = Some("sha256:abc".to_string());
    assert!(validate(&it, &bp(fdo.clone()), &with_url()).is_err());
    fdo.manufacturing_server_url.clear();
    assert!(validate(&it, &bp(fdo), &with_url()).is_err());
  }

  #[test]
  fn live_installer_accepts_no_customizations() {
    let it = image_type("fedora-40", "x86_64", "live-installer");
    let bp = with_customizations(Customizations {
      user: admin(),
      ..Default::default()
    });
    let err = validate(&it, &bp, &ImageOptions::default()).unwrap_err();
    assert!(err.to_string().ends_with("(allowed: None)"));
  }

  #[test]
  fn unrestricted_types_check_mountpoints() {
    let it = image_type("fedora-37", "s390x", "qcow2");
    let bp = with_customizations(Customizations {
      filesystem: vec![FilesystemCustomization::new("/etc", 1024)],
      ..Default::default()
    });
    let err = validate(&it, &bp, &ImageOptions::default()).unwrap_err();
    assert_eq!(err.to_string(), r#"The following custom mountpoints are not supported ["/etc"]"#);
  }

  #[test]
  fn parent_ref_without_url_fails_first() {
    let it = image_type("fedora-37", "x86_64", "iot-commit");
    let options = ImageOptions {
      ostree: Some(OstreeOptions {
        parent_ref: "fedora/37/x86_64/iot".to_string(),
        ..Default::default()
      }),
      ..Default::default()
    };
    let err = validate(&it, &Blueprint::default(), &options).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidOstreeOptions(_)));
  }

  #[test]
  #[tracing_test::traced_test]
  fn size_on_diskless_type_only_warns() {
    let it = image_type("fedora-37", "x86_64", "wsl");
    let options = ImageOptions {
      size: 10 * crate::consts::GIB,
      ..Default::default()
    };
    assert!(validate(&it, &Blueprint::default(), &options).is_ok());
    assert!(logs_contain("requested size is ignored"));
  }
}
