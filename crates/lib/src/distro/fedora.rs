//! The Fedora catalog: releases, architectures and their image types.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AllowedCustomizations, BootMode, DiskFormat, DistroInfo, ImageFamily, ImageType};
use crate::blueprint::CustomizationKind as K;
use crate::consts::GIB;
use crate::disk::BaseTable;
use crate::rpmmd::PackageSet;

pub const RELEASES: [u32; 4] = [37, 38, 39, 40];

pub const ARCHES: [&str; 4] = ["aarch64", "ppc64le", "s390x", "x86_64"];

/// Alternative names accepted for image types, alias first.
pub const ALIASES: [(&str, &str); 4] = [
  ("fedora-iot-commit", "iot-commit"),
  ("fedora-iot-container", "iot-container"),
  ("fedora-iot-installer", "iot-installer"),
  ("fedora-image-installer", "image-installer"),
];

/// First release that ships the simplified installer.
const SIMPLIFIED_INSTALLER_SINCE: u32 = 38;

const CLOUD_KERNEL_OPTIONS: &str = "ro no_timer_check console=ttyS0,115200n8 biosdevname=0 net.ifnames=0";
const VHD_KERNEL_OPTIONS: &str = "ro biosdevname=0 rootdelay=300 console=ttyS0 earlyprintk=ttyS0 net.ifnames=0";
const IOT_KERNEL_OPTIONS: &str = "modprobe.blacklist=vc4";

const CLOUD_SERVICES: &[&str] = &[
  "cloud-init.service",
  "cloud-config.service",
  "cloud-final.service",
  "cloud-init-local.service",
];

const IOT_SERVICES: &[&str] = &[
  "NetworkManager.service",
  "firewalld.service",
  "sshd.service",
  "greenboot-grub2-set-counter",
  "greenboot-grub2-set-success",
  "greenboot-healthcheck",
  "greenboot-rpm-ostree-grub2-check-fallback",
  "greenboot-status",
  "greenboot-task-runner",
  "redboot-auto-reboot",
  "redboot-task-runner",
];

pub fn distro_info(release: u32) -> DistroInfo {
  DistroInfo {
    name: format!("fedora-{}", release),
    product: "Fedora".to_string(),
    releasever: release.to_string(),
    module_platform_id: format!("platform:f{}", release),
    vendor: "fedora".to_string(),
    arches: ARCHES.iter().map(|a| a.to_string()).collect(),
  }
}

/// A catalog entry before the architecture specific parts are filled in.
struct Def {
  name: &'static str,
  filename: &'static str,
  mime_type: &'static str,
  family: ImageFamily,
  default_size: u64,
  base_table: Option<BaseTable>,
  allowed: AllowedCustomizations,
  kernel_options: &'static str,
  services: &'static [&'static str],
  sets: Vec<(&'static str, PackageSet)>,
}

impl Def {
  fn new(name: &'static str, filename: &'static str, mime_type: &'static str, family: ImageFamily) -> Self {
    Self {
      name,
      filename,
      mime_type,
      family,
      default_size: 0,
      base_table: None,
      allowed: AllowedCustomizations::Unrestricted,
      kernel_options: "",
      services: &[],
      sets: Vec::new(),
    }
  }

  fn disk(mut self, size: u64, table: BaseTable) -> Self {
    self.default_size = size;
    self.base_table = Some(table);
    self
  }

  fn allow(mut self, kinds: &[K]) -> Self {
    self.allowed = AllowedCustomizations::Only(kinds.to_vec());
    self
  }

  fn kernel_options(mut self, options: &'static str) -> Self {
    self.kernel_options = options;
    self
  }

  fn services(mut self, services: &'static [&'static str]) -> Self {
    self.services = services;
    self
  }

  fn set(mut self, stage: &'static str, set: PackageSet) -> Self {
    self.sets.push((stage, set));
    self
  }

  fn finish(self, distro: &Arc<DistroInfo>, arch: &str) -> ImageType {
    let rpm_ostree = matches!(
      self.family,
      ImageFamily::OstreeCommit
        | ImageFamily::OstreeContainer
        | ImageFamily::OstreeDisk { .. }
        | ImageFamily::OstreeInstaller
        | ImageFamily::OstreeSimplifiedInstaller
    );
    let boot_iso = matches!(
      self.family,
      ImageFamily::OstreeInstaller
        | ImageFamily::OstreeSimplifiedInstaller
        | ImageFamily::ImageInstaller
        | ImageFamily::LiveInstaller
    );
    let boot_mode = boot_mode(self.family, self.base_table, arch);

    let mut package_sets: BTreeMap<String, PackageSet> = BTreeMap::new();
    package_sets.insert("build".to_string(), build_set(arch, boot_iso, rpm_ostree));
    for (stage, set) in self.sets {
      package_sets.insert(stage.to_string(), set);
    }

    ImageType {
      distro: Arc::clone(distro),
      arch: arch.to_string(),
      name: self.name.to_string(),
      filename: self.filename.to_string(),
      mime_type: self.mime_type.to_string(),
      boot_mode,
      default_size: self.default_size,
      bootable: boot_mode != BootMode::None,
      rpm_ostree,
      boot_iso,
      allowed: self.allowed,
      package_sets,
      enabled_services: self.services.iter().map(|s| s.to_string()).collect(),
      kernel_options: self.kernel_options.to_string(),
      base_table: self.base_table,
      family: self.family,
    }
  }
}

fn boot_mode(family: ImageFamily, table: Option<BaseTable>, arch: &str) -> BootMode {
  if matches!(
    family,
    ImageFamily::Archive { .. } | ImageFamily::OstreeCommit | ImageFamily::OstreeContainer
  ) {
    return BootMode::None;
  }
  match arch {
    "x86_64" if matches!(table, Some(BaseTable::Iot | BaseTable::MinimalRaw)) => BootMode::Uefi,
    "x86_64" => BootMode::Hybrid,
    "aarch64" => BootMode::Uefi,
    _ => BootMode::Legacy,
  }
}

fn build_set(arch: &str, boot_iso: bool, rpm_ostree: bool) -> PackageSet {
  let mut set = PackageSet::new([
    "dnf",
    "dosfstools",
    "e2fsprogs",
    "policycoreutils",
    "qemu-img",
    "selinux-policy-targeted",
    "systemd",
    "tar",
    "xz",
  ]);
  match arch {
    "x86_64" => set.include.push("grub2-pc".to_string()),
    "ppc64le" => set.include.extend(["grub2-ppc64le".to_string(), "grub2-ppc64le-modules".to_string()]),
    "s390x" => set.include.push("s390utils-base".to_string()),
    _ => {}
  }
  if boot_iso {
    set = set.append(PackageSet::new([
      "isomd5sum",
      "lorax-templates-generic",
      "squashfs-tools",
      "xorriso",
    ]));
  }
  if rpm_ostree {
    set.include.push("rpm-ostree".to_string());
  }
  set
}

fn bootloader_packages(arch: &str) -> PackageSet {
  match arch {
    "x86_64" => PackageSet::new(["grub2-pc", "grub2-efi-x64", "shim-x64", "efibootmgr"]),
    "aarch64" => PackageSet::new(["grub2-efi-aa64", "shim-aa64", "efibootmgr"]),
    "ppc64le" => PackageSet::new(["grub2-ppc64le", "grub2-ppc64le-modules", "powerpc-utils"]),
    "s390x" => PackageSet::new(["s390utils-base"]),
    _ => PackageSet::default(),
  }
}

fn cloud_base_set(arch: &str) -> PackageSet {
  PackageSet::new([
    "kernel",
    "chrony",
    "cloud-init",
    "cloud-utils-growpart",
    "dnf",
    "dracut-config-generic",
    "e2fsprogs",
    "fedora-release-cloud",
    "langpacks-en",
    "NetworkManager",
    "passwd",
    "qemu-guest-agent",
    "rsync",
    "selinux-policy-targeted",
    "sudo",
    "systemd-udev",
    "tar",
  ])
  .with_exclude([
    "dracut-config-rescue",
    "firewalld",
    "geolite2-city",
    "geolite2-country",
    "plymouth",
    "zram-generator-defaults",
  ])
  .append(bootloader_packages(arch))
}

fn vmware_set(arch: &str) -> PackageSet {
  cloud_base_set(arch).append(PackageSet::new(["open-vm-tools"]).with_exclude(["qemu-guest-agent"]))
}

fn container_set() -> PackageSet {
  PackageSet::new([
    "bash",
    "coreutils",
    "dnf",
    "fedora-release-container",
    "glibc-minimal-langpack",
    "rootfiles",
    "rpm",
    "sudo",
    "tar",
    "vim-minimal",
  ])
  .with_exclude([
    "crypto-policies-scripts",
    "dosfstools",
    "e2fsprogs",
    "fuse-libs",
    "grubby",
    "kernel",
    "libxcrypt-compat",
    "util-linux",
  ])
}

fn wsl_set() -> PackageSet {
  container_set().append(PackageSet::new(["passwd", "shadow-utils", "procps-ng", "iproute", "iputils"]))
}

fn minimal_raw_set(arch: &str) -> PackageSet {
  PackageSet::new([
    "kernel",
    "dnf",
    "dracut-config-generic",
    "fedora-release",
    "initial-setup",
    "libxkbcommon",
    "NetworkManager",
    "NetworkManager-wifi",
    "openssh-server",
    "rootfiles",
    "selinux-policy-targeted",
    "sudo",
    "systemd",
  ])
  .with_exclude(["dracut-config-rescue"])
  .append(bootloader_packages(arch))
}

fn iot_commit_set(arch: &str) -> PackageSet {
  let mut set = PackageSet::new([
    "kernel",
    "fedora-release-iot",
    "glibc",
    "glibc-minimal-langpack",
    "nss-altfiles",
    "sssd-client",
    "shadow-utils",
    "dracut-config-generic",
    "dracut-network",
    "polkit",
    "lvm2",
    "cryptsetup",
    "e2fsprogs",
    "xfsprogs",
    "dosfstools",
    "bash",
    "coreutils",
    "curl",
    "firewalld",
    "NetworkManager",
    "NetworkManager-wifi",
    "openssh-server",
    "openssh-clients",
    "passwd",
    "policycoreutils",
    "rpm",
    "rpm-ostree",
    "ostree",
    "selinux-policy-targeted",
    "sudo",
    "systemd",
    "util-linux",
    "vim-minimal",
    "greenboot",
    "greenboot-default-health-checks",
    "ignition",
    "podman",
    "container-selinux",
    "skopeo",
    "clevis",
    "clevis-dracut",
    "clevis-luks",
    "chrony",
  ]);
  match arch {
    "x86_64" => set.include.extend(
      ["grub2-efi-x64", "efibootmgr", "shim-x64", "microcode_ctl", "iwl7260-firmware"].map(String::from),
    ),
    "aarch64" => set.include.extend(
      ["grub2-efi-aa64", "efibootmgr", "shim-aa64", "uboot-images-armv8", "bcm283x-firmware"].map(String::from),
    ),
    _ => {}
  }
  set
}

fn anaconda_set(arch: &str) -> PackageSet {
  PackageSet::new([
    "kernel",
    "anaconda-dracut",
    "anaconda-install-env-deps",
    "anaconda-widgets",
    "curl",
    "dracut-config-generic",
    "dracut-network",
    "glibc-all-langpacks",
    "grub2-tools",
    "grub2-tools-extra",
    "grub2-tools-minimal",
    "hostname",
    "less",
    "lvm2",
    "NetworkManager",
    "openssh-clients",
    "plymouth",
    "rng-tools",
    "rpm-ostree",
    "selinux-policy-targeted",
    "systemd",
    "tmux",
    "xfsprogs",
    "xz",
  ])
  .append(bootloader_packages(arch))
}

fn live_set(arch: &str) -> PackageSet {
  PackageSet::new([
    "kernel",
    "anaconda-install-env-deps",
    "anaconda-live",
    "dracut-live",
    "fedora-release-workstation",
    "gdm",
    "glibc-all-langpacks",
    "gnome-shell",
    "livesys-scripts",
    "NetworkManager",
    "selinux-policy-targeted",
    "systemd",
  ])
  .with_exclude(["dracut-config-rescue"])
  .append(bootloader_packages(arch))
}

fn coreos_installer_set(arch: &str) -> PackageSet {
  PackageSet::new([
    "kernel",
    "coreos-installer",
    "coreos-installer-bootinfra",
    "coreos-installer-dracut",
    "dracut-network",
    "fdo-init",
    "fdo-owner-cli",
    "lvm2",
    "NetworkManager",
    "nss-altfiles",
    "openssl",
    "rpm-ostree",
    "systemd",
    "xz",
  ])
  .append(bootloader_packages(arch))
}

fn definitions(release: u32, arch: &str) -> Vec<Def> {
  use ImageFamily as F;

  let iot_disk_allowed = [K::User, K::Group, K::Directories, K::Files, K::Services];
  let mut defs = vec![
    Def::new("container", "container.tar", "application/x-tar", F::Archive { container: true })
      .set("os", container_set()),
    Def::new("qcow2", "disk.qcow2", "application/x-qemu-disk", F::Disk { format: DiskFormat::Qcow2 })
      .disk(5 * GIB, BaseTable::Standard)
      .kernel_options(CLOUD_KERNEL_OPTIONS)
      .services(CLOUD_SERVICES)
      .set("os", cloud_base_set(arch)),
  ];

  if matches!(arch, "x86_64" | "aarch64") {
    defs.extend([
      Def::new("ami", "image.raw", "application/octet-stream", F::Disk { format: DiskFormat::Raw })
        .disk(5 * GIB, BaseTable::Standard)
        .kernel_options(CLOUD_KERNEL_OPTIONS)
        .services(CLOUD_SERVICES)
        .set("os", cloud_base_set(arch)),
      Def::new("oci", "disk.qcow2", "application/x-qemu-disk", F::Disk { format: DiskFormat::Qcow2 })
        .disk(5 * GIB, BaseTable::Standard)
        .kernel_options(CLOUD_KERNEL_OPTIONS)
        .services(CLOUD_SERVICES)
        .set("os", cloud_base_set(arch)),
      Def::new("openstack", "disk.qcow2", "application/x-qemu-disk", F::Disk { format: DiskFormat::Qcow2 })
        .disk(5 * GIB, BaseTable::Standard)
        .kernel_options(CLOUD_KERNEL_OPTIONS)
        .services(CLOUD_SERVICES)
        .set("os", cloud_base_set(arch).append(PackageSet::new(["spice-vdagent"]))),
      Def::new("minimal-raw", "raw.img.xz", "application/xz", F::Disk { format: DiskFormat::Xz })
        .disk(2 * GIB, BaseTable::MinimalRaw)
        .kernel_options("ro")
        .services(&["NetworkManager.service", "initial-setup.service", "sshd.service"])
        .set("os", minimal_raw_set(arch)),
      Def::new("iot-commit", "commit.tar", "application/x-tar", F::OstreeCommit)
        .kernel_options(IOT_KERNEL_OPTIONS)
        .services(IOT_SERVICES)
        .set("os", iot_commit_set(arch)),
      Def::new("iot-container", "container.tar", "application/x-tar", F::OstreeContainer)
        .kernel_options(IOT_KERNEL_OPTIONS)
        .services(IOT_SERVICES)
        .set("os", iot_commit_set(arch))
        .set("container", PackageSet::new(["nginx"])),
      Def::new("iot-raw-image", "image.raw.xz", "application/xz", F::OstreeDisk { format: DiskFormat::Xz })
        .disk(4 * GIB, BaseTable::Iot)
        .allow(&iot_disk_allowed)
        .kernel_options(IOT_KERNEL_OPTIONS),
      Def::new("iot-qcow2-image", "image.qcow2", "application/x-qemu-disk", F::OstreeDisk { format: DiskFormat::Qcow2 })
        .disk(4 * GIB, BaseTable::Iot)
        .allow(&iot_disk_allowed)
        .kernel_options(IOT_KERNEL_OPTIONS),
      Def::new("iot-installer", "installer.iso", "application/x-iso9660-image", F::OstreeInstaller)
        .allow(&[K::User, K::Group])
        .set("installer", anaconda_set(arch)),
      Def::new("image-installer", "installer.iso", "application/x-iso9660-image", F::ImageInstaller)
        .allow(&[K::User, K::Group])
        .set("os", minimal_raw_set(arch))
        .set("installer", anaconda_set(arch)),
      Def::new("live-installer", "live-installer.iso", "application/x-iso9660-image", F::LiveInstaller)
        .allow(&[])
        .services(&["livesys.service", "livesys-late.service"])
        .set("os", live_set(arch)),
    ]);

    if release >= SIMPLIFIED_INSTALLER_SINCE {
      defs.push(
        Def::new(
          "iot-simplified-installer",
          "simplified-installer.iso",
          "application/x-iso9660-image",
          F::OstreeSimplifiedInstaller,
        )
        .disk(4 * GIB, BaseTable::Iot)
        .allow(&[K::InstallationDevice, K::Fdo, K::User, K::Group])
        .kernel_options(IOT_KERNEL_OPTIONS)
        .set("installer", coreos_installer_set(arch)),
      );
    }
  }

  if arch == "x86_64" {
    defs.extend([
      Def::new("vhd", "disk.vhd", "application/x-vhd", F::Disk { format: DiskFormat::Vpc })
        .disk(4 * GIB, BaseTable::Standard)
        .kernel_options(VHD_KERNEL_OPTIONS)
        .services(&["sshd.service", "waagent.service"])
        .set("os", cloud_base_set(arch).append(PackageSet::new(["WALinuxAgent"]))),
      Def::new("vmdk", "disk.vmdk", "application/x-vmdk", F::Disk { format: DiskFormat::Vmdk })
        .disk(5 * GIB, BaseTable::Standard)
        .kernel_options("ro")
        .services(&["cloud-init.service", "cloud-config.service", "cloud-final.service", "vmtoolsd.service"])
        .set("os", vmware_set(arch)),
      Def::new("ova", "image.ova", "application/ovf", F::Disk { format: DiskFormat::Ova })
        .disk(5 * GIB, BaseTable::Standard)
        .kernel_options("ro")
        .services(&["cloud-init.service", "cloud-config.service", "cloud-final.service", "vmtoolsd.service"])
        .set("os", vmware_set(arch)),
      Def::new("wsl", "wsl.tar", "application/x-tar", F::Archive { container: false }).set("os", wsl_set()),
    ]);
  }

  defs
}

/// Every image type of `distro` on `arch`.
pub fn image_types(distro: &Arc<DistroInfo>, release: u32, arch: &str) -> Vec<ImageType> {
  definitions(release, arch)
    .into_iter()
    .map(|def| def.finish(distro, arch))
    .collect()
}
