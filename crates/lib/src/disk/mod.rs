//! Partition tables and the filesystem layout planner.
//!
//! Every disk image type starts from a default [`PartitionTable`] for its
//! architecture. The planner merges blueprint mountpoints into that table,
//! grows it to the requested image size and assigns seeded identifiers.

mod planner;
mod tables;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use planner::{plan, required_size};
pub use tables::{BaseTable, default_table};

/// GPT partition type GUIDs.
pub mod gpt {
  pub const BIOS_BOOT: &str = "21686148-6449-6E6F-744E-656564454649";
  pub const EFI_SYSTEM: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
  pub const FILESYSTEM_DATA: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";
  pub const LVM: &str = "E6D6D379-F507-44C2-A23C-238F2A3DF928";
}

/// DOS (MBR) partition type ids.
pub mod dos {
  pub const LINUX: &str = "83";
  pub const LVM: &str = "8e";
  pub const PREP: &str = "41";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
  Gpt,
  Dos,
}

impl PartitionTableType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Gpt => "gpt",
      Self::Dos => "dos",
    }
  }

  /// Type id used for a partition holding an LVM physical volume.
  pub fn lvm_type(&self) -> &'static str {
    match self {
      Self::Gpt => gpt::LVM,
      Self::Dos => dos::LVM,
    }
  }

  /// Type id used for a plain Linux data partition.
  pub fn data_type(&self) -> &'static str {
    match self {
      Self::Gpt => gpt::FILESYSTEM_DATA,
      Self::Dos => dos::LINUX,
    }
  }
}

impl fmt::Display for PartitionTableType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How blueprint mountpoints missing from the default table are added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitioningMode {
  /// Convert the root partition to LVM only when new mountpoints are needed.
  #[default]
  AutoLvm,
  /// Always convert the root partition to LVM.
  Lvm,
  /// Add plain partitions.
  Raw,
}

impl PartitioningMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::AutoLvm => "auto-lvm",
      Self::Lvm => "lvm",
      Self::Raw => "raw",
    }
  }
}

impl fmt::Display for PartitioningMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PartitioningMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "auto-lvm" | "" => Ok(Self::AutoLvm),
      "lvm" => Ok(Self::Lvm),
      "raw" => Ok(Self::Raw),
      other => Err(format!("unknown partitioning mode {:?} (expected auto-lvm, lvm or raw)", other)),
    }
  }
}

/// A mountable filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
  #[serde(rename = "type")]
  pub fs_type: String,
  /// Assigned by the planner; empty in default tables.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub uuid: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub label: String,
  pub mountpoint: String,
  pub fstab_options: String,
  #[serde(default)]
  pub fstab_freq: u32,
  #[serde(default)]
  pub fstab_passno: u32,
}

impl Filesystem {
  pub fn ext4(mountpoint: &str, label: &str) -> Self {
    Self {
      fs_type: "ext4".to_string(),
      uuid: String::new(),
      label: label.to_string(),
      mountpoint: mountpoint.to_string(),
      fstab_options: "defaults".to_string(),
      fstab_freq: 1,
      fstab_passno: if mountpoint == "/" { 1 } else { 2 },
    }
  }

  pub fn efi() -> Self {
    Self {
      fs_type: "vfat".to_string(),
      uuid: String::new(),
      label: "EFI-SYSTEM".to_string(),
      mountpoint: "/boot/efi".to_string(),
      fstab_options: "defaults,uid=0,gid=0,umask=077,shortname=winnt".to_string(),
      fstab_freq: 0,
      fstab_passno: 2,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolume {
  pub name: String,
  pub size: u64,
  pub filesystem: Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
  pub name: String,
  pub description: String,
  pub logical_volumes: Vec<LogicalVolume>,
}

/// What a partition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payload_type", rename_all = "lowercase")]
pub enum Payload {
  Filesystem(Filesystem),
  Lvm(VolumeGroup),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
  pub start: u64,
  pub size: u64,
  #[serde(rename = "type")]
  pub type_id: String,
  #[serde(default)]
  pub bootable: bool,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub uuid: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload: Option<Payload>,
}

impl Partition {
  /// A partition without a payload (BIOS boot, PReP).
  pub fn raw(size: u64, type_id: &str) -> Self {
    Self {
      start: 0,
      size,
      type_id: type_id.to_string(),
      bootable: false,
      uuid: String::new(),
      payload: None,
    }
  }

  pub fn with_filesystem(size: u64, type_id: &str, fs: Filesystem) -> Self {
    Self {
      payload: Some(Payload::Filesystem(fs)),
      ..Self::raw(size, type_id)
    }
  }

  pub fn bootable(mut self) -> Self {
    self.bootable = true;
    self
  }

  pub fn end(&self) -> u64 {
    self.start + self.size
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTable {
  /// Disk GUID for GPT, `0x`-prefixed disk id for DOS.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub uuid: String,
  #[serde(rename = "type")]
  pub table_type: PartitionTableType,
  pub size: u64,
  pub partitions: Vec<Partition>,
}

impl PartitionTable {
  pub fn new(table_type: PartitionTableType, partitions: Vec<Partition>) -> Self {
    Self {
      uuid: String::new(),
      table_type,
      size: 0,
      partitions,
    }
  }

  /// Every filesystem in partition order, logical volumes included.
  pub fn filesystems(&self) -> Vec<&Filesystem> {
    let mut out = Vec::new();
    for partition in &self.partitions {
      match &partition.payload {
        Some(Payload::Filesystem(fs)) => out.push(fs),
        Some(Payload::Lvm(vg)) => out.extend(vg.logical_volumes.iter().map(|lv| &lv.filesystem)),
        None => {}
      }
    }
    out
  }

  pub fn find_mountpoint(&self, mountpoint: &str) -> Option<&Filesystem> {
    self.filesystems().into_iter().find(|fs| fs.mountpoint == mountpoint)
  }

  /// True if some filesystem is mounted at `mountpoint`.
  pub fn contains_mountpoint(&self, mountpoint: &str) -> bool {
    self.find_mountpoint(mountpoint).is_some()
  }

  /// The root filesystem UUID, once the planner has assigned identifiers.
  pub fn root_uuid(&self) -> Option<&str> {
    self
      .find_mountpoint("/")
      .map(|fs| fs.uuid.as_str())
      .filter(|uuid| !uuid.is_empty())
  }

  pub fn has_lvm(&self) -> bool {
    self
      .partitions
      .iter()
      .any(|p| matches!(p.payload, Some(Payload::Lvm(_))))
  }
}
