//! Default partition tables per architecture.

use super::{Filesystem, Partition, PartitionTable, PartitionTableType, dos, gpt};
use crate::consts::{GIB, MIB};

/// Which family of default layouts an image type starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseTable {
  /// General purpose disk images (qcow2, ami, vhd, ...).
  Standard,
  /// OSTree deployments written to disk.
  Iot,
  MinimalRaw,
}

/// The unplanned default table for `arch`, or `None` if the combination has
/// no disk layout.
pub fn default_table(arch: &str, base: BaseTable) -> Option<PartitionTable> {
  let table = match (base, arch) {
    (BaseTable::Standard, "x86_64") => PartitionTable::new(
      PartitionTableType::Gpt,
      vec![
        Partition::raw(MIB, gpt::BIOS_BOOT).bootable(),
        Partition::with_filesystem(200 * MIB, gpt::EFI_SYSTEM, Filesystem::efi()),
        Partition::with_filesystem(500 * MIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/boot", "boot")),
        Partition::with_filesystem(2 * GIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/", "root")),
      ],
    ),
    (BaseTable::Standard, "aarch64") => PartitionTable::new(
      PartitionTableType::Gpt,
      vec![
        Partition::with_filesystem(200 * MIB, gpt::EFI_SYSTEM, Filesystem::efi()),
        Partition::with_filesystem(500 * MIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/boot", "boot")),
        Partition::with_filesystem(2 * GIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/", "root")),
      ],
    ),
    (BaseTable::Standard, "ppc64le") => PartitionTable::new(
      PartitionTableType::Dos,
      vec![
        Partition::raw(4 * MIB, dos::PREP).bootable(),
        Partition::with_filesystem(500 * MIB, dos::LINUX, Filesystem::ext4("/boot", "boot")),
        Partition::with_filesystem(2 * GIB, dos::LINUX, Filesystem::ext4("/", "root")),
      ],
    ),
    (BaseTable::Standard, "s390x") => PartitionTable::new(
      PartitionTableType::Dos,
      vec![
        Partition::with_filesystem(500 * MIB, dos::LINUX, Filesystem::ext4("/boot", "boot")),
        Partition::with_filesystem(2 * GIB, dos::LINUX, Filesystem::ext4("/", "root")).bootable(),
      ],
    ),
    (BaseTable::Iot, "x86_64" | "aarch64") => PartitionTable::new(
      PartitionTableType::Gpt,
      vec![
        Partition::with_filesystem(501 * MIB, gpt::EFI_SYSTEM, Filesystem::efi()),
        Partition::with_filesystem(GIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/boot", "boot")),
        Partition::with_filesystem(2569 * MIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/", "root")),
      ],
    ),
    (BaseTable::MinimalRaw, "x86_64" | "aarch64") => PartitionTable::new(
      PartitionTableType::Gpt,
      vec![
        Partition::with_filesystem(200 * MIB, gpt::EFI_SYSTEM, Filesystem::efi()),
        Partition::with_filesystem(GIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/boot", "boot")),
        Partition::with_filesystem(2 * GIB, gpt::FILESYSTEM_DATA, Filesystem::ext4("/", "root")),
      ],
    ),
    _ => return None,
  };
  Some(table)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_architecture_has_a_standard_table() {
    for arch in ["aarch64", "ppc64le", "s390x", "x86_64"] {
      let table = default_table(arch, BaseTable::Standard).unwrap();
      assert!(table.contains_mountpoint("/"), "{arch} has no root");
      assert!(table.contains_mountpoint("/boot"), "{arch} has no /boot");
    }
  }

  #[test]
  fn table_types_follow_architecture() {
    assert_eq!(
      default_table("x86_64", BaseTable::Standard).unwrap().table_type,
      PartitionTableType::Gpt
    );
    assert_eq!(
      default_table("s390x", BaseTable::Standard).unwrap().table_type,
      PartitionTableType::Dos
    );
  }

  #[test]
  fn iot_tables_exist_only_for_uefi_arches() {
    let iot = default_table("aarch64", BaseTable::Iot).unwrap();
    assert_eq!(iot.partitions[0].size, 501 * MIB);
    assert_eq!(iot.partitions[2].size, 2569 * MIB);
    assert!(default_table("s390x", BaseTable::Iot).is_none());
    assert!(default_table("ppc64le", BaseTable::MinimalRaw).is_none());
  }
}
