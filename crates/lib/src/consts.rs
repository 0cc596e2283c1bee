//! Shared constants.

/// Length of the truncated manifest hash used for identifiers.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

/// Alignment applied to every partition start and size.
pub const PARTITION_ALIGNMENT: u64 = MIB;

/// Largest disk addressable by a DOS (MBR) partition table with 512 byte sectors.
pub const DOS_MAX_SIZE: u64 = 2 * TIB;

/// Largest number of primary partitions in a DOS partition table.
pub const DOS_MAX_PARTITIONS: usize = 4;

/// Manifest document version understood by the downstream executor.
pub const MANIFEST_VERSION: &str = "2";

/// Volume group created when the root partition is converted to LVM.
pub const ROOT_VOLUME_GROUP: &str = "rootvg";
