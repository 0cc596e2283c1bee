//! Merging blueprint mountpoints into a default partition table.

use rand::RngCore;
use tracing::debug;
use uuid::Builder;

use super::{
  Filesystem, LogicalVolume, Partition, PartitionTable, PartitionTableType, PartitioningMode, Payload, VolumeGroup,
};
use crate::blueprint::FilesystemCustomization;
use crate::consts::{DOS_MAX_PARTITIONS, DOS_MAX_SIZE, GIB, MIB, PARTITION_ALIGNMENT, ROOT_VOLUME_GROUP};
use crate::error::{ManifestError, Result};

/// Space reserved before the first partition.
const TABLE_HEADER_SIZE: u64 = MIB;

/// Space reserved after the last partition of a GPT disk for the backup header.
const GPT_FOOTER_SIZE: u64 = MIB;

/// Space an LVM physical volume needs beyond its logical volumes.
const LVM_METADATA_SIZE: u64 = MIB;

/// Minimum size some directories need to hold a working system.
pub fn required_size(mountpoint: &str) -> u64 {
  match mountpoint {
    "/" => GIB,
    "/usr" => 2 * GIB,
    _ => 0,
  }
}

/// Error for a layout whose byte arithmetic leaves the `u64` range.
fn unaddressable(table_type: PartitionTableType, required: u64) -> ManifestError {
  ManifestError::InsufficientPartitionSize {
    table: table_type.to_string(),
    required,
    limit: u64::MAX,
  }
}

fn align_up(table_type: PartitionTableType, size: u64) -> Result<u64> {
  size
    .checked_next_multiple_of(PARTITION_ALIGNMENT)
    .ok_or_else(|| unaddressable(table_type, size))
}

fn checked_sum(table_type: PartitionTableType, a: u64, b: u64) -> Result<u64> {
  a.checked_add(b).ok_or_else(|| unaddressable(table_type, u64::MAX))
}

/// Build the final partition table for an image.
///
/// Mountpoints already in `base` grow to the larger of their default and
/// requested size. Missing mountpoints are added according to `mode`. The
/// last partition grows so the table fills `image_size`.
pub fn plan<R: RngCore>(
  base: &PartitionTable,
  filesystems: &[FilesystemCustomization],
  image_size: u64,
  mode: PartitioningMode,
  rng: &mut R,
) -> Result<PartitionTable> {
  let mut table = base.clone();
  let mut missing: Vec<(&str, u64)> = Vec::new();

  for fs in filesystems {
    let size = align_up(table.table_type, fs.min_size.max(required_size(&fs.mountpoint)))?;
    if !grow_mountpoint(&mut table, &fs.mountpoint, size) {
      missing.push((fs.mountpoint.as_str(), size));
    }
  }
  grow_mountpoint(&mut table, "/", required_size("/"));

  let use_lvm = match mode {
    PartitioningMode::Lvm => true,
    PartitioningMode::AutoLvm => !missing.is_empty(),
    PartitioningMode::Raw => false,
  };

  if use_lvm && convert_root_to_lvm(&mut table) {
    for (mountpoint, size) in missing {
      add_logical_volume(&mut table, mountpoint, size);
    }
  } else {
    for (mountpoint, size) in missing {
      add_partition(&mut table, mountpoint, size);
    }
  }

  if table.table_type == PartitionTableType::Dos && table.partitions.len() > DOS_MAX_PARTITIONS {
    return Err(ManifestError::TooManyPartitions {
      table: table.table_type.to_string(),
      count: table.partitions.len(),
      max: DOS_MAX_PARTITIONS,
    });
  }

  relayout(&mut table, image_size)?;
  assign_uuids(&mut table, rng);

  debug!(
    table = %table.table_type,
    size = table.size,
    partitions = table.partitions.len(),
    lvm = table.has_lvm(),
    "planned partition table"
  );
  Ok(table)
}

/// Grow the filesystem mounted at `mountpoint` to at least `size`.
///
/// Returns false if the table has no such mountpoint.
fn grow_mountpoint(table: &mut PartitionTable, mountpoint: &str, size: u64) -> bool {
  for partition in &mut table.partitions {
    match &mut partition.payload {
      Some(Payload::Filesystem(fs)) if fs.mountpoint == mountpoint => {
        partition.size = partition.size.max(size);
        return true;
      }
      Some(Payload::Lvm(vg)) => {
        if let Some(lv) = vg.logical_volumes.iter_mut().find(|lv| lv.filesystem.mountpoint == mountpoint) {
          lv.size = lv.size.max(size);
          return true;
        }
      }
      _ => {}
    }
  }
  false
}

/// Logical volume name for a mountpoint: `/` is `rootlv`, `/var/log` is `var_loglv`.
fn lv_name(mountpoint: &str) -> String {
  let trimmed = mountpoint.trim_start_matches('/');
  if trimmed.is_empty() {
    return "rootlv".to_string();
  }
  format!("{}lv", trimmed.replace('/', "_"))
}

/// Move the root filesystem into a logical volume of a new volume group.
///
/// Returns true if the table has an LVM root afterwards.
fn convert_root_to_lvm(table: &mut PartitionTable) -> bool {
  if table.has_lvm() {
    return true;
  }
  let lvm_type = table.table_type.lvm_type();
  let Some(partition) = table
    .partitions
    .iter_mut()
    .find(|p| matches!(&p.payload, Some(Payload::Filesystem(fs)) if fs.mountpoint == "/"))
  else {
    return false;
  };
  let Some(Payload::Filesystem(root)) = partition.payload.take() else {
    return false;
  };

  partition.type_id = lvm_type.to_string();
  partition.payload = Some(Payload::Lvm(VolumeGroup {
    name: ROOT_VOLUME_GROUP.to_string(),
    description: "root volume group".to_string(),
    logical_volumes: vec![LogicalVolume {
      name: lv_name("/"),
      size: partition.size,
      filesystem: root,
    }],
  }));
  true
}

fn add_logical_volume(table: &mut PartitionTable, mountpoint: &str, size: u64) {
  for partition in &mut table.partitions {
    if let Some(Payload::Lvm(vg)) = &mut partition.payload {
      vg.logical_volumes.push(LogicalVolume {
        name: lv_name(mountpoint),
        size,
        filesystem: Filesystem::ext4(mountpoint, ""),
      });
      return;
    }
  }
}

/// Insert a plain partition ahead of the root partition so root stays last.
fn add_partition(table: &mut PartitionTable, mountpoint: &str, size: u64) {
  let partition = Partition::with_filesystem(size, table.table_type.data_type(), Filesystem::ext4(mountpoint, ""));
  let root = table.partitions.iter().position(|p| match &p.payload {
    Some(Payload::Filesystem(fs)) => fs.mountpoint == "/",
    Some(Payload::Lvm(_)) => true,
    None => false,
  });
  match root {
    Some(index) => table.partitions.insert(index, partition),
    None => table.partitions.push(partition),
  }
}

/// Assign aligned offsets and grow the last partition to fill the image.
fn relayout(table: &mut PartitionTable, image_size: u64) -> Result<()> {
  let footer = match table.table_type {
    PartitionTableType::Gpt => GPT_FOOTER_SIZE,
    PartitionTableType::Dos => 0,
  };

  let table_type = table.table_type;
  let mut cursor = TABLE_HEADER_SIZE;
  for partition in &mut table.partitions {
    if let Some(Payload::Lvm(vg)) = &partition.payload {
      let volumes = vg.logical_volumes.iter().try_fold(LVM_METADATA_SIZE, |sum, lv| {
        checked_sum(table_type, sum, align_up(table_type, lv.size)?)
      })?;
      partition.size = partition.size.max(volumes);
    }
    partition.size = align_up(table_type, partition.size)?;
    partition.start = cursor;
    cursor = checked_sum(table_type, cursor, partition.size)?;
  }

  let total = align_up(table_type, image_size.max(checked_sum(table_type, cursor, footer)?))?;
  if table.table_type == PartitionTableType::Dos && total > DOS_MAX_SIZE {
    return Err(ManifestError::InsufficientPartitionSize {
      table: table.table_type.to_string(),
      required: total,
      limit: DOS_MAX_SIZE,
    });
  }

  if let Some(last) = table.partitions.last_mut() {
    let grown = total - footer - last.start;
    let extra = grown - last.size;
    last.size = grown;
    if let Some(Payload::Lvm(vg)) = &mut last.payload
      && let Some(root) = vg.logical_volumes.iter_mut().find(|lv| lv.filesystem.mountpoint == "/")
    {
      root.size += extra;
    }
  }
  table.size = total;
  Ok(())
}

fn random_uuid<R: RngCore>(rng: &mut R) -> String {
  let mut bytes = [0u8; 16];
  rng.fill_bytes(&mut bytes);
  Builder::from_random_bytes(bytes).into_uuid().to_string()
}

fn assign_filesystem_uuid<R: RngCore>(fs: &mut Filesystem, rng: &mut R) {
  fs.uuid = if fs.fs_type == "vfat" {
    let id = rng.next_u32();
    format!("{:04X}-{:04X}", id >> 16, id & 0xffff)
  } else {
    random_uuid(rng)
  };
}

/// Fill every identifier from `rng`, in table order.
fn assign_uuids<R: RngCore>(table: &mut PartitionTable, rng: &mut R) {
  table.uuid = match table.table_type {
    PartitionTableType::Gpt => random_uuid(rng),
    PartitionTableType::Dos => format!("0x{:08x}", rng.next_u32()),
  };

  for partition in &mut table.partitions {
    if table.table_type == PartitionTableType::Gpt {
      partition.uuid = random_uuid(rng);
    }
    match &mut partition.payload {
      Some(Payload::Filesystem(fs)) => assign_filesystem_uuid(fs, rng),
      Some(Payload::Lvm(vg)) => {
        for lv in &mut vg.logical_volumes {
          assign_filesystem_uuid(&mut lv.filesystem, rng);
        }
      }
      None => {}
    }
  }
}
