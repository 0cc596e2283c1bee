//! Stage constructors.
//!
//! Every function returns one executor stage. Options are plain JSON objects
//! so the executor's option schema stays out of the type system.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{Stage, StageInput};
use crate::blueprint::{
  DirectoryCustomization, FileCustomization, FirewallCustomization, GroupCustomization, OpenScapCustomization,
  SshKeyCustomization, UserCustomization,
};
use crate::disk::{Filesystem, PartitionTable, Payload, VolumeGroup};
use crate::distro::BootMode;

const SECTOR_SIZE: u64 = 512;

const FILE_CONTEXTS: &str = "etc/selinux/targeted/contexts/files/file_contexts";

/// Where an OSTree system keeps its rpm database.
const OSTREE_RPM_DBPATH: &str = "/usr/share/rpm";

fn octal(mode: &str) -> Option<u32> {
  u32::from_str_radix(mode, 8).ok()
}

// OS tree

pub fn rpm(ostree: bool) -> Stage {
  let mut options = json!({ "gpgkeys": [] });
  if ostree {
    options["dbpath"] = json!(OSTREE_RPM_DBPATH);
    options["ostree_booted"] = json!(true);
  }
  Stage::new("org.osbuild.rpm", options).with_input("packages", StageInput::Packages)
}

pub fn kernel_cmdline(root_fs_uuid: &str, kernel_opts: &str) -> Stage {
  Stage::new(
    "org.osbuild.kernel-cmdline",
    json!({ "root_fs_uuid": root_fs_uuid, "kernel_opts": kernel_opts }),
  )
}

pub fn locale(language: &str) -> Stage {
  Stage::new("org.osbuild.locale", json!({ "language": language }))
}

pub fn keymap(keymap: &str) -> Stage {
  Stage::new("org.osbuild.keymap", json!({ "keymap": keymap }))
}

pub fn hostname(hostname: &str) -> Stage {
  Stage::new("org.osbuild.hostname", json!({ "hostname": hostname }))
}

pub fn timezone(zone: &str) -> Stage {
  Stage::new("org.osbuild.timezone", json!({ "zone": zone }))
}

pub fn chrony(servers: &[String]) -> Stage {
  let servers: Vec<Value> = servers.iter().map(|s| json!({ "hostname": s })).collect();
  Stage::new("org.osbuild.chrony", json!({ "servers": servers }))
}

pub fn groups(groups: &[GroupCustomization]) -> Stage {
  let entries: BTreeMap<&str, Value> = groups
    .iter()
    .map(|g| {
      let mut entry = json!({});
      if let Some(gid) = g.gid {
        entry["gid"] = json!(gid);
      }
      (g.name.as_str(), entry)
    })
    .collect();
  Stage::new("org.osbuild.groups", json!({ "groups": entries }))
}

/// Users with their keys. SSH key customizations attach to the user of the
/// same name, creating a bare entry when the user is not declared.
pub fn users(users: &[UserCustomization], keys: &[SshKeyCustomization]) -> Stage {
  let mut entries: BTreeMap<String, Value> = BTreeMap::new();
  for user in users {
    let mut entry = serde_json::Map::new();
    let optional = [
      ("description", &user.description),
      ("password", &user.password),
      ("key", &user.key),
      ("home", &user.home),
      ("shell", &user.shell),
    ];
    for (field, value) in optional {
      if let Some(value) = value {
        entry.insert(field.to_string(), json!(value));
      }
    }
    if !user.groups.is_empty() {
      entry.insert("groups".to_string(), json!(user.groups));
    }
    if let Some(uid) = user.uid {
      entry.insert("uid".to_string(), json!(uid));
    }
    if let Some(gid) = user.gid {
      entry.insert("gid".to_string(), json!(gid));
    }
    entries.insert(user.name.clone(), Value::Object(entry));
  }
  for key in keys {
    let entry = entries.entry(key.user.clone()).or_insert_with(|| json!({}));
    entry["key"] = json!(key.key);
  }
  Stage::new("org.osbuild.users", json!({ "users": entries }))
}

pub fn firewall(firewall: &FirewallCustomization) -> Stage {
  let mut options = json!({});
  if !firewall.ports.is_empty() {
    options["ports"] = json!(firewall.ports);
  }
  if let Some(services) = &firewall.services {
    if !services.enabled.is_empty() {
      options["enabled_services"] = json!(services.enabled);
    }
    if !services.disabled.is_empty() {
      options["disabled_services"] = json!(services.disabled);
    }
  }
  Stage::new("org.osbuild.firewall", options)
}

pub fn systemd(enabled: &[String], disabled: &[String]) -> Stage {
  let mut options = json!({});
  if !enabled.is_empty() {
    options["enabled_services"] = json!(enabled);
  }
  if !disabled.is_empty() {
    options["disabled_services"] = json!(disabled);
  }
  Stage::new("org.osbuild.systemd", options)
}

pub fn fstab(table: &PartitionTable) -> Stage {
  let filesystems: Vec<Value> = table
    .filesystems()
    .into_iter()
    .map(|fs| {
      json!({
        "uuid": fs.uuid,
        "vfs_type": fs.fs_type,
        "path": fs.mountpoint,
        "options": fs.fstab_options,
        "freq": fs.fstab_freq,
        "passno": fs.fstab_passno,
      })
    })
    .collect();
  Stage::new("org.osbuild.fstab", json!({ "filesystems": filesystems }))
}

/// GRUB platform used for BIOS style boot on `arch`.
pub fn legacy_platform(arch: &str) -> Option<&'static str> {
  match arch {
    "x86_64" => Some("i386-pc"),
    "ppc64le" => Some("powerpc-ieee1275"),
    _ => None,
  }
}

pub fn grub2(table: &PartitionTable, kernel_opts: &str, boot_mode: BootMode, arch: &str, vendor: &str) -> Stage {
  let mut options = json!({
    "root_fs_uuid": table.root_uuid().unwrap_or_default(),
    "kernel_opts": kernel_opts,
    "write_defaults": false,
    "greenboot": false,
  });
  if let Some(boot) = table.find_mountpoint("/boot") {
    options["boot_fs_uuid"] = json!(boot.uuid);
  }
  if boot_mode.has_bios()
    && let Some(platform) = legacy_platform(arch)
  {
    options["legacy"] = json!(platform);
  }
  if boot_mode.has_uefi() {
    options["uefi"] = json!({ "vendor": vendor, "unified": true });
  }
  Stage::new("org.osbuild.grub2", options)
}

pub fn zipl() -> Stage {
  Stage::new("org.osbuild.zipl", json!({}))
}

pub fn mkdir(directories: &[DirectoryCustomization]) -> Stage {
  let paths: Vec<Value> = directories
    .iter()
    .map(|dir| {
      let mut entry = json!({ "path": dir.path, "exist_ok": true });
      if dir.ensure_parents {
        entry["parents"] = json!(true);
      }
      if let Some(mode) = dir.mode.as_deref().and_then(octal) {
        entry["mode"] = json!(mode);
      }
      entry
    })
    .collect();
  Stage::new("org.osbuild.mkdir", json!({ "paths": paths }))
}

/// Ownership changes for customized paths; `None` when no path sets one.
pub fn chown(directories: &[DirectoryCustomization], files: &[FileCustomization]) -> Option<Stage> {
  let owned = directories
    .iter()
    .map(|d| (&d.path, &d.user, &d.group))
    .chain(files.iter().map(|f| (&f.path, &f.user, &f.group)));

  let mut items: BTreeMap<&str, Value> = BTreeMap::new();
  for (path, user, group) in owned {
    if user.is_none() && group.is_none() {
      continue;
    }
    let mut entry = json!({});
    if let Some(user) = user {
      entry["user"] = json!(user);
    }
    if let Some(group) = group {
      entry["group"] = json!(group);
    }
    items.insert(path.as_str(), entry);
  }
  (!items.is_empty()).then(|| Stage::new("org.osbuild.chown", json!({ "items": items })))
}

pub fn chmod(files: &[FileCustomization]) -> Option<Stage> {
  let items: BTreeMap<&str, Value> = files
    .iter()
    .filter_map(|f| {
      let mode = f.mode.as_deref()?;
      Some((f.path.as_str(), json!({ "mode": mode })))
    })
    .collect();
  (!items.is_empty()).then(|| Stage::new("org.osbuild.chmod", json!({ "items": items })))
}

/// Copy inline file sources into the tree. `files` maps destination path to
/// content checksum.
pub fn copy_inline(files: &[(String, String)]) -> Stage {
  let paths: Vec<Value> = files
    .iter()
    .map(|(path, checksum)| {
      json!({
        "from": format!("input://inlinefile/{}", checksum),
        "to": format!("tree://{}", path),
      })
    })
    .collect();
  let checksums = files.iter().map(|(_, checksum)| checksum.clone()).collect();
  Stage::new("org.osbuild.copy", json!({ "paths": paths })).with_input("inlinefile", StageInput::Inline { checksums })
}

pub fn oscap_remediation(openscap: &OpenScapCustomization) -> Stage {
  Stage::new(
    "org.osbuild.oscap.remediation",
    json!({
      "data_dir": "/oscap_data",
      "config": {
        "datastream": openscap.datastream,
        "profile_id": openscap.profile_id,
      },
    }),
  )
}

pub fn crypto_policy(policy: &str) -> Stage {
  Stage::new("org.osbuild.update-crypto-policies", json!({ "policy": policy }))
}

pub fn selinux() -> Stage {
  Stage::new("org.osbuild.selinux", json!({ "file_contexts": FILE_CONTEXTS }))
}

// Disk image

pub fn truncate(filename: &str, size: u64) -> Stage {
  Stage::new("org.osbuild.truncate", json!({ "filename": filename, "size": size.to_string() }))
}

pub fn sfdisk(filename: &str, table: &PartitionTable) -> Stage {
  let partitions: Vec<Value> = table
    .partitions
    .iter()
    .map(|p| {
      let mut entry = json!({
        "start": p.start / SECTOR_SIZE,
        "size": p.size / SECTOR_SIZE,
        "type": p.type_id,
      });
      if p.bootable {
        entry["bootable"] = json!(true);
      }
      if !p.uuid.is_empty() {
        entry["uuid"] = json!(p.uuid);
      }
      entry
    })
    .collect();
  Stage::new(
    "org.osbuild.sfdisk",
    json!({
      "filename": filename,
      "label": table.table_type.as_str(),
      "uuid": table.uuid,
      "partitions": partitions,
    }),
  )
}

pub fn lvm2_create(filename: &str, partition: usize, vg: &VolumeGroup) -> Stage {
  let volumes: Vec<Value> = vg
    .logical_volumes
    .iter()
    .map(|lv| json!({ "name": lv.name, "size": lv.size.to_string() }))
    .collect();
  Stage::new(
    "org.osbuild.lvm2.create",
    json!({
      "filename": filename,
      "partition": partition,
      "volume_group": vg.name,
      "volumes": volumes,
    }),
  )
}

/// Create `fs` on a partition or, when `volume` is set, a logical volume.
pub fn mkfs(filename: &str, partition: usize, volume: Option<&str>, fs: &Filesystem) -> Stage {
  let mut options = json!({
    "filename": filename,
    "partition": partition,
    "uuid": fs.uuid,
  });
  if let Some(volume) = volume {
    options["volume"] = json!(volume);
  }
  match fs.fs_type.as_str() {
    "vfat" => {
      options["volid"] = json!(fs.uuid.replace('-', ""));
    }
    _ => {
      options["label"] = json!(fs.label);
    }
  }
  Stage::new(&format!("org.osbuild.mkfs.{}", fs.fs_type), options)
}

/// Every filesystem stage for `table`, in partition order.
pub fn mkfs_all(filename: &str, table: &PartitionTable) -> Vec<Stage> {
  let mut stages = Vec::new();
  for (idx, partition) in table.partitions.iter().enumerate() {
    match &partition.payload {
      Some(Payload::Filesystem(fs)) => stages.push(mkfs(filename, idx, None, fs)),
      Some(Payload::Lvm(vg)) => {
        stages.push(lvm2_create(filename, idx, vg));
        for lv in &vg.logical_volumes {
          stages.push(mkfs(filename, idx, Some(&lv.name), &lv.filesystem));
        }
      }
      None => {}
    }
  }
  stages
}

/// Copy a tree onto the mounted filesystems of a disk image.
pub fn copy_tree_to_disk(source: &str, filename: &str, table: &PartitionTable) -> Stage {
  let mut mounts: Vec<(&str, &str)> = table
    .filesystems()
    .into_iter()
    .map(|fs| (fs.mountpoint.as_str(), fs.uuid.as_str()))
    .collect();
  // Parents mount before their children.
  mounts.sort_by_key(|(mountpoint, _)| mountpoint.len());
  let mounts: Vec<Value> = mounts
    .into_iter()
    .map(|(target, uuid)| json!({ "target": target, "uuid": uuid }))
    .collect();
  Stage::new(
    "org.osbuild.copy",
    json!({
      "filename": filename,
      "mounts": mounts,
      "paths": [{ "from": "input://root-tree/", "to": "mount://root/" }],
    }),
  )
  .with_input("root-tree", StageInput::tree(source))
}

pub fn grub2_inst(filename: &str, platform: &str, table: &PartitionTable) -> Stage {
  let mut options = json!({ "filename": filename, "platform": platform });
  if let Some(idx) = table.partitions.iter().position(|p| p.payload.is_none()) {
    options["location"] = json!(table.partitions[idx].start / SECTOR_SIZE);
    options["core"] = json!({ "type": "mkimage", "partlabel": table.table_type.as_str(), "filesystem": "ext4" });
  }
  Stage::new("org.osbuild.grub2.inst", options)
}

pub fn zipl_inst(filename: &str) -> Stage {
  Stage::new("org.osbuild.zipl.inst", json!({ "filename": filename, "kernel": "" }))
}

// Formats

pub fn qemu(format: &str, filename: &str, source: &str, source_file: &str) -> Stage {
  let mut format_options = json!({ "type": format });
  match format {
    "vpc" => format_options["force_size"] = json!(true),
    "vmdk" => format_options["subformat"] = json!("streamOptimized"),
    "qcow2" => format_options["compat"] = json!("1.1"),
    _ => {}
  }
  Stage::new("org.osbuild.qemu", json!({ "filename": filename, "format": format_options }))
    .with_input("image", StageInput::file(source, source_file))
}

pub fn ovf(vmdk: &str) -> Stage {
  Stage::new("org.osbuild.ovf", json!({ "vmdk": vmdk }))
}

pub fn tar(filename: &str, source: &str, format: Option<&str>) -> Stage {
  let mut options = json!({ "filename": filename });
  if let Some(format) = format {
    options["format"] = json!(format);
  }
  Stage::new("org.osbuild.tar", options).with_input("tree", StageInput::tree(source))
}

pub fn xz(filename: &str, source: &str, source_file: &str) -> Stage {
  Stage::new("org.osbuild.xz", json!({ "filename": filename })).with_input("file", StageInput::file(source, source_file))
}

/// Container image architecture name for `arch`.
pub fn goarch(arch: &str) -> &str {
  match arch {
    "x86_64" => "amd64",
    "aarch64" => "arm64",
    "ppc64le" => "ppc64le",
    "s390x" => "s390x",
    other => other,
  }
}

pub fn oci_archive(filename: &str, arch: &str, source: &str, config: Option<Value>) -> Stage {
  let mut options = json!({ "filename": filename, "architecture": goarch(arch) });
  if let Some(config) = config {
    options["config"] = config;
  }
  Stage::new("org.osbuild.oci-archive", options).with_input("base", StageInput::tree(source))
}

// OSTree

pub fn ostree_init(path: &str) -> Stage {
  Stage::new("org.osbuild.ostree.init", json!({ "mode": "archive", "path": path }))
}

pub fn ostree_preptree() -> Stage {
  Stage::new(
    "org.osbuild.ostree.preptree",
    json!({ "etc_group_members": ["wheel", "docker"] }),
  )
}

pub fn ostree_commit(image_ref: &str, os_version: &str, parent: Option<&str>, source: &str) -> Stage {
  let mut options = json!({ "ref": image_ref, "os_version": os_version });
  if let Some(parent) = parent {
    options["parent"] = json!(parent);
  }
  Stage::new("org.osbuild.ostree.commit", options).with_input("tree", StageInput::tree(source))
}

pub fn ostree_pull(repo: &str, remote: &str, url: &str, image_ref: &str) -> Stage {
  Stage::new("org.osbuild.ostree.pull", json!({ "repo": repo, "remote": remote })).with_input(
    "commits",
    StageInput::OstreeCommit {
      url: url.to_string(),
      image_ref: image_ref.to_string(),
    },
  )
}

pub fn ostree_init_fs() -> Stage {
  Stage::new("org.osbuild.ostree.init-fs", json!({}))
}

pub fn ostree_os_init(osname: &str) -> Stage {
  Stage::new("org.osbuild.ostree.os-init", json!({ "osname": osname }))
}

pub fn ostree_config(readonly: bool) -> Stage {
  Stage::new(
    "org.osbuild.ostree.config",
    json!({
      "repo": "/ostree/repo",
      "config": { "sysroot": { "readonly": readonly, "bootloader": "none" } },
    }),
  )
}

pub fn ostree_remotes(remote: &str, url: &str) -> Stage {
  Stage::new(
    "org.osbuild.ostree.remotes",
    json!({
      "repo": "/ostree/repo",
      "remotes": [{ "name": remote, "url": url }],
    }),
  )
}

pub fn ostree_deploy(osname: &str, remote: &str, image_ref: &str, root_fs_uuid: &str, kernel_opts: &[String]) -> Stage {
  Stage::new(
    "org.osbuild.ostree.deploy",
    json!({
      "osname": osname,
      "ref": image_ref,
      "remote": remote,
      "mounts": ["/boot", "/boot/efi"],
      "rootfs": { "uuid": root_fs_uuid },
      "kernel_opts": kernel_opts,
    }),
  )
}

fn deployment(osname: &str, image_ref: &str) -> Value {
  json!({ "osname": osname, "ref": image_ref })
}

pub fn ostree_fillvar(osname: &str, image_ref: &str) -> Stage {
  Stage::new(
    "org.osbuild.ostree.fillvar",
    json!({ "deployment": deployment(osname, image_ref) }),
  )
}

pub fn ostree_selinux(osname: &str, image_ref: &str) -> Stage {
  Stage::new(
    "org.osbuild.ostree.selinux",
    json!({ "deployment": deployment(osname, image_ref) }),
  )
}

pub fn nginx_conf(listen: &str) -> Stage {
  Stage::new(
    "org.osbuild.nginxconf",
    json!({
      "path": "/etc/nginx.conf",
      "config": { "listen": listen, "root": "/usr/share/nginx/html", "pid": "/var/tmp/nginx.pid", "daemon": false },
    }),
  )
}

/// Copy an OSTree repository produced by `source` to `to`.
pub fn copy_repo(source: &str, to: &str) -> Stage {
  Stage::new(
    "org.osbuild.copy",
    json!({ "paths": [{ "from": "input://repo/repo", "to": format!("tree://{}", to) }] }),
  )
  .with_input("repo", StageInput::tree(source))
}

// Installer media

pub fn buildstamp(arch: &str, product: &str, version: &str, is_final: bool) -> Stage {
  Stage::new(
    "org.osbuild.buildstamp",
    json!({
      "arch": arch,
      "product": product,
      "version": version,
      "final": is_final,
      "variant": "IoT",
      "bugurl": "",
    }),
  )
}

pub fn anaconda(modules: &[&str]) -> Stage {
  Stage::new("org.osbuild.anaconda", json!({ "activatable-modules": modules }))
}

pub fn lorax_script(arch: &str) -> Stage {
  Stage::new(
    "org.osbuild.lorax-script",
    json!({ "path": "99-generic/runtime-postinstall.tmpl", "basearch": arch }),
  )
}

pub fn dracut(kernel: &[String], modules: &[&str]) -> Stage {
  Stage::new(
    "org.osbuild.dracut",
    json!({ "kernel": kernel, "add_modules": modules }),
  )
}

/// A filesystem image holding the tree of `source`, used as the ISO rootfs.
pub fn rootfs_image(filename: &str, size: u64, source: &str) -> Vec<Stage> {
  vec![
    truncate(filename, size),
    Stage::new("org.osbuild.mkfs.ext4", json!({ "filename": filename, "label": "Anaconda" })),
    Stage::new(
      "org.osbuild.copy",
      json!({ "filename": filename, "paths": [{ "from": "input://tree/", "to": "mount://root/" }] }),
    )
    .with_input("tree", StageInput::tree(source)),
  ]
}

pub fn grub2_iso(product: &str, version: &str, isolabel: &str, arch: &str, kernel_opts: &[String]) -> Stage {
  let efi_arch = match arch {
    "aarch64" => "AA64",
    _ => "X64",
  };
  Stage::new(
    "org.osbuild.grub2.iso",
    json!({
      "product": { "name": product, "version": version },
      "isolabel": isolabel,
      "architectures": [efi_arch],
      "vendor": "fedora",
      "kernel": { "dir": "/images/pxeboot", "opts": kernel_opts },
    }),
  )
}

pub fn squashfs(filename: &str, source: &str, source_file: &str) -> Stage {
  Stage::new(
    "org.osbuild.squashfs",
    json!({ "filename": filename, "compression": { "method": "xz" } }),
  )
  .with_input("file", StageInput::file(source, source_file))
}

pub fn copy_boot_files(source: &str) -> Stage {
  Stage::new(
    "org.osbuild.copy",
    json!({
      "paths": [
        { "from": "input://tree/boot/vmlinuz", "to": "tree:///images/pxeboot/vmlinuz" },
        { "from": "input://tree/boot/initramfs.img", "to": "tree:///images/pxeboot/initrd.img" },
      ],
    }),
  )
  .with_input("tree", StageInput::tree(source))
}

/// Copy the whole tree of `source` into the root of this pipeline's tree.
pub fn copy_tree(source: &str) -> Stage {
  Stage::new(
    "org.osbuild.copy",
    json!({ "paths": [{ "from": "input://tree/", "to": "tree:///" }] }),
  )
  .with_input("tree", StageInput::tree(source))
}

pub fn copy_file(source: &str, file: &str, to: &str) -> Stage {
  Stage::new(
    "org.osbuild.copy",
    json!({ "paths": [{ "from": format!("input://file/{}", file), "to": format!("tree://{}", to) }] }),
  )
  .with_input("file", StageInput::file(source, file))
}

pub fn discinfo(arch: &str, release: &str) -> Stage {
  Stage::new("org.osbuild.discinfo", json!({ "basearch": arch, "release": release }))
}

/// Kickstart for an unattended install. `source` is an `ostreesetup` or
/// `liveimg` line.
pub fn kickstart(path: &str, source: Value, users: &[UserCustomization], groups: &[GroupCustomization]) -> Stage {
  let mut options = json!({ "path": path });
  for (key, value) in source.as_object().into_iter().flatten() {
    options[key] = value.clone();
  }
  if !users.is_empty() {
    options["users"] = users_stage_options(users)["users"].clone();
  }
  if !groups.is_empty() {
    options["groups"] = groups_stage_options(groups)["groups"].clone();
  }
  Stage::new("org.osbuild.kickstart", options)
}

fn users_stage_options(list: &[UserCustomization]) -> Value {
  users(list, &[]).options
}

fn groups_stage_options(list: &[GroupCustomization]) -> Value {
  groups(list).options
}

pub fn xorrisofs(filename: &str, volid: &str, source: &str, efi: bool) -> Stage {
  let mut options = json!({ "filename": filename, "volid": volid, "sysid": "LINUX", "isolevel": 3 });
  if efi {
    options["efi"] = json!("images/efiboot.img");
    options["isohybridmbr"] = json!("/usr/share/syslinux/isohdpfx.bin");
  }
  Stage::new("org.osbuild.xorrisofs", options).with_input("tree", StageInput::tree(source))
}

pub fn implantisomd5(filename: &str) -> Stage {
  Stage::new("org.osbuild.implantisomd5", json!({ "filename": filename }))
}

pub fn fdo(manufacturing_server_url: &str, diun: (&str, &str)) -> Stage {
  let (key, value) = diun;
  let mut options = json!({ "manufacturing_server_url": manufacturing_server_url });
  options[key] = json!(value);
  Stage::new("org.osbuild.fdo", options)
}
