//! Assembling the pipelines of one image family.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tracing::debug;

use super::{Manifest, OstreeSource, Pipeline, PipelineGraph, Stage, stages};
use crate::blueprint::{Blueprint, Customizations, DirectoryCustomization};
use crate::consts::{GIB, ROOT_VOLUME_GROUP};
use crate::disk::{self, PartitionTable};
use crate::distro::{DiskFormat, ImageFamily, ImageOptions, ImageType};
use crate::error::{ManifestError, Result};
use crate::rpmmd::{PackageSet, PackageSetChain};
use crate::util::hash::hash_bytes;

const OSTREE_OSNAME: &str = "fedora-iot";
const OSTREE_REMOTE: &str = "fedora-iot";

/// Raw disk file written by the `image` pipeline when the format needs a
/// conversion step.
const DISK_FILE: &str = "disk.raw";

/// Filesystem image holding an installer or live root.
const ROOTFS_FILE: &str = "rootfs.img";
const ROOTFS_SIZE: u64 = 4 * GIB;

const KICKSTART_PATH: &str = "/osbuild.ks";

/// Assemble the manifest for an already validated request.
pub(crate) fn build(
  image_type: &ImageType,
  blueprint: &Blueprint,
  options: &ImageOptions,
  overrides: Option<&BTreeMap<String, PackageSet>>,
  seed: u64,
) -> Result<Manifest> {
  let mut ctx = Context::new(image_type, blueprint, options, overrides, seed)?;

  ctx.push("build", ctx.chain("build"), vec![stages::rpm(false), stages::selinux()]);
  match image_type.family() {
    ImageFamily::Disk { format } => ctx.disk(format)?,
    ImageFamily::Archive { container } => ctx.archive(container),
    ImageFamily::OstreeCommit => ctx.ostree_commit(),
    ImageFamily::OstreeContainer => ctx.ostree_container(),
    ImageFamily::OstreeDisk { format } => ctx.ostree_disk(format)?,
    ImageFamily::OstreeInstaller => ctx.ostree_installer(),
    ImageFamily::OstreeSimplifiedInstaller => ctx.simplified_installer()?,
    ImageFamily::ImageInstaller => ctx.image_installer(),
    ImageFamily::LiveInstaller => ctx.live_installer(),
  }

  let manifest = ctx.finish();
  let graph = PipelineGraph::from_manifest(&manifest)?;
  debug!(
    image_type = %manifest.image_type,
    pipelines = graph.len(),
    inline_files = manifest.inline_files.len(),
    ostree_sources = manifest.ostree_sources.len(),
    "assembled pipelines"
  );
  Ok(manifest)
}

struct Context<'a> {
  image_type: &'a ImageType,
  blueprint: &'a Blueprint,
  customizations: &'a Customizations,
  options: &'a ImageOptions,
  overrides: Option<&'a BTreeMap<String, PackageSet>>,
  seed: u64,
  partition_table: Option<PartitionTable>,
  pipelines: Vec<Pipeline>,
  ostree_sources: Vec<OstreeSource>,
  inline_files: BTreeMap<String, String>,
}

impl<'a> Context<'a> {
  fn new(
    image_type: &'a ImageType,
    blueprint: &'a Blueprint,
    options: &'a ImageOptions,
    overrides: Option<&'a BTreeMap<String, PackageSet>>,
    seed: u64,
  ) -> Result<Self> {
    let customizations = blueprint.customizations();
    let mut rng = StdRng::seed_from_u64(seed);

    let partition_table = match image_type.base_table() {
      Some(base) => {
        let base = disk::default_table(image_type.arch(), base).ok_or_else(|| ManifestError::UnsupportedImageType {
          arch: image_type.arch().to_string(),
          name: image_type.name().to_string(),
        })?;
        let table = disk::plan(
          &base,
          &customizations.filesystem,
          image_type.size(options.size),
          options.partitioning_mode,
          &mut rng,
        )?;
        Some(table)
      }
      None => None,
    };

    Ok(Self {
      image_type,
      blueprint,
      customizations,
      options,
      overrides,
      seed,
      partition_table,
      pipelines: Vec::new(),
      ostree_sources: Vec::new(),
      inline_files: BTreeMap::new(),
    })
  }

  fn finish(self) -> Manifest {
    let distro = self.image_type.distro();
    Manifest {
      distro: distro.name.clone(),
      runner: distro.runner(),
      arch: self.image_type.arch().to_string(),
      image_type: self.image_type.name().to_string(),
      filename: self.image_type.filename().to_string(),
      mime_type: self.image_type.mime_type().to_string(),
      seed: self.seed,
      pipelines: self.pipelines,
      partition_table: self.partition_table,
      ostree_sources: self.ostree_sources,
      inline_files: self.inline_files,
    }
  }

  fn push(&mut self, name: &str, package_sets: PackageSetChain, stages: Vec<Stage>) {
    self.pipelines.push(Pipeline {
      name: name.to_string(),
      build: (name != "build").then(|| "build".to_string()),
      package_sets,
      stages,
    });
  }

  fn arch(&self) -> &'a str {
    self.image_type.arch()
  }

  fn table(&self) -> Result<PartitionTable> {
    self
      .partition_table
      .clone()
      .ok_or_else(|| ManifestError::UnsupportedImageType {
        arch: self.arch().to_string(),
        name: self.image_type.name().to_string(),
      })
  }

  // Package sets

  fn base_set(&self, stage: &str) -> Option<PackageSet> {
    self
      .overrides
      .and_then(|overrides| overrides.get(stage))
      .or_else(|| self.image_type.package_sets().get(stage))
      .cloned()
  }

  fn chain(&self, stage: &str) -> PackageSetChain {
    self.base_set(stage).into_iter().collect()
  }

  /// The image type's os set followed by whatever the blueprint adds.
  fn os_chain(&self) -> PackageSetChain {
    let mut chain = Vec::new();
    if let Some(mut base) = self.base_set("os") {
      if let Some(kernel) = self.customizations.kernel_name() {
        for name in base.include.iter_mut().filter(|name| *name == "kernel") {
          *name = kernel.to_string();
        }
      }
      chain.push(base);
    }

    let mut extra = self.blueprint.package_specs();
    if self.customizations.openscap.is_some() {
      extra.extend(["openscap-scanner".to_string(), "scap-security-guide".to_string()]);
    }
    if !extra.is_empty() {
      chain.push(PackageSet::new(extra));
    }
    chain
  }

  // Shared pieces

  fn kernel_options(&self) -> String {
    let mut opts: Vec<&str> = Vec::new();
    let lvm = self.partition_table.as_ref().is_some_and(PartitionTable::has_lvm);
    let lvm_arg = format!("rd.lvm.lv={}/rootlv", ROOT_VOLUME_GROUP);

    if !self.image_type.kernel_options().is_empty() {
      opts.push(self.image_type.kernel_options());
    }
    if lvm {
      opts.push(&lvm_arg);
    }
    if self.customizations.fips == Some(true) {
      opts.push("fips=1");
    }
    if let Some(append) = self.customizations.kernel_append() {
      opts.push(append);
    }
    opts.join(" ")
  }

  /// Register blueprint files as inline sources, returning `(path, checksum)`.
  fn register_inline_files(&mut self) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for file in &self.customizations.files {
      let data = file.data.as_bytes();
      let checksum = hash_bytes(data).checksum();
      self.inline_files.insert(checksum.clone(), STANDARD.encode(data));
      files.push((file.path.clone(), checksum));
    }
    files
  }

  /// Stages writing user, group, service and path customizations.
  fn customization_stages(&mut self, with_services: bool) -> Vec<Stage> {
    let c = self.customizations;
    let mut out = Vec::new();

    if !c.group.is_empty() {
      out.push(stages::groups(&c.group));
    }
    if !c.user.is_empty() || !c.sshkey.is_empty() {
      out.push(stages::users(&c.user, &c.sshkey));
    }
    if with_services {
      let mut enabled = self.image_type.enabled_services().to_vec();
      let mut disabled = Vec::new();
      if let Some(services) = &c.services {
        enabled.extend(services.enabled.iter().cloned());
        disabled.extend(services.disabled.iter().cloned());
      }
      if !enabled.is_empty() || !disabled.is_empty() {
        out.push(stages::systemd(&enabled, &disabled));
      }
    }
    if !c.directories.is_empty() {
      out.push(stages::mkdir(&c.directories));
    }
    let files = self.register_inline_files();
    if !files.is_empty() {
      out.push(stages::copy_inline(&files));
    }
    out.extend(stages::chown(&c.directories, &c.files));
    out.extend(stages::chmod(&c.files));
    out
  }

  /// Stages of an `os` tree. `bootloader` adds fstab and boot configuration
  /// for the planned partition table.
  fn os_stages(&mut self, ostree: bool, bootloader: bool) -> Vec<Stage> {
    let c = self.customizations;
    let table = if bootloader { self.partition_table.clone() } else { None };
    let kernel_opts = self.kernel_options();
    let mut out = vec![stages::rpm(ostree)];

    if let Some(table) = &table {
      out.push(stages::kernel_cmdline(table.root_uuid().unwrap_or_default(), &kernel_opts));
    }

    let language = c
      .locale
      .as_ref()
      .and_then(|l| l.languages.first())
      .map_or("C.UTF-8", String::as_str);
    out.push(stages::locale(language));
    if let Some(keyboard) = c.locale.as_ref().and_then(|l| l.keyboard.as_deref()) {
      out.push(stages::keymap(keyboard));
    }
    if let Some(hostname) = c.hostname.as_deref().filter(|h| !h.is_empty()) {
      out.push(stages::hostname(hostname));
    }
    let zone = c.timezone.as_ref().and_then(|t| t.timezone.as_deref()).unwrap_or("UTC");
    out.push(stages::timezone(zone));
    if let Some(timezone) = &c.timezone
      && !timezone.ntpservers.is_empty()
    {
      out.push(stages::chrony(&timezone.ntpservers));
    }
    if let Some(firewall) = &c.firewall {
      out.push(stages::firewall(firewall));
    }

    out.extend(self.customization_stages(true));

    if let Some(table) = &table {
      out.push(stages::fstab(table));
      if self.arch() == "s390x" {
        out.push(stages::zipl());
      } else {
        out.push(stages::grub2(
          table,
          &kernel_opts,
          self.image_type.boot_mode(),
          self.arch(),
          &self.image_type.distro().vendor,
        ));
      }
    }
    if c.fips == Some(true) {
      out.push(stages::crypto_policy("FIPS"));
    }
    if let Some(openscap) = &c.openscap {
      out.push(stages::oscap_remediation(openscap));
    }
    out.push(if ostree { stages::ostree_preptree() } else { stages::selinux() });
    out
  }

  /// The `image` pipeline: partition, format and fill a raw disk file.
  fn image_pipeline(&mut self, source: &str, file: &str, table: &PartitionTable) {
    let mut out = vec![stages::truncate(file, table.size), stages::sfdisk(file, table)];
    out.extend(stages::mkfs_all(file, table));
    out.push(stages::copy_tree_to_disk(source, file, table));
    if self.arch() == "s390x" {
      out.push(stages::zipl_inst(file));
    } else if self.image_type.boot_mode().has_bios()
      && let Some(platform) = stages::legacy_platform(self.arch())
    {
      out.push(stages::grub2_inst(file, platform, table));
    }
    self.push("image", vec![], out);
  }

  /// Conversion pipelines after `image`, producing the image type's file.
  fn format_pipelines(&mut self, format: DiskFormat, image_file: &str) {
    let filename = self.image_type.filename();
    match format {
      DiskFormat::Raw => {}
      DiskFormat::Qcow2 => self.push("qcow2", vec![], vec![stages::qemu("qcow2", filename, "image", image_file)]),
      DiskFormat::Vpc => self.push("vpc", vec![], vec![stages::qemu("vpc", filename, "image", image_file)]),
      DiskFormat::Vmdk => self.push("vmdk", vec![], vec![stages::qemu("vmdk", filename, "image", image_file)]),
      DiskFormat::Ova => {
        let vmdk = "image.vmdk";
        self.push("vmdk", vec![], vec![stages::qemu("vmdk", vmdk, "image", image_file)]);
        self.push("ovf", vec![], vec![stages::copy_tree("vmdk"), stages::ovf(vmdk)]);
        self.push("archive", vec![], vec![stages::tar(filename, "ovf", Some("ustar"))]);
      }
      DiskFormat::Xz => self.push("xz", vec![], vec![stages::xz(filename, "image", image_file)]),
    }
  }

  /// The raw file an `image` pipeline writes for `format`.
  fn image_file(&self, format: DiskFormat) -> String {
    let filename = self.image_type.filename();
    match format {
      DiskFormat::Raw => filename.to_string(),
      DiskFormat::Xz => filename.strip_suffix(".xz").unwrap_or(DISK_FILE).to_string(),
      _ => DISK_FILE.to_string(),
    }
  }

  /// The commit an OSTree image deploys or installs, registered as a source.
  fn commit_source(&mut self) -> OstreeSource {
    let ostree = self.options.ostree.clone().unwrap_or_default();
    let image_ref = if ostree.image_ref.is_empty() {
      self.image_type.default_ostree_ref()
    } else {
      ostree.image_ref.clone()
    };
    let source = OstreeSource {
      url: ostree.fetch_url().unwrap_or_default().to_string(),
      image_ref,
      checksum: ostree.checksum.clone(),
    };
    self.ostree_sources.push(source.clone());
    source
  }

  fn commit_ref(&self) -> String {
    self
      .options
      .ostree
      .as_ref()
      .map(|o| o.image_ref.clone())
      .filter(|r| !r.is_empty())
      .unwrap_or_else(|| self.image_type.default_ostree_ref())
  }

  fn iso_label(&self) -> String {
    let distro = self.image_type.distro();
    format!("{}-{}-{}", distro.product, distro.releasever, self.arch())
  }

  fn efiboot_tree(&mut self, kernel_opts: Vec<String>) {
    let distro = self.image_type.distro();
    let stage = stages::grub2_iso(
      &distro.product,
      &distro.releasever,
      &self.iso_label(),
      self.arch(),
      &kernel_opts,
    );
    self.push("efiboot-tree", vec![], vec![stage]);
  }

  fn bootiso(&mut self) {
    let filename = self.image_type.filename();
    let label = self.iso_label();
    self.push(
      "bootiso",
      vec![],
      vec![
        stages::xorrisofs(filename, &label, "bootiso-tree", true),
        stages::implantisomd5(filename),
      ],
    );
  }

  fn anaconda_tree(&mut self) {
    let distro = self.image_type.distro();
    let stages = vec![
      stages::rpm(false),
      stages::buildstamp(self.arch(), &distro.product, &distro.releasever, true),
      stages::locale("en_US.UTF-8"),
      stages::anaconda(&[
        "org.fedoraproject.Anaconda.Modules.Network",
        "org.fedoraproject.Anaconda.Modules.Payloads",
        "org.fedoraproject.Anaconda.Modules.Storage",
        "org.fedoraproject.Anaconda.Modules.Users",
      ]),
      stages::lorax_script(self.arch()),
      stages::dracut(&["kernel".to_string()], &["anaconda", "rdma", "rngd", "multipath", "fcoe", "nfs"]),
      stages::selinux(),
    ];
    self.push("anaconda-tree", self.chain("installer"), stages);
  }

  fn installer_kernel_opts(&self) -> Vec<String> {
    let label = self.iso_label();
    vec![
      format!("inst.stage2=hd:LABEL={}", label),
      format!("inst.ks=hd:LABEL={}:{}", label, KICKSTART_PATH),
    ]
  }

  // Families

  fn disk(&mut self, format: DiskFormat) -> Result<()> {
    let table = self.table()?;
    let os = self.os_stages(false, true);
    self.push("os", self.os_chain(), os);

    let image_file = self.image_file(format);
    self.image_pipeline("os", &image_file, &table);
    self.format_pipelines(format, &image_file);
    Ok(())
  }

  fn archive(&mut self, container: bool) {
    let os = self.os_stages(false, false);
    self.push("os", self.os_chain(), os);

    let filename = self.image_type.filename();
    if container {
      let stage = stages::oci_archive(filename, self.arch(), "os", None);
      self.push("container", vec![], vec![stage]);
    } else {
      self.push("archive", vec![], vec![stages::tar(filename, "os", None)]);
    }
  }

  fn commit_pipelines(&mut self) {
    let os = self.os_stages(true, false);
    self.push("os", self.os_chain(), os);

    let mut out = vec![stages::ostree_init("/repo")];
    let mut parent = None;
    if let Some(ostree) = &self.options.ostree
      && !ostree.parent_ref.is_empty()
    {
      let url = ostree.fetch_url().unwrap_or_default();
      out.push(stages::ostree_pull("/repo", OSTREE_REMOTE, url, &ostree.parent_ref));
      self.ostree_sources.push(OstreeSource {
        url: url.to_string(),
        image_ref: ostree.parent_ref.clone(),
        checksum: ostree.checksum.clone(),
      });
      parent = Some(if ostree.checksum.is_empty() { ostree.parent_ref.clone() } else { ostree.checksum.clone() });
    }
    out.push(stages::ostree_commit(
      &self.commit_ref(),
      &self.image_type.distro().releasever,
      parent.as_deref(),
      "os",
    ));
    self.push("ostree-commit", vec![], out);
  }

  fn ostree_commit(&mut self) {
    self.commit_pipelines();
    let stage = stages::tar(self.image_type.filename(), "ostree-commit", None);
    self.push("commit-archive", vec![], vec![stage]);
  }

  fn ostree_container(&mut self) {
    self.commit_pipelines();
    self.push(
      "container-tree",
      self.chain("container"),
      vec![
        stages::rpm(false),
        stages::nginx_conf("8080"),
        stages::copy_repo("ostree-commit", "/usr/share/nginx/html/repo"),
      ],
    );
    let config = json!({
      "Cmd": ["nginx", "-c", "/etc/nginx.conf"],
      "ExposedPorts": ["8080"],
    });
    let stage = stages::oci_archive(self.image_type.filename(), self.arch(), "container-tree", Some(config));
    self.push("container", vec![], vec![stage]);
  }

  fn deployment(&mut self, commit: &OstreeSource, table: &PartitionTable) {
    let kernel_opts: Vec<String> = self.kernel_options().split_whitespace().map(str::to_string).collect();
    let efi = DirectoryCustomization {
      path: "/boot/efi".to_string(),
      mode: Some("0700".to_string()),
      ensure_parents: true,
      ..Default::default()
    };

    let mut out = vec![
      stages::ostree_init_fs(),
      stages::ostree_os_init(OSTREE_OSNAME),
      stages::ostree_config(true),
      stages::mkdir(&[efi]),
      stages::ostree_remotes(OSTREE_REMOTE, &commit.url),
      stages::ostree_pull("/ostree/repo", OSTREE_REMOTE, &commit.url, &commit.image_ref),
      stages::ostree_deploy(
        OSTREE_OSNAME,
        OSTREE_REMOTE,
        &commit.image_ref,
        table.root_uuid().unwrap_or_default(),
        &kernel_opts,
      ),
      stages::ostree_fillvar(OSTREE_OSNAME, &commit.image_ref),
      stages::fstab(table),
    ];
    out.extend(self.customization_stages(true));
    out.push(stages::grub2(
      table,
      &kernel_opts.join(" "),
      self.image_type.boot_mode(),
      self.arch(),
      &self.image_type.distro().vendor,
    ));
    out.push(stages::ostree_selinux(OSTREE_OSNAME, &commit.image_ref));
    self.push("ostree-deployment", vec![], out);
  }

  fn ostree_disk(&mut self, format: DiskFormat) -> Result<()> {
    let table = self.table()?;
    let commit = self.commit_source();
    self.deployment(&commit, &table);

    let image_file = self.image_file(format);
    self.image_pipeline("ostree-deployment", &image_file, &table);
    self.format_pipelines(format, &image_file);
    Ok(())
  }

  fn simplified_installer(&mut self) -> Result<()> {
    let table = self.table()?;
    let commit = self.commit_source();
    self.deployment(&commit, &table);

    let raw = "image.raw";
    let compressed = "image.raw.xz";
    self.image_pipeline("ostree-deployment", raw, &table);
    self.push("xz", vec![], vec![stages::xz(compressed, "image", raw)]);

    let c = self.customizations;
    let mut coi = vec![stages::rpm(false)];
    let mut kernel_opts = vec![
      format!(
        "coreos.inst.install_dev={}",
        c.installation_device.as_deref().unwrap_or_default()
      ),
      format!("coreos.inst.image_file=/run/media/iso/{}", compressed),
      "coreos.inst.insecure".to_string(),
    ];
    if let Some(fdo) = &c.fdo {
      let diun = [
        ("diun_pub_key_insecure", &fdo.diun_pub_key_insecure),
        ("diun_pub_key_hash", &fdo.diun_pub_key_hash),
        ("diun_pub_key_root_certs", &fdo.diun_pub_key_root_certs),
      ]
      .into_iter()
      .find_map(|(key, value)| value.as_deref().filter(|v| !v.is_empty()).map(|v| (key, v)));
      if let Some(diun) = diun {
        coi.push(stages::fdo(&fdo.manufacturing_server_url, diun));
      }
      kernel_opts.push(format!("fdo.manufacturing_server_url={}", fdo.manufacturing_server_url));
    }
    if let Some(url) = c.ignition.as_ref().and_then(|i| i.firstboot_url.as_deref()) {
      kernel_opts.push(format!("ignition.config.url={}", url));
    }
    coi.push(stages::dracut(&["kernel".to_string()], &["coreos-installer", "fdo"]));
    self.push("coi-tree", self.chain("installer"), coi);

    self.efiboot_tree(kernel_opts);
    self.push(
      "bootiso-tree",
      vec![],
      vec![
        stages::copy_boot_files("coi-tree"),
        stages::copy_tree("efiboot-tree"),
        stages::copy_file("xz", compressed, &format!("/{}", compressed)),
        stages::discinfo(self.arch(), &self.image_type.distro().releasever),
      ],
    );
    self.bootiso();
    Ok(())
  }

  fn ostree_installer(&mut self) {
    let commit = self.commit_source();
    let c = self.customizations;

    self.anaconda_tree();
    let rootfs = stages::rootfs_image(ROOTFS_FILE, ROOTFS_SIZE, "anaconda-tree");
    self.push("rootfs-image", vec![], rootfs);
    self.efiboot_tree(self.installer_kernel_opts());

    let ostreesetup = json!({
      "ostree": {
        "osname": OSTREE_OSNAME,
        "url": "file:///run/install/repo/ostree/repo",
        "ref": commit.image_ref,
        "remote": OSTREE_REMOTE,
        "gpg": false,
      },
    });
    self.push(
      "bootiso-tree",
      vec![],
      vec![
        stages::copy_boot_files("anaconda-tree"),
        stages::squashfs("images/install.img", "rootfs-image", ROOTFS_FILE),
        stages::copy_tree("efiboot-tree"),
        stages::ostree_init("/ostree/repo"),
        stages::ostree_pull("/ostree/repo", OSTREE_REMOTE, &commit.url, &commit.image_ref),
        stages::kickstart(KICKSTART_PATH, ostreesetup, &c.user, &c.group),
        stages::discinfo(self.arch(), &self.image_type.distro().releasever),
      ],
    );
    self.bootiso();
  }

  fn image_installer(&mut self) {
    let os = self.os_stages(false, false);
    self.push("os", self.os_chain(), os);

    let c = self.customizations;
    self.anaconda_tree();
    let rootfs = stages::rootfs_image(ROOTFS_FILE, ROOTFS_SIZE, "anaconda-tree");
    self.push("rootfs-image", vec![], rootfs);
    self.efiboot_tree(self.installer_kernel_opts());

    let liveimg = json!({ "liveimg": { "url": "file:///run/install/repo/liveimg.tar.gz" } });
    self.push(
      "bootiso-tree",
      vec![],
      vec![
        stages::copy_boot_files("anaconda-tree"),
        stages::squashfs("images/install.img", "rootfs-image", ROOTFS_FILE),
        stages::copy_tree("efiboot-tree"),
        stages::tar("/liveimg.tar.gz", "os", None),
        stages::kickstart(KICKSTART_PATH, liveimg, &c.user, &c.group),
        stages::discinfo(self.arch(), &self.image_type.distro().releasever),
      ],
    );
    self.bootiso();
  }

  fn live_installer(&mut self) {
    let mut os = self.os_stages(false, false);
    // Relabelling stays last.
    let selinux = os.pop();
    os.push(stages::dracut(&["kernel".to_string()], &["dmsquash-live", "livenet"]));
    os.extend(selinux);
    self.push("os", self.os_chain(), os);

    let rootfs = stages::rootfs_image(ROOTFS_FILE, ROOTFS_SIZE, "os");
    self.push("rootfs-image", vec![], rootfs);

    let label = self.iso_label();
    self.efiboot_tree(vec![
      format!("root=live:CDLABEL={}", label),
      "rd.live.image".to_string(),
      "quiet".to_string(),
      "rhgb".to_string(),
    ]);
    self.push(
      "bootiso-tree",
      vec![],
      vec![
        stages::copy_boot_files("os"),
        stages::squashfs("LiveOS/squashfs.img", "rootfs-image", ROOTFS_FILE),
        stages::copy_tree("efiboot-tree"),
        stages::discinfo(self.arch(), &self.image_type.distro().releasever),
      ],
    );
    self.bootiso();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blueprint::{FileCustomization, FilesystemCustomization, KernelCustomization, Package};
  use crate::distro::{OstreeOptions, registry};
  use crate::manifest::StageInput;

  fn image_type(release: &str, arch: &str, name: &str) -> std::sync::Arc<ImageType> {
    registry()
      .get_distro(release)
      .and_then(|d| d.get_arch(arch))
      .and_then(|a| a.get_image_type(name))
      .unwrap()
  }

  fn ostree_options() -> ImageOptions {
    ImageOptions {
      ostree: Some(OstreeOptions {
        url: "https://ostree.example.com/repo".to_string(),
        ..Default::default()
      }),
      ..Default::default()
    }
  }

  fn options_for(it: &ImageType) -> ImageOptions {
    if it.rpm_ostree() && !it.family().is_ostree_commit() {
      ostree_options()
    } else {
      ImageOptions::default()
    }
  }

  fn blueprint_for(it: &ImageType) -> Blueprint {
    if it.family() == ImageFamily::OstreeSimplifiedInstaller {
      Blueprint {
        customizations: Some(Customizations {
          installation_device: Some("/dev/vda".to_string()),
          ..Default::default()
        }),
        ..Default::default()
      }
    } else {
      Blueprint::default()
    }
  }

  #[test]
  fn every_image_type_follows_its_family_layout() {
    for distro in registry().list_distros() {
      let distro = registry().get_distro(distro).unwrap();
      for arch in distro.list_arches() {
        let arch = distro.get_arch(arch).unwrap();
        for name in arch.list_image_types() {
          let it = arch.get_image_type(name).unwrap();
          let (manifest, _) = it.manifest(&blueprint_for(&it), &options_for(&it), None, 0).unwrap();
          assert_eq!(
            manifest.pipeline_names(),
            it.family().pipeline_names(),
            "{} {} {}",
            distro.name(),
            arch.name(),
            name
          );
        }
      }
    }
  }

  #[test]
  fn blueprint_packages_follow_the_base_set() {
    let it = image_type("fedora-37", "x86_64", "qcow2");
    let bp = Blueprint {
      packages: vec![Package {
        name: "tmux".to_string(),
        version: None,
      }],
      customizations: Some(Customizations {
        kernel: Some(KernelCustomization {
          name: "kernel-debug".to_string(),
          ..Default::default()
        }),
        ..Default::default()
      }),
      ..Default::default()
    };
    let m = build(&it, &bp, &ImageOptions::default(), None, 0).unwrap();
    let os = m.chain("os");
    assert_eq!(os.len(), 2);
    assert!(os[0].include.contains(&"kernel-debug".to_string()));
    assert!(!os[0].include.contains(&"kernel".to_string()));
    assert_eq!(os[1].include, vec!["tmux"]);
  }

  #[test]
  fn overrides_replace_base_sets() {
    let it = image_type("fedora-37", "aarch64", "qcow2");
    let overrides = BTreeMap::from([("build".to_string(), PackageSet::new(["busybox"]))]);
    let m = build(&it, &Blueprint::default(), &ImageOptions::default(), Some(&overrides), 0).unwrap();
    assert_eq!(m.chain("build"), vec![PackageSet::new(["busybox"])]);
    assert_eq!(m.chain("os"), vec![it.package_sets()["os"].clone()]);
  }

  #[test]
  fn inline_files_are_content_addressed() {
    let it = image_type("fedora-38", "x86_64", "qcow2");
    let bp = Blueprint {
      customizations: Some(Customizations {
        files: vec![FileCustomization {
          path: "/etc/motd".to_string(),
          data: "hello world".to_string(),
          ..Default::default()
        }],
        ..Default::default()
      }),
      ..Default::default()
    };
    let m = build(&it, &bp, &ImageOptions::default(), None, 0).unwrap();
    let checksum = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    assert_eq!(m.inline_files()[checksum], "aGVsbG8gd29ybGQ=");
    let copy = m
      .pipeline("os")
      .unwrap()
      .stages
      .iter()
      .find(|s| s.inputs.contains_key("inlinefile"))
      .unwrap();
    assert_eq!(
      copy.inputs["inlinefile"],
      StageInput::Inline {
        checksums: vec![checksum.to_string()]
      }
    );
  }

  #[test]
  fn lvm_root_adds_kernel_argument() {
    let it = image_type("fedora-37", "x86_64", "qcow2");
    let bp = Blueprint {
      customizations: Some(Customizations {
        filesystem: vec![FilesystemCustomization::new("/var/log", GIB)],
        ..Default::default()
      }),
      ..Default::default()
    };
    let m = build(&it, &bp, &ImageOptions::default(), None, 0).unwrap();
    assert!(m.partition_table().unwrap().has_lvm());
    let cmdline = &m.pipeline("os").unwrap().stages[1];
    assert_eq!(cmdline.stage_type, "org.osbuild.kernel-cmdline");
    assert!(cmdline.options["kernel_opts"].as_str().unwrap().ends_with("rd.lvm.lv=rootvg/rootlv"));
  }

  #[test]
  fn ostree_disk_pulls_the_default_ref() {
    let it = image_type("fedora-37", "x86_64", "iot-raw-image");
    let m = build(&it, &Blueprint::default(), &ostree_options(), None, 0).unwrap();
    assert_eq!(m.ostree_sources().len(), 1);
    assert_eq!(m.ostree_sources()[0].image_ref, "fedora/37/x86_64/iot");
    assert!(m.pipeline("ostree-deployment").unwrap().package_sets.is_empty());
    assert_eq!(m.partition_table().unwrap().size, 4 * GIB);
  }

  #[test]
  fn commit_with_parent_records_source() {
    let it = image_type("fedora-37", "aarch64", "iot-commit");
    let options = ImageOptions {
      ostree: Some(OstreeOptions {
        image_ref: "custom/ref".to_string(),
        parent_ref: "fedora/37/aarch64/iot".to_string(),
        url: "https://ostree.example.com/repo".to_string(),
        ..Default::default()
      }),
      ..Default::default()
    };
    let m = build(&it, &Blueprint::default(), &options, None, 0).unwrap();
    let commit = m.pipeline("ostree-commit").unwrap();
    let stage = commit.stages.last().unwrap();
    assert_eq!(stage.options["ref"], "custom/ref");
    assert_eq!(stage.options["parent"], "fedora/37/aarch64/iot");
    assert_eq!(m.ostree_sources()[0].key(), "fedora/37/aarch64/iot");
  }

  #[test]
  fn archive_types_have_no_partition_table() {
    let it = image_type("fedora-40", "s390x", "container");
    let m = build(&it, &Blueprint::default(), &ImageOptions::default(), None, 0).unwrap();
    assert!(m.partition_table().is_none());
    assert!(m.pipeline("os").unwrap().stages.iter().all(|s| s.stage_type != "org.osbuild.fstab"));
  }
}
