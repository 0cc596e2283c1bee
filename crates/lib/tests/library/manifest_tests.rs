//! Manifest generation, package resolution and serialization end to end.

use std::time::Duration;

use tokio::sync::watch;

use distrogen_lib::ManifestError;
use distrogen_lib::blueprint::{Blueprint, Customizations, FilesystemCustomization, Package};
use distrogen_lib::distro::{ImageOptions, ImageType, OstreeOptions};
use distrogen_lib::manifest::PipelineGraph;
use distrogen_lib::rpmmd::{DepsolveOptions, StaticResolver, depsolve};
use distrogen_lib::util::hash::Hashable;

use super::common::{all_image_types, fake_spec, image_type, with_customizations};

/// A snapshot holding every package `it` installs without a blueprint.
fn snapshot_for(it: &ImageType) -> StaticResolver {
  let mut names: Vec<&str> = it
    .package_sets()
    .values()
    .flat_map(|set| set.include.iter().map(String::as_str))
    .collect();
  names.sort_unstable();
  names.dedup();
  StaticResolver::new(names.into_iter().map(|name| fake_spec(name, "noarch")))
}

#[test]
fn same_seed_gives_identical_manifests() {
  let it = image_type("fedora-38", "x86_64", "qcow2");
  let options = ImageOptions::default();
  let (a, _) = it.manifest(&Blueprint::default(), &options, None, 42).unwrap();
  let (b, _) = it.manifest(&Blueprint::default(), &options, None, 42).unwrap();
  assert_eq!(a, b);
  assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());

  let (c, _) = it.manifest(&Blueprint::default(), &options, None, 43).unwrap();
  assert_ne!(a.compute_hash().unwrap(), c.compute_hash().unwrap());
  assert_ne!(
    a.partition_table().unwrap().root_uuid(),
    c.partition_table().unwrap().root_uuid()
  );
}

#[test]
fn every_manifest_forms_a_valid_pipeline_graph() {
  for distro in ["fedora-37", "fedora-40"] {
    for (arch, it) in all_image_types(distro) {
      let options = ImageOptions {
        ostree: it.rpm_ostree().then(|| OstreeOptions {
          url: "https://ostree.example.com/repo".to_string(),
          ..Default::default()
        }),
        ..Default::default()
      };
      let blueprint = if it.name() == "iot-simplified-installer" {
        Blueprint::from_toml("[customizations]\ninstallation_device = \"/dev/vda\"\n").unwrap()
      } else {
        Blueprint::default()
      };
      let (manifest, _) = it
        .manifest(&blueprint, &options, None, 0)
        .unwrap_or_else(|e| panic!("{}/{}/{}: {}", distro, arch, it.name(), e));
      assert_eq!(manifest.pipeline_names(), it.family().pipeline_names(), "{}/{}", arch, it.name());

      let graph = PipelineGraph::from_manifest(&manifest).unwrap();
      assert_eq!(graph.order().unwrap().first(), Some(&"build"));
      assert!(graph.dependents("build").len() + 1 >= graph.len());
    }
  }
}

#[test]
fn build_chain_is_returned_with_the_manifest() {
  let it = image_type("fedora-37", "aarch64", "ami");
  let (manifest, build_chain) = it.manifest(&Blueprint::default(), &ImageOptions::default(), None, 0).unwrap();
  assert_eq!(build_chain.len(), 1);
  assert_eq!(build_chain, manifest.package_set_chains()["build"]);
  assert!(!build_chain[0].include.contains(&"grub2-pc".to_string()));
}

#[test]
fn qcow2_build_packages_per_arch() {
  let base = [
    "dnf",
    "dosfstools",
    "e2fsprogs",
    "policycoreutils",
    "qemu-img",
    "selinux-policy-targeted",
    "systemd",
    "tar",
    "xz",
  ];
  let mut x86_64 = base.to_vec();
  x86_64.push("grub2-pc");

  for (arch, expected) in [("x86_64", x86_64), ("aarch64", base.to_vec())] {
    let it = image_type("fedora-37", arch, "qcow2");
    let (_, build_chain) = it.manifest(&Blueprint::default(), &ImageOptions::default(), None, 0).unwrap();
    assert_eq!(build_chain.len(), 1, "{}", arch);
    assert_eq!(build_chain[0].include, expected, "{}", arch);
    assert!(build_chain[0].exclude.is_empty(), "{}", arch);
  }
}

#[tokio::test]
async fn resolves_and_serializes_qcow2() {
  let it = image_type("fedora-37", "x86_64", "qcow2");
  let (manifest, _) = it.manifest(&Blueprint::default(), &ImageOptions::default(), None, 0).unwrap();
  let resolver = snapshot_for(&it);

  let resolved = depsolve(&resolver, &manifest, &DepsolveOptions::default()).await.unwrap();
  assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["build", "os"]);

  let document = manifest.serialize(&resolved).unwrap();
  let names: Vec<&str> = document.pipelines.iter().map(|p| p.name.as_str()).collect();
  assert_eq!(names, ["build", "os", "image", "qcow2"]);
  assert!(document.pipelines[0].build.is_none());
  assert!(document.pipelines[1..].iter().all(|p| p.build.as_deref() == Some("name:build")));
  assert!(document.sources.contains_key("org.osbuild.curl"));

  let json = document.to_json_pretty().unwrap();
  assert!(json.contains(r#""type": "org.osbuild.qemu""#));
}

#[tokio::test]
async fn blueprint_packages_must_be_resolvable() {
  let it = image_type("fedora-37", "x86_64", "qcow2");
  let blueprint = Blueprint {
    packages: vec![Package {
      name: "tmux".to_string(),
      version: None,
    }],
    ..Default::default()
  };
  let (manifest, _) = it.manifest(&blueprint, &ImageOptions::default(), None, 0).unwrap();

  let err = depsolve(&snapshot_for(&it), &manifest, &DepsolveOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, ManifestError::ResolutionFailed { ref pipeline, .. } if pipeline == "os"));
  assert!(err.to_string().contains("tmux"));
}

#[tokio::test]
async fn cancelled_resolution_stops_early() {
  let it = image_type("fedora-37", "x86_64", "qcow2");
  let (manifest, _) = it.manifest(&Blueprint::default(), &ImageOptions::default(), None, 0).unwrap();
  let (tx, rx) = watch::channel(true);
  let options = DepsolveOptions {
    timeout: Some(Duration::from_secs(5)),
    cancel: Some(rx),
  };

  let err = depsolve(&snapshot_for(&it), &manifest, &options).await.unwrap_err();
  assert!(matches!(err, ManifestError::ResolutionCancelled));
  drop(tx);
}

#[test]
fn serializing_without_resolution_fails() {
  let it = image_type("fedora-37", "x86_64", "wsl");
  let (manifest, _) = it.manifest(&Blueprint::default(), &ImageOptions::default(), None, 0).unwrap();
  let err = manifest.serialize(&Default::default()).unwrap_err();
  assert!(matches!(err, ManifestError::MissingPackageSpecs { ref pipeline } if pipeline == "build"));
}

#[test]
fn vhd_size_rounds_to_whole_mib_without_overflowing() {
  let vhd = image_type("fedora-37", "x86_64", "vhd");
  assert_eq!(vhd.size(0), 4 * 1024 * 1024 * 1024);
  assert_eq!(vhd.size(1), 1024 * 1024);
  assert_eq!(vhd.size(u64::MAX), u64::MAX / (1024 * 1024) * (1024 * 1024));
  assert_eq!(image_type("fedora-37", "x86_64", "qcow2").size(u64::MAX), u64::MAX);
}

#[test]
fn huge_sizes_are_rejected_not_panicking() {
  let qcow2 = image_type("fedora-37", "x86_64", "qcow2");
  let options = ImageOptions {
    size: u64::MAX,
    ..Default::default()
  };
  let err = qcow2.manifest(&Blueprint::default(), &options, None, 0).unwrap_err();
  assert!(matches!(err, ManifestError::InsufficientPartitionSize { limit: u64::MAX, .. }));

  let huge_var = with_customizations(Customizations {
    filesystem: vec![FilesystemCustomization::new("/var", u64::MAX)],
    ..Default::default()
  });
  for (distro, arch, name) in [
    ("fedora-37", "x86_64", "qcow2"),
    ("fedora-38", "s390x", "qcow2"),
    ("fedora-40", "aarch64", "minimal-raw"),
  ] {
    let err = image_type(distro, arch, name)
      .manifest(&huge_var, &ImageOptions::default(), None, 0)
      .unwrap_err();
    assert!(
      matches!(err, ManifestError::InsufficientPartitionSize { .. }),
      "{}/{}/{}: {}",
      distro,
      arch,
      name,
      err
    );
  }

  let vhd = image_type("fedora-37", "x86_64", "vhd");
  let err = vhd.manifest(&Blueprint::default(), &options, None, 0).unwrap_err();
  assert!(matches!(err, ManifestError::InsufficientPartitionSize { .. }));
}
