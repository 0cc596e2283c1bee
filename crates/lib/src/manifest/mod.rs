//! Manifest types.
//!
//! A [`Manifest`] is the ordered list of pipelines an executor runs to
//! produce one image. Each pipeline owns a package-set chain and a list of
//! stages; stages reference earlier pipelines through their inputs.
//!
//! Manifests are immutable once built. Before the package sets are resolved
//! a manifest can be inspected and hashed; [`Manifest::serialize`] turns it
//! into the executor-facing document once resolved packages are available.

mod builder;
mod graph;
mod serialize;
mod stages;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::disk::PartitionTable;
use crate::rpmmd::PackageSetChain;
use crate::util::hash::Hashable;

pub(crate) use builder::build;
pub use graph::PipelineGraph;
pub use serialize::{SerializedManifest, SerializedPipeline, SerializedStage};

/// Where a stage reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StageInput {
  /// The filesystem tree produced by another pipeline.
  Tree { pipeline: String },
  /// One file produced by another pipeline.
  File { pipeline: String, path: String },
  /// The resolved packages of the owning pipeline.
  Packages,
  /// Inline file sources, by checksum.
  Inline { checksums: Vec<String> },
  /// An OSTree commit fetched from a remote repository.
  OstreeCommit {
    url: String,
    #[serde(rename = "ref")]
    image_ref: String,
  },
}

impl StageInput {
  pub fn tree(pipeline: &str) -> Self {
    StageInput::Tree {
      pipeline: pipeline.to_string(),
    }
  }

  pub fn file(pipeline: &str, path: &str) -> Self {
    StageInput::File {
      pipeline: pipeline.to_string(),
      path: path.to_string(),
    }
  }

  /// The pipeline this input depends on, if any.
  pub fn pipeline(&self) -> Option<&str> {
    match self {
      StageInput::Tree { pipeline } | StageInput::File { pipeline, .. } => Some(pipeline),
      StageInput::Packages | StageInput::Inline { .. } | StageInput::OstreeCommit { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
  #[serde(rename = "type")]
  pub stage_type: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: BTreeMap<String, StageInput>,
  #[serde(default)]
  pub options: serde_json::Value,
}

impl Stage {
  pub fn new(stage_type: &str, options: serde_json::Value) -> Self {
    Self {
      stage_type: stage_type.to_string(),
      inputs: BTreeMap::new(),
      options,
    }
  }

  pub fn with_input(mut self, name: &str, input: StageInput) -> Self {
    self.inputs.insert(name.to_string(), input);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
  pub name: String,
  /// Pipeline whose tree provides the build environment.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub package_sets: PackageSetChain,
  pub stages: Vec<Stage>,
}

impl Pipeline {
  /// Every pipeline this one reads from, build environment first.
  pub fn dependencies(&self) -> Vec<&str> {
    let mut deps: Vec<&str> = self.build.iter().map(String::as_str).collect();
    for stage in &self.stages {
      for input in stage.inputs.values() {
        if let Some(dep) = input.pipeline()
          && !deps.contains(&dep)
        {
          deps.push(dep);
        }
      }
    }
    deps
  }
}

/// An OSTree commit the manifest pulls from a remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OstreeSource {
  pub url: String,
  #[serde(rename = "ref")]
  pub image_ref: String,
  /// Commit checksum when known; the ref stands in for it otherwise.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub checksum: String,
}

impl OstreeSource {
  pub fn key(&self) -> &str {
    if self.checksum.is_empty() { &self.image_ref } else { &self.checksum }
  }
}

/// A complete, unresolved image build description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  pub(crate) distro: String,
  pub(crate) runner: String,
  pub(crate) arch: String,
  pub(crate) image_type: String,
  pub(crate) filename: String,
  pub(crate) mime_type: String,
  pub(crate) seed: u64,
  pub(crate) pipelines: Vec<Pipeline>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub(crate) partition_table: Option<PartitionTable>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub(crate) ostree_sources: Vec<OstreeSource>,
  /// Base64 file contents keyed by `sha256:<hex>` checksum.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub(crate) inline_files: BTreeMap<String, String>,
}

impl Hashable for Manifest {}

impl Manifest {
  pub fn distro(&self) -> &str {
    &self.distro
  }

  pub fn arch(&self) -> &str {
    &self.arch
  }

  pub fn image_type(&self) -> &str {
    &self.image_type
  }

  pub fn filename(&self) -> &str {
    &self.filename
  }

  pub fn mime_type(&self) -> &str {
    &self.mime_type
  }

  pub fn seed(&self) -> u64 {
    self.seed
  }

  pub fn pipelines(&self) -> &[Pipeline] {
    &self.pipelines
  }

  pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
    self.pipelines.iter().find(|p| p.name == name)
  }

  pub fn pipeline_names(&self) -> Vec<&str> {
    self.pipelines.iter().map(|p| p.name.as_str()).collect()
  }

  pub fn partition_table(&self) -> Option<&PartitionTable> {
    self.partition_table.as_ref()
  }

  pub fn ostree_sources(&self) -> &[OstreeSource] {
    &self.ostree_sources
  }

  pub fn inline_files(&self) -> &BTreeMap<String, String> {
    &self.inline_files
  }

  /// Package-set chains of every pipeline that installs packages.
  pub fn package_set_chains(&self) -> BTreeMap<String, PackageSetChain> {
    self
      .pipelines
      .iter()
      .filter(|p| !p.package_sets.is_empty())
      .map(|p| (p.name.clone(), p.package_sets.clone()))
      .collect()
  }

  /// The concatenated package sets of every pipeline named `stage`.
  pub fn chain(&self, stage: &str) -> PackageSetChain {
    self
      .pipelines
      .iter()
      .filter(|p| p.name == stage)
      .flat_map(|p| p.package_sets.iter().cloned())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::rpmmd::PackageSet;

  fn manifest(pipelines: Vec<Pipeline>) -> Manifest {
    Manifest {
      distro: "fedora-37".to_string(),
      runner: "org.osbuild.fedora37".to_string(),
      arch: "x86_64".to_string(),
      image_type: "qcow2".to_string(),
      filename: "disk.qcow2".to_string(),
      mime_type: "application/x-qemu-disk".to_string(),
      seed: 0,
      pipelines,
      partition_table: None,
      ostree_sources: Vec::new(),
      inline_files: BTreeMap::new(),
    }
  }

  fn pipeline(name: &str, sets: PackageSetChain) -> Pipeline {
    Pipeline {
      name: name.to_string(),
      build: None,
      package_sets: sets,
      stages: vec![],
    }
  }

  #[test]
  fn chains_skip_pipelines_without_packages() {
    let m = manifest(vec![
      pipeline("build", vec![PackageSet::new(["dnf"])]),
      pipeline("os", vec![PackageSet::new(["kernel"]), PackageSet::new(["tmux"])]),
      pipeline("image", vec![]),
    ]);
    let chains = m.package_set_chains();
    assert_eq!(chains.keys().collect::<Vec<_>>(), vec!["build", "os"]);
    assert_eq!(chains["os"].len(), 2);
    assert!(m.chain("image").is_empty());
    assert_eq!(m.chain("build"), vec![PackageSet::new(["dnf"])]);
  }

  #[test]
  fn dependencies_list_build_then_inputs_once() {
    let p = Pipeline {
      name: "image".to_string(),
      build: Some("build".to_string()),
      package_sets: vec![],
      stages: vec![
        Stage::new("org.osbuild.copy", json!({})).with_input("tree", StageInput::tree("os")),
        Stage::new("org.osbuild.copy", json!({})).with_input("again", StageInput::tree("os")),
        Stage::new("org.osbuild.rpm", json!({})).with_input("packages", StageInput::Packages),
      ],
    };
    assert_eq!(p.dependencies(), vec!["build", "os"]);
  }

  #[test]
  fn hash_changes_with_content() {
    let a = manifest(vec![pipeline("build", vec![])]);
    let mut b = a.clone();
    b.seed = 1;
    assert_eq!(a.compute_hash().unwrap(), a.clone().compute_hash().unwrap());
    assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
  }
}
