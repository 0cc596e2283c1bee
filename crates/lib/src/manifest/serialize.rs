//! The executor-facing manifest document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{Manifest, Pipeline, Stage, StageInput};
use crate::consts::MANIFEST_VERSION;
use crate::error::{ManifestError, Result};
use crate::rpmmd::{PackageSpec, ResolvedPackages};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedStage {
  #[serde(rename = "type")]
  pub stage_type: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: BTreeMap<String, Value>,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedPipeline {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build: Option<String>,
  pub runner: String,
  pub stages: Vec<SerializedStage>,
}

/// A resolved manifest, ready for the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedManifest {
  pub version: String,
  pub pipelines: Vec<SerializedPipeline>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub sources: BTreeMap<String, Value>,
}

impl SerializedManifest {
  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

fn installs_packages(pipeline: &Pipeline) -> bool {
  pipeline.package_sets.iter().any(|set| !set.is_empty())
}

impl Manifest {
  /// Combine the manifest with resolved packages into the executor document.
  ///
  /// # Errors
  ///
  /// Returns [`ManifestError::MissingPackageSpecs`] when a pipeline that
  /// installs packages has no entry in `resolved`.
  pub fn serialize(&self, resolved: &ResolvedPackages) -> Result<SerializedManifest> {
    let mut packages: BTreeMap<&str, &[PackageSpec]> = BTreeMap::new();
    for pipeline in self.pipelines.iter().filter(|p| installs_packages(p)) {
      let specs = resolved
        .get(&pipeline.name)
        .ok_or_else(|| ManifestError::MissingPackageSpecs {
          pipeline: pipeline.name.clone(),
        })?;
      packages.insert(pipeline.name.as_str(), specs);
    }

    let pipelines = self
      .pipelines
      .iter()
      .map(|pipeline| {
        let specs = packages.get(pipeline.name.as_str()).copied().unwrap_or_default();
        SerializedPipeline {
          name: pipeline.name.clone(),
          build: pipeline.build.as_ref().map(|b| format!("name:{}", b)),
          runner: self.runner.clone(),
          stages: pipeline.stages.iter().map(|s| self.serialize_stage(s, specs)).collect(),
        }
      })
      .collect();

    let sources = self.sources(packages.values().copied().flatten());
    debug!(
      image_type = %self.image_type,
      sources = sources.len(),
      "serialized manifest"
    );
    Ok(SerializedManifest {
      version: MANIFEST_VERSION.to_string(),
      pipelines,
      sources,
    })
  }

  fn serialize_stage(&self, stage: &Stage, specs: &[PackageSpec]) -> SerializedStage {
    let inputs = stage
      .inputs
      .iter()
      .map(|(name, input)| (name.clone(), self.serialize_input(input, specs)))
      .collect();
    SerializedStage {
      stage_type: stage.stage_type.clone(),
      inputs,
      options: stage.options.clone(),
    }
  }

  fn serialize_input(&self, input: &StageInput, specs: &[PackageSpec]) -> Value {
    match input {
      StageInput::Packages => {
        let references: Vec<&str> = specs.iter().map(|s| s.checksum.as_str()).collect();
        json!({ "type": "org.osbuild.files", "origin": "org.osbuild.source", "references": references })
      }
      StageInput::Tree { pipeline } => json!({
        "type": "org.osbuild.tree",
        "origin": "org.osbuild.pipeline",
        "references": [format!("name:{}", pipeline)],
      }),
      StageInput::File { pipeline, path } => json!({
        "type": "org.osbuild.files",
        "origin": "org.osbuild.pipeline",
        "references": { format!("name:{}", pipeline): { "file": path } },
      }),
      StageInput::Inline { checksums } => json!({
        "type": "org.osbuild.files",
        "origin": "org.osbuild.source",
        "references": checksums,
      }),
      StageInput::OstreeCommit { url, image_ref } => {
        let key = self
          .ostree_sources
          .iter()
          .find(|s| &s.url == url && &s.image_ref == image_ref)
          .map_or(image_ref.as_str(), |s| s.key());
        json!({
          "type": "org.osbuild.ostree",
          "origin": "org.osbuild.source",
          "references": { key: { "ref": image_ref } },
        })
      }
    }
  }

  fn sources<'s>(&self, specs: impl Iterator<Item = &'s PackageSpec>) -> BTreeMap<String, Value> {
    let mut sources = BTreeMap::new();

    let curl: BTreeMap<&str, Value> = specs
      .map(|spec| (spec.checksum.as_str(), json!({ "url": spec.remote_location })))
      .collect();
    if !curl.is_empty() {
      sources.insert("org.osbuild.curl".to_string(), json!({ "items": curl }));
    }

    if !self.inline_files.is_empty() {
      let items: BTreeMap<&str, Value> = self
        .inline_files
        .iter()
        .map(|(checksum, data)| (checksum.as_str(), json!({ "encoding": "base64", "data": data })))
        .collect();
      sources.insert("org.osbuild.inline".to_string(), json!({ "items": items }));
    }

    if !self.ostree_sources.is_empty() {
      let items: BTreeMap<&str, Value> = self
        .ostree_sources
        .iter()
        .map(|s| (s.key(), json!({ "remote": { "url": s.url } })))
        .collect();
      sources.insert("org.osbuild.ostree".to_string(), json!({ "items": items }));
    }

    sources
  }
}
