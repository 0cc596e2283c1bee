//! Blueprint model.
//!
//! A blueprint is the user-supplied description of an image: extra packages
//! plus a set of optional customizations. Blueprints are plain values; they are
//! parsed from TOML, validated against an image type and then discarded.

mod customizations;
mod filesystem;
pub mod policy;

use serde::{Deserialize, Serialize};

pub use customizations::*;
pub use filesystem::{FilesystemCustomization, parse_size};

/// A package requested by the blueprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

impl Package {
  /// The include spec handed to the package resolver (`name` or `name-version`).
  pub fn spec(&self) -> String {
    match self.version.as_deref() {
      Some(version) if !version.is_empty() && version != "*" => format!("{}-{}", self.name, version),
      _ => self.name.clone(),
    }
  }
}

/// A package group requested by the blueprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageGroup {
  pub name: String,
}

/// User input describing the desired image content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub version: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub packages: Vec<Package>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub groups: Vec<PackageGroup>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub customizations: Option<Customizations>,
}

impl Blueprint {
  /// Parse a blueprint from its TOML representation.
  pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(input)
  }

  /// Customizations, or an empty set when the blueprint declares none.
  pub fn customizations(&self) -> &Customizations {
    static EMPTY: Customizations = Customizations::EMPTY;
    self.customizations.as_ref().unwrap_or(&EMPTY)
  }

  /// Package include specs contributed by the blueprint, groups last.
  pub fn package_specs(&self) -> Vec<String> {
    self
      .packages
      .iter()
      .map(Package::spec)
      .chain(self.groups.iter().map(|g| format!("@{}", g.name)))
      .collect()
  }
}
