//! Blueprint customizations and their kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::filesystem::FilesystemCustomization;

/// The classes of customization an image type can allow.
///
/// The declaration order is the order used when listing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CustomizationKind {
  Hostname,
  Kernel,
  #[serde(rename = "SSHKey")]
  SshKey,
  User,
  Group,
  Timezone,
  Locale,
  Firewall,
  Services,
  Filesystem,
  InstallationDevice,
  #[serde(rename = "FDO")]
  Fdo,
  #[serde(rename = "OpenSCAP")]
  OpenScap,
  Ignition,
  Directories,
  Files,
  #[serde(rename = "FIPS")]
  Fips,
}

impl CustomizationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Hostname => "Hostname",
      Self::Kernel => "Kernel",
      Self::SshKey => "SSHKey",
      Self::User => "User",
      Self::Group => "Group",
      Self::Timezone => "Timezone",
      Self::Locale => "Locale",
      Self::Firewall => "Firewall",
      Self::Services => "Services",
      Self::Filesystem => "Filesystem",
      Self::InstallationDevice => "InstallationDevice",
      Self::Fdo => "FDO",
      Self::OpenScap => "OpenSCAP",
      Self::Ignition => "Ignition",
      Self::Directories => "Directories",
      Self::Files => "Files",
      Self::Fips => "FIPS",
    }
  }
}

impl fmt::Display for CustomizationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelCustomization {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub append: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeyCustomization {
  pub user: String,
  pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCustomization {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub home: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub groups: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uid: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCustomization {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneCustomization {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timezone: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub ntpservers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleCustomization {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub languages: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub keyboard: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesCustomization {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub enabled: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub disabled: Vec<String>,
}

impl ServicesCustomization {
  pub fn is_empty(&self) -> bool {
    self.enabled.is_empty() && self.disabled.is_empty()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallCustomization {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub ports: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub services: Option<ServicesCustomization>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdoCustomization {
  #[serde(default)]
  pub manufacturing_server_url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diun_pub_key_insecure: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diun_pub_key_hash: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diun_pub_key_root_certs: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenScapCustomization {
  pub datastream: String,
  pub profile_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnitionCustomization {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub embedded_config: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub firstboot_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCustomization {
  pub path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<String>,
  #[serde(default)]
  pub ensure_parents: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCustomization {
  pub path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<String>,
  #[serde(default)]
  pub data: String,
}

/// Optional image customizations carried by a blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customizations {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hostname: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kernel: Option<KernelCustomization>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub sshkey: Vec<SshKeyCustomization>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub user: Vec<UserCustomization>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub group: Vec<GroupCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timezone: Option<TimezoneCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub locale: Option<LocaleCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub firewall: Option<FirewallCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub services: Option<ServicesCustomization>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub filesystem: Vec<FilesystemCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub installation_device: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fdo: Option<FdoCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub openscap: Option<OpenScapCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ignition: Option<IgnitionCustomization>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub directories: Vec<DirectoryCustomization>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub files: Vec<FileCustomization>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fips: Option<bool>,
}

fn non_empty(value: &Option<String>) -> bool {
  value.as_deref().is_some_and(|v| !v.is_empty())
}

impl Customizations {
  pub const EMPTY: Customizations = Customizations {
    hostname: None,
    kernel: None,
    sshkey: Vec::new(),
    user: Vec::new(),
    group: Vec::new(),
    timezone: None,
    locale: None,
    firewall: None,
    services: None,
    filesystem: Vec::new(),
    installation_device: None,
    fdo: None,
    openscap: None,
    ignition: None,
    directories: Vec::new(),
    files: Vec::new(),
    fips: None,
  };

  /// Kinds that carry a non-empty value, in declaration order.
  pub fn present_kinds(&self) -> Vec<CustomizationKind> {
    use CustomizationKind as K;

    let kernel = self
      .kernel
      .as_ref()
      .is_some_and(|k| !k.name.is_empty() || !k.append.is_empty());
    let timezone = self
      .timezone
      .as_ref()
      .is_some_and(|t| non_empty(&t.timezone) || !t.ntpservers.is_empty());
    let locale = self
      .locale
      .as_ref()
      .is_some_and(|l| !l.languages.is_empty() || non_empty(&l.keyboard));
    let firewall = self
      .firewall
      .as_ref()
      .is_some_and(|f| !f.ports.is_empty() || f.services.as_ref().is_some_and(|s| !s.is_empty()));

    [
      (K::Hostname, non_empty(&self.hostname)),
      (K::Kernel, kernel),
      (K::SshKey, !self.sshkey.is_empty()),
      (K::User, !self.user.is_empty()),
      (K::Group, !self.group.is_empty()),
      (K::Timezone, timezone),
      (K::Locale, locale),
      (K::Firewall, firewall),
      (K::Services, self.services.as_ref().is_some_and(|s| !s.is_empty())),
      (K::Filesystem, !self.filesystem.is_empty()),
      (K::InstallationDevice, non_empty(&self.installation_device)),
      (K::Fdo, self.fdo.is_some()),
      (K::OpenScap, self.openscap.is_some()),
      (K::Ignition, self.ignition.is_some()),
      (K::Directories, !self.directories.is_empty()),
      (K::Files, !self.files.is_empty()),
      (K::Fips, self.fips == Some(true)),
    ]
    .into_iter()
    .filter_map(|(kind, present)| present.then_some(kind))
    .collect()
  }

  /// Extra kernel command line arguments, if any.
  pub fn kernel_append(&self) -> Option<&str> {
    self
      .kernel
      .as_ref()
      .map(|k| k.append.as_str())
      .filter(|append| !append.is_empty())
  }

  /// Replacement kernel package name, if any.
  pub fn kernel_name(&self) -> Option<&str> {
    self
      .kernel
      .as_ref()
      .map(|k| k.name.as_str())
      .filter(|name| !name.is_empty())
  }
}
