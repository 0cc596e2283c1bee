//! Path policies for mountpoint, directory and file customizations.
//!
//! A policy table maps path prefixes to rules. The rule of the longest
//! matching prefix (compared component by component) decides whether a path is
//! acceptable.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::{DirectoryCustomization, FileCustomization, FilesystemCustomization};
use crate::error::ManifestError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathPolicy {
  /// Reject the prefix and everything below it.
  pub deny: bool,
  /// Accept only the prefix itself, not its subdirectories.
  pub exact: bool,
}

impl PathPolicy {
  const ALLOW: PathPolicy = PathPolicy {
    deny: false,
    exact: false,
  };
  const DENY: PathPolicy = PathPolicy {
    deny: true,
    exact: false,
  };
  const EXACT: PathPolicy = PathPolicy {
    deny: false,
    exact: true,
  };
}

#[derive(Debug, Clone, Default)]
pub struct PathPolicies {
  rules: BTreeMap<String, PathPolicy>,
}

impl PathPolicies {
  pub fn new<'a>(rules: impl IntoIterator<Item = (&'a str, PathPolicy)>) -> Self {
    Self {
      rules: rules.into_iter().map(|(path, policy)| (path.to_string(), policy)).collect(),
    }
  }

  /// Returns true if `path` is allowed by the longest matching rule.
  ///
  /// Paths not covered by any rule are rejected.
  pub fn allows(&self, path: &str) -> bool {
    let Some((prefix, policy)) = self
      .rules
      .iter()
      .filter(|(prefix, _)| is_path_prefix(prefix, path))
      .max_by_key(|(prefix, _)| prefix.len())
    else {
      return false;
    };

    if policy.deny {
      return false;
    }
    !(policy.exact && prefix.as_str() != path)
  }
}

/// Policy applied to filesystem mountpoints.
pub static MOUNTPOINT_POLICIES: LazyLock<PathPolicies> = LazyLock::new(|| {
  PathPolicies::new([
    ("/", PathPolicy::ALLOW),
    ("/bin", PathPolicy::DENY),
    ("/boot", PathPolicy::DENY),
    ("/dev", PathPolicy::DENY),
    ("/etc", PathPolicy::DENY),
    ("/lib", PathPolicy::DENY),
    ("/lib64", PathPolicy::DENY),
    ("/lost+found", PathPolicy::DENY),
    ("/proc", PathPolicy::DENY),
    ("/run", PathPolicy::DENY),
    ("/sbin", PathPolicy::DENY),
    ("/sys", PathPolicy::DENY),
    ("/sysroot", PathPolicy::DENY),
    ("/usr", PathPolicy::EXACT),
    ("/var/lock", PathPolicy::DENY),
    ("/var/run", PathPolicy::DENY),
  ])
});

/// Policy applied to directory and file customizations.
pub static FILE_POLICIES: LazyLock<PathPolicies> = LazyLock::new(|| {
  PathPolicies::new([
    ("/", PathPolicy::ALLOW),
    ("/boot", PathPolicy::DENY),
    ("/dev", PathPolicy::DENY),
    ("/proc", PathPolicy::DENY),
    ("/run", PathPolicy::DENY),
    ("/sys", PathPolicy::DENY),
    ("/etc/fstab", PathPolicy::DENY),
    ("/etc/group", PathPolicy::DENY),
    ("/etc/passwd", PathPolicy::DENY),
    ("/etc/shadow", PathPolicy::DENY),
  ])
});

fn is_path_prefix(prefix: &str, path: &str) -> bool {
  if prefix == "/" {
    return path.starts_with('/');
  }
  path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Lexically normalize a slash separated path.
///
/// Collapses repeated separators, drops `.` segments, resolves `..` against
/// preceding segments and removes trailing separators.
pub fn clean_path(path: &str) -> String {
  let rooted = path.starts_with('/');
  let mut parts: Vec<&str> = Vec::new();

  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        if parts.last().is_some_and(|last| *last != "..") {
          parts.pop();
        } else if !rooted {
          parts.push("..");
        }
      }
      other => parts.push(other),
    }
  }

  let joined = parts.join("/");
  if rooted {
    format!("/{}", joined)
  } else if joined.is_empty() {
    ".".to_string()
  } else {
    joined
  }
}

/// True if `path` is absolute and already in normalized form.
pub fn is_clean_absolute(path: &str) -> bool {
  path.starts_with('/') && clean_path(path) == path
}

/// Check mountpoints for normalization, policy and duplicates.
///
/// Offending paths are reported once each, in the order they were given.
pub fn check_mountpoints(filesystems: &[FilesystemCustomization]) -> Result<(), ManifestError> {
  let mut offending: Vec<String> = Vec::new();
  let mut dirty = false;

  for fs in filesystems {
    let mountpoint = fs.mountpoint.as_str();
    let clean = is_clean_absolute(mountpoint);
    if clean && MOUNTPOINT_POLICIES.allows(mountpoint) {
      continue;
    }
    dirty |= !clean;
    if !offending.iter().any(|p| p == mountpoint) {
      offending.push(mountpoint.to_string());
    }
  }

  if !offending.is_empty() {
    return Err(if dirty {
      ManifestError::DirtyMountpoint { paths: offending }
    } else {
      ManifestError::UnsupportedMountpoint { paths: offending }
    });
  }

  let mut seen = BTreeSet::new();
  for fs in filesystems {
    if !seen.insert(fs.mountpoint.as_str()) {
      return Err(ManifestError::DuplicateMountpoint {
        mountpoint: fs.mountpoint.clone(),
      });
    }
  }

  Ok(())
}

/// Check directory and file customizations against the file policy.
pub fn check_paths(directories: &[DirectoryCustomization], files: &[FileCustomization]) -> Result<(), ManifestError> {
  let mut seen = BTreeSet::new();
  let paths = directories
    .iter()
    .map(|d| d.path.as_str())
    .chain(files.iter().map(|f| f.path.as_str()));

  for path in paths {
    let reason = if !is_clean_absolute(path) {
      Some("path must be absolute and normalized")
    } else if path == "/" {
      Some("the root directory cannot be customized")
    } else if !FILE_POLICIES.allows(path) {
      Some("path is not allowed")
    } else if !seen.insert(path) {
      Some("path is declared more than once")
    } else {
      None
    };

    if let Some(reason) = reason {
      return Err(ManifestError::InvalidPathCustomization {
        path: path.to_string(),
        reason: reason.to_string(),
      });
    }
  }

  for dir in directories {
    if let Some(mode) = dir.mode.as_deref() {
      check_mode(&dir.path, mode)?;
    }
  }
  for file in files {
    if let Some(mode) = file.mode.as_deref() {
      check_mode(&file.path, mode)?;
    }
  }

  Ok(())
}

fn check_mode(path: &str, mode: &str) -> Result<(), ManifestError> {
  let valid = !mode.is_empty() && mode.len() <= 4 && mode.chars().all(|c| ('0'..='7').contains(&c));
  if valid {
    return Ok(());
  }
  Err(ManifestError::InvalidPathCustomization {
    path: path.to_string(),
    reason: format!("invalid octal mode {:?}", mode),
  })
}
