//! Filesystem (mountpoint) customizations.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::consts::{GIB, KIB, MIB, TIB};

/// A request for a mountpoint with a minimum size in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemCustomization {
  pub mountpoint: String,
  #[serde(rename = "minsize", default, deserialize_with = "deserialize_size")]
  pub min_size: u64,
}

impl FilesystemCustomization {
  pub fn new(mountpoint: &str, min_size: u64) -> Self {
    Self {
      mountpoint: mountpoint.to_string(),
      min_size,
    }
  }
}

/// Parse a size such as `1024`, `"512 MiB"` or `"2GB"` into bytes.
pub fn parse_size(input: &str) -> Option<u64> {
  let trimmed = input.trim();
  let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
  let (digits, unit) = trimmed.split_at(split);
  let value: u64 = digits.parse().ok()?;

  let multiplier = match unit.trim() {
    "" | "B" => 1,
    "KiB" => KIB,
    "MiB" => MIB,
    "GiB" => GIB,
    "TiB" => TIB,
    "kB" | "KB" => 1000,
    "MB" => 1000 * 1000,
    "GB" => 1000 * 1000 * 1000,
    "TB" => 1000 * 1000 * 1000 * 1000,
    _ => return None,
  };

  value.checked_mul(multiplier)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  struct SizeVisitor;

  impl Visitor<'_> for SizeVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("a byte count or a size string such as \"2 GiB\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
      Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
      u64::try_from(v).map_err(|_| E::custom(format!("size cannot be negative: {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
      parse_size(v).ok_or_else(|| E::custom(format!("invalid size: {:?}", v)))
    }
  }

  deserializer.deserialize_any(SizeVisitor)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_binary_and_decimal_units() {
    assert_eq!(parse_size("1024"), Some(1024));
    assert_eq!(parse_size("512 MiB"), Some(512 * MIB));
    assert_eq!(parse_size("2GiB"), Some(2 * GIB));
    assert_eq!(parse_size("3 GB"), Some(3_000_000_000));
    assert_eq!(parse_size(" 1 TiB "), Some(TIB));
  }

  #[test]
  fn rejects_unknown_units() {
    assert_eq!(parse_size("12 parsecs"), None);
    assert_eq!(parse_size("GiB"), None);
    assert_eq!(parse_size(""), None);
  }

  #[test]
  fn deserializes_from_json_number_and_string() {
    let fs: FilesystemCustomization = serde_json::from_str(r#"{"mountpoint": "/var", "minsize": 4096}"#).unwrap();
    assert_eq!(fs, FilesystemCustomization::new("/var", 4096));

    let fs: FilesystemCustomization = serde_json::from_str(r#"{"mountpoint": "/var", "minsize": "1 MiB"}"#).unwrap();
    assert_eq!(fs.min_size, MIB);

    assert!(serde_json::from_str::<FilesystemCustomization>(r#"{"mountpoint": "/", "minsize": -1}"#).is_err());
  }
}
