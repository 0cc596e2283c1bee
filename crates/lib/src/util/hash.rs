//! Hashing utilities for manifest identity and inline file sources.
//!
//! This module provides:
//! - `ObjectHash`: A truncated 20-character hash identifying a manifest
//! - `ContentHash`: A full 64-character hash for content addressing
//! - `hash_bytes()`: Arbitrary byte hashing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A truncated hash identifying a serializable value.
///
/// The hash is the first 20 characters of the lowercase hex SHA-256 of the
/// value's JSON serialization. Map-typed fields must be ordered (`BTreeMap`)
/// for the hash to be stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let full = hex::encode(Sha256::digest(serialized.as_bytes()));
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA-256 hash, used to address inline file sources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// The `sha256:<hex>` form used as a source key.
  pub fn checksum(&self) -> String {
    format!("sha256:{}", self.0)
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Serialize)]
  struct Sample {
    name: &'static str,
    size: u64,
  }

  impl Hashable for Sample {}

  #[test]
  fn object_hash_is_truncated_and_stable() {
    let a = Sample { name: "qcow2", size: 1 };
    let hash = a.compute_hash().unwrap();
    assert_eq!(hash.0.len(), OBJ_HASH_PREFIX_LEN);
    assert_eq!(hash, a.compute_hash().unwrap());
  }

  #[test]
  fn object_hash_changes_with_content() {
    let a = Sample { name: "qcow2", size: 1 };
    let b = Sample { name: "qcow2", size: 2 };
    assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
  }

  #[test]
  fn hash_bytes_matches_known_digest() {
    let hash = hash_bytes(b"hello world");
    assert_eq!(hash.0, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    assert_eq!(
      hash.checksum(),
      "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
  }
}
