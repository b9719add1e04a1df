//! Hashing utilities for content fingerprints and node identity.
//!
//! This module provides:
//! - `Fingerprint`: a 16-character FNV-1a digest used for naming and change detection
//! - `ObjectHash`: a truncated 20-character SHA-256 of a serialized value
//! - `fingerprint_reader()` / `fingerprint_file()`: streaming digests of byte content
//! - `fingerprint_strings()`: digest of a concatenation of strings
//!
//! Fingerprints are not cryptographically secure. They exist to notice that
//! content changed and to disambiguate names, nothing more.

use std::fs::File;
use std::hash::Hasher;
use std::io::{self, Read};
use std::path::Path;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A deterministic, non-cryptographic content digest.
///
/// # Format
///
/// The 64-bit FNV-1a value rendered as 16 lowercase, zero-padded hexadecimal
/// characters (big-endian), e.g. `"8bdfbef6654809e6"` for `"totoro"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The first `len` characters of the digest (the whole digest if shorter).
  pub fn prefix(&self, len: usize) -> &str {
    &self.0[..len.min(self.0.len())]
  }
}

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

fn finish(hasher: FnvHasher) -> Fingerprint {
  Fingerprint(hex::encode(hasher.finish().to_be_bytes()))
}

/// Fingerprint arbitrary bytes.
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
  let mut hasher = FnvHasher::default();
  hasher.write(data);
  finish(hasher)
}

/// Fingerprint the concatenation of `parts`.
///
/// Order matters: `["a", "b"]` and `["b", "a"]` produce different digests.
pub fn fingerprint_strings<I, S>(parts: I) -> Fingerprint
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut hasher = FnvHasher::default();
  for part in parts {
    hasher.write(part.as_ref().as_bytes());
  }
  finish(hasher)
}

/// Fingerprint everything a reader yields.
///
/// Fails if the stream cannot be consumed to the end.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
  let mut hasher = FnvHasher::default();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = match reader.read(&mut buffer) {
      Ok(0) => break,
      Ok(n) => n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    hasher.write(&buffer[..bytes_read]);
  }

  Ok(finish(hasher))
}

/// Fingerprint a file's contents.
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
  let file = File::open(path)?;
  fingerprint_reader(file)
}

/// A content-addressed hash identifying a serialized value.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized value,
/// e.g. `"a1b2c3d4e5f6789012ab"`.
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
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = hex::encode(hasher.finalize());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}
