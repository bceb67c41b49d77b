//! Content hashing for file sets and sandbox inputs.
//!
//! - `Fingerprint`: a full 64-character SHA-256 hex digest
//! - `hash_bytes()`: arbitrary byte hashing
//! - `hash_file()`: single file hashing
//! - `fingerprint_entries()`: deterministic hashing of a path -> content map

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A SHA-256 digest, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to read file {path}: {message}")]
pub struct HashError {
  pub path: String,
  pub message: String,
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<Fingerprint, HashError> {
  let read_error = |e: std::io::Error| HashError {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  let mut file = fs::File::open(path).map_err(read_error)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_error)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Hash a set of `(relative path, content fingerprint)` entries.
///
/// Entries are sorted by path first, so the result does not depend on the
/// order they are supplied in.
pub fn fingerprint_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a Fingerprint)>) -> Fingerprint {
  let mut entries: Vec<_> = entries.into_iter().collect();
  entries.sort_by(|a, b| a.0.cmp(b.0));

  let mut hasher = Sha256::new();
  for (path, fingerprint) in entries {
    hasher.update(format!("F:{}:{}", path, fingerprint.0).as_bytes());
    hasher.update(b"\n");
  }
  Fingerprint(format!("{:x}", hasher.finalize()))
}
