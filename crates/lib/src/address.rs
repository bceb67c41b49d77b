//! Node identities in the build graph.
//!
//! An [`Address`] names exactly one target: the directory that declares it
//! (`spec_path`, relative to the build root) plus the target's name within
//! that directory. Addresses render as `spec_path:name`, or `//:name` for
//! targets declared at the build root.
//!
//! [`AddressSpec`] is the selection language used on the command line and in
//! tool options to pick several addresses at once.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing addresses and address specs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
  #[error("empty address spec")]
  Empty,

  #[error("invalid address `{spec}`: {reason}")]
  Invalid { spec: String, reason: String },
}

/// The unique identity of a target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
  /// Directory of the declaring build file, relative to the build root. Empty at the root.
  pub spec_path: String,
  /// Name of the target within its directory.
  pub target_name: String,
}

impl Address {
  pub fn new(spec_path: impl Into<String>, target_name: impl Into<String>) -> Self {
    Self {
      spec_path: normalize_dir(&spec_path.into()),
      target_name: target_name.into(),
    }
  }

  /// Parse an address reference as written inside a build file.
  ///
  /// Accepted forms:
  /// - `:name`: a sibling of `relative_to`
  /// - `dir:name`
  /// - `dir`: shorthand for `dir:<last path component of dir>`
  /// - `//dir:name`: explicitly rooted, same as `dir:name`
  pub fn parse(spec: &str, relative_to: Option<&Address>) -> Result<Self, AddressError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
      return Err(AddressError::Empty);
    }
    let rooted = trimmed.strip_prefix("//").unwrap_or(trimmed);

    let (dir, name) = match rooted.split_once(':') {
      Some((dir, name)) => (dir, name),
      None => {
        let dir = rooted.trim_end_matches('/');
        let name = dir.rsplit('/').next().unwrap_or(dir);
        (dir, name)
      }
    };

    if name.is_empty() {
      return Err(AddressError::Invalid {
        spec: spec.to_string(),
        reason: "missing target name".to_string(),
      });
    }
    if name.contains('/') || name.contains(':') {
      return Err(AddressError::Invalid {
        spec: spec.to_string(),
        reason: "target names may not contain `/` or `:`".to_string(),
      });
    }

    let spec_path = if dir.is_empty() && trimmed.starts_with(':') {
      match relative_to {
        Some(owner) => owner.spec_path.clone(),
        None => String::new(),
      }
    } else {
      dir.to_string()
    };

    if spec_path.split('/').any(|part| part == "..") {
      return Err(AddressError::Invalid {
        spec: spec.to_string(),
        reason: "address may not escape the build root".to_string(),
      });
    }

    Ok(Self::new(spec_path, name))
  }

  /// Whether the target is declared by the build file at the build root.
  pub fn is_root(&self) -> bool {
    self.spec_path.is_empty()
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_root() {
      write!(f, "//:{}", self.target_name)
    } else {
      write!(f, "{}:{}", self.spec_path, self.target_name)
    }
  }
}

/// A pattern selecting zero or more addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressSpec {
  /// Exactly one address.
  Single(Address),
  /// Every target declared directly in a directory (`dir:`).
  Sibling(String),
  /// Every target declared in a directory or below it (`dir::`, or `::` for everything).
  Descendant(String),
}

impl AddressSpec {
  pub fn parse(spec: &str) -> Result<Self, AddressError> {
    let trimmed = spec.trim();
    let rooted = trimmed.strip_prefix("//").unwrap_or(trimmed);
    if let Some(dir) = rooted.strip_suffix("::") {
      return Ok(Self::Descendant(normalize_dir(dir)));
    }
    if let Some(dir) = rooted.strip_suffix(':') {
      return Ok(Self::Sibling(normalize_dir(dir)));
    }
    Address::parse(trimmed, None).map(Self::Single)
  }

  /// Whether this spec selects `address`.
  pub fn matches(&self, address: &Address) -> bool {
    match self {
      AddressSpec::Single(expected) => expected == address,
      AddressSpec::Sibling(dir) => &address.spec_path == dir,
      AddressSpec::Descendant(dir) => {
        dir.is_empty()
          || &address.spec_path == dir
          || address
            .spec_path
            .strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
      }
    }
  }
}

impl fmt::Display for AddressSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AddressSpec::Single(address) => write!(f, "{}", address),
      AddressSpec::Sibling(dir) => write!(f, "{}:", dir),
      AddressSpec::Descendant(dir) => write!(f, "{}::", dir),
    }
  }
}

fn normalize_dir(dir: &str) -> String {
  dir.trim_matches('/').to_string()
}
