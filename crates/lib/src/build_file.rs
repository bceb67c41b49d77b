//! `BUILD.yaml` parsing.
//!
//! A build file is a YAML list of target declarations. Each declaration names
//! its target type and target name; every other key is a raw field value:
//!
//! ```yaml
//! - type: python_library
//!   name: app
//!   dependencies: [":util", "3rdparty:requests"]
//!   interpreter_constraints: [">=3.8"]
//! ```
//!
//! The directory holding the file becomes the `spec_path` of its addresses.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::address::Address;
use crate::field::RawValue;
use crate::target::{RegisteredTargetTypes, Target, TargetError};

pub const BUILD_FILE_NAME: &str = "BUILD.yaml";

#[derive(Debug, Error)]
pub enum BuildFileError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("declaration #{index} in {path} is missing `{key}` or it is not a string")]
  MissingKey { path: PathBuf, index: usize, key: &'static str },

  #[error("target {0} is declared more than once")]
  DuplicateTarget(Address),

  #[error(transparent)]
  Target(#[from] TargetError),
}

/// One entry of a build file, before its fields are validated.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDeclaration {
  pub type_alias: String,
  pub address: Address,
  pub fields: IndexMap<String, RawValue>,
}

/// Parse the declarations of a build file located in `spec_path`.
pub fn parse_build_file(content: &str, spec_path: &str, path: &Path) -> Result<Vec<TargetDeclaration>, BuildFileError> {
  let entries: Option<Vec<IndexMap<String, RawValue>>> =
    serde_yaml::from_str(content).map_err(|source| BuildFileError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

  let mut declarations = Vec::new();
  for (index, mut fields) in entries.unwrap_or_default().into_iter().enumerate() {
    let mut take = |key: &'static str| match fields.shift_remove(key) {
      Some(RawValue::String(value)) => Ok(value),
      _ => Err(BuildFileError::MissingKey {
        path: path.to_path_buf(),
        index,
        key,
      }),
    };
    let type_alias = take("type")?;
    let name = take("name")?;
    declarations.push(TargetDeclaration {
      type_alias,
      address: Address::new(spec_path, name),
      fields,
    });
  }
  Ok(declarations)
}

/// Find every build file under `build_root`, skipping hidden directories.
pub fn find_build_files(build_root: &Path) -> Result<Vec<(String, PathBuf)>, BuildFileError> {
  let walker = WalkDir::new(build_root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !e.file_name().to_string_lossy().starts_with('.'));

  let mut found = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| BuildFileError::Read {
      path: build_root.to_path_buf(),
      source: e.into(),
    })?;
    if !entry.file_type().is_file() || entry.file_name() != BUILD_FILE_NAME {
      continue;
    }
    let Some(dir) = entry.path().parent().and_then(|dir| dir.strip_prefix(build_root).ok()) else {
      continue;
    };
    let spec_path = dir
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    found.push((spec_path, entry.path().to_path_buf()));
  }
  Ok(found)
}

/// Parse every build file under `build_root` and construct its targets.
pub fn load_targets(build_root: &Path, types: &RegisteredTargetTypes) -> Result<Vec<Target>, BuildFileError> {
  let mut targets: IndexMap<Address, Target> = IndexMap::new();
  for (spec_path, path) in find_build_files(build_root)? {
    let content = std::fs::read_to_string(&path).map_err(|source| BuildFileError::Read {
      path: path.clone(),
      source,
    })?;
    let declarations = parse_build_file(&content, &spec_path, &path)?;
    debug!(path = %path.display(), targets = declarations.len(), "parsed build file");

    for declaration in declarations {
      if targets.contains_key(&declaration.address) {
        return Err(BuildFileError::DuplicateTarget(declaration.address));
      }
      let target = types.construct(&declaration.type_alias, &declaration.fields, declaration.address.clone())?;
      targets.insert(declaration.address, target);
    }
  }
  Ok(targets.into_values().collect())
}
