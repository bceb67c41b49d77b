//! Fixtures shared by unit tests.

use std::fs;

use tempfile::TempDir;

use crate::address::Address;
use crate::python::registered_target_types;
use crate::target::{PluginFields, Target};

/// A temporary build root holding `files`, each containing its own path.
pub fn workspace(files: &[&str]) -> TempDir {
  let temp = TempDir::new().unwrap();
  for file in files {
    let path = temp.path().join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, file).unwrap();
  }
  temp
}

/// Construct a built-in target from a JSON object of raw field values.
pub fn construct(alias: &str, address: Address, fields: serde_json::Value) -> Target {
  let raw = serde_json::from_value(fields).unwrap();
  registered_target_types(PluginFields::default())
    .unwrap()
    .construct(alias, &raw, address)
    .unwrap()
}
