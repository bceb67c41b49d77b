//! Implementation of the `keel deps` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use keel_lib::address::Address;

use crate::output::{ARROW, OutputFormat, print_json};

use super::Workspace;

#[derive(Debug, Serialize)]
struct DepsOutput {
  address: String,
  transitive: bool,
  dependencies: Vec<String>,
}

pub fn cmd_deps(config: Option<&Path>, spec: &str, transitive: bool, output: OutputFormat) -> Result<()> {
  let workspace = Workspace::load(config)?;
  let address = Address::parse(spec, None).with_context(|| format!("Invalid address: {}", spec))?;

  let dependencies: Vec<String> = if transitive {
    let closure = workspace.graph.transitive_targets(std::slice::from_ref(&address))?;
    let mut addresses: Vec<&Address> = closure
      .closure
      .iter()
      .map(|target| target.address())
      .filter(|dependency| **dependency != address)
      .collect();
    addresses.sort();
    addresses.into_iter().map(Address::to_string).collect()
  } else {
    workspace
      .graph
      .dependencies(&address)?
      .iter()
      .map(|target| target.address().to_string())
      .collect()
  };

  if output.is_json() {
    return print_json(&DepsOutput {
      address: address.to_string(),
      transitive,
      dependencies,
    });
  }
  for dependency in &dependencies {
    println!("{} {}", ARROW, dependency);
  }
  Ok(())
}
