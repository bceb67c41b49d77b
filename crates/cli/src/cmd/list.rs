//! Implementation of the `keel list` command.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::output::{OutputFormat, Status, print_json};

use super::Workspace;

#[derive(Debug, Serialize)]
struct ListedTarget {
  address: String,
  #[serde(rename = "type")]
  type_alias: &'static str,
}

pub fn cmd_list(config: Option<&Path>, specs: &[String], output: OutputFormat) -> Result<()> {
  let workspace = Workspace::load(config)?;
  let addresses = workspace.resolve(specs)?;

  let listed = addresses
    .iter()
    .map(|address| {
      let target = workspace.graph.get(address)?;
      Ok(ListedTarget {
        address: address.to_string(),
        type_alias: target.alias(),
      })
    })
    .collect::<Result<Vec<_>>>()?;

  if output.is_json() {
    return print_json(&listed);
  }
  if listed.is_empty() {
    Status::Info.print(&format!("No targets found under {}", workspace.build_root().display()));
    return Ok(());
  }
  for target in &listed {
    println!("{}  {}", target.address, target.type_alias);
  }
  Ok(())
}
