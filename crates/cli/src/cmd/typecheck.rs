//! Implementation of the `keel typecheck` command.
//!
//! Selects every target MyPy applies to among the requested specs and runs
//! the partitioned MyPy pipeline against the local machine. The process exit
//! status is the first non-zero MyPy exit code.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use keel_lib::engine::{LocalEnvironmentBuilder, LocalGlobExpander, LocalProcessRunner};
use keel_lib::target::FieldSet;
use keel_lib::typecheck::{MyPyFieldSet, TypecheckContext, TypecheckResults, mypy_typecheck};

use crate::output::{OutputFormat, Status, count, format_duration, print_json, print_stat};

use super::Workspace;

#[derive(Debug, Serialize)]
struct TypecheckOutput<'a> {
  typechecker: &'a str,
  exit_code: i32,
  results: Vec<PartitionOutput<'a>>,
}

#[derive(Debug, Serialize)]
struct PartitionOutput<'a> {
  partition: Option<&'a str>,
  exit_code: i32,
  stdout: &'a str,
  stderr: &'a str,
}

pub fn cmd_typecheck(config: Option<&Path>, specs: &[String], verbose: bool, output: OutputFormat) -> Result<ExitCode> {
  let workspace = Workspace::load(config)?;
  let addresses = workspace.resolve(specs)?;

  let mut field_sets = Vec::new();
  for address in &addresses {
    let target = workspace.graph.get(address)?;
    if MyPyFieldSet::is_applicable(&target) {
      field_sets.push(MyPyFieldSet::create(&target)?);
    }
  }
  info!(selected = addresses.len(), applicable = field_sets.len(), "selected targets");
  let targets = field_sets.len();

  let build_root = workspace.build_root().to_path_buf();
  let ctx = TypecheckContext {
    environments: Arc::new(LocalEnvironmentBuilder::from_search_paths(
      &workspace.config.python.interpreter_search_paths,
    )),
    globs: Arc::new(LocalGlobExpander::new(&build_root)),
    runner: Arc::new(LocalProcessRunner::new(&build_root)),
    config: Arc::new(workspace.config),
    graph: Arc::new(workspace.graph),
  };

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let results = rt
    .block_on(mypy_typecheck(field_sets, &ctx))
    .context("Failed to run MyPy")?;

  if output.is_json() {
    print_json(&TypecheckOutput {
      typechecker: &results.typechecker_name,
      exit_code: results.exit_code(),
      results: results
        .results
        .iter()
        .map(|result| PartitionOutput {
          partition: result.partition_description.as_deref(),
          exit_code: result.exit_code,
          stdout: &result.stdout,
          stderr: &result.stderr,
        })
        .collect(),
    })?;
  } else {
    report(&results, ctx.config.mypy.skip, targets, verbose);
    if verbose {
      print_stat("Took", &format_duration(started.elapsed()));
    }
  }

  Ok(exit_status(results.exit_code()))
}

fn report(results: &TypecheckResults, skipped: bool, targets: usize, verbose: bool) {
  if results.skipped() {
    if skipped {
      Status::Info.print(&format!("{} skipped.", results.typechecker_name));
    } else {
      Status::Info.print("No targets to type check.");
    }
    return;
  }

  for result in &results.results {
    let partition = result
      .partition_description
      .as_deref()
      .map(|description| format!(" for {}", description))
      .unwrap_or_default();
    if result.is_success() {
      Status::Success.print(&format!("{} succeeded{}.", results.typechecker_name, partition));
    } else {
      Status::Failure.print(&format!("{} failed{}.", results.typechecker_name, partition));
    }
    if !result.stdout.is_empty() {
      println!("{}", result.stdout.trim_end());
    }
    if !result.stderr.is_empty() {
      Status::Warning.print(result.stderr.trim_end());
    }
  }

  if verbose {
    println!();
    print_stat("Targets", &targets.to_string());
    print_stat("Partitions", &results.results.len().to_string());
  } else if results.results.len() > 1 {
    Status::Info.print(&format!(
      "Checked {} in {}.",
      count(targets, "target"),
      count(results.results.len(), "partition")
    ));
  }
}

/// Exit codes outside `1..=255` still report failure.
fn exit_status(code: i32) -> ExitCode {
  match u8::try_from(code) {
    Ok(code) => ExitCode::from(code),
    Err(_) => ExitCode::FAILURE,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn out_of_range_codes_still_fail() {
    assert_eq!(exit_status(0), ExitCode::SUCCESS);
    assert_eq!(exit_status(2), ExitCode::from(2));
    assert_eq!(exit_status(-1), ExitCode::FAILURE);
    assert_eq!(exit_status(256), ExitCode::FAILURE);
  }
}
