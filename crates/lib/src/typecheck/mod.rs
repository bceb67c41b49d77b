//! Type checking of Python targets with MyPy.
//!
//! Targets are grouped into partitions by the interpreter constraints of
//! their transitive closure. Each partition gets its own environments and
//! its own MyPy run; all partitions run concurrently and their results are
//! reported together, ordered by partition.

mod mypy;
mod partition;
mod pipeline;

use std::sync::Arc;

use thiserror::Error;

use crate::address::AddressError;
use crate::config::KeelConfig;
use crate::constraints::ConstraintError;
use crate::engine::{EnvironmentBuilder, EnvironmentError, GlobError, GlobExpander, ProcessError, ProcessRunner};
use crate::graph::{BuildGraph, GraphError};
use crate::sources::SourcesError;
use crate::target::TargetError;

pub use mypy::{
  FILE_LIST_PATH, MyPyFieldSet, check_and_warn_if_python_version_configured, determine_python_files, generate_argv,
};
pub use partition::{MyPyPartition, partition_field_sets};
pub use pipeline::mypy_typecheck;

/// Errors that abort a whole type check run.
///
/// A MyPy process that runs and reports errors is not one of these: its
/// output is recorded in that partition's [`TypecheckResult`].
#[derive(Debug, Error)]
pub enum TypecheckError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Target(#[from] TargetError),

  #[error(transparent)]
  Address(#[from] AddressError),

  #[error(transparent)]
  Constraint(#[from] ConstraintError),

  #[error(transparent)]
  Sources(#[from] SourcesError),

  #[error(transparent)]
  Glob(#[from] GlobError),

  #[error(transparent)]
  Environment(#[from] EnvironmentError),

  #[error(transparent)]
  Process(#[from] ProcessError),
}

/// The outcome of one MyPy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypecheckResult {
  pub exit_code: i32,
  pub stdout: String,
  pub stderr: String,
  /// The partition's sorted interpreter constraints, e.g. `[CPython>=3.6]`.
  pub partition_description: Option<String>,
}

impl TypecheckResult {
  pub fn is_success(&self) -> bool {
    self.exit_code == 0
  }
}

/// Every partition's result for one type checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypecheckResults {
  pub typechecker_name: String,
  pub results: Vec<TypecheckResult>,
}

impl TypecheckResults {
  pub fn new(typechecker_name: impl Into<String>, results: Vec<TypecheckResult>) -> Self {
    Self {
      typechecker_name: typechecker_name.into(),
      results,
    }
  }

  /// The first non-zero exit code, or 0 when every partition passed.
  pub fn exit_code(&self) -> i32 {
    self
      .results
      .iter()
      .map(|result| result.exit_code)
      .find(|code| *code != 0)
      .unwrap_or(0)
  }

  pub fn is_success(&self) -> bool {
    self.exit_code() == 0
  }

  /// Whether nothing ran, e.g. because the checker is skipped.
  pub fn skipped(&self) -> bool {
    self.results.is_empty()
  }
}

/// Collaborators and options shared by every partition of a run.
#[derive(Clone)]
pub struct TypecheckContext {
  pub config: Arc<KeelConfig>,
  pub graph: Arc<BuildGraph>,
  pub globs: Arc<dyn GlobExpander>,
  pub environments: Arc<dyn EnvironmentBuilder>,
  pub runner: Arc<dyn ProcessRunner>,
}
