//! Isolated interpreter environments for running tools.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::constraints::InterpreterConstraints;

static INTERPRETER_NAME: LazyLock<Result<Regex, regex::Error>> =
  LazyLock::new(|| Regex::new(r"^python(?P<major>\d+)\.(?P<minor>\d+)$"));

/// The placeholder in interpreter search paths that expands to `$PATH`.
pub const PATH_PLACEHOLDER: &str = "<PATH>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
  #[error("no interpreter compatible with {constraints} found in {searched:?}")]
  NoCompatibleInterpreter { constraints: String, searched: Vec<String> },

  #[error("failed to build environment `{name}`: {message}")]
  Build { name: String, message: String },
}

/// A request for an execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentRequest {
  /// A short name for logs, e.g. `mypy.pex`.
  pub name: String,
  pub requirements: Vec<String>,
  pub interpreter_constraints: InterpreterConstraints,
  /// Module to run with `-m`. `None` runs the bare interpreter.
  pub entry_point: Option<String>,
}

/// A resolved environment: an interpreter plus the requirements installed for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Environment {
  pub name: String,
  pub interpreter: PathBuf,
  pub interpreter_version: (u64, u64),
  pub requirements: Vec<String>,
  pub entry_point: Option<String>,
}

impl Environment {
  /// The full argv for running this environment's entry point with `args`.
  pub fn argv(&self, args: &[String]) -> Vec<String> {
    let mut argv = vec![self.interpreter.display().to_string()];
    if let Some(entry_point) = &self.entry_point {
      argv.push("-m".to_string());
      argv.push(entry_point.clone());
    }
    argv.extend(args.iter().cloned());
    argv
  }
}

/// Builds isolated environments.
#[async_trait]
pub trait EnvironmentBuilder: Send + Sync {
  async fn build(&self, request: &EnvironmentRequest) -> Result<Environment, EnvironmentError>;
}

/// Selects interpreters from the local machine.
///
/// Every entry of the search path is either a directory scanned for
/// `pythonX.Y` executables or such an executable itself. The lowest version
/// admitted by the requested constraints wins. Requirements are recorded on
/// the environment but not installed.
#[derive(Debug, Clone)]
pub struct LocalEnvironmentBuilder {
  search_paths: Vec<PathBuf>,
}

impl LocalEnvironmentBuilder {
  pub fn new(search_paths: Vec<PathBuf>) -> Self {
    Self { search_paths }
  }

  /// Build from configured search paths, expanding [`PATH_PLACEHOLDER`].
  pub fn from_search_paths(entries: &[String]) -> Self {
    let mut search_paths = Vec::new();
    for entry in entries {
      if entry == PATH_PLACEHOLDER {
        if let Some(path) = std::env::var_os("PATH") {
          search_paths.extend(std::env::split_paths(&path));
        }
      } else {
        search_paths.push(PathBuf::from(entry));
      }
    }
    Self::new(search_paths)
  }

  fn candidates(&self) -> Vec<((u64, u64), PathBuf)> {
    let mut found = Vec::new();
    for entry in &self.search_paths {
      if entry.is_dir() {
        let Ok(read_dir) = std::fs::read_dir(entry) else {
          continue;
        };
        for child in read_dir.flatten() {
          let path = child.path();
          if let Some(version) = interpreter_version(&path) {
            found.push((version, path));
          }
        }
      } else if let Some(version) = interpreter_version(entry) {
        found.push((version, entry.clone()));
      }
    }
    found.sort();
    found.dedup_by(|a, b| a.0 == b.0);
    found
  }
}

fn interpreter_version(path: &Path) -> Option<(u64, u64)> {
  let name = path.file_name()?.to_str()?;
  let captures = INTERPRETER_NAME.as_ref().ok()?.captures(name)?;
  let major = captures.name("major")?.as_str().parse().ok()?;
  let minor = captures.name("minor")?.as_str().parse().ok()?;
  Some((major, minor))
}

#[async_trait]
impl EnvironmentBuilder for LocalEnvironmentBuilder {
  async fn build(&self, request: &EnvironmentRequest) -> Result<Environment, EnvironmentError> {
    let this = self.clone();
    let candidates = tokio::task::spawn_blocking(move || this.candidates())
      .await
      .map_err(|e| EnvironmentError::Build {
        name: request.name.clone(),
        message: e.to_string(),
      })?;
    debug!(name = %request.name, candidates = candidates.len(), "searching for interpreters");

    let constraints = &request.interpreter_constraints;
    let (version, interpreter) = candidates
      .into_iter()
      .find(|((major, minor), _)| constraints.is_empty() || constraints.includes_version(*major, *minor))
      .ok_or_else(|| EnvironmentError::NoCompatibleInterpreter {
        constraints: constraints.to_string(),
        searched: self.search_paths.iter().map(|p| p.display().to_string()).collect(),
      })?;

    info!(
      name = %request.name,
      interpreter = %interpreter.display(),
      requirements = request.requirements.len(),
      "selected interpreter"
    );
    Ok(Environment {
      name: request.name.clone(),
      interpreter,
      interpreter_version: version,
      requirements: request.requirements.clone(),
      entry_point: request.entry_point.clone(),
    })
  }
}
