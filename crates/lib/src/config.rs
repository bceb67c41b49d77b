//! `keel.toml` options.
//!
//! Every section and option has a default, so an empty (or missing) file is a
//! valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::engine::GlobMatchErrorBehavior;
use crate::engine::environment::PATH_PLACEHOLDER;

/// The file looked up in the build root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "keel.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid configuration in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value for `{option}`: {message}")]
  Invalid { option: String, message: String },
}

fn default_constraints() -> Vec<String> {
  vec!["CPython>=3.6".to_string()]
}

fn default_parallelism() -> usize {
  std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
  /// Root of the workspace. Relative paths are resolved against the
  /// directory holding the config file.
  pub build_root: PathBuf,
  pub glob_match_error_behavior: GlobMatchErrorBehavior,
  /// Maximum number of tool processes running at once.
  pub parallelism: usize,
}

impl Default for GlobalOptions {
  fn default() -> Self {
    Self {
      build_root: PathBuf::from("."),
      glob_match_error_behavior: GlobMatchErrorBehavior::default(),
      parallelism: default_parallelism(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonOptions {
  /// Used by targets that leave `interpreter_constraints` unset.
  pub interpreter_constraints: Vec<String>,
  /// Directories or interpreter paths to search; `<PATH>` expands to `$PATH`.
  pub interpreter_search_paths: Vec<String>,
  /// Import roots, relative to the build root.
  pub source_roots: Vec<String>,
}

impl Default for PythonOptions {
  fn default() -> Self {
    Self {
      interpreter_constraints: default_constraints(),
      interpreter_search_paths: vec![PATH_PLACEHOLDER.to_string()],
      source_roots: vec![".".to_string()],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MyPyOptions {
  /// Don't run MyPy at all.
  pub skip: bool,
  /// Extra arguments, appended after the generated ones.
  pub args: Vec<String>,
  /// A config file, relative to the build root.
  pub config: Option<String>,
  /// Address specs of targets providing MyPy plugins.
  pub source_plugins: Vec<String>,
  pub version: String,
  pub extra_requirements: Vec<String>,
  /// Constraints for the environment MyPy itself runs in.
  pub interpreter_constraints: Vec<String>,
  pub entry_point: String,
  pub extra_env: BTreeMap<String, String>,
}

impl Default for MyPyOptions {
  fn default() -> Self {
    Self {
      skip: false,
      args: Vec::new(),
      config: None,
      source_plugins: Vec::new(),
      version: "mypy==0.800".to_string(),
      extra_requirements: Vec::new(),
      interpreter_constraints: default_constraints(),
      entry_point: "mypy".to_string(),
      extra_env: BTreeMap::new(),
    }
  }
}

impl MyPyOptions {
  /// Whether `interpreter_constraints` was left at its default.
  pub fn has_default_interpreter_constraints(&self) -> bool {
    self.interpreter_constraints == default_constraints()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeelConfig {
  pub global: GlobalOptions,
  pub python: PythonOptions,
  pub mypy: MyPyOptions,
}

impl KeelConfig {
  pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
    let config: KeelConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Load `path`, resolving a relative build root against its directory.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config = Self::parse(&content, path)?;
    if config.global.build_root.is_relative() {
      let dir = path.parent().unwrap_or_else(|| Path::new("."));
      config.global.build_root = dir.join(&config.global.build_root);
    }
    debug!(path = %path.display(), build_root = %config.global.build_root.display(), "loaded config");
    Ok(config)
  }

  /// Load `dir/keel.toml` if it exists, else the defaults rooted at `dir`.
  pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.is_file() {
      return Self::load(&path);
    }
    debug!(dir = %dir.display(), "no config file, using defaults");
    let mut config = Self::default();
    config.global.build_root = dir.to_path_buf();
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.global.parallelism == 0 {
      return Err(ConfigError::Invalid {
        option: "[global].parallelism".to_string(),
        message: "must be at least 1".to_string(),
      });
    }
    if self.mypy.entry_point.is_empty() {
      return Err(ConfigError::Invalid {
        option: "[mypy].entry_point".to_string(),
        message: "must not be empty".to_string(),
      });
    }
    Ok(())
  }
}
