//! Sandboxed tool invocations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::environment::Environment;
use super::fs::{FileContent, Snapshot};
use crate::util::hash::{Fingerprint, fingerprint_entries, hash_bytes};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
  #[error("input `{path}` is provided twice with different contents")]
  ConflictingInputs { path: String },

  #[error("failed to prepare sandbox: {message}")]
  Sandbox { message: String },

  #[error("failed to spawn `{program}`: {message}")]
  Spawn { program: String, message: String },
}

/// Where the bytes of a sandbox input come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputSource {
  /// Copied from the same path under the build root.
  Workspace,
  /// Written from memory.
  Content(Vec<u8>),
}

/// The files made available to a process, keyed by sandbox-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InputSet {
  entries: BTreeMap<String, InputSource>,
  /// Digests of the snapshots workspace entries came from.
  snapshots: BTreeSet<Fingerprint>,
}

impl InputSet {
  /// Every file of `snapshot`, copied from the build root.
  pub fn from_snapshot(snapshot: &Snapshot) -> Self {
    let entries = snapshot
      .files
      .iter()
      .map(|path| (path.clone(), InputSource::Workspace))
      .collect();
    Self {
      entries,
      snapshots: BTreeSet::from([snapshot.digest.clone()]),
    }
  }

  pub fn from_contents(contents: impl IntoIterator<Item = FileContent>) -> Self {
    let entries = contents
      .into_iter()
      .map(|file| (file.path, InputSource::Content(file.content)))
      .collect();
    Self {
      entries,
      snapshots: BTreeSet::new(),
    }
  }

  /// Union of `sets`. The same path may appear more than once only if every
  /// occurrence has the same source.
  pub fn merge(sets: impl IntoIterator<Item = InputSet>) -> Result<Self, ProcessError> {
    let mut merged: BTreeMap<String, InputSource> = BTreeMap::new();
    let mut snapshots = BTreeSet::new();
    for set in sets {
      snapshots.extend(set.snapshots);
      for (path, source) in set.entries {
        match merged.get(&path) {
          Some(existing) if existing != &source => return Err(ProcessError::ConflictingInputs { path }),
          Some(_) => {}
          None => {
            merged.insert(path, source);
          }
        }
      }
    }
    Ok(Self {
      entries: merged,
      snapshots,
    })
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn get(&self, path: &str) -> Option<&InputSource> {
    self.entries.get(path)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// A digest over in-memory contents, workspace paths and the snapshots
  /// those paths were taken from.
  pub fn digest(&self) -> Fingerprint {
    let workspace = hash_bytes(
      self
        .snapshots
        .iter()
        .map(|digest| digest.0.as_str())
        .collect::<Vec<_>>()
        .join(",")
        .as_bytes(),
    );
    let fingerprints: Vec<(&str, Fingerprint)> = self
      .entries
      .iter()
      .map(|(path, source)| match source {
        InputSource::Workspace => (path.as_str(), workspace.clone()),
        InputSource::Content(bytes) => (path.as_str(), hash_bytes(bytes)),
      })
      .collect();
    fingerprint_entries(fingerprints.iter().map(|(path, fingerprint)| (*path, fingerprint)))
  }
}

/// A tool invocation, independent of the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Process {
  /// Arguments passed to the environment's entry point.
  pub argv: Vec<String>,
  pub description: String,
  pub input: InputSet,
  pub extra_env: BTreeMap<String, String>,
}

/// The outcome of a process that ran to completion, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
  pub exit_code: i32,
  pub stdout: String,
  pub stderr: String,
}

/// Runs processes in isolated environments.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
  async fn run(&self, environment: &Environment, process: &Process) -> Result<ProcessResult, ProcessError>;
}

/// Runs processes on the local machine inside a temporary sandbox directory.
///
/// The sandbox holds exactly the process inputs. The process starts with a
/// cleared environment: only a minimal isolated set plus the process's extra
/// variables are visible.
#[derive(Debug, Clone)]
pub struct LocalProcessRunner {
  build_root: PathBuf,
}

impl LocalProcessRunner {
  pub fn new(build_root: impl Into<PathBuf>) -> Self {
    Self {
      build_root: build_root.into(),
    }
  }

  async fn materialize(&self, input: &InputSet, sandbox: &Path) -> Result<(), ProcessError> {
    let sandbox_error = |path: &str, e: std::io::Error| ProcessError::Sandbox {
      message: format!("{}: {}", path, e),
    };

    for (path, source) in &input.entries {
      let dest = sandbox.join(path);
      if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
          .await
          .map_err(|e| sandbox_error(path, e))?;
      }
      match source {
        InputSource::Workspace => {
          tokio::fs::copy(self.build_root.join(path), &dest)
            .await
            .map_err(|e| sandbox_error(path, e))?;
        }
        InputSource::Content(bytes) => {
          tokio::fs::write(&dest, bytes).await.map_err(|e| sandbox_error(path, e))?;
        }
      }
    }
    Ok(())
  }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
  async fn run(&self, environment: &Environment, process: &Process) -> Result<ProcessResult, ProcessError> {
    let sandbox = tempfile::Builder::new()
      .prefix("keel-sandbox-")
      .tempdir()
      .map_err(|e| ProcessError::Sandbox { message: e.to_string() })?;
    self.materialize(&process.input, sandbox.path()).await?;

    let tmp_dir = sandbox.path().join(".tmp");
    tokio::fs::create_dir_all(&tmp_dir)
      .await
      .map_err(|e| ProcessError::Sandbox { message: e.to_string() })?;

    let argv = environment.argv(&process.argv);
    let (program, args) = argv.split_first().ok_or_else(|| ProcessError::Spawn {
      program: String::new(),
      message: "empty argv".to_string(),
    })?;

    info!(description = %process.description, inputs = process.input.len(), "running process");

    let mut command = Command::new(program);
    command
      .args(args)
      .current_dir(sandbox.path())
      .env_clear()
      .env("PATH", "/path-not-set")
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", &tmp_dir)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", "315532800")
      .envs(&process.extra_env);

    let output = command.output().await.map_err(|e| ProcessError::Spawn {
      program: program.clone(),
      message: e.to_string(),
    })?;

    // A signal-terminated process has no code.
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(description = %process.description, exit_code, "process finished");

    Ok(ProcessResult {
      exit_code,
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;

  fn content(path: &str, bytes: &str) -> FileContent {
    FileContent {
      path: path.to_string(),
      content: bytes.as_bytes().to_vec(),
    }
  }

  fn shell() -> Environment {
    Environment {
      name: "sh".to_string(),
      interpreter: PathBuf::from("/bin/sh"),
      interpreter_version: (0, 0),
      requirements: vec![],
      entry_point: None,
    }
  }

  #[test]
  fn merge_rejects_conflicting_content() {
    let a = InputSet::from_contents([content("__files.txt", "a.py")]);
    let b = InputSet::from_contents([content("__files.txt", "b.py")]);
    let same = InputSet::from_contents([content("__files.txt", "a.py")]);

    assert!(InputSet::merge([a.clone(), same]).is_ok());
    assert_eq!(
      InputSet::merge([a, b]).unwrap_err(),
      ProcessError::ConflictingInputs {
        path: "__files.txt".to_string()
      }
    );
  }

  #[test]
  fn digest_depends_on_contents() {
    let a = InputSet::from_contents([content("x", "1")]);
    let b = InputSet::from_contents([content("x", "2")]);
    assert_ne!(a.digest(), b.digest());
    assert_eq!(a.digest(), a.clone().digest());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn runs_in_sandbox_with_isolated_env() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("src")).unwrap();
    fs::write(root.path().join("src/app.py"), "print(1)").unwrap();

    let snapshot = Snapshot {
      digest: hash_bytes(b"snapshot"),
      files: vec!["src/app.py".to_string()],
    };
    let input = InputSet::merge([
      InputSet::from_snapshot(&snapshot),
      InputSet::from_contents([content("__files.txt", "src/app.py")]),
    ])
    .unwrap();

    let process = Process {
      argv: vec![
        "-c".to_string(),
        "read -r files < __files.txt; read -r app < src/app.py; echo \"$files|$app|$EXTRA|$HOME\"; exit 3".to_string(),
      ],
      description: "sandbox test".to_string(),
      input,
      extra_env: BTreeMap::from([("EXTRA".to_string(), "yes".to_string())]),
    };

    let result = LocalProcessRunner::new(root.path()).run(&shell(), &process).await.unwrap();
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "src/app.py|print(1)|yes|/homeless-shelter\n");
  }

  #[tokio::test]
  async fn spawn_failure_is_an_error() {
    let root = TempDir::new().unwrap();
    let mut env = shell();
    env.interpreter = PathBuf::from("/definitely/not/a/real/binary");
    let process = Process {
      argv: vec![],
      description: "missing".to_string(),
      input: InputSet::default(),
      extra_env: BTreeMap::new(),
    };
    let err = LocalProcessRunner::new(root.path()).run(&env, &process).await.unwrap_err();
    assert!(matches!(err, ProcessError::Spawn { .. }));
  }
}
