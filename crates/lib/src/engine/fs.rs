//! Glob expansion into content-addressed file sets.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::util::hash::{Fingerprint, fingerprint_entries, hash_file};

/// What to do when a glob matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobMatchErrorBehavior {
  Ignore,
  #[default]
  Warn,
  Error,
}

/// Whether every include glob must match, or only one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobExpansionConjunction {
  AllMatch,
  AnyMatch,
}

/// A request to expand globs relative to the build root.
///
/// Globs prefixed with `!` exclude matching paths from the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathGlobs {
  pub globs: Vec<String>,
  pub glob_match_error_behavior: GlobMatchErrorBehavior,
  pub conjunction: GlobExpansionConjunction,
  /// Names the source of the globs in unmatched-glob messages.
  pub description_of_origin: Option<String>,
}

impl PathGlobs {
  pub fn new(globs: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      globs: globs.into_iter().map(Into::into).collect(),
      glob_match_error_behavior: GlobMatchErrorBehavior::Ignore,
      conjunction: GlobExpansionConjunction::AllMatch,
      description_of_origin: None,
    }
  }

  pub fn with_match_behavior(mut self, behavior: GlobMatchErrorBehavior, origin: impl Into<String>) -> Self {
    self.glob_match_error_behavior = behavior;
    self.description_of_origin = Some(origin.into());
    self
  }

  pub fn with_conjunction(mut self, conjunction: GlobExpansionConjunction) -> Self {
    self.conjunction = conjunction;
    self
  }

  pub fn includes(&self) -> impl Iterator<Item = &str> {
    self.globs.iter().map(String::as_str).filter(|glob| !glob.starts_with('!'))
  }

  pub fn excludes(&self) -> impl Iterator<Item = &str> {
    self.globs.iter().filter_map(|glob| glob.strip_prefix('!'))
  }
}

/// An immutable set of files with a digest over their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot {
  pub digest: Fingerprint,
  /// Paths relative to the build root, sorted.
  pub files: Vec<String>,
}

impl Snapshot {
  pub fn empty() -> Self {
    Self {
      digest: fingerprint_entries([]),
      files: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

/// A file path plus its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileContent {
  pub path: String,
  pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobError {
  #[error("unmatched glob(s) from {origin}: {globs:?}")]
  Unmatched { origin: String, globs: Vec<String> },

  #[error("invalid glob `{glob}`: {message}")]
  Invalid { glob: String, message: String },

  #[error("glob `{0}` must be relative to the build root and may not contain `..`")]
  EscapesBuildRoot(String),

  #[error("failed to read {path}: {message}")]
  Io { path: String, message: String },
}

/// Resolves globs to file sets.
#[async_trait]
pub trait GlobExpander: Send + Sync {
  async fn expand(&self, globs: &PathGlobs) -> Result<Snapshot, GlobError>;

  /// Expand `globs` and read every matched file.
  async fn contents(&self, globs: &PathGlobs) -> Result<Vec<FileContent>, GlobError>;
}

/// Expands globs against a directory on the local disk.
///
/// Directories whose name starts with `.` are never descended into.
#[derive(Debug, Clone)]
pub struct LocalGlobExpander {
  build_root: PathBuf,
}

impl LocalGlobExpander {
  pub fn new(build_root: impl Into<PathBuf>) -> Self {
    Self {
      build_root: build_root.into(),
    }
  }

  pub fn build_root(&self) -> &Path {
    &self.build_root
  }
}

#[async_trait]
impl GlobExpander for LocalGlobExpander {
  async fn expand(&self, globs: &PathGlobs) -> Result<Snapshot, GlobError> {
    let root = self.build_root.clone();
    let globs = globs.clone();
    tokio::task::spawn_blocking(move || expand_blocking(&root, &globs))
      .await
      .map_err(|e| GlobError::Io {
        path: "<glob task>".to_string(),
        message: e.to_string(),
      })?
  }

  async fn contents(&self, globs: &PathGlobs) -> Result<Vec<FileContent>, GlobError> {
    let snapshot = self.expand(globs).await?;
    let mut contents = Vec::with_capacity(snapshot.files.len());
    for path in snapshot.files {
      let content = tokio::fs::read(self.build_root.join(&path))
        .await
        .map_err(|e| GlobError::Io {
          path: path.clone(),
          message: e.to_string(),
        })?;
      contents.push(FileContent { path, content });
    }
    Ok(contents)
  }
}

fn compile(glob: &str) -> Result<Pattern, GlobError> {
  let escapes = Path::new(glob)
    .components()
    .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
  if escapes {
    return Err(GlobError::EscapesBuildRoot(glob.to_string()));
  }
  Pattern::new(glob).map_err(|e| GlobError::Invalid {
    glob: glob.to_string(),
    message: e.to_string(),
  })
}

fn expand_blocking(root: &Path, globs: &PathGlobs) -> Result<Snapshot, GlobError> {
  let includes: Vec<(&str, Pattern)> = globs
    .includes()
    .map(|glob| compile(glob).map(|pattern| (glob, pattern)))
    .collect::<Result<_, _>>()?;
  let excludes: Vec<Pattern> = globs.excludes().map(compile).collect::<Result<_, _>>()?;

  let options = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
  };

  let mut matched = vec![false; includes.len()];
  let mut entries: Vec<(String, Fingerprint)> = Vec::new();

  if !includes.is_empty() {
    let walker = WalkDir::new(root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
      let entry = entry.map_err(|e| GlobError::Io {
        path: root.display().to_string(),
        message: e.to_string(),
      })?;
      if !entry.file_type().is_file() {
        continue;
      }
      let Ok(relative) = entry.path().strip_prefix(root) else {
        continue;
      };
      let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

      let mut included = false;
      for (i, (_, pattern)) in includes.iter().enumerate() {
        if pattern.matches_with(&relative, options) {
          matched[i] = true;
          included = true;
        }
      }
      if !included || excludes.iter().any(|pattern| pattern.matches_with(&relative, options)) {
        continue;
      }

      let fingerprint = hash_file(entry.path()).map_err(|e| GlobError::Io {
        path: e.path,
        message: e.message,
      })?;
      entries.push((relative, fingerprint));
    }
  }

  let unmatched: Vec<String> = match globs.conjunction {
    GlobExpansionConjunction::AllMatch => includes
      .iter()
      .zip(&matched)
      .filter(|(_, hit)| !**hit)
      .map(|((glob, _), _)| glob.to_string())
      .collect(),
    GlobExpansionConjunction::AnyMatch if matched.iter().any(|hit| *hit) => Vec::new(),
    GlobExpansionConjunction::AnyMatch => includes.iter().map(|(glob, _)| glob.to_string()).collect(),
  };

  if !unmatched.is_empty() {
    let origin = globs
      .description_of_origin
      .clone()
      .unwrap_or_else(|| "the build request".to_string());
    match globs.glob_match_error_behavior {
      GlobMatchErrorBehavior::Error => return Err(GlobError::Unmatched { origin, globs: unmatched }),
      GlobMatchErrorBehavior::Warn => warn!(origin = %origin, globs = ?unmatched, "unmatched globs"),
      GlobMatchErrorBehavior::Ignore => {}
    }
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));
  debug!(files = entries.len(), "expanded globs");
  let digest = fingerprint_entries(entries.iter().map(|(path, fingerprint)| (path.as_str(), fingerprint)));
  let files = entries.into_iter().map(|(path, _)| path).collect();
  Ok(Snapshot { digest, files })
}
