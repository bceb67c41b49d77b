//! The `sources` field and its hydration into a concrete file set.
//!
//! Constructing a [`Sources`] field only validates the declared globs.
//! Expanding them needs the file system, so it happens later through
//! [`hydrate_sources`], which is async and goes through a [`GlobExpander`].
//!
//! Specializations such as `PythonSources` wrap a [`Sources`] built with their
//! own default globs and extension allowlist. Hydrating the base view of a
//! specialized field therefore still applies the specialization's policy.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::address::Address;
use crate::engine::{GlobError, GlobExpander, GlobExpansionConjunction, GlobMatchErrorBehavior, PathGlobs, Snapshot};
use crate::field::{AsyncField, Field, FieldError, RawValue, StringSequence, compute_value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourcesError {
  #[error(transparent)]
  Glob(#[from] GlobError),

  #[error(transparent)]
  Field(#[from] FieldError),
}

/// Glob patterns naming the files that belong to a target, relative to the
/// target's directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sources {
  address: Address,
  globs: Option<Vec<String>>,
  default_globs: &'static [&'static str],
  expected_extensions: Option<&'static [&'static str]>,
}

impl Sources {
  /// Validate `raw_value` as the sources of a field of type `F`.
  ///
  /// Declared globs are sorted. When nothing is declared, hydration falls
  /// back to `default_globs`.
  pub fn sanitize<F: Field>(
    raw_value: Option<&RawValue>,
    address: &Address,
    default_globs: &'static [&'static str],
    expected_extensions: Option<&'static [&'static str]>,
  ) -> Result<Self, FieldError> {
    let globs = compute_value::<F, StringSequence>(raw_value, address)?.map(|mut globs| {
      globs.sort();
      globs
    });
    if globs.is_none() && F::REQUIRED {
      return Err(FieldError::missing(address, F::ALIAS));
    }
    Ok(Self {
      address: address.clone(),
      globs,
      default_globs,
      expected_extensions,
    })
  }

  /// The declared globs, `None` when the field was left unset.
  pub fn globs(&self) -> Option<&[String]> {
    self.globs.as_deref()
  }

  pub fn default_globs(&self) -> &'static [&'static str] {
    self.default_globs
  }

  pub fn expected_extensions(&self) -> Option<&'static [&'static str]> {
    self.expected_extensions
  }

  /// The globs to expand, rewritten relative to the build root, or `None` if
  /// there is nothing to expand.
  pub fn path_globs(&self, behavior: GlobMatchErrorBehavior) -> Option<PathGlobs> {
    let (globs, conjunction): (Vec<&str>, _) = match &self.globs {
      Some(globs) => (
        globs.iter().map(String::as_str).collect(),
        GlobExpansionConjunction::AllMatch,
      ),
      // Defaults only need to match something.
      None => (self.default_globs.to_vec(), GlobExpansionConjunction::AnyMatch),
    };
    if globs.is_empty() {
      return None;
    }
    let rewritten = globs
      .iter()
      .map(|glob| prefix_glob_with_address(glob, &self.address.spec_path));
    Some(
      PathGlobs::new(rewritten)
        .with_match_behavior(behavior, format!("{}'s `{}` field", self.address, Self::ALIAS))
        .with_conjunction(conjunction),
    )
  }

  /// Reject hydrated files whose extension is not allowed.
  pub fn validate_snapshot(&self, snapshot: &Snapshot) -> Result<(), FieldError> {
    let Some(extensions) = self.expected_extensions else {
      return Ok(());
    };
    let bad: Vec<&str> = snapshot
      .files
      .iter()
      .map(String::as_str)
      .filter(|file| !extensions.iter().any(|ext| file.ends_with(ext)))
      .collect();
    if bad.is_empty() {
      return Ok(());
    }
    Err(FieldError::invalid(
      &self.address,
      Self::ALIAS,
      format!("files must have one of the extensions {:?}, but got {:?}", extensions, bad),
    ))
  }
}

impl Field for Sources {
  const ALIAS: &'static str = "sources";

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    Self::sanitize::<Self>(raw_value, address, &[], None)
  }
}

impl AsyncField for Sources {
  type Sanitized = Option<Vec<String>>;

  fn address(&self) -> &Address {
    &self.address
  }

  fn sanitized_raw_value(&self) -> &Self::Sanitized {
    &self.globs
  }
}

impl fmt::Display for Sources {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.globs {
      Some(globs) => write!(f, "{}={:?}", Self::ALIAS, globs),
      None => write!(f, "{}=null", Self::ALIAS),
    }
  }
}

/// Make `glob` relative to the build root instead of to `spec_path`.
///
/// A leading `!` stays in front of the rewritten glob.
pub fn prefix_glob_with_address(glob: &str, spec_path: &str) -> String {
  let (negation, glob) = match glob.strip_prefix('!') {
    Some(rest) => ("!", rest),
    None => ("", glob),
  };
  if spec_path.is_empty() {
    format!("{}{}", negation, glob)
  } else {
    format!("{}{}/{}", negation, spec_path.trim_end_matches('/'), glob)
  }
}

/// The resolved files of a `sources` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HydratedSources {
  pub snapshot: Snapshot,
}

/// Expand `field`'s globs through `expander` and validate the result.
pub async fn hydrate_sources(
  field: &Sources,
  expander: &dyn GlobExpander,
  behavior: GlobMatchErrorBehavior,
) -> Result<HydratedSources, SourcesError> {
  let Some(path_globs) = field.path_globs(behavior) else {
    return Ok(HydratedSources {
      snapshot: Snapshot::empty(),
    });
  };
  let snapshot = expander.expand(&path_globs).await?;
  debug!(address = %field.address, files = snapshot.files.len(), "hydrated sources");
  field.validate_snapshot(&snapshot)?;
  Ok(HydratedSources { snapshot })
}
