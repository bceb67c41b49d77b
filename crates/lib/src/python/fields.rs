use std::any::{Any, TypeId};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::address::Address;
use crate::constraints::Constraint;
use crate::field::{
  AsyncField, DynField, Field, FieldError, FieldType, Int, PrimitiveField, RawValue, StringSequence, ValueKind,
  compute_value,
};
use crate::sources::Sources;

static REQUIREMENT: LazyLock<Result<Regex, regex::Error>> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(\[[A-Za-z0-9._,-]+\])?\s*([<>=!~;@ ].*)?$"));

const PYTHON_EXTENSIONS: &[&str] = &[".py", ".pyi"];

/// Implements [`Field`], [`AsyncField`] and `Display` for a newtype around a
/// sources field, viewing it as every field it specializes.
macro_rules! sources_specialization {
  ($name:ident, base: $base:ty, required: $required:literal, from_raw: |$raw:ident, $address:ident| $body:block) => {
    impl Field for $name {
      const ALIAS: &'static str = "sources";
      const REQUIRED: bool = $required;
      const BASES: &'static [FieldType] = &[FieldType::of::<$base>()];

      fn from_raw($raw: Option<&RawValue>, $address: &Address) -> Result<Self, FieldError> {
        let sources = $body;
        sources.map(Self)
      }

      fn upcast(&self, base: TypeId) -> Option<&dyn Any> {
        self.0.upcast_to(base)
      }
    }

    impl AsyncField for $name {
      type Sanitized = Option<Vec<String>>;

      fn address(&self) -> &Address {
        self.sources().address()
      }

      fn sanitized_raw_value(&self) -> &Self::Sanitized {
        self.sources().sanitized_raw_value()
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
      }
    }
  };
}

/// Python source files and type stubs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PythonSources(Sources);

impl PythonSources {
  pub const DEFAULT_GLOBS: &'static [&'static str] = &[
    "*.py",
    "*.pyi",
    "!test_*.py",
    "!*_test.py",
    "!tests.py",
    "!conftest.py",
  ];

  pub fn sources(&self) -> &Sources {
    &self.0
  }
}

sources_specialization!(PythonSources, base: Sources, required: false, from_raw: |raw, address| {
  Sources::sanitize::<PythonSources>(raw, address, PythonSources::DEFAULT_GLOBS, Some(PYTHON_EXTENSIONS))
});

/// Sources of a `python_tests` target. Defaults to test files only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PythonTestsSources(PythonSources);

impl PythonTestsSources {
  pub const DEFAULT_GLOBS: &'static [&'static str] = &["test_*.py", "*_test.py", "tests.py", "conftest.py"];

  pub fn sources(&self) -> &Sources {
    self.0.sources()
  }
}

sources_specialization!(PythonTestsSources, base: PythonSources, required: false, from_raw: |raw, address| {
  Sources::sanitize::<PythonTestsSources>(raw, address, PythonTestsSources::DEFAULT_GLOBS, Some(PYTHON_EXTENSIONS))
    .map(PythonSources)
});

/// Sources of a `files` target: loose files with no default, so they must be
/// listed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilesSources(Sources);

impl FilesSources {
  pub fn sources(&self) -> &Sources {
    &self.0
  }
}

sources_specialization!(FilesSources, base: Sources, required: true, from_raw: |raw, address| {
  Sources::sanitize::<FilesSources>(raw, address, &[], None)
});

/// The interpreters a target's code is compatible with, e.g. `CPython>=3.6`.
///
/// Entries are ORed. When unset, the `[python].interpreter_constraints` option
/// applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterpreterConstraintsField {
  value: Option<Vec<String>>,
}

impl InterpreterConstraintsField {
  pub fn value_or_global_default<'a>(&'a self, global_default: &'a [String]) -> &'a [String] {
    self.value.as_deref().unwrap_or(global_default)
  }
}

impl Field for InterpreterConstraintsField {
  const ALIAS: &'static str = "interpreter_constraints";

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    let value = compute_value::<Self, StringSequence>(raw_value, address)?;
    for constraint in value.iter().flatten() {
      Constraint::parse(constraint).map_err(|e| FieldError::invalid(address, Self::ALIAS, e.to_string()))?;
    }
    Ok(Self { value })
  }
}

impl PrimitiveField for InterpreterConstraintsField {
  type Value = Option<Vec<String>>;

  fn value(&self) -> &Self::Value {
    &self.value
  }
}

impl fmt::Display for InterpreterConstraintsField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.value {
      Some(value) => write!(f, "{}={}", Self::ALIAS, StringSequence::to_raw(value)),
      None => write!(f, "{}=null", Self::ALIAS),
    }
  }
}

/// Third-party requirement strings, e.g. `requests>=2.25`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PythonRequirementsField {
  value: Vec<String>,
}

impl Field for PythonRequirementsField {
  const ALIAS: &'static str = "requirements";
  const REQUIRED: bool = true;

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    let Some(value) = compute_value::<Self, StringSequence>(raw_value, address)? else {
      return Err(FieldError::missing(address, Self::ALIAS));
    };
    let pattern = REQUIREMENT
      .as_ref()
      .map_err(|e| FieldError::invalid(address, Self::ALIAS, e.to_string()))?;
    if let Some(bad) = value.iter().find(|requirement| !pattern.is_match(requirement.trim())) {
      return Err(FieldError::invalid(
        address,
        Self::ALIAS,
        format!("invalid requirement string `{}`", bad),
      ));
    }
    Ok(Self { value })
  }
}

impl PrimitiveField for PythonRequirementsField {
  type Value = Vec<String>;

  fn value(&self) -> &Self::Value {
    &self.value
  }
}

impl fmt::Display for PythonRequirementsField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={}", Self::ALIAS, StringSequence::to_raw(&self.value))
  }
}

/// Seconds a test may run before it is killed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timeout {
  value: Option<i64>,
}

impl Field for Timeout {
  const ALIAS: &'static str = "timeout";

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    let value = compute_value::<Self, Int>(raw_value, address)?;
    if let Some(seconds) = value
      && seconds <= 0
    {
      return Err(FieldError::invalid(
        address,
        Self::ALIAS,
        format!("the timeout must be greater than 0, but was {}", seconds),
      ));
    }
    Ok(Self { value })
  }
}

impl PrimitiveField for Timeout {
  type Value = Option<i64>;

  fn value(&self) -> &Self::Value {
    &self.value
  }
}

impl fmt::Display for Timeout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.value {
      Some(seconds) => write!(f, "{}={}", Self::ALIAS, seconds),
      None => write!(f, "{}=null", Self::ALIAS),
    }
  }
}
