//! Fields of the `python_awslambda` target type.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::address::Address;
use crate::field::{Dependencies, DynField, Field, FieldError, FieldType, PrimitiveField, RawValue, Text, compute_value};

static RUNTIME: LazyLock<Result<Regex, regex::Error>> =
  LazyLock::new(|| Regex::new(r"^python(?P<major>\d)\.(?P<minor>\d+)$"));

/// The entry point of the lambda, as `module:function`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handler {
  value: String,
}

impl Handler {
  /// The `module` part of `module:function`.
  pub fn module(&self) -> &str {
    self.value.split_once(':').map_or(self.value.as_str(), |(module, _)| module)
  }
}

impl Field for Handler {
  const ALIAS: &'static str = "handler";
  const REQUIRED: bool = true;

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    let Some(value) = compute_value::<Self, Text>(raw_value, address)? else {
      return Err(FieldError::missing(address, Self::ALIAS));
    };
    if !value.contains(':') {
      return Err(FieldError::invalid(
        address,
        Self::ALIAS,
        format!("the handler must be in the form `module:function`, but was `{}`", value),
      ));
    }
    Ok(Self { value })
  }
}

impl PrimitiveField for Handler {
  type Value = String;

  fn value(&self) -> &String {
    &self.value
  }
}

impl fmt::Display for Handler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={:?}", Self::ALIAS, self.value)
  }
}

/// The lambda runtime, e.g. `python3.8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Runtime {
  value: String,
  version: (u64, u64),
}

impl Runtime {
  /// The `(major, minor)` interpreter version of the runtime.
  pub fn to_interpreter_version(&self) -> (u64, u64) {
    self.version
  }
}

impl Field for Runtime {
  const ALIAS: &'static str = "runtime";
  const REQUIRED: bool = true;

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    let Some(value) = compute_value::<Self, Text>(raw_value, address)? else {
      return Err(FieldError::missing(address, Self::ALIAS));
    };
    let invalid = || {
      FieldError::invalid(
        address,
        Self::ALIAS,
        format!("the runtime must be of the form `pythonX.Y`, but was `{}`", value),
      )
    };
    let pattern = RUNTIME.as_ref().map_err(|_| invalid())?;
    let captures = pattern.captures(&value).ok_or_else(invalid)?;
    let major = captures["major"].parse().map_err(|_| invalid())?;
    let minor = captures["minor"].parse().map_err(|_| invalid())?;
    Ok(Self {
      version: (major, minor),
      value,
    })
  }
}

impl PrimitiveField for Runtime {
  type Value = String;

  fn value(&self) -> &String {
    &self.value
  }
}

impl fmt::Display for Runtime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={:?}", Self::ALIAS, self.value)
  }
}

/// Dependencies of a lambda. Parsed like [`Dependencies`], which it stands in for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LambdaDependencies(Dependencies);

impl LambdaDependencies {
  pub fn addresses(&self) -> &[Address] {
    self.0.addresses()
  }
}

impl Field for LambdaDependencies {
  const ALIAS: &'static str = "dependencies";
  const BASES: &'static [FieldType] = &[FieldType::of::<Dependencies>()];

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    Dependencies::parse::<Self>(raw_value, address).map(Self)
  }

  fn upcast(&self, base: TypeId) -> Option<&dyn Any> {
    self.0.upcast_to(base)
  }
}

impl fmt::Display for LambdaDependencies {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}
