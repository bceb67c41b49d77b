//! Fields shared by every target type.

use std::fmt;

use super::{Field, FieldError, FieldType, PrimitiveField, RawValue, StringSequence, compute_value};
use crate::address::Address;
use crate::primitive_field;

primitive_field! {
  /// Arbitrary strings to describe a target, usable for filtering.
  pub struct Tags: StringSequence { alias: "tags" }
}

primitive_field! {
  /// A human-readable description of the target.
  pub struct Description: crate::field::Text { alias: "description" }
}

primitive_field! {
  /// Never cache results of running this target.
  pub struct NoCache: crate::field::Bool { alias: "no_cache", default: false }
}

/// Addresses of the targets this one depends on.
///
/// Entries are parsed relative to the owning target, so `:util` names a
/// sibling. The resolved addresses are sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependencies {
  value: Option<Vec<Address>>,
}

impl Dependencies {
  /// Shared parsing for `Dependencies` and its specializations.
  pub fn parse<F: Field>(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    let Some(specs) = compute_value::<F, StringSequence>(raw_value, address)? else {
      return Ok(Self { value: None });
    };

    let mut addresses = specs
      .iter()
      .map(|spec| Address::parse(spec, Some(address)).map_err(|e| FieldError::invalid(address, F::ALIAS, e.to_string())))
      .collect::<Result<Vec<_>, _>>()?;
    addresses.sort();
    addresses.dedup();
    Ok(Self { value: Some(addresses) })
  }

  /// The declared dependencies, empty when the field was left unset.
  pub fn addresses(&self) -> &[Address] {
    self.value.as_deref().unwrap_or_default()
  }
}

impl Field for Dependencies {
  const ALIAS: &'static str = "dependencies";

  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
    Self::parse::<Self>(raw_value, address)
  }
}

impl PrimitiveField for Dependencies {
  type Value = Option<Vec<Address>>;

  fn value(&self) -> &Self::Value {
    &self.value
  }
}

impl fmt::Display for Dependencies {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.value {
      Some(addresses) => {
        let rendered: Vec<String> = addresses.iter().map(ToString::to_string).collect();
        write!(f, "{}={:?}", Self::ALIAS, rendered)
      }
      None => write!(f, "{}=null", Self::ALIAS),
    }
  }
}

/// Fields every target type carries in addition to its own.
pub const COMMON_FIELDS: &[FieldType] = &[
  FieldType::of::<Tags>(),
  FieldType::of::<Description>(),
  FieldType::of::<NoCache>(),
];
