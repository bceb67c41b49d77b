//! Reusable value templates for primitive fields.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::{Field, FieldError, RawValue};
use crate::address::Address;

/// The validation rules of a primitive value shape.
pub trait ValueKind {
  type Value: Clone + fmt::Debug + Eq + Hash + Send + Sync + 'static;

  /// Human readable description used in type errors, e.g. `a string`.
  const EXPECTED_TYPE: &'static str;

  /// The validated value, or `None` when `raw` has the wrong shape.
  fn validate(raw: &RawValue) -> Option<Self::Value>;

  /// Render a validated value back to raw form.
  fn to_raw(value: &Self::Value) -> RawValue;
}

/// Shared hydration for primitive fields.
///
/// Absent or null raw values yield `Ok(None)` for optional fields and
/// [`FieldError::RequiredFieldMissing`] for required ones. Anything else must
/// validate as `K`.
pub fn compute_value<F: Field, K: ValueKind>(
  raw_value: Option<&RawValue>,
  address: &Address,
) -> Result<Option<K::Value>, FieldError> {
  match raw_value {
    None | Some(RawValue::Null) if F::REQUIRED => Err(FieldError::missing(address, F::ALIAS)),
    None | Some(RawValue::Null) => Ok(None),
    Some(raw) => K::validate(raw)
      .map(Some)
      .ok_or_else(|| FieldError::invalid_type(address, F::ALIAS, raw, K::EXPECTED_TYPE)),
  }
}

fn strings(items: &[RawValue]) -> Option<Vec<String>> {
  items.iter().map(|item| item.as_str().map(str::to_string)).collect()
}

pub struct Bool;

impl ValueKind for Bool {
  type Value = bool;
  const EXPECTED_TYPE: &'static str = "a boolean";

  fn validate(raw: &RawValue) -> Option<bool> {
    raw.as_bool()
  }

  fn to_raw(value: &bool) -> RawValue {
    RawValue::Bool(*value)
  }
}

pub struct Int;

impl ValueKind for Int {
  type Value = i64;
  const EXPECTED_TYPE: &'static str = "an integer";

  fn validate(raw: &RawValue) -> Option<i64> {
    match raw {
      RawValue::Number(n) if !n.is_f64() => n.as_i64(),
      _ => None,
    }
  }

  fn to_raw(value: &i64) -> RawValue {
    RawValue::from(*value)
  }
}

/// An `f64` compared and hashed by its bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct FloatValue(pub f64);

impl PartialEq for FloatValue {
  fn eq(&self, other: &Self) -> bool {
    self.0.to_bits() == other.0.to_bits()
  }
}

impl Eq for FloatValue {}

impl Hash for FloatValue {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.to_bits().hash(state);
  }
}

impl fmt::Display for FloatValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub struct Float;

impl ValueKind for Float {
  type Value = FloatValue;
  const EXPECTED_TYPE: &'static str = "a float";

  fn validate(raw: &RawValue) -> Option<FloatValue> {
    match raw {
      RawValue::Number(n) if n.is_f64() => n.as_f64().map(FloatValue),
      _ => None,
    }
  }

  fn to_raw(value: &FloatValue) -> RawValue {
    serde_json::Number::from_f64(value.0)
      .map(RawValue::Number)
      .unwrap_or(RawValue::Null)
  }
}

pub struct Text;

impl ValueKind for Text {
  type Value = String;
  const EXPECTED_TYPE: &'static str = "a string";

  fn validate(raw: &RawValue) -> Option<String> {
    raw.as_str().map(str::to_string)
  }

  fn to_raw(value: &String) -> RawValue {
    RawValue::String(value.clone())
  }
}

/// A sequence of strings. A bare string is rejected rather than being split
/// into characters.
pub struct StringSequence;

impl ValueKind for StringSequence {
  type Value = Vec<String>;
  const EXPECTED_TYPE: &'static str = "an iterable of strings (e.g. a list of strings)";

  fn validate(raw: &RawValue) -> Option<Vec<String>> {
    raw.as_array().and_then(|items| strings(items))
  }

  fn to_raw(value: &Vec<String>) -> RawValue {
    RawValue::from(value.clone())
  }
}

/// A string or a sequence of strings, normalized to a sequence.
pub struct StringOrStringSequence;

impl ValueKind for StringOrStringSequence {
  type Value = Vec<String>;
  const EXPECTED_TYPE: &'static str = "either a single string or an iterable of strings (e.g. a list of strings)";

  fn validate(raw: &RawValue) -> Option<Vec<String>> {
    match raw {
      RawValue::String(s) => Some(vec![s.clone()]),
      RawValue::Array(items) => strings(items),
      _ => None,
    }
  }

  fn to_raw(value: &Vec<String>) -> RawValue {
    RawValue::from(value.clone())
  }
}

/// A string to string mapping, stored sorted by key so that two declarations
/// differing only in key order are the same value.
pub struct DictStringToString;

impl ValueKind for DictStringToString {
  type Value = BTreeMap<String, String>;
  const EXPECTED_TYPE: &'static str = "a dictionary of string -> string";

  fn validate(raw: &RawValue) -> Option<Self::Value> {
    raw
      .as_object()?
      .iter()
      .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
      .collect()
  }

  fn to_raw(value: &Self::Value) -> RawValue {
    RawValue::Object(
      value
        .iter()
        .map(|(k, v)| (k.clone(), RawValue::String(v.clone())))
        .collect(),
    )
  }
}

/// Like [`DictStringToString`], with string sequence values. Keys are sorted.
pub struct DictStringToStringSequence;

impl ValueKind for DictStringToStringSequence {
  type Value = BTreeMap<String, Vec<String>>;
  const EXPECTED_TYPE: &'static str = "a dictionary of string -> an iterable of strings";

  fn validate(raw: &RawValue) -> Option<Self::Value> {
    raw
      .as_object()?
      .iter()
      .map(|(k, v)| StringSequence::validate(v).map(|v| (k.clone(), v)))
      .collect()
  }

  fn to_raw(value: &Self::Value) -> RawValue {
    RawValue::Object(
      value
        .iter()
        .map(|(k, v)| (k.clone(), RawValue::from(v.clone())))
        .collect(),
    )
  }
}

/// Declare a primitive field backed by a [`ValueKind`].
///
/// ```ignore
/// primitive_field! {
///   /// Free-form labels.
///   pub struct Tags: StringSequence { alias: "tags" }
/// }
/// primitive_field! {
///   pub struct NoCache: Bool { alias: "no_cache", default: false }
/// }
/// primitive_field! {
///   pub struct Handler: Text { alias: "handler", required }
/// }
/// ```
///
/// Optional fields without a default hold `Option<K::Value>`; the other two
/// forms hold `K::Value` directly.
#[macro_export]
macro_rules! primitive_field {
  (
    $(#[$meta:meta])*
    $vis:vis struct $name:ident : $kind:ty { alias: $alias:literal $(,)? }
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    $vis struct $name {
      value: Option<<$kind as $crate::field::ValueKind>::Value>,
    }

    impl $crate::field::Field for $name {
      const ALIAS: &'static str = $alias;

      fn from_raw(
        raw_value: Option<&$crate::field::RawValue>,
        address: &$crate::address::Address,
      ) -> Result<Self, $crate::field::FieldError> {
        Ok(Self {
          value: $crate::field::compute_value::<Self, $kind>(raw_value, address)?,
        })
      }
    }

    impl $crate::field::PrimitiveField for $name {
      type Value = Option<<$kind as $crate::field::ValueKind>::Value>;

      fn value(&self) -> &Self::Value {
        &self.value
      }
    }

    impl ::std::fmt::Display for $name {
      fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        match &self.value {
          Some(value) => write!(
            f,
            "{}={}",
            $alias,
            <$kind as $crate::field::ValueKind>::to_raw(value)
          ),
          None => write!(f, "{}=null", $alias),
        }
      }
    }
  };

  (
    $(#[$meta:meta])*
    $vis:vis struct $name:ident : $kind:ty { alias: $alias:literal, default: $default:expr $(,)? }
  ) => {
    $crate::primitive_field!(
      @present $(#[$meta])* $vis struct $name: $kind, $alias, false,
      |_address: &$crate::address::Address| Ok::<_, $crate::field::FieldError>($default)
    );
  };

  (
    $(#[$meta:meta])*
    $vis:vis struct $name:ident : $kind:ty { alias: $alias:literal, required $(,)? }
  ) => {
    $crate::primitive_field!(
      @present $(#[$meta])* $vis struct $name: $kind, $alias, true,
      |address: &$crate::address::Address| Err($crate::field::FieldError::missing(address, $alias))
    );
  };

  (
    @present $(#[$meta:meta])* $vis:vis struct $name:ident : $kind:ty, $alias:literal, $required:literal, $fallback:expr
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    $vis struct $name {
      value: <$kind as $crate::field::ValueKind>::Value,
    }

    impl $crate::field::Field for $name {
      const ALIAS: &'static str = $alias;
      const REQUIRED: bool = $required;

      fn from_raw(
        raw_value: Option<&$crate::field::RawValue>,
        address: &$crate::address::Address,
      ) -> Result<Self, $crate::field::FieldError> {
        let value = match $crate::field::compute_value::<Self, $kind>(raw_value, address)? {
          Some(value) => value,
          None => ($fallback)(address)?,
        };
        Ok(Self { value })
      }
    }

    impl $crate::field::PrimitiveField for $name {
      type Value = <$kind as $crate::field::ValueKind>::Value;

      fn value(&self) -> &Self::Value {
        &self.value
      }
    }

    impl ::std::fmt::Display for $name {
      fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(
          f,
          "{}={}",
          $alias,
          <$kind as $crate::field::ValueKind>::to_raw(&self.value)
        )
      }
    }
  };
}
