//! Typed, validated target attributes.
//!
//! A [`Field`] turns the raw value declared in a build file into a validated,
//! immutable value. Every field type implements exactly one hydration entry
//! point, [`Field::from_raw`], and picks one of two strategies:
//!
//! - [`PrimitiveField`]: the value is fully computed at construction time.
//! - [`AsyncField`]: construction only sanitizes the raw value; turning it into
//!   its final form needs an external, suspending step (see [`crate::sources`]).
//!
//! Fields are `Clone + Eq + Hash`: targets, closures and partitions are
//! deduplicated by structural equality, so every resolved value has to be
//! hashable. The trait bounds make a field that breaks this fail to compile.
//!
//! # Specialization
//!
//! A field type may declare [`Field::BASES`], the field types it stands in
//! for. A target that registers the specialized field then answers lookups for
//! the base field with the specialized instance (through [`Field::upcast`]),
//! so generic code written against the base keeps working.

mod common;
mod kinds;

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

use crate::address::Address;

pub use common::{COMMON_FIELDS, Dependencies, Description, NoCache, Tags};
pub use kinds::{
  Bool, DictStringToString, DictStringToStringSequence, Float, FloatValue, Int, StringOrStringSequence,
  StringSequence, Text, ValueKind, compute_value,
};

/// A raw, unvalidated attribute value as declared in a build file.
pub type RawValue = serde_json::Value;

/// Schema errors raised while constructing fields and targets.
///
/// These abort construction of the offending target and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
  /// A declared attribute does not belong to the target type.
  #[error(
    "unrecognized field `{alias}={raw_value}` in target {address}. Valid fields for the target type `{target_type}`: {valid_aliases:?}"
  )]
  UnrecognizedField {
    address: Address,
    alias: String,
    raw_value: String,
    target_type: String,
    valid_aliases: Vec<String>,
  },

  /// The value does not have the shape the field expects.
  #[error("the `{alias}` field in target {address} must be {expected_type}, but was `{raw_value}` with type `{raw_type}`")]
  InvalidFieldType {
    address: Address,
    alias: String,
    raw_value: String,
    raw_type: String,
    expected_type: String,
  },

  /// A required field was not declared.
  #[error("the `{alias}` field in target {address} must be defined")]
  RequiredFieldMissing { address: Address, alias: String },

  /// The value has the right type but fails a field-specific check.
  #[error("invalid `{alias}` field in target {address}: {message}")]
  InvalidField {
    address: Address,
    alias: String,
    message: String,
  },
}

impl FieldError {
  pub fn invalid_type(address: &Address, alias: &str, raw_value: &RawValue, expected_type: &str) -> Self {
    FieldError::InvalidFieldType {
      address: address.clone(),
      alias: alias.to_string(),
      raw_value: raw_value.to_string(),
      raw_type: raw_type_name(raw_value).to_string(),
      expected_type: expected_type.to_string(),
    }
  }

  pub fn invalid(address: &Address, alias: &str, message: impl Into<String>) -> Self {
    FieldError::InvalidField {
      address: address.clone(),
      alias: alias.to_string(),
      message: message.into(),
    }
  }

  pub fn missing(address: &Address, alias: &str) -> Self {
    FieldError::RequiredFieldMissing {
      address: address.clone(),
      alias: alias.to_string(),
    }
  }
}

fn raw_type_name(raw_value: &RawValue) -> &'static str {
  match raw_value {
    RawValue::Null => "null",
    RawValue::Bool(_) => "bool",
    RawValue::Number(n) if n.is_f64() => "float",
    RawValue::Number(_) => "int",
    RawValue::String(_) => "string",
    RawValue::Array(_) => "list",
    RawValue::Object(_) => "dict",
  }
}

/// A single typed attribute of a target.
pub trait Field: Any + Clone + fmt::Debug + fmt::Display + Eq + Hash + Send + Sync {
  /// The attribute key used in build files. Unique within a target type.
  const ALIAS: &'static str;

  /// Whether omitting the attribute is a schema error.
  const REQUIRED: bool = false;

  /// Field types this one specializes, nearest first.
  const BASES: &'static [FieldType] = &[];

  /// Validate `raw_value` and build the field.
  ///
  /// `None` (or an explicit null) means the attribute was not declared: a
  /// required field fails with [`FieldError::RequiredFieldMissing`], an
  /// optional one falls back to its default.
  fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError>;

  /// View this instance as one of its [`Field::BASES`].
  fn upcast(&self, _base: TypeId) -> Option<&dyn Any> {
    None
  }
}

/// A field whose value is computed synchronously from the raw value.
pub trait PrimitiveField: Field {
  type Value: Clone + fmt::Debug + Eq + Hash + Send + Sync;

  fn value(&self) -> &Self::Value;
}

/// A field whose final value needs an external resolution step.
///
/// Construction stores the owning address and a sanitized, hashable copy of
/// the raw value; resolving it is left to a companion request.
pub trait AsyncField: Field {
  type Sanitized: Clone + fmt::Debug + Eq + Hash + Send + Sync;

  fn address(&self) -> &Address;

  fn sanitized_raw_value(&self) -> &Self::Sanitized;
}

/// Object-safe view over any [`Field`], used to store heterogeneous fields.
pub trait DynField: fmt::Debug + fmt::Display + Send + Sync {
  fn field_type(&self) -> FieldType;

  fn as_any(&self) -> &dyn Any;

  /// This instance viewed as `target`, if it is that field type or specializes it.
  fn upcast_to(&self, target: TypeId) -> Option<&dyn Any>;

  fn dyn_eq(&self, other: &dyn DynField) -> bool;

  fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<F: Field> DynField for F {
  fn field_type(&self) -> FieldType {
    FieldType::of::<F>()
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn upcast_to(&self, target: TypeId) -> Option<&dyn Any> {
    if target == TypeId::of::<F>() {
      Some(self)
    } else {
      self.upcast(target)
    }
  }

  fn dyn_eq(&self, other: &dyn DynField) -> bool {
    other.as_any().downcast_ref::<F>().is_some_and(|other| other == self)
  }

  fn dyn_hash(&self, mut state: &mut dyn Hasher) {
    TypeId::of::<F>().hash(&mut state);
    self.hash(&mut state);
  }
}

impl PartialEq for dyn DynField + '_ {
  fn eq(&self, other: &Self) -> bool {
    self.dyn_eq(other)
  }
}

impl Eq for dyn DynField + '_ {}

impl Hash for dyn DynField + '_ {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.dyn_hash(state);
  }
}

fn type_id_of<F: Any>() -> TypeId {
  TypeId::of::<F>()
}

fn type_name_of<F: Any>() -> &'static str {
  std::any::type_name::<F>()
}

type Constructor = fn(Option<&RawValue>, &Address) -> Result<Box<dyn DynField>, FieldError>;

fn construct<F: Field>(raw_value: Option<&RawValue>, address: &Address) -> Result<Box<dyn DynField>, FieldError> {
  Ok(Box::new(F::from_raw(raw_value, address)?))
}

/// A runtime descriptor of a field type.
///
/// Target types list their fields as `FieldType`s; the descriptor carries
/// everything needed to match aliases, walk specializations and construct
/// instances without knowing the concrete type.
#[derive(Clone, Copy)]
pub struct FieldType {
  id: fn() -> TypeId,
  type_name: fn() -> &'static str,
  alias: &'static str,
  required: bool,
  bases: &'static [FieldType],
  construct: Constructor,
}

impl FieldType {
  pub const fn of<F: Field>() -> Self {
    Self {
      id: type_id_of::<F>,
      type_name: type_name_of::<F>,
      alias: F::ALIAS,
      required: F::REQUIRED,
      bases: F::BASES,
      construct: construct::<F>,
    }
  }

  pub fn id(&self) -> TypeId {
    (self.id)()
  }

  pub fn alias(&self) -> &'static str {
    self.alias
  }

  pub fn required(&self) -> bool {
    self.required
  }

  /// The unqualified Rust type name, e.g. `PythonSources`.
  pub fn name(&self) -> &'static str {
    let full = (self.type_name)();
    full.rsplit("::").next().unwrap_or(full)
  }

  pub fn bases(&self) -> &'static [FieldType] {
    self.bases
  }

  /// Whether this type specializes `base`, directly or transitively. A type
  /// is not its own subtype.
  pub fn is_strict_subtype_of(&self, base: TypeId) -> bool {
    self
      .bases
      .iter()
      .any(|parent| parent.id() == base || parent.is_strict_subtype_of(base))
  }

  /// Whether an instance of this type can answer for `requested`.
  pub fn satisfies(&self, requested: TypeId) -> bool {
    self.id() == requested || self.is_strict_subtype_of(requested)
  }

  pub fn construct(&self, raw_value: Option<&RawValue>, address: &Address) -> Result<Box<dyn DynField>, FieldError> {
    (self.construct)(raw_value, address)
  }
}

impl PartialEq for FieldType {
  fn eq(&self, other: &Self) -> bool {
    self.id() == other.id()
  }
}

impl Eq for FieldType {}

impl Hash for FieldType {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id().hash(state);
  }
}

impl fmt::Debug for FieldType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.name(), self.alias)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::primitive_field;

  primitive_field! {
    struct Color: Text { alias: "color" }
  }

  primitive_field! {
    struct Shade: Text { alias: "shade", required }
  }

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  struct DarkColor(Color);

  impl fmt::Display for DarkColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.0.fmt(f)
    }
  }

  impl Field for DarkColor {
    const ALIAS: &'static str = "color";
    const BASES: &'static [FieldType] = &[FieldType::of::<Color>()];

    fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
      Color::from_raw(raw_value, address).map(Self)
    }

    fn upcast(&self, base: TypeId) -> Option<&dyn Any> {
      self.0.upcast_to(base)
    }
  }

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  struct DarkestColor(DarkColor);

  impl fmt::Display for DarkestColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.0.fmt(f)
    }
  }

  impl Field for DarkestColor {
    const ALIAS: &'static str = "color";
    const BASES: &'static [FieldType] = &[FieldType::of::<DarkColor>()];

    fn from_raw(raw_value: Option<&RawValue>, address: &Address) -> Result<Self, FieldError> {
      DarkColor::from_raw(raw_value, address).map(Self)
    }

    fn upcast(&self, base: TypeId) -> Option<&dyn Any> {
      self.0.upcast_to(base)
    }
  }

  fn address() -> Address {
    Address::new("src", "tgt")
  }

  #[test]
  fn field_type_descriptor() {
    let ty = FieldType::of::<Shade>();
    assert_eq!(ty.alias(), "shade");
    assert_eq!(ty.name(), "Shade");
    assert!(ty.required());
    assert_eq!(ty, FieldType::of::<Shade>());
    assert_ne!(ty, FieldType::of::<Color>());
  }

  #[test]
  fn subtyping_is_strict_and_transitive() {
    let color = TypeId::of::<Color>();
    let darkest = FieldType::of::<DarkestColor>();
    assert!(darkest.is_strict_subtype_of(color));
    assert!(darkest.is_strict_subtype_of(TypeId::of::<DarkColor>()));
    assert!(!darkest.is_strict_subtype_of(TypeId::of::<DarkestColor>()));
    assert!(darkest.satisfies(TypeId::of::<DarkestColor>()));
    assert!(!FieldType::of::<Color>().satisfies(TypeId::of::<DarkColor>()));
  }

  #[test]
  fn upcast_reaches_transitive_base() {
    let field = DarkestColor::from_raw(Some(&json!("navy")), &address()).unwrap();
    let base = field
      .upcast_to(TypeId::of::<Color>())
      .and_then(|any| any.downcast_ref::<Color>())
      .unwrap();
    assert_eq!(base.value().as_deref(), Some("navy"));
    assert!(field.upcast_to(TypeId::of::<Shade>()).is_none());
  }

  #[test]
  fn dyn_equality_and_hash_are_structural() {
    use std::collections::hash_map::DefaultHasher;

    let a: Box<dyn DynField> = FieldType::of::<Color>().construct(Some(&json!("red")), &address()).unwrap();
    let b: Box<dyn DynField> = FieldType::of::<Color>().construct(Some(&json!("red")), &address()).unwrap();
    let c: Box<dyn DynField> = FieldType::of::<Color>().construct(Some(&json!("blue")), &address()).unwrap();
    assert!(a.as_ref() == b.as_ref());
    assert!(a.as_ref() != c.as_ref());

    let hash = |field: &dyn DynField| {
      let mut hasher = DefaultHasher::new();
      field.hash(&mut hasher);
      hasher.finish()
    };
    assert_eq!(hash(a.as_ref()), hash(b.as_ref()));
  }

  #[test]
  fn required_field_missing() {
    let err = Shade::from_raw(None, &address()).unwrap_err();
    assert_eq!(err, FieldError::missing(&address(), "shade"));
    assert_eq!(err.to_string(), "the `shade` field in target src:tgt must be defined");
  }

  #[test]
  fn invalid_type_message_names_the_raw_value() {
    let err = Color::from_raw(Some(&json!(3)), &address()).unwrap_err();
    assert_eq!(
      err.to_string(),
      "the `color` field in target src:tgt must be a string, but was `3` with type `int`"
    );
  }
}
