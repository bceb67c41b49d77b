//! Targets: addressable nodes built from a set of fields.
//!
//! A [`TargetType`] is a static descriptor naming the fields a kind of node
//! carries. A [`Target`] is one constructed node: its address plus one
//! validated instance of every field its type declares, including fields
//! contributed by plugins through a frozen [`PluginFields`] registry.
//!
//! Field lookups are specialization aware. A target whose type registers
//! `PythonSources` answers `get::<Sources>()` with the `PythonSources`
//! instance, so code written against a base field works on every target that
//! carries some specialization of it.

mod field_set;
mod plugin;

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::address::Address;
use crate::field::{COMMON_FIELDS, DynField, Field, FieldError, FieldType, RawValue};

pub use field_set::FieldSet;
pub use plugin::{PluginFieldRegistry, PluginFields};

/// Errors raised by target lookups and target type registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
  #[error(transparent)]
  Field(#[from] FieldError),

  /// Index-style lookup of a field the target does not carry.
  #[error("the target {address} of type `{target_type}` does not have a field `{field}`")]
  MissingField {
    address: Address,
    target_type: String,
    field: String,
  },

  /// Two fields of one target type share an alias.
  #[error("target type `{target_type}` declares the field alias `{alias}` more than once")]
  DuplicateFieldAlias { target_type: String, alias: String },

  #[error("target type `{0}` is registered more than once")]
  DuplicateTargetType(String),

  #[error("unknown target type `{alias}`; registered types: {known:?}")]
  UnknownTargetType { alias: String, known: Vec<String> },
}

/// A static descriptor of a kind of target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetType {
  /// The name used in build files, e.g. `python_library`.
  pub alias: &'static str,
  /// Fields specific to this type. [`COMMON_FIELDS`] are always added.
  pub core_fields: &'static [FieldType],
  pub help: &'static str,
}

impl TargetType {
  /// Every field type a target of this type carries: the common fields, the
  /// core fields, then fields contributed by plugins, without repeats.
  pub fn class_field_types(&self, plugins: &PluginFields) -> Vec<FieldType> {
    let mut types: IndexSet<FieldType> = IndexSet::new();
    types.extend(COMMON_FIELDS.iter().copied());
    types.extend(self.core_fields.iter().copied());
    types.extend(plugins.for_target_type(self.alias).iter().copied());
    types.into_iter().collect()
  }

  /// Whether targets of this type carry `requested` or a specialization of it.
  pub fn class_has_field(&self, requested: FieldType, plugins: &PluginFields) -> bool {
    self
      .class_field_types(plugins)
      .iter()
      .any(|ty| ty.satisfies(requested.id()))
  }

  pub fn class_has_fields(&self, requested: &[FieldType], plugins: &PluginFields) -> bool {
    requested.iter().all(|ty| self.class_has_field(*ty, plugins))
  }
}

/// A constructed, immutable build graph node.
pub struct Target {
  target_type: TargetType,
  address: Address,
  fields: IndexMap<TypeId, Box<dyn DynField>>,
}

impl Target {
  /// Build a target from the raw attribute values declared for it.
  ///
  /// Every key of `raw_values` must be the alias of one of the type's
  /// fields. Fields without a declared value are constructed from an absent
  /// raw value, which applies their default or fails if they are required.
  pub fn new(
    target_type: TargetType,
    raw_values: &IndexMap<String, RawValue>,
    address: Address,
    plugins: &PluginFields,
  ) -> Result<Self, FieldError> {
    let field_types = target_type.class_field_types(plugins);

    for (alias, raw_value) in raw_values {
      if !field_types.iter().any(|ty| ty.alias() == alias) {
        let mut valid_aliases: Vec<String> = field_types.iter().map(|ty| ty.alias().to_string()).collect();
        valid_aliases.sort();
        return Err(FieldError::UnrecognizedField {
          address,
          alias: alias.clone(),
          raw_value: raw_value.to_string(),
          target_type: target_type.alias.to_string(),
          valid_aliases,
        });
      }
    }

    let mut fields = IndexMap::with_capacity(field_types.len());
    for ty in field_types {
      let field = ty.construct(raw_values.get(ty.alias()), &address)?;
      fields.insert(ty.id(), field);
    }

    Ok(Self {
      target_type,
      address,
      fields,
    })
  }

  pub fn address(&self) -> &Address {
    &self.address
  }

  pub fn target_type(&self) -> TargetType {
    self.target_type
  }

  pub fn alias(&self) -> &'static str {
    self.target_type.alias
  }

  /// The registered field types, in declaration order.
  pub fn field_types(&self) -> impl Iterator<Item = FieldType> + '_ {
    self.fields.values().map(|field| field.field_type())
  }

  /// The field registered exactly as `F`. Specializations are not considered.
  pub fn get_exact<F: Field>(&self) -> Option<&F> {
    self
      .fields
      .get(&TypeId::of::<F>())
      .and_then(|field| field.as_any().downcast_ref::<F>())
  }

  /// `F`, or the first registered specialization of `F`.
  pub fn lookup<F: Field>(&self) -> Option<&F> {
    if let Some(exact) = self.get_exact::<F>() {
      return Some(exact);
    }
    let requested = TypeId::of::<F>();
    self
      .fields
      .values()
      .filter(|field| field.field_type().is_strict_subtype_of(requested))
      .find_map(|field| field.upcast_to(requested))
      .and_then(|any| any.downcast_ref::<F>())
  }

  /// Like [`Target::lookup`], but when the target carries no matching field a
  /// fresh `F` is built from `default_raw_value` instead.
  pub fn get<F: Field>(&self, default_raw_value: Option<&RawValue>) -> Result<Cow<'_, F>, FieldError> {
    match self.lookup::<F>() {
      Some(field) => Ok(Cow::Borrowed(field)),
      None => F::from_raw(default_raw_value, &self.address).map(Cow::Owned),
    }
  }

  /// Index-style access: `F` or a specialization of it, or an error.
  pub fn require<F: Field>(&self) -> Result<&F, TargetError> {
    self.lookup::<F>().ok_or_else(|| TargetError::MissingField {
      address: self.address.clone(),
      target_type: self.target_type.alias.to_string(),
      field: F::ALIAS.to_string(),
    })
  }

  pub fn has_field<F: Field>(&self) -> bool {
    self.has_field_type(FieldType::of::<F>())
  }

  pub fn has_field_type(&self, requested: FieldType) -> bool {
    let requested = requested.id();
    self.fields.contains_key(&requested)
      || self
        .fields
        .values()
        .any(|field| field.field_type().is_strict_subtype_of(requested))
  }

  pub fn has_fields(&self, requested: &[FieldType]) -> bool {
    requested.iter().all(|ty| self.has_field_type(*ty))
  }
}

impl PartialEq for Target {
  fn eq(&self, other: &Self) -> bool {
    self.target_type == other.target_type
      && self.address == other.address
      && self.fields.len() == other.fields.len()
      && self
        .fields
        .iter()
        .all(|(id, field)| other.fields.get(id).is_some_and(|theirs| field.as_ref() == theirs.as_ref()))
  }
}

impl Eq for Target {}

impl Hash for Target {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.target_type.alias.hash(state);
    self.address.hash(state);
    for field in self.fields.values() {
      field.as_ref().hash(state);
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}(address=\"{}\"", self.target_type.alias, self.address)?;
    for field in self.fields.values() {
      write!(f, ", {}", field)?;
    }
    write!(f, ")")
  }
}

impl fmt::Debug for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Target")
      .field("alias", &self.target_type.alias)
      .field("address", &self.address)
      .field("fields", &self.fields.values().collect::<Vec<_>>())
      .finish()
  }
}

/// All target types known to a build, keyed and ordered by alias.
#[derive(Debug, Clone, Default)]
pub struct RegisteredTargetTypes {
  types: BTreeMap<&'static str, TargetType>,
  plugins: PluginFields,
}

impl RegisteredTargetTypes {
  /// Register `types` together with the frozen plugin fields.
  ///
  /// Fails if two types share an alias, or if any type ends up with two
  /// fields under the same alias once plugin fields are added.
  pub fn new(types: impl IntoIterator<Item = TargetType>, plugins: PluginFields) -> Result<Self, TargetError> {
    let mut registered = BTreeMap::new();
    for target_type in types {
      let mut aliases = IndexSet::new();
      for ty in target_type.class_field_types(&plugins) {
        if !aliases.insert(ty.alias()) {
          return Err(TargetError::DuplicateFieldAlias {
            target_type: target_type.alias.to_string(),
            alias: ty.alias().to_string(),
          });
        }
      }
      if registered.insert(target_type.alias, target_type).is_some() {
        return Err(TargetError::DuplicateTargetType(target_type.alias.to_string()));
      }
    }
    Ok(Self {
      types: registered,
      plugins,
    })
  }

  pub fn get(&self, alias: &str) -> Result<TargetType, TargetError> {
    self
      .types
      .get(alias)
      .copied()
      .ok_or_else(|| TargetError::UnknownTargetType {
        alias: alias.to_string(),
        known: self.aliases().map(str::to_string).collect(),
      })
  }

  pub fn aliases(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.types.keys().copied()
  }

  pub fn types(&self) -> impl Iterator<Item = TargetType> + '_ {
    self.types.values().copied()
  }

  pub fn plugins(&self) -> &PluginFields {
    &self.plugins
  }

  /// Construct a target of the registered type `alias`.
  pub fn construct(
    &self,
    alias: &str,
    raw_values: &IndexMap<String, RawValue>,
    address: Address,
  ) -> Result<Target, TargetError> {
    let target_type = self.get(alias)?;
    Ok(Target::new(target_type, raw_values, address, &self.plugins)?)
  }
}
