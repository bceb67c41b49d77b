//! Plugin-contributed fields.
//!
//! Plugins extend existing target types with extra fields during a
//! registration phase. Once every plugin has registered, the registry is
//! frozen into [`PluginFields`], which target construction reads from.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::field::FieldType;

/// Mutable registry used while plugins load.
#[derive(Debug, Default)]
pub struct PluginFieldRegistry {
  fields: IndexMap<&'static str, IndexSet<FieldType>>,
}

impl PluginFieldRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add `field` to every target of type `target_alias`. Registering the same
  /// field twice is a no-op.
  pub fn register(&mut self, target_alias: &'static str, field: FieldType) -> &mut Self {
    debug!(target_type = target_alias, field = field.alias(), "registering plugin field");
    self.fields.entry(target_alias).or_default().insert(field);
    self
  }

  pub fn freeze(self) -> PluginFields {
    let fields = self
      .fields
      .into_iter()
      .map(|(alias, fields)| (alias, fields.into_iter().collect()))
      .collect();
    PluginFields {
      fields: Arc::new(fields),
    }
  }
}

/// The frozen, shareable view of every plugin field.
#[derive(Debug, Clone, Default)]
pub struct PluginFields {
  fields: Arc<IndexMap<&'static str, Vec<FieldType>>>,
}

impl PluginFields {
  /// Extra fields for the target type `target_alias`, in registration order.
  pub fn for_target_type(&self, target_alias: &str) -> &[FieldType] {
    self.fields.get(target_alias).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }
}
