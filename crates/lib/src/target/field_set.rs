use crate::address::Address;
use crate::field::FieldType;

use super::{Target, TargetError};

/// The subset of a target's fields a rule operates on.
///
/// A field set applies to every target carrying all of its
/// [`FieldSet::REQUIRED_FIELDS`] (or specializations of them).
pub trait FieldSet: Sized + Send + Sync + 'static {
  const REQUIRED_FIELDS: &'static [FieldType];

  fn is_applicable(target: &Target) -> bool {
    target.has_fields(Self::REQUIRED_FIELDS)
  }

  fn create(target: &Target) -> Result<Self, TargetError>;

  fn address(&self) -> &Address;
}
