use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::TypecheckError;
use super::mypy::MyPyFieldSet;
use crate::address::Address;
use crate::config::{MyPyOptions, PythonOptions};
use crate::constraints::InterpreterConstraints;
use crate::graph::BuildGraph;
use crate::target::Target;

/// Field sets that share interpreter constraints and are checked in one MyPy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MyPyPartition {
  pub field_sets: Vec<MyPyFieldSet>,
  /// The union of every root's transitive closure, sorted by address.
  pub closure: Vec<Arc<Target>>,
  pub interpreter_constraints: InterpreterConstraints,
  /// Whether the user pinned the Python version, so it must not be derived.
  pub python_version_already_configured: bool,
}

impl MyPyPartition {
  /// The label used for this partition in reports.
  pub fn description(&self) -> String {
    self.interpreter_constraints.to_string()
  }
}

/// Group `field_sets` by the interpreter constraints of their closures.
///
/// A closure that declares no constraints at all falls back to MyPy's own
/// `interpreter_constraints`. Partitions come out sorted by constraints.
pub fn partition_field_sets(
  field_sets: &[MyPyFieldSet],
  graph: &BuildGraph,
  python: &PythonOptions,
  mypy: &MyPyOptions,
  python_version_already_configured: bool,
) -> Result<Vec<MyPyPartition>, TypecheckError> {
  let fallback = InterpreterConstraints::parse(&mypy.interpreter_constraints)?;

  let mut groups: BTreeMap<InterpreterConstraints, (Vec<MyPyFieldSet>, IndexMap<Address, Arc<Target>>)> =
    BTreeMap::new();
  for field_set in field_sets {
    let transitive = graph.transitive_targets(std::slice::from_ref(&field_set.address))?;
    let constraints = InterpreterConstraints::create_from_targets(
      transitive.closure.iter().map(|target| target.as_ref()),
      &python.interpreter_constraints,
    )?
    .unwrap_or_else(|| fallback.clone());

    let (roots, closure) = groups.entry(constraints).or_default();
    roots.push(field_set.clone());
    for target in transitive.closure {
      closure.entry(target.address().clone()).or_insert(target);
    }
  }

  let partitions: Vec<MyPyPartition> = groups
    .into_iter()
    .map(|(interpreter_constraints, (field_sets, mut closure))| {
      closure.sort_keys();
      MyPyPartition {
        field_sets,
        closure: closure.into_values().collect(),
        interpreter_constraints,
        python_version_already_configured,
      }
    })
    .collect();
  debug!(partitions = partitions.len(), field_sets = field_sets.len(), "partitioned field sets");
  Ok(partitions)
}
