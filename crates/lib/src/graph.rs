//! The in-memory build graph and transitive closures over it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use thiserror::Error;
use tracing::debug;

use crate::address::{Address, AddressSpec};
use crate::field::Dependencies;
use crate::target::Target;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("no target found at address {0}")]
  UnknownAddress(Address),

  #[error("target {dependent} depends on {dependency}, which does not exist")]
  UnknownDependency { dependent: Address, dependency: Address },

  #[error("no targets match the address spec `{0}`")]
  NoMatches(String),

  #[error("target {0} is declared more than once")]
  DuplicateTarget(Address),
}

/// A set of root targets plus everything they transitively depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitiveTargets {
  pub roots: Vec<Arc<Target>>,
  /// Every reachable target exactly once, roots included.
  pub closure: Vec<Arc<Target>>,
}

impl TransitiveTargets {
  pub fn contains(&self, address: &Address) -> bool {
    self.closure.iter().any(|target| target.address() == address)
  }
}

/// Every target of a build, with edges from each target to its dependencies.
///
/// Construction checks that every declared dependency exists, so traversals
/// never meet a dangling address. Cycles are allowed.
pub struct BuildGraph {
  graph: DiGraph<Arc<Target>, ()>,
  nodes: HashMap<Address, NodeIndex>,
  /// Addresses in sorted order, for deterministic spec resolution.
  addresses: BTreeMap<Address, NodeIndex>,
}

impl BuildGraph {
  pub fn new(targets: impl IntoIterator<Item = Target>) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for target in targets {
      let address = target.address().clone();
      if nodes.contains_key(&address) {
        return Err(GraphError::DuplicateTarget(address));
      }
      let idx = graph.add_node(Arc::new(target));
      nodes.insert(address, idx);
    }

    let addresses: BTreeMap<Address, NodeIndex> =
      nodes.iter().map(|(address, idx)| (address.clone(), *idx)).collect();

    let mut edges = Vec::new();
    for (address, &dependent_idx) in &addresses {
      let Some(dependencies) = graph[dependent_idx].lookup::<Dependencies>() else {
        continue;
      };
      for dependency in dependencies.addresses() {
        let dependency_idx = nodes.get(dependency).ok_or_else(|| GraphError::UnknownDependency {
          dependent: address.clone(),
          dependency: dependency.clone(),
        })?;
        edges.push((dependent_idx, *dependency_idx));
      }
    }
    for (from, to) in edges {
      graph.add_edge(from, to, ());
    }

    debug!(targets = graph.node_count(), edges = graph.edge_count(), "built target graph");
    Ok(Self {
      graph,
      nodes,
      addresses,
    })
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn get(&self, address: &Address) -> Result<Arc<Target>, GraphError> {
    self
      .nodes
      .get(address)
      .map(|idx| Arc::clone(&self.graph[*idx]))
      .ok_or_else(|| GraphError::UnknownAddress(address.clone()))
  }

  /// Every target, sorted by address.
  pub fn targets(&self) -> impl Iterator<Item = &Arc<Target>> {
    self.addresses.values().map(|idx| &self.graph[*idx])
  }

  /// The targets `address` directly depends on, sorted by address.
  pub fn dependencies(&self, address: &Address) -> Result<Vec<Arc<Target>>, GraphError> {
    let idx = self.index(address)?;
    let mut dependencies: Vec<Arc<Target>> = self
      .graph
      .neighbors(idx)
      .map(|dep| Arc::clone(&self.graph[dep]))
      .collect();
    dependencies.sort_by(|a, b| a.address().cmp(b.address()));
    Ok(dependencies)
  }

  /// Expand address specs into the sorted, deduplicated addresses they select.
  ///
  /// A spec that selects nothing is an error.
  pub fn resolve_addresses(&self, specs: &[AddressSpec]) -> Result<Vec<Address>, GraphError> {
    let mut resolved = Vec::new();
    for spec in specs {
      let matched: Vec<&Address> = match spec {
        AddressSpec::Single(address) => {
          self.index(address)?;
          vec![address]
        }
        _ => self.addresses.keys().filter(|address| spec.matches(address)).collect(),
      };
      if matched.is_empty() {
        return Err(GraphError::NoMatches(spec.to_string()));
      }
      resolved.extend(matched.into_iter().cloned());
    }
    resolved.sort();
    resolved.dedup();
    Ok(resolved)
  }

  /// The roots plus everything reachable from them.
  ///
  /// Each target is expanded at most once, so dependency cycles terminate.
  pub fn transitive_targets(&self, roots: &[Address]) -> Result<TransitiveTargets, GraphError> {
    let root_indices = roots.iter().map(|address| self.index(address)).collect::<Result<Vec<_>, _>>()?;

    let mut closure = Vec::new();
    let mut dfs = Dfs::empty(&self.graph);
    for &root in &root_indices {
      dfs.move_to(root);
      while let Some(idx) = dfs.next(&self.graph) {
        closure.push(Arc::clone(&self.graph[idx]));
      }
    }

    let mut seen_roots = HashSet::new();
    let roots = root_indices
      .into_iter()
      .filter(|idx| seen_roots.insert(*idx))
      .map(|idx| Arc::clone(&self.graph[idx]))
      .collect();
    Ok(TransitiveTargets { roots, closure })
  }

  fn index(&self, address: &Address) -> Result<NodeIndex, GraphError> {
    self
      .nodes
      .get(address)
      .copied()
      .ok_or_else(|| GraphError::UnknownAddress(address.clone()))
  }
}
