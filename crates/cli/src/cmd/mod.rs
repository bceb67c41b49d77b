mod deps;
mod list;
mod typecheck;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use keel_lib::address::{Address, AddressSpec};
use keel_lib::build_file::load_targets;
use keel_lib::config::KeelConfig;
use keel_lib::graph::BuildGraph;
use keel_lib::python::registered_target_types;
use keel_lib::target::PluginFields;

pub use deps::cmd_deps;
pub use list::cmd_list;
pub use typecheck::cmd_typecheck;

/// A loaded config plus the target graph of its build root.
pub struct Workspace {
  pub config: KeelConfig,
  pub graph: BuildGraph,
}

impl Workspace {
  /// Load `config_path`, or discover `keel.toml` in the current directory.
  pub fn load(config_path: Option<&Path>) -> Result<Self> {
    let config = match config_path {
      Some(path) => {
        KeelConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))?
      }
      None => {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        KeelConfig::discover(&cwd).context("Failed to load config")?
      }
    };

    let types = registered_target_types(PluginFields::default()).context("Failed to register target types")?;
    let targets = load_targets(&config.global.build_root, &types)
      .with_context(|| format!("Failed to load build files under {}", config.global.build_root.display()))?;
    let graph = BuildGraph::new(targets).context("Failed to build the target graph")?;
    debug!(targets = graph.len(), "loaded workspace");
    Ok(Self { config, graph })
  }

  pub fn build_root(&self) -> &Path {
    &self.config.global.build_root
  }

  /// Resolve `specs`, treating an empty list as every target.
  pub fn resolve(&self, specs: &[String]) -> Result<Vec<Address>> {
    if specs.is_empty() {
      return Ok(self.graph.targets().map(|target| target.address().clone()).collect());
    }
    let specs = specs
      .iter()
      .map(|spec| AddressSpec::parse(spec))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(self.graph.resolve_addresses(&specs)?)
  }
}
