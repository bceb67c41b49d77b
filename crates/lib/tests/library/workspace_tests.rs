//! Loading a build root: config, build files, the target graph and sources.

use keel_lib::address::{Address, AddressSpec};
use keel_lib::build_file::{BuildFileError, load_targets};
use keel_lib::config::KeelConfig;
use keel_lib::engine::{GlobMatchErrorBehavior, LocalGlobExpander};
use keel_lib::field::Dependencies;
use keel_lib::graph::BuildGraph;
use keel_lib::python::{PythonSources, registered_target_types};
use keel_lib::sources::{Sources, hydrate_sources};
use keel_lib::target::{FieldSet, PluginFields, TargetError};
use keel_lib::typecheck::MyPyFieldSet;

use super::common::build_root;

const PROJECT: &[(&str, &str)] = &[
  (
    "keel.toml",
    "[python]\ninterpreter_constraints = ['CPython>=3.7']\n\n[mypy]\nargs = ['--strict']\n",
  ),
  (
    "src/app/BUILD.yaml",
    "- type: python_library\n  name: app\n  dependencies: ['src/util']\n\
     - type: python_tests\n  name: tests\n  dependencies: [':app']\n\
     - type: python_awslambda\n  name: lambda\n  handler: 'main:handler'\n  runtime: python3.8\n  dependencies: [':app']\n",
  ),
  ("src/app/main.py", ""),
  ("src/app/test_main.py", ""),
  ("src/util/BUILD.yaml", "- type: python_library\n  name: util\n"),
  ("src/util/strings.py", ""),
  (
    "resources/BUILD.yaml",
    "- type: files\n  name: resources\n  sources: ['*.json']\n",
  ),
  ("resources/data.json", "{}"),
  (".cache/BUILD.yaml", "- type: not_a_target\n  name: ignored\n"),
];

fn load(files: &[(&str, &str)]) -> (tempfile::TempDir, Result<BuildGraph, String>) {
  let root = build_root(files);
  let types = registered_target_types(PluginFields::default()).unwrap();
  let graph = load_targets(root.path(), &types)
    .map_err(|e| e.to_string())
    .and_then(|targets| BuildGraph::new(targets).map_err(|e| e.to_string()));
  (root, graph)
}

mod loading {
  use super::*;

  #[test]
  fn config_is_discovered_at_the_root() {
    let root = build_root(PROJECT);
    let config = KeelConfig::discover(root.path()).unwrap();
    assert_eq!(config.python.interpreter_constraints, vec!["CPython>=3.7"]);
    assert_eq!(config.mypy.args, vec!["--strict"]);
    assert_eq!(config.mypy.version, "mypy==0.800");
    assert_eq!(config.global.build_root, root.path().join("."));
  }

  #[test]
  fn every_build_file_outside_hidden_dirs_is_loaded() {
    let (_root, graph) = load(PROJECT);
    let graph = graph.unwrap();
    let addresses: Vec<String> = graph.targets().map(|t| t.address().to_string()).collect();
    assert_eq!(
      addresses,
      vec![
        "resources:resources",
        "src/app:app",
        "src/app:lambda",
        "src/app:tests",
        "src/util:util"
      ]
    );
  }

  #[test]
  fn unknown_target_type_is_reported() {
    let (_root, graph) = load(&[("BUILD.yaml", "- type: java_library\n  name: nope\n")]);
    let err = graph.err().unwrap();
    assert!(err.contains("java_library"), "unexpected error: {}", err);
  }

  #[test]
  fn duplicate_names_in_one_directory_are_rejected() {
    let root = build_root(&[(
      "src/BUILD.yaml",
      "- type: python_library\n  name: a\n- type: files\n  name: a\n  sources: []\n",
    )]);
    let types = registered_target_types(PluginFields::default()).unwrap();
    let err = load_targets(root.path(), &types).unwrap_err();
    assert!(matches!(err, BuildFileError::DuplicateTarget(address) if address == Address::new("src", "a")));
  }

  #[test]
  fn files_require_sources() {
    let root = build_root(&[("res/BUILD.yaml", "- type: files\n  name: res\n")]);
    let types = registered_target_types(PluginFields::default()).unwrap();
    let err = load_targets(root.path(), &types).unwrap_err();
    assert!(matches!(err, BuildFileError::Target(TargetError::Field(_))), "unexpected error: {}", err);
  }
}

mod graph {
  use super::*;

  #[test]
  fn lambda_closure_reaches_through_its_dependencies() {
    let (_root, graph) = load(PROJECT);
    let graph = graph.unwrap();

    let lambda = graph.get(&Address::new("src/app", "lambda")).unwrap();
    assert!(lambda.has_field::<Dependencies>());

    let transitive = graph.transitive_targets(&[lambda.address().clone()]).unwrap();
    assert!(transitive.contains(&Address::new("src/app", "app")));
    assert!(transitive.contains(&Address::new("src/util", "util")));
    assert!(!transitive.contains(&Address::new("src/app", "tests")));
  }

  #[test]
  fn descendant_specs_select_nested_targets() {
    let (_root, graph) = load(PROJECT);
    let graph = graph.unwrap();
    let resolved = graph.resolve_addresses(&[AddressSpec::parse("src::").unwrap()]).unwrap();
    assert_eq!(resolved.len(), 4);
  }
}

mod sources {
  use super::*;

  #[test]
  fn mypy_applies_to_python_sources_and_their_specializations() {
    let (_root, graph) = load(PROJECT);
    let graph = graph.unwrap();
    let applicable: Vec<String> = graph
      .targets()
      .filter(|target| MyPyFieldSet::is_applicable(target))
      .map(|target| target.address().to_string())
      .collect();
    assert_eq!(applicable, vec!["src/app:app", "src/app:tests", "src/util:util"]);
  }

  #[tokio::test]
  async fn default_globs_split_tests_from_library_code() {
    let (root, graph) = load(PROJECT);
    let graph = graph.unwrap();
    let expander = LocalGlobExpander::new(root.path());

    let hydrate = |address: Address| {
      let target = graph.get(&address).unwrap();
      let sources: Sources = target.require::<Sources>().unwrap().clone();
      let expander = &expander;
      async move {
        hydrate_sources(&sources, expander, GlobMatchErrorBehavior::Error)
          .await
          .unwrap()
          .snapshot
          .files
      }
    };
    assert_eq!(hydrate(Address::new("src/app", "app")).await, vec!["src/app/main.py"]);
    assert_eq!(hydrate(Address::new("src/app", "tests")).await, vec!["src/app/test_main.py"]);
    assert_eq!(hydrate(Address::new("resources", "resources")).await, vec!["resources/data.json"]);

    let tests = graph.get(&Address::new("src/app", "tests")).unwrap();
    assert!(tests.lookup::<PythonSources>().is_some());
  }
}
