//! Fixtures shared by the integration tests.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keel_lib::build_file::load_targets;
use keel_lib::config::KeelConfig;
use keel_lib::engine::{
  Environment, EnvironmentBuilder, EnvironmentError, EnvironmentRequest, InputSource, LocalGlobExpander, Process,
  ProcessError, ProcessResult, ProcessRunner,
};
use keel_lib::graph::BuildGraph;
use keel_lib::python::registered_target_types;
use keel_lib::target::{FieldSet, PluginFields};
use keel_lib::typecheck::{FILE_LIST_PATH, MyPyFieldSet, TypecheckContext};
use tempfile::TempDir;

/// A build root populated with `files`, given as `(path, content)` pairs.
pub fn build_root(files: &[(&str, &str)]) -> TempDir {
  let root = TempDir::new().unwrap();
  for (path, content) in files {
    let path = root.path().join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }
  root
}

/// Hands out environments without resolving anything, recording each request.
#[derive(Default)]
pub struct FakeEnvironments {
  pub requests: Mutex<Vec<EnvironmentRequest>>,
}

#[async_trait]
impl EnvironmentBuilder for FakeEnvironments {
  async fn build(&self, request: &EnvironmentRequest) -> Result<Environment, EnvironmentError> {
    self.requests.lock().unwrap().push(request.clone());
    let version = request
      .interpreter_constraints
      .minimum_version()
      .unwrap_or_else(|| "3.6".to_string());
    let (major, minor) = version.split_once('.').unwrap();
    Ok(Environment {
      name: request.name.clone(),
      interpreter: PathBuf::from(format!("/usr/bin/python{}", version)),
      interpreter_version: (major.parse().unwrap(), minor.parse().unwrap()),
      requirements: request.requirements.clone(),
      entry_point: request.entry_point.clone(),
    })
  }
}

/// Records every process and fails the ones whose file list names `failing_file`.
#[derive(Default)]
pub struct FakeRunner {
  pub failing_file: Option<String>,
  pub runs: Mutex<Vec<(Environment, Process)>>,
}

impl FakeRunner {
  pub fn failing_on(file: &str) -> Self {
    Self {
      failing_file: Some(file.to_string()),
      ..Self::default()
    }
  }

  /// The recorded processes, ordered by their argv for stable assertions.
  pub fn processes(&self) -> Vec<(Environment, Process)> {
    let mut runs = self.runs.lock().unwrap().clone();
    runs.sort_by(|a, b| a.1.argv.cmp(&b.1.argv));
    runs
  }
}

pub fn file_list(process: &Process) -> Vec<String> {
  match process.input.get(FILE_LIST_PATH) {
    Some(InputSource::Content(content)) => String::from_utf8(content.clone())
      .unwrap()
      .lines()
      .map(str::to_string)
      .collect(),
    other => panic!("expected a generated file list, got {:?}", other),
  }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
  async fn run(&self, environment: &Environment, process: &Process) -> Result<ProcessResult, ProcessError> {
    self.runs.lock().unwrap().push((environment.clone(), process.clone()));
    let files = file_list(process);
    let failed = self
      .failing_file
      .as_ref()
      .is_some_and(|failing| files.iter().any(|file| file == failing));
    Ok(ProcessResult {
      exit_code: if failed { 1 } else { 0 },
      stdout: if failed {
        format!("{}:1: error: oops", files[0])
      } else {
        "Success: no issues found".to_string()
      },
      stderr: String::new(),
    })
  }
}

/// A loaded workspace wired to fake environments and a fake runner.
pub struct Harness {
  /// Keeps the build root alive for the harness's lifetime.
  _root: TempDir,
  pub ctx: TypecheckContext,
  pub environments: Arc<FakeEnvironments>,
  pub runner: Arc<FakeRunner>,
}

impl Harness {
  pub fn new(files: &[(&str, &str)], config: KeelConfig, runner: FakeRunner) -> Self {
    let root = build_root(files);
    let types = registered_target_types(PluginFields::default()).unwrap();
    let graph = BuildGraph::new(load_targets(root.path(), &types).unwrap()).unwrap();

    let environments = Arc::new(FakeEnvironments::default());
    let runner = Arc::new(runner);
    let ctx = TypecheckContext {
      config: Arc::new(config),
      graph: Arc::new(graph),
      globs: Arc::new(LocalGlobExpander::new(root.path())),
      environments: environments.clone(),
      runner: runner.clone(),
    };
    Self {
      _root: root,
      ctx,
      environments,
      runner,
    }
  }

  /// Field sets for every target MyPy applies to.
  pub fn field_sets(&self) -> Vec<MyPyFieldSet> {
    self
      .ctx
      .graph
      .targets()
      .filter(|target| MyPyFieldSet::is_applicable(target))
      .map(|target| MyPyFieldSet::create(target).unwrap())
      .collect()
  }
}
