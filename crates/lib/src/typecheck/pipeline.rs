use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::mypy::{
  FILE_LIST_PATH, MyPyFieldSet, check_and_warn_if_python_version_configured, determine_python_files, generate_argv,
};
use super::partition::{MyPyPartition, partition_field_sets};
use super::{TypecheckContext, TypecheckError, TypecheckResult, TypecheckResults};
use crate::address::AddressSpec;
use crate::constraints::InterpreterConstraints;
use crate::engine::{EnvironmentRequest, FileContent, GlobMatchErrorBehavior, InputSet, PathGlobs, Process, Snapshot};
use crate::field::PrimitiveField;
use crate::python::{PythonRequirementsField, PythonSources};
use crate::sources::hydrate_sources;
use crate::target::Target;

const TYPECHECKER_NAME: &str = "MyPy";

/// Inputs computed once per run and shared by every partition.
struct SharedInputs {
  config_file: Option<FileContent>,
  plugin_requirements: Vec<String>,
  plugin_sources: InputSet,
}

/// Run MyPy over `field_sets`, one process per partition.
///
/// Partitions run concurrently, bounded by `[global].parallelism`. A
/// partition whose MyPy run fails, or whose task panics, is reported as a
/// failed entry without affecting the others. Results are ordered like the
/// partitions, i.e. by interpreter constraints.
pub async fn mypy_typecheck(
  field_sets: Vec<MyPyFieldSet>,
  ctx: &TypecheckContext,
) -> Result<TypecheckResults, TypecheckError> {
  if ctx.config.mypy.skip {
    info!("skipping MyPy");
    return Ok(TypecheckResults::new(TYPECHECKER_NAME, Vec::new()));
  }
  if field_sets.is_empty() {
    return Ok(TypecheckResults::new(TYPECHECKER_NAME, Vec::new()));
  }

  let shared = Arc::new(shared_inputs(ctx).await?);
  let python_version_configured =
    check_and_warn_if_python_version_configured(shared.config_file.as_ref(), &ctx.config.mypy.args);

  let partitions = partition_field_sets(
    &field_sets,
    &ctx.graph,
    &ctx.config.python,
    &ctx.config.mypy,
    python_version_configured,
  )?;
  info!(partitions = partitions.len(), targets = field_sets.len(), "running MyPy");

  let semaphore = Arc::new(Semaphore::new(ctx.config.global.parallelism.max(1)));
  let mut join_set = JoinSet::new();
  let mut task_partitions = HashMap::new();

  for (index, partition) in partitions.into_iter().enumerate() {
    let ctx = ctx.clone();
    let shared = Arc::clone(&shared);
    let semaphore = Arc::clone(&semaphore);
    let description = partition.description();

    let handle = join_set.spawn(async move {
      // The semaphore is never closed, so acquiring only waits.
      let _permit = semaphore.acquire().await.ok();
      run_partition(&partition, &shared, &ctx).await
    });
    task_partitions.insert(handle.id(), (index, description));
  }

  let mut slots: Vec<Option<TypecheckResult>> = vec![None; task_partitions.len()];
  let mut fatal: Option<(usize, TypecheckError)> = None;
  while let Some(joined) = join_set.join_next_with_id().await {
    match joined {
      Ok((id, Ok(result))) => {
        if let Some((index, _)) = task_partitions.get(&id) {
          slots[*index] = Some(result);
        }
      }
      Ok((id, Err(e))) => {
        let index = task_partitions.get(&id).map_or(usize::MAX, |(index, _)| *index);
        error!(error = %e, "MyPy partition failed");
        if fatal.as_ref().is_none_or(|(first, _)| index < *first) {
          fatal = Some((index, e));
        }
      }
      Err(e) => {
        error!(error = %e, "MyPy partition task panicked");
        if let Some((index, description)) = task_partitions.get(&e.id()) {
          slots[*index] = Some(TypecheckResult {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("MyPy task failed: {}", e),
            partition_description: Some(description.clone()),
          });
        }
      }
    }
  }

  if let Some((_, e)) = fatal {
    return Err(e);
  }
  Ok(TypecheckResults::new(TYPECHECKER_NAME, slots.into_iter().flatten().collect()))
}

/// Read the config file and hydrate the source plugins.
async fn shared_inputs(ctx: &TypecheckContext) -> Result<SharedInputs, TypecheckError> {
  let mypy = &ctx.config.mypy;

  let config_file = match &mypy.config {
    Some(path) => {
      let globs = PathGlobs::new([path.as_str()])
        .with_match_behavior(GlobMatchErrorBehavior::Error, "the option `[mypy].config`");
      ctx.globs.contents(&globs).await?.into_iter().next()
    }
    None => None,
  };

  if mypy.source_plugins.is_empty() {
    return Ok(SharedInputs {
      config_file,
      plugin_requirements: Vec::new(),
      plugin_sources: InputSet::default(),
    });
  }

  let specs = mypy
    .source_plugins
    .iter()
    .map(|spec| AddressSpec::parse(spec))
    .collect::<Result<Vec<_>, _>>()?;
  let addresses = ctx.graph.resolve_addresses(&specs)?;
  let plugins = ctx.graph.transitive_targets(&addresses)?;
  debug!(plugins = addresses.len(), closure = plugins.closure.len(), "resolved MyPy source plugins");

  let behavior = ctx.config.global.glob_match_error_behavior;
  let snapshots = python_source_snapshots(&plugins.closure, ctx, behavior).await?;
  Ok(SharedInputs {
    config_file,
    plugin_requirements: requirements(&plugins.closure),
    plugin_sources: InputSet::merge(snapshots.iter().map(InputSet::from_snapshot))?,
  })
}

/// Hydrate the Python sources of every target that has them.
async fn python_source_snapshots(
  targets: &[Arc<Target>],
  ctx: &TypecheckContext,
  behavior: GlobMatchErrorBehavior,
) -> Result<Vec<Snapshot>, TypecheckError> {
  let mut snapshots = Vec::new();
  for target in targets {
    if let Some(sources) = target.lookup::<PythonSources>() {
      let hydrated = hydrate_sources(sources.sources(), ctx.globs.as_ref(), behavior).await?;
      snapshots.push(hydrated.snapshot);
    }
  }
  Ok(snapshots)
}

/// The sorted, deduplicated requirement strings of `targets`.
fn requirements(targets: &[Arc<Target>]) -> Vec<String> {
  let requirements: BTreeSet<String> = targets
    .iter()
    .filter_map(|target| target.lookup::<PythonRequirementsField>())
    .flat_map(|field| field.value().iter().cloned())
    .collect();
  requirements.into_iter().collect()
}

/// The constraints MyPy itself runs under: the partition's when MyPy's are
/// left at the default and the partition needs Python 3.8 or newer, else
/// MyPy's own.
fn tool_interpreter_constraints(
  partition: &MyPyPartition,
  ctx: &TypecheckContext,
) -> Result<InterpreterConstraints, TypecheckError> {
  let mypy = &ctx.config.mypy;
  if mypy.has_default_interpreter_constraints() && partition.interpreter_constraints.requires_38_or_newer() {
    return Ok(partition.interpreter_constraints.clone());
  }
  Ok(InterpreterConstraints::parse(&mypy.interpreter_constraints)?)
}

async fn run_partition(
  partition: &MyPyPartition,
  shared: &SharedInputs,
  ctx: &TypecheckContext,
) -> Result<TypecheckResult, TypecheckError> {
  let mypy = &ctx.config.mypy;
  let description = partition.description();
  let behavior = ctx.config.global.glob_match_error_behavior;

  let mut tool_requirements = vec![mypy.version.clone()];
  tool_requirements.extend(mypy.extra_requirements.iter().cloned());
  tool_requirements.extend(shared.plugin_requirements.iter().cloned());
  let tool_request = EnvironmentRequest {
    name: "mypy.pex".to_string(),
    requirements: tool_requirements,
    interpreter_constraints: tool_interpreter_constraints(partition, ctx)?,
    entry_point: Some(mypy.entry_point.clone()),
  };

  let mut checked_requirements = requirements(&partition.closure);
  checked_requirements.extend(mypy.extra_requirements.iter().cloned());
  let checked_request = EnvironmentRequest {
    name: "requirements.pex".to_string(),
    requirements: checked_requirements,
    interpreter_constraints: partition.interpreter_constraints.clone(),
    entry_point: None,
  };

  let closure = python_source_snapshots(&partition.closure, ctx, behavior);
  let tool_env = async { Ok::<_, TypecheckError>(ctx.environments.build(&tool_request).await?) };
  let checked_env = async { Ok::<_, TypecheckError>(ctx.environments.build(&checked_request).await?) };

  let (closure_snapshots, tool_env, checked_env) = tokio::try_join!(closure, tool_env, checked_env)?;

  // Dependencies are checked too, so a stub anywhere in the closure wins.
  let typechecked = determine_python_files(
    closure_snapshots
      .iter()
      .flat_map(|snapshot| snapshot.files.iter().map(String::as_str)),
  );
  let file_list = FileContent {
    path: FILE_LIST_PATH.to_string(),
    content: typechecked.join("\n").into_bytes(),
  };

  let mut inputs = vec![InputSet::from_contents([file_list]), shared.plugin_sources.clone()];
  inputs.extend(closure_snapshots.iter().map(InputSet::from_snapshot));
  if let Some(config_file) = &shared.config_file {
    inputs.push(InputSet::from_contents([config_file.clone()]));
  }
  let input = InputSet::merge(inputs)?;

  let python_version = if partition.python_version_already_configured {
    None
  } else {
    partition.interpreter_constraints.minimum_version()
  };
  let argv = generate_argv(
    mypy,
    &checked_env.interpreter.display().to_string(),
    FILE_LIST_PATH,
    python_version.as_deref(),
  );

  let mut extra_env: BTreeMap<String, String> = mypy.extra_env.clone();
  let mut source_roots = ctx.config.python.source_roots.clone();
  source_roots.sort();
  extra_env.insert("MYPYPATH".to_string(), source_roots.join(":"));

  let process = Process {
    argv,
    description: format!("Run MyPy on {} file(s).", typechecked.len()),
    input,
    extra_env,
  };
  info!(partition = %description, files = typechecked.len(), "running MyPy partition");
  let result = ctx.runner.run(&tool_env, &process).await?;
  if result.exit_code != 0 {
    info!(partition = %description, exit_code = result.exit_code, "MyPy reported errors");
  }

  Ok(TypecheckResult {
    exit_code: result.exit_code,
    stdout: result.stdout,
    stderr: result.stderr,
    partition_description: Some(description),
  })
}
