use indexmap::IndexSet;
use tracing::warn;

use crate::address::Address;
use crate::config::MyPyOptions;
use crate::engine::FileContent;
use crate::field::FieldType;
use crate::python::PythonSources;
use crate::sources::Sources;
use crate::target::{FieldSet, Target, TargetError};

/// The generated file passed to MyPy as `@__files.txt`.
pub const FILE_LIST_PATH: &str = "__files.txt";

/// The fields MyPy needs from a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MyPyFieldSet {
  pub address: Address,
  pub sources: Sources,
}

impl FieldSet for MyPyFieldSet {
  const REQUIRED_FIELDS: &'static [FieldType] = &[FieldType::of::<PythonSources>()];

  fn create(target: &Target) -> Result<Self, TargetError> {
    Ok(Self {
      address: target.address().clone(),
      sources: target.require::<Sources>()?.clone(),
    })
  }

  fn address(&self) -> &Address {
    &self.address
  }
}

/// MyPy's arguments, without the interpreter and entry point.
///
/// `python_version` is left out when `None`, i.e. when the user already
/// pinned the version themselves.
pub fn generate_argv(
  mypy: &MyPyOptions,
  python_executable: &str,
  file_list_path: &str,
  python_version: Option<&str>,
) -> Vec<String> {
  let mut args = vec![format!("--python-executable={}", python_executable)];
  if let Some(config) = &mypy.config {
    args.push(format!("--config-file={}", config));
  }
  if let Some(version) = python_version {
    args.push(format!("--python-version={}", version));
  }
  args.extend(mypy.args.iter().cloned());
  args.push(format!("@{}", file_list_path));
  args
}

/// Whether the user pinned MyPy's Python version, warning once if so.
///
/// Both the config file and `[mypy].args` are inspected; the warning names
/// every place the version was set.
pub fn check_and_warn_if_python_version_configured(config: Option<&FileContent>, args: &[String]) -> bool {
  let mut configured = Vec::new();
  if let Some(config) = config
    && String::from_utf8_lossy(&config.content).contains("python_version")
  {
    configured.push(format!(
      "`python_version` in {} (which is used because of the `[mypy].config` option)",
      config.path
    ));
  }
  if args.iter().any(|arg| arg == "--py2") {
    configured.push("`--py2` in the `[mypy].args` option".to_string());
  }
  if args.iter().any(|arg| arg.starts_with("--python-version")) {
    configured.push("`--python-version` in the `[mypy].args` option".to_string());
  }

  if configured.is_empty() {
    return false;
  }
  warn!(
    "You set {}. Normally the Python version is derived from each partition's interpreter constraints; \
     your setting is used instead, so targets with different constraints are all checked as the same version.",
    configured.join(" and you set ")
  );
  true
}

/// Drop every `.py` file that has a `.pyi` stub next to it.
///
/// Input order is kept. A stub replaces its implementation file even when
/// the implementation came first.
pub fn determine_python_files<'a>(files: impl IntoIterator<Item = &'a str>) -> Vec<String> {
  let mut result: IndexSet<String> = IndexSet::new();
  for file in files {
    if let Some(implementation) = file.strip_suffix(".pyi").map(|stem| format!("{}.py", stem)) {
      result.shift_remove(&implementation);
      result.insert(file.to_string());
    } else if file.ends_with(".py") && !result.contains(&format!("{}i", file)) {
      result.insert(file.to_string());
    }
  }
  result.into_iter().collect()
}
