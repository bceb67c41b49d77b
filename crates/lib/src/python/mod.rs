//! Python target types and their fields.

mod awslambda;
mod fields;

use crate::field::{Dependencies, FieldType};
use crate::target::{PluginFields, RegisteredTargetTypes, TargetError, TargetType};

pub use awslambda::{Handler, LambdaDependencies, Runtime};
pub use fields::{
  FilesSources, InterpreterConstraintsField, PythonRequirementsField, PythonSources, PythonTestsSources, Timeout,
};

pub const PYTHON_LIBRARY: TargetType = TargetType {
  alias: "python_library",
  core_fields: &[
    FieldType::of::<Dependencies>(),
    FieldType::of::<PythonSources>(),
    FieldType::of::<InterpreterConstraintsField>(),
  ],
  help: "Python source code.",
};

pub const PYTHON_TESTS: TargetType = TargetType {
  alias: "python_tests",
  core_fields: &[
    FieldType::of::<Dependencies>(),
    FieldType::of::<PythonTestsSources>(),
    FieldType::of::<InterpreterConstraintsField>(),
    FieldType::of::<Timeout>(),
  ],
  help: "Python tests, run with Pytest.",
};

pub const PYTHON_REQUIREMENT_LIBRARY: TargetType = TargetType {
  alias: "python_requirement_library",
  core_fields: &[
    FieldType::of::<Dependencies>(),
    FieldType::of::<PythonRequirementsField>(),
  ],
  help: "Third-party requirements, e.g. the contents of a requirements.txt.",
};

pub const PYTHON_AWSLAMBDA: TargetType = TargetType {
  alias: "python_awslambda",
  core_fields: &[
    FieldType::of::<LambdaDependencies>(),
    FieldType::of::<Handler>(),
    FieldType::of::<Runtime>(),
    FieldType::of::<InterpreterConstraintsField>(),
  ],
  help: "A self-contained Python function suitable for uploading to AWS Lambda.",
};

pub const FILES: TargetType = TargetType {
  alias: "files",
  core_fields: &[FieldType::of::<Dependencies>(), FieldType::of::<FilesSources>()],
  help: "Loose files that are not source code, e.g. resources or config.",
};

/// Every built-in target type.
pub fn target_types() -> Vec<TargetType> {
  vec![PYTHON_LIBRARY, PYTHON_TESTS, PYTHON_REQUIREMENT_LIBRARY, PYTHON_AWSLAMBDA, FILES]
}

/// The built-in target types, extended with `plugins`.
pub fn registered_target_types(plugins: PluginFields) -> Result<RegisteredTargetTypes, TargetError> {
  RegisteredTargetTypes::new(target_types(), plugins)
}
