//! End-to-end MyPy runs over a real build root, with fake environments and
//! a fake process runner.

use keel_lib::config::KeelConfig;
use keel_lib::engine::InputSource;
use keel_lib::typecheck::{TypecheckError, mypy_typecheck};
use tracing_test::traced_test;

use super::common::{FakeRunner, Harness, file_list};

const WORKSPACE: &[(&str, &str)] = &[
  (
    "src/a/BUILD.yaml",
    "- type: python_library\n  name: a\n  interpreter_constraints: ['>=3.6']\n",
  ),
  ("src/a/a.py", "import b\n"),
  (
    "src/b/BUILD.yaml",
    "- type: python_library\n  name: b\n  interpreter_constraints: ['>=3.6']\n",
  ),
  ("src/b/b.py", "def f(): ...\n"),
  ("src/b/b.pyi", "def f() -> None: ...\n"),
  (
    "src/c/BUILD.yaml",
    "- type: python_library\n  name: c\n  interpreter_constraints: ['>=3.8']\n  dependencies: ['3rdparty:attrs']\n",
  ),
  ("src/c/c.py", "import attrs\n"),
  (
    "3rdparty/BUILD.yaml",
    "- type: python_requirement_library\n  name: attrs\n  requirements: ['attrs==20.3.0']\n",
  ),
];

fn config(edit: impl FnOnce(&mut KeelConfig)) -> KeelConfig {
  let mut config = KeelConfig::default();
  edit(&mut config);
  config
}

fn has_arg(argv: &[String], prefix: &str) -> bool {
  argv.iter().any(|arg| arg.starts_with(prefix))
}

mod partitioning {
  use super::*;

  #[tokio::test]
  async fn one_run_per_distinct_interpreter_constraints() {
    let harness = Harness::new(WORKSPACE, KeelConfig::default(), FakeRunner::default());

    let results = mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();
    assert_eq!(results.typechecker_name, "MyPy");
    let descriptions: Vec<_> = results
      .results
      .iter()
      .map(|result| result.partition_description.as_deref().unwrap())
      .collect();
    assert_eq!(descriptions, vec!["[CPython>=3.6]", "[CPython>=3.8]"]);
    assert!(results.is_success());

    let processes = harness.runner.processes();
    assert_eq!(processes.len(), 2);

    let (tool, py36) = &processes[0];
    assert_eq!(tool.name, "mypy.pex");
    assert_eq!(
      py36.argv,
      vec![
        "--python-executable=/usr/bin/python3.6",
        "--python-version=3.6",
        "@__files.txt"
      ]
    );
    assert_eq!(file_list(py36), vec!["src/a/a.py", "src/b/b.pyi"]);
    assert_eq!(py36.description, "Run MyPy on 2 file(s).");
    assert_eq!(py36.extra_env.get("MYPYPATH").map(String::as_str), Some("."));

    let (tool, py38) = &processes[1];
    assert_eq!(tool.interpreter_version, (3, 8));
    assert!(has_arg(&py38.argv, "--python-version=3.8"));
    assert_eq!(file_list(py38), vec!["src/c/c.py"]);
    assert_eq!(py38.input.get("src/c/c.py"), Some(&InputSource::Workspace));
    assert_eq!(py38.input.get("src/a/a.py"), None);
  }

  #[tokio::test]
  async fn environments_follow_the_partition() {
    let harness = Harness::new(WORKSPACE, KeelConfig::default(), FakeRunner::default());
    mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();

    let requests = harness.environments.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 4);

    let tools: Vec<_> = requests.iter().filter(|request| request.name == "mypy.pex").collect();
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|request| request.requirements == vec!["mypy==0.800"]));
    assert!(tools.iter().all(|request| request.entry_point.as_deref() == Some("mypy")));
    // MyPy runs under 3.8 for a partition that needs it.
    assert!(
      tools
        .iter()
        .any(|request| request.interpreter_constraints.to_string() == "[CPython>=3.8]")
    );

    let checked: Vec<_> = requests
      .iter()
      .filter(|request| request.name == "requirements.pex")
      .collect();
    assert_eq!(checked.len(), 2);
    let py38 = checked
      .iter()
      .find(|request| request.interpreter_constraints.to_string() == "[CPython>=3.8]")
      .unwrap();
    assert_eq!(py38.requirements, vec!["attrs==20.3.0"]);
    assert_eq!(py38.entry_point, None);
  }

  #[tokio::test]
  async fn repeated_runs_are_identical() {
    let first = Harness::new(WORKSPACE, KeelConfig::default(), FakeRunner::default());
    let second = Harness::new(
      WORKSPACE,
      config(|c| c.global.parallelism = 1),
      FakeRunner::default(),
    );
    let a = mypy_typecheck(first.field_sets(), &first.ctx).await.unwrap();
    let b = mypy_typecheck(second.field_sets(), &second.ctx).await.unwrap();
    assert_eq!(a, b);

    let argvs = |harness: &Harness| -> Vec<Vec<String>> {
      harness
        .runner
        .processes()
        .into_iter()
        .map(|(_, process)| process.argv)
        .collect()
    };
    assert_eq!(argvs(&first), argvs(&second));
  }
}

mod closure {
  use keel_lib::typecheck::MyPyFieldSet;

  use super::*;

  fn roots(harness: &Harness, roots: &[&str]) -> Vec<MyPyFieldSet> {
    harness
      .field_sets()
      .into_iter()
      .filter(|field_set| roots.contains(&field_set.address.to_string().as_str()))
      .collect()
  }

  #[tokio::test]
  async fn dependencies_are_checked_with_their_dependents() {
    let harness = Harness::new(
      &[
        (
          "src/app/BUILD.yaml",
          "- type: python_library\n  name: app\n  dependencies: ['src/lib']\n",
        ),
        ("src/app/app.py", "import lib\n"),
        ("src/lib/BUILD.yaml", "- type: python_library\n  name: lib\n"),
        ("src/lib/lib.py", "def f(): ...\n"),
      ],
      KeelConfig::default(),
      FakeRunner::default(),
    );

    mypy_typecheck(roots(&harness, &["src/app:app"]), &harness.ctx)
      .await
      .unwrap();
    let processes = harness.runner.processes();
    assert_eq!(processes.len(), 1);
    let (_, process) = &processes[0];
    assert_eq!(file_list(process), vec!["src/app/app.py", "src/lib/lib.py"]);
    assert_eq!(process.description, "Run MyPy on 2 file(s).");
  }

  #[tokio::test]
  async fn a_stub_in_a_dependency_replaces_the_implementation() {
    let harness = Harness::new(
      &[
        (
          "src/pkg/BUILD.yaml",
          "- type: python_library\n  name: impl\n  sources: ['x.py']\n  dependencies: [':stubs']\n\
           - type: python_library\n  name: stubs\n  sources: ['x.pyi']\n",
        ),
        ("src/pkg/x.py", "def f(): ...\n"),
        ("src/pkg/x.pyi", "def f() -> None: ...\n"),
      ],
      KeelConfig::default(),
      FakeRunner::default(),
    );

    mypy_typecheck(roots(&harness, &["src/pkg:impl"]), &harness.ctx)
      .await
      .unwrap();
    let processes = harness.runner.processes();
    let (_, process) = &processes[0];
    assert_eq!(file_list(process), vec!["src/pkg/x.pyi"]);
    assert_eq!(process.input.get("src/pkg/x.py"), Some(&InputSource::Workspace));
    assert_eq!(process.input.get("src/pkg/x.pyi"), Some(&InputSource::Workspace));
  }
}

mod failures {
  use super::*;

  #[tokio::test]
  async fn a_failing_partition_does_not_hide_the_others() {
    let harness = Harness::new(WORKSPACE, KeelConfig::default(), FakeRunner::failing_on("src/c/c.py"));

    let results = mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();
    assert_eq!(results.results.len(), 2);
    assert!(results.results[0].is_success());
    assert_eq!(results.results[1].exit_code, 1);
    assert_eq!(results.results[1].stdout, "src/c/c.py:1: error: oops");
    assert_eq!(results.exit_code(), 1);
    assert!(!results.is_success());
  }

  #[tokio::test]
  async fn missing_config_file_aborts_the_run() {
    let harness = Harness::new(
      WORKSPACE,
      config(|c| c.mypy.config = Some("mypy.ini".to_string())),
      FakeRunner::default(),
    );
    let err = mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap_err();
    assert!(matches!(err, TypecheckError::Glob(_)), "unexpected error: {}", err);
    assert!(harness.runner.processes().is_empty());
  }
}

mod options {
  use super::*;

  #[tokio::test]
  async fn skip_runs_nothing() {
    let harness = Harness::new(WORKSPACE, config(|c| c.mypy.skip = true), FakeRunner::default());

    let results = mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();
    assert!(results.skipped());
    assert_eq!(results.exit_code(), 0);
    assert!(harness.runner.processes().is_empty());
    assert!(harness.environments.requests.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn no_field_sets_runs_nothing() {
    let harness = Harness::new(WORKSPACE, KeelConfig::default(), FakeRunner::default());
    let results = mypy_typecheck(Vec::new(), &harness.ctx).await.unwrap();
    assert!(results.skipped());
    assert!(harness.runner.processes().is_empty());
  }

  #[traced_test]
  #[tokio::test]
  async fn pinned_version_in_args_wins_with_a_single_warning() {
    let harness = Harness::new(
      WORKSPACE,
      config(|c| c.mypy.args = vec!["--python-version=3.7".to_string()]),
      FakeRunner::default(),
    );

    let results = mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();
    assert_eq!(results.results.len(), 2);
    for (_, process) in harness.runner.processes() {
      assert_eq!(
        process
          .argv
          .iter()
          .filter(|arg| arg.starts_with("--python-version"))
          .collect::<Vec<_>>(),
        vec!["--python-version=3.7"]
      );
    }

    logs_assert(|lines: &[&str]| {
      match lines.iter().filter(|line| line.contains("You set")).count() {
        1 => Ok(()),
        n => Err(format!("expected one warning, got {}", n)),
      }
    });
    assert!(logs_contain("`--python-version` in the `[mypy].args` option"));
  }

  #[tokio::test]
  async fn config_file_is_passed_and_shipped() {
    let mut files = WORKSPACE.to_vec();
    files.push(("mypy.ini", "[mypy]\npython_version = 3.7\n"));
    let harness = Harness::new(
      &files,
      config(|c| c.mypy.config = Some("mypy.ini".to_string())),
      FakeRunner::default(),
    );

    mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();
    for (_, process) in harness.runner.processes() {
      assert!(has_arg(&process.argv, "--config-file=mypy.ini"));
      assert!(!has_arg(&process.argv, "--python-version"));
      assert_eq!(
        process.input.get("mypy.ini"),
        Some(&InputSource::Content(b"[mypy]\npython_version = 3.7\n".to_vec()))
      );
    }
  }

  #[tokio::test]
  async fn source_plugins_join_every_partition() {
    let mut files = WORKSPACE.to_vec();
    files.push((
      "plugins/BUILD.yaml",
      "- type: python_library\n  name: plugin\n  dependencies: ['3rdparty:attrs']\n",
    ));
    files.push(("plugins/plugin.py", "def plugin(version): ...\n"));
    let harness = Harness::new(
      &files,
      config(|c| c.mypy.source_plugins = vec!["plugins:plugin".to_string()]),
      FakeRunner::default(),
    );

    let field_sets = harness
      .field_sets()
      .into_iter()
      .filter(|field_set| field_set.address.spec_path != "plugins")
      .collect();
    mypy_typecheck(field_sets, &harness.ctx).await.unwrap();

    for (tool, process) in harness.runner.processes() {
      assert_eq!(tool.requirements, vec!["mypy==0.800", "attrs==20.3.0"]);
      assert_eq!(process.input.get("plugins/plugin.py"), Some(&InputSource::Workspace));
      assert!(!file_list(&process).contains(&"plugins/plugin.py".to_string()));
    }
  }

  #[tokio::test]
  async fn extra_env_and_source_roots_reach_the_process() {
    let harness = Harness::new(
      WORKSPACE,
      config(|c| {
        c.python.source_roots = vec!["src".to_string(), "3rdparty".to_string()];
        c.mypy.extra_env.insert("MYPY_FORCE_COLOR".to_string(), "1".to_string());
      }),
      FakeRunner::default(),
    );

    mypy_typecheck(harness.field_sets(), &harness.ctx).await.unwrap();
    for (_, process) in harness.runner.processes() {
      assert_eq!(process.extra_env.get("MYPYPATH").map(String::as_str), Some("3rdparty:src"));
      assert_eq!(process.extra_env.get("MYPY_FORCE_COLOR").map(String::as_str), Some("1"));
    }
  }
}
