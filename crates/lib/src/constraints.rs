//! Interpreter constraints: the compatibility key used to partition targets.
//!
//! A constraint is written `Interpreter<specifier>,<specifier>`, e.g.
//! `CPython>=3.6,<4`. A bare specifier list (`>=3.6`) implies `CPython`, and a
//! bare interpreter name (`PyPy`) accepts any version of it.
//!
//! A set of constraints is an OR: any one of them may be satisfied. Sets
//! coming from different targets are combined with AND, see
//! [`InterpreterConstraints::merge_constraint_sets`].

use std::cmp::Ordering;
use std::fmt;

use semver::Version;
use thiserror::Error;

use crate::python::InterpreterConstraintsField;
use crate::target::Target;

const DEFAULT_INTERPRETER: &str = "CPython";

/// `(major, minor, last known patch)` for every interpreter release line we
/// reason about.
const KNOWN_VERSIONS: &[(u64, u64, u64)] = &[
  (2, 7, 18),
  (3, 5, 10),
  (3, 6, 15),
  (3, 7, 17),
  (3, 8, 20),
  (3, 9, 20),
  (3, 10, 15),
  (3, 11, 10),
  (3, 12, 7),
  (3, 13, 0),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
  #[error("invalid interpreter constraint `{constraint}`: {reason}")]
  Parse { constraint: String, reason: String },

  #[error("no interpreter satisfies all of the constraint sets {sets:?}: they name different interpreter types")]
  Incompatible { sets: Vec<Vec<String>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operator {
  Compatible,
  Equal,
  NotEqual,
  GreaterEqual,
  LessEqual,
  Greater,
  Less,
}

impl Operator {
  fn as_str(self) -> &'static str {
    match self {
      Operator::Compatible => "~=",
      Operator::Equal => "==",
      Operator::NotEqual => "!=",
      Operator::GreaterEqual => ">=",
      Operator::LessEqual => "<=",
      Operator::Greater => ">",
      Operator::Less => "<",
    }
  }
}

// Two-character operators first so `>=` is not read as `>`.
const OPERATORS: &[Operator] = &[
  Operator::Compatible,
  Operator::Equal,
  Operator::NotEqual,
  Operator::GreaterEqual,
  Operator::LessEqual,
  Operator::Greater,
  Operator::Less,
];

/// One version comparison, e.g. `>=3.6` or `==3.7.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Specifier {
  op: Operator,
  release: Vec<u64>,
  wildcard: bool,
}

impl Specifier {
  fn parse(raw: &str, constraint: &str) -> Result<Self, ConstraintError> {
    let error = |reason: &str| ConstraintError::Parse {
      constraint: constraint.to_string(),
      reason: reason.to_string(),
    };

    let raw = raw.trim();
    let (op, rest) = OPERATORS
      .iter()
      .find_map(|op| raw.strip_prefix(op.as_str()).map(|rest| (*op, rest.trim())))
      .ok_or_else(|| error("expected a comparison operator such as `>=`"))?;

    let (version, wildcard) = match rest.strip_suffix(".*") {
      Some(version) => (version, true),
      None => (rest, false),
    };
    if wildcard && !matches!(op, Operator::Equal | Operator::NotEqual) {
      return Err(error("wildcards are only allowed with `==` and `!=`"));
    }

    let release = version
      .split('.')
      .map(|part| part.parse::<u64>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| error("versions must be dot-separated integers"))?;
    if op == Operator::Compatible && release.len() < 2 {
      return Err(error("`~=` needs at least a major and minor version"));
    }

    Ok(Self { op, release, wildcard })
  }

  fn contains(&self, version: &Version) -> bool {
    let candidate = [version.major, version.minor, version.patch];
    match self.op {
      Operator::Equal if self.wildcard => has_prefix(&candidate, &self.release),
      Operator::NotEqual if self.wildcard => !has_prefix(&candidate, &self.release),
      Operator::Equal => compare(&candidate, &self.release) == Ordering::Equal,
      Operator::NotEqual => compare(&candidate, &self.release) != Ordering::Equal,
      Operator::GreaterEqual => compare(&candidate, &self.release) != Ordering::Less,
      Operator::LessEqual => compare(&candidate, &self.release) != Ordering::Greater,
      Operator::Greater => compare(&candidate, &self.release) == Ordering::Greater,
      Operator::Less => compare(&candidate, &self.release) == Ordering::Less,
      Operator::Compatible => {
        compare(&candidate, &self.release) != Ordering::Less
          && has_prefix(&candidate, &self.release[..self.release.len() - 1])
      }
    }
  }
}

impl fmt::Display for Specifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
    write!(f, "{}{}", self.op.as_str(), release.join("."))?;
    if self.wildcard {
      write!(f, ".*")?;
    }
    Ok(())
  }
}

fn compare(candidate: &[u64], release: &[u64]) -> Ordering {
  let len = candidate.len().max(release.len());
  let segment = |parts: &[u64], i: usize| parts.get(i).copied().unwrap_or(0);
  (0..len)
    .map(|i| segment(candidate, i).cmp(&segment(release, i)))
    .find(|ordering| *ordering != Ordering::Equal)
    .unwrap_or(Ordering::Equal)
}

fn has_prefix(candidate: &[u64], prefix: &[u64]) -> bool {
  prefix
    .iter()
    .enumerate()
    .all(|(i, part)| candidate.get(i).copied().unwrap_or(0) == *part)
}

/// A single interpreter requirement: an interpreter name and the specifiers
/// that must all hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
  interpreter: String,
  specifiers: Vec<Specifier>,
}

impl Constraint {
  pub fn parse(raw: &str) -> Result<Self, ConstraintError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(ConstraintError::Parse {
        constraint: raw.to_string(),
        reason: "empty constraint".to_string(),
      });
    }

    let split = trimmed.find(['=', '!', '<', '>', '~']).unwrap_or(trimmed.len());
    let (name, specs) = trimmed.split_at(split);
    let interpreter = match name.trim() {
      "" => DEFAULT_INTERPRETER.to_string(),
      name => name.to_string(),
    };

    let specifiers = if specs.trim().is_empty() {
      Vec::new()
    } else {
      specs
        .split(',')
        .map(|spec| Specifier::parse(spec, raw))
        .collect::<Result<Vec<_>, _>>()?
    };

    Ok(Self::from_parts(interpreter, specifiers))
  }

  fn from_parts(interpreter: String, mut specifiers: Vec<Specifier>) -> Self {
    specifiers.sort_by_cached_key(ToString::to_string);
    specifiers.dedup();
    Self {
      interpreter,
      specifiers,
    }
  }

  pub fn interpreter(&self) -> &str {
    &self.interpreter
  }

  /// Whether `version` satisfies every specifier. The interpreter name is
  /// not considered.
  pub fn contains(&self, version: &Version) -> bool {
    self.specifiers.iter().all(|spec| spec.contains(version))
  }

  /// AND together constraints that name the same interpreter.
  fn and(constraints: &[&Constraint]) -> Option<Constraint> {
    let first = constraints.first()?;
    if constraints.iter().any(|c| c.interpreter != first.interpreter) {
      return None;
    }
    let specifiers = constraints.iter().flat_map(|c| c.specifiers.iter().cloned()).collect();
    Some(Self::from_parts(first.interpreter.clone(), specifiers))
  }
}

impl fmt::Display for Constraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let specs: Vec<String> = self.specifiers.iter().map(ToString::to_string).collect();
    write!(f, "{}{}", self.interpreter, specs.join(","))
  }
}

impl PartialOrd for Constraint {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Constraint {
  fn cmp(&self, other: &Self) -> Ordering {
    self.to_string().cmp(&other.to_string())
  }
}

/// An OR of [`Constraint`]s, kept sorted and deduplicated so it can serve as
/// a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InterpreterConstraints(Vec<Constraint>);

impl InterpreterConstraints {
  pub fn parse<S: AsRef<str>>(constraints: &[S]) -> Result<Self, ConstraintError> {
    let parsed = constraints
      .iter()
      .map(|c| Constraint::parse(c.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self::from_constraints(parsed))
  }

  fn from_constraints(mut constraints: Vec<Constraint>) -> Self {
    constraints.sort();
    constraints.dedup();
    Self(constraints)
  }

  /// Combine constraint sets from several targets.
  ///
  /// Constraints within one set are ORed; the sets themselves are ANDed.
  /// The result is the cartesian product of the sets, each combination
  /// merged into one constraint. Combinations naming different interpreters
  /// can never hold and are dropped.
  pub fn merge_constraint_sets<S: AsRef<str>>(sets: &[Vec<S>]) -> Result<Self, ConstraintError> {
    let parsed = sets
      .iter()
      .map(|set| set.iter().map(|c| Constraint::parse(c.as_ref())).collect())
      .collect::<Result<Vec<Vec<Constraint>>, _>>()?;
    if parsed.is_empty() {
      return Ok(Self::default());
    }

    let mut combinations: Vec<Vec<&Constraint>> = vec![Vec::new()];
    for set in &parsed {
      combinations = combinations
        .iter()
        .flat_map(|prefix| {
          set.iter().map(move |constraint| {
            let mut combination = prefix.clone();
            combination.push(constraint);
            combination
          })
        })
        .collect();
    }

    let merged: Vec<Constraint> = combinations
      .iter()
      .filter_map(|combination| Constraint::and(combination))
      .collect();
    if merged.is_empty() {
      return Err(ConstraintError::Incompatible {
        sets: sets
          .iter()
          .map(|set| set.iter().map(|c| c.as_ref().to_string()).collect())
          .collect(),
      });
    }
    Ok(Self::from_constraints(merged))
  }

  /// The combined constraints of every target carrying an
  /// `interpreter_constraints` field, or `None` if none of them do.
  ///
  /// A target that carries the field but leaves it unset contributes
  /// `global_default`.
  pub fn create_from_targets<'a>(
    targets: impl IntoIterator<Item = &'a Target>,
    global_default: &[String],
  ) -> Result<Option<Self>, ConstraintError> {
    let sets: Vec<Vec<String>> = targets
      .into_iter()
      .filter_map(|target| target.lookup::<InterpreterConstraintsField>())
      .map(|field| field.value_or_global_default(global_default).to_vec())
      .collect();
    if sets.is_empty() {
      return Ok(None);
    }
    Self::merge_constraint_sets(&sets).map(Some)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
    self.0.iter()
  }

  pub fn to_strings(&self) -> Vec<String> {
    self.0.iter().map(ToString::to_string).collect()
  }

  /// Whether some constraint admits `version`.
  pub fn allows(&self, version: &Version) -> bool {
    self.0.iter().any(|c| c.contains(version))
  }

  /// Whether some patch release of `major.minor` is admitted.
  pub fn includes_version(&self, major: u64, minor: u64) -> bool {
    KNOWN_VERSIONS
      .iter()
      .filter(|(ma, mi, _)| *ma == major && *mi == minor)
      .any(|(ma, mi, last_patch)| (0..=*last_patch).any(|patch| self.allows(&Version::new(*ma, *mi, patch))))
  }

  /// The lowest known `major.minor` these constraints admit, e.g. `3.6`.
  pub fn minimum_version(&self) -> Option<String> {
    KNOWN_VERSIONS
      .iter()
      .find(|(major, minor, _)| self.includes_version(*major, *minor))
      .map(|(major, minor, _)| format!("{}.{}", major, minor))
  }

  /// True when no interpreter older than 3.8 is admitted.
  pub fn requires_38_or_newer(&self) -> bool {
    ![(2, 7), (3, 5), (3, 6), (3, 7)]
      .iter()
      .any(|(major, minor)| self.includes_version(*major, *minor))
  }
}

/// The human readable form used to label partitions: `[CPython>=3.6]`.
impl fmt::Display for InterpreterConstraints {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.to_strings().join(", "))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ics(constraints: &[&str]) -> InterpreterConstraints {
    InterpreterConstraints::parse(constraints).unwrap()
  }

  #[test]
  fn parse_defaults_to_cpython() {
    let constraint = Constraint::parse(">=3.6").unwrap();
    assert_eq!(constraint.interpreter(), "CPython");
    assert_eq!(constraint.to_string(), "CPython>=3.6");

    let pypy = Constraint::parse("PyPy").unwrap();
    assert_eq!(pypy.to_string(), "PyPy");
    assert!(pypy.contains(&Version::new(2, 7, 0)));
  }

  #[test]
  fn specifiers_are_canonicalized() {
    let a = Constraint::parse("CPython>=3.6, <4").unwrap();
    let b = Constraint::parse("CPython<4,>=3.6").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_string(), "CPython<4,>=3.6");
  }

  #[test]
  fn parse_errors() {
    assert!(Constraint::parse("").is_err());
    assert!(Constraint::parse("CPython>=three").is_err());
    assert!(Constraint::parse("CPython~=3").is_err());
    assert!(Constraint::parse("CPython>=3.*").is_err());
  }

  #[test]
  fn operators() {
    let v = |s: &str| Version::parse(s).unwrap();
    assert!(Constraint::parse("==3.7.*").unwrap().contains(&v("3.7.4")));
    assert!(!Constraint::parse("==3.7.*").unwrap().contains(&v("3.8.0")));
    assert!(Constraint::parse("==3.7").unwrap().contains(&v("3.7.0")));
    assert!(!Constraint::parse("==3.7").unwrap().contains(&v("3.7.1")));
    assert!(!Constraint::parse("!=3.7.*").unwrap().contains(&v("3.7.2")));
    assert!(Constraint::parse("~=3.6").unwrap().contains(&v("3.9.0")));
    assert!(!Constraint::parse("~=3.6").unwrap().contains(&v("4.0.0")));
    assert!(Constraint::parse("~=3.6.2").unwrap().contains(&v("3.6.9")));
    assert!(!Constraint::parse("~=3.6.2").unwrap().contains(&v("3.7.0")));
    assert!(Constraint::parse(">2.7,<3").unwrap().contains(&v("2.7.5")));
    assert!(!Constraint::parse("<=3.8").unwrap().contains(&v("3.8.1")));
  }

  #[test]
  fn minimum_version_and_38_check() {
    assert_eq!(ics(&["CPython>=3.6"]).minimum_version().as_deref(), Some("3.6"));
    assert_eq!(ics(&["CPython>=3.8"]).minimum_version().as_deref(), Some("3.8"));
    assert_eq!(
      ics(&["CPython==2.7.*", "CPython>=3.6"]).minimum_version().as_deref(),
      Some("2.7")
    );
    assert_eq!(ics(&["CPython>=4"]).minimum_version(), None);

    assert!(ics(&["CPython>=3.8"]).requires_38_or_newer());
    assert!(!ics(&["CPython>=3.6"]).requires_38_or_newer());
    assert!(!ics(&["CPython==3.7.*", "CPython>=3.9"]).requires_38_or_newer());
  }

  #[test]
  fn merge_is_and_across_sets_or_within() {
    let merged = InterpreterConstraints::merge_constraint_sets(&[
      vec!["CPython>=3.6"],
      vec!["CPython==2.7.*", "CPython<3.9"],
    ])
    .unwrap();
    assert_eq!(merged.to_strings(), vec!["CPython<3.9,>=3.6", "CPython==2.7.*,>=3.6"]);
  }

  #[test]
  fn merge_drops_cross_interpreter_combinations() {
    let merged =
      InterpreterConstraints::merge_constraint_sets(&[vec!["CPython>=3.6", "PyPy>=3.6"], vec!["PyPy"]]).unwrap();
    assert_eq!(merged.to_strings(), vec!["PyPy>=3.6"]);

    let impossible = InterpreterConstraints::merge_constraint_sets(&[vec!["CPython>=3.6"], vec!["PyPy"]]);
    assert!(matches!(impossible, Err(ConstraintError::Incompatible { .. })));
  }

  #[test]
  fn merge_of_identical_sets_is_stable() {
    let merged = InterpreterConstraints::merge_constraint_sets(&[vec![">=3.6"], vec!["CPython>=3.6"]]).unwrap();
    assert_eq!(merged, ics(&["CPython>=3.6"]));
    assert_eq!(merged.to_string(), "[CPython>=3.6]");
  }

  #[test]
  fn ordering_is_by_rendered_constraint() {
    let mut keys = vec![ics(&["CPython>=3.8"]), ics(&["CPython>=3.6"])];
    keys.sort();
    assert_eq!(keys[0], ics(&["CPython>=3.6"]));
  }
}
