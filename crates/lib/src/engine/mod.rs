//! External collaborators of the typecheck pipeline.
//!
//! Each concern is an async trait so the pipeline can run against the local
//! machine or against in-memory fakes:
//! - [`GlobExpander`]: globs to content-addressed file sets
//! - [`EnvironmentBuilder`]: interpreter constraints to an isolated environment
//! - [`ProcessRunner`]: a sandboxed tool invocation

pub mod environment;
pub mod fs;
pub mod process;

pub use environment::{Environment, EnvironmentBuilder, EnvironmentError, EnvironmentRequest, LocalEnvironmentBuilder};
pub use fs::{
  FileContent, GlobError, GlobExpander, GlobExpansionConjunction, GlobMatchErrorBehavior, LocalGlobExpander,
  PathGlobs, Snapshot,
};
pub use process::{InputSet, InputSource, LocalProcessRunner, Process, ProcessError, ProcessResult, ProcessRunner};
