//! keel-lib: the target model and type checking pipeline behind `keel`.
//!
//! - [`field`]: typed, validated target attributes
//! - [`target`]: target types, targets, plugin fields and field sets
//! - [`graph`]: the build graph and transitive closures
//! - [`sources`]: the `sources` field and its hydration into files
//! - [`python`]: the built-in Python target types
//! - [`typecheck`]: MyPy, partitioned by interpreter constraints
//! - [`engine`]: globbing, environments and sandboxed processes

pub mod address;
pub mod build_file;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod field;
pub mod graph;
pub mod python;
pub mod sources;
pub mod target;
pub mod typecheck;
pub mod util;
