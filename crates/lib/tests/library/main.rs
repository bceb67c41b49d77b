//! Integration tests for keel-lib, driven through its public API.

mod common;
mod typecheck_tests;
mod workspace_tests;
