//! Bleep - incremental build orchestrator for front-end workspaces
//!
//! This library discovers the modules of a multi-package workspace, resolves
//! the dependency graph between them and runs their build scripts in
//! dependency order, rebuilding dependents whenever a module changes.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Graph, planning and scheduling logic
//! - [`infra`] - Infrastructure layer (filesystem walking, processes, file watching)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
