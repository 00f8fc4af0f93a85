//! Core business logic module
//!
//! Graph construction, command planning and the scheduling state machine.
//! Reading files goes through the reader traits and process execution goes
//! through [`executor::Executor`]; the concrete side-effecting
//! implementations live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`manifest`] - Module manifest (package.json) reading
//! - [`bundle`] - Bundler config (rollup.config.mjs) reading
//! - [`planner`] - Build script to invocation planning
//! - [`graph`] - Dependency graph construction and cycle detection
//! - [`state`] - Per-module build state and work items
//! - [`queue`] - Synchronous scheduling state machine
//! - [`executor`] - Worker execution contract
//! - [`scheduler`] - Async coordinator and worker pool
//! - [`report`] - End-of-run report

pub mod bundle;
pub mod executor;
pub mod graph;
pub mod manifest;
pub mod planner;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod state;
