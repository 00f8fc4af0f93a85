//! Infrastructure layer
//!
//! Handles all I/O operations: directory traversal, external processes and
//! file watching. This module is the only place where side effects occur,
//! apart from the manifest readers.

pub mod process;
pub mod walk;
pub mod watch;
