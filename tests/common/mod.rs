//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test workspace context
///
/// Creates a temporary workspace and provides utilities for laying out
/// modules and running bleep against it.
pub struct TestProject {
    /// Temporary directory for the test workspace
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test workspace in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test workspace directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test workspace
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test workspace
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test workspace
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Add a module with a raw `package.json`
    pub fn add_module(&self, name: &str, package_json: &str) {
        self.create_file(&format!("{name}/package.json"), package_json);
    }

    /// Add a module whose `dev` script runs `build.sh` with `sh`
    ///
    /// The script appends the module name to `build.log` at the workspace
    /// root, then runs `body`.
    pub fn add_shell_module(&self, name: &str, deps: &[&str], body: &str) {
        let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\": \"*\"")).collect();
        self.add_module(
            name,
            &format!(
                r#"{{"dependencies": {{{}}}, "scripts": {{"dev": "sh build.sh"}}}}"#,
                deps.join(", ")
            ),
        );
        self.create_file(
            &format!("{name}/build.sh"),
            &format!("echo {name} >> ../build.log\n{body}\n"),
        );
    }

    /// Module names in the order their builds ran
    pub fn build_log(&self) -> Vec<String> {
        if !self.file_exists("build.log") {
            return Vec::new();
        }
        self.read_file("build.log")
            .lines()
            .map(ToString::to_string)
            .collect()
    }

    /// Run bleep with `args` from the workspace directory
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_bleep"))
            .current_dir(self.path())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute bleep")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard output as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Standard error as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
