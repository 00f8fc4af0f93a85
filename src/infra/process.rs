//! External process execution
//!
//! [`ProcessExecutor`] runs invocations with `tokio::process`, capturing
//! output. Programs are looked up in the module's and the workspace's
//! `node_modules/.bin` before `PATH`, the way package scripts see them.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::config::defaults;
use crate::core::executor::{Executor, InvocationOutput};
use crate::core::planner::Invocation;
use crate::error::BuildError;

/// Runs invocations as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    /// Workspace root, whose tool directory is searched after the module's
    root: Option<PathBuf>,
}

impl ProcessExecutor {
    /// Create an executor that also searches `<root>/node_modules/.bin`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Search path for an invocation: module tools, workspace tools, `PATH`
    pub fn search_path(&self, working_dir: &Path) -> OsString {
        let mut dirs = vec![working_dir.join(defaults::TOOL_BIN_DIR)];
        if let Some(root) = &self.root {
            let tools = root.join(defaults::TOOL_BIN_DIR);
            if !dirs.contains(&tools) {
                dirs.push(tools);
            }
        }
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path));
        }
        std::env::join_paths(dirs).unwrap_or_default()
    }

    /// Locate the program for an invocation
    pub fn resolve(invocation: &Invocation, search_path: &OsString) -> Result<PathBuf, BuildError> {
        let program = Path::new(&invocation.program);
        if program.components().count() > 1 {
            return Ok(invocation.working_dir.join(program));
        }

        which::which_in(&invocation.program, Some(search_path), &invocation.working_dir).map_err(|e| {
            BuildError::Spawn {
                program: invocation.program.clone(),
                error: format!("{e} (searched {} and PATH)", defaults::TOOL_BIN_DIR),
            }
        })
    }
}

impl Executor for ProcessExecutor {
    fn execute(&self, invocation: Invocation) -> BoxFuture<'static, InvocationOutput> {
        let search_path = self.search_path(&invocation.working_dir);

        async move {
            let started = Instant::now();
            let program = match Self::resolve(&invocation, &search_path) {
                Ok(program) => program,
                Err(e) => return InvocationOutput::failure(&invocation, e, ""),
            };
            tracing::trace!("Resolved '{}' to {}", invocation.program, program.display());

            let output = tokio::process::Command::new(&program)
                .args(&invocation.args)
                .current_dir(&invocation.working_dir)
                .env("PATH", &search_path)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await;

            let output = match output {
                Ok(output) => output,
                Err(e) => {
                    return InvocationOutput::failure(
                        &invocation,
                        BuildError::Spawn {
                            program: invocation.program.clone(),
                            error: e.to_string(),
                        },
                        "",
                    )
                }
            };

            let status = if output.status.success() {
                Ok(())
            } else {
                Err(BuildError::ExitStatus {
                    command: invocation.command_line(),
                    code: output.status.code(),
                })
            };

            InvocationOutput {
                command: invocation.command_line(),
                status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: started.elapsed(),
            }
        }
        .boxed()
    }
}

/// Fails invocations that run longer than a fixed limit
///
/// The timed-out process is killed when its future is dropped.
#[derive(Debug, Clone)]
pub struct DeadlineExecutor<E> {
    inner: E,
    limit: Duration,
}

impl<E: Executor> DeadlineExecutor<E> {
    /// Wrap `inner` with a per-invocation time limit
    pub fn new(inner: E, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

impl<E: Executor> Executor for DeadlineExecutor<E> {
    fn execute(&self, invocation: Invocation) -> BoxFuture<'static, InvocationOutput> {
        let limit = self.limit;
        let command = invocation.command_line();
        let running = self.inner.execute(invocation);

        async move {
            match tokio::time::timeout(limit, running).await {
                Ok(output) => output,
                Err(_) => InvocationOutput {
                    command: command.clone(),
                    status: Err(BuildError::TimedOut {
                        command,
                        seconds: limit.as_secs(),
                    }),
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: limit,
                },
            }
        }
        .boxed()
    }
}

/// Executor for the configured deadline, if any
pub fn with_deadline(executor: ProcessExecutor, limit: Option<Duration>) -> std::sync::Arc<dyn Executor> {
    match limit {
        Some(limit) => std::sync::Arc::new(DeadlineExecutor::new(executor, limit)),
        None => std::sync::Arc::new(executor),
    }
}
