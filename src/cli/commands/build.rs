//! Build command implementation
//!
//! Implements `bleep build`: every module is built once, in dependency order,
//! and the run ends when nothing is left to do.

use anyhow::{bail, Result};

use super::{SchedulerOptions, Workspace};
use crate::cli::output::{self, OutputConfig, ProgressObserver};
use crate::core::scheduler::Scheduler;
use crate::infra::process::{self, ProcessExecutor};

/// Execute the build command
pub async fn execute(workspace: Workspace, options: SchedulerOptions, config: &OutputConfig) -> Result<()> {
    let Workspace { root, graph, .. } = workspace;

    if graph.is_empty() {
        tracing::warn!("No modules found under {}", root.display());
    }
    tracing::info!(
        "Building {} modules with {} jobs",
        graph.len(),
        options.jobs
    );

    let executor = process::with_deadline(ProcessExecutor::new(&root), options.timeout);
    let mut observer = ProgressObserver::new(*config, graph.len());

    let report = Scheduler::new(graph, executor)
        .with_jobs(options.jobs)
        .run(&mut observer)
        .await;
    observer.finish();

    output::print_report(&report, config)?;

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} module(s) failed");
    }
    Ok(())
}
