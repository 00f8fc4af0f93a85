//! Watch command implementation
//!
//! Implements `bleep watch`: builds everything, then rebuilds a changed
//! module and its dependents until interrupted with Ctrl-C.

use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::{SchedulerOptions, Workspace};
use crate::cli::output::{self, OutputConfig, ProgressObserver};
use crate::core::executor::{Job, JobResult};
use crate::core::graph::DependencyGraph;
use crate::core::scheduler::{Scheduler, SchedulerEvent, SchedulerObserver};
use crate::core::state::Transition;
use crate::infra::process::{self, ProcessExecutor};
use crate::infra::watch::{FsWatcher, PathClassifier};

/// Keeps the watcher's module map in step with the graph
struct WatchObserver {
    progress: ProgressObserver,
    classifier: Arc<Mutex<PathClassifier>>,
}

impl SchedulerObserver for WatchObserver {
    fn transition(&mut self, transition: &Transition) {
        self.progress.transition(transition);
    }

    fn job_started(&mut self, job: &Job) {
        self.progress.job_started(job);
    }

    fn job_finished(&mut self, result: &JobResult) {
        self.progress.job_finished(result);
    }

    fn graph_refreshed(&mut self, graph: &DependencyGraph) {
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(graph);
        self.progress.graph_refreshed(graph);
    }
}

/// Execute the watch command
pub async fn execute(workspace: Workspace, options: SchedulerOptions, config: &OutputConfig) -> Result<()> {
    let Workspace {
        root,
        settings,
        builder,
        graph,
    } = workspace;

    let (tx, rx) = mpsc::unbounded_channel();
    let classifier = PathClassifier::new(&root, builder.ignore().to_vec(), &graph)
        .with_extensions(settings.watch_extensions());
    let watcher = FsWatcher::start(&root, classifier, settings.debounce(), tx.clone())
        .context("Failed to start file watcher")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, waiting for running builds");
            let _ = tx.send(SchedulerEvent::Shutdown);
        }
    });

    if config.interactive() {
        println!("{} Watching {} (Ctrl-C to stop)", output::status::INFO, root.display());
    }

    let executor = process::with_deadline(ProcessExecutor::new(&root), options.timeout);
    let mut observer = WatchObserver {
        progress: ProgressObserver::new(*config, graph.len()),
        classifier: watcher.classifier(),
    };

    let report = Scheduler::new(graph, executor)
        .with_jobs(options.jobs)
        .with_builder(builder)
        .watch(rx, &mut observer)
        .await;
    observer.progress.finish();
    drop(watcher);

    output::print_report(&report, config)?;

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} module(s) failed");
    }
    Ok(())
}
