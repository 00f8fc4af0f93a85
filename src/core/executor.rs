//! Worker execution contract
//!
//! Workers are stateless: they receive an immutable [`Job`] snapshot, run its
//! invocations in order and hand back a [`JobResult`]. The process-backed
//! implementation lives in [`crate::infra::process`].

use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::planner::{BuildPlan, Invocation};
use crate::core::state::QueueReason;
use crate::error::BuildError;

/// A dispatched build of one module at one epoch
#[derive(Debug, Clone)]
pub struct Job {
    /// Module being built
    pub module: String,
    /// Epoch the job belongs to
    pub epoch: u64,
    /// Why the module was queued
    pub reasons: BTreeSet<QueueReason>,
    /// Invocations to run
    pub plan: Arc<BuildPlan>,
}

/// Result of running one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationOutput {
    /// Rendered command line
    pub command: String,
    /// `Ok` on exit status 0
    pub status: Result<(), BuildError>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration
    pub duration: Duration,
}

impl InvocationOutput {
    /// Output for a successful invocation
    pub fn success(invocation: &Invocation, stdout: impl Into<String>, duration: Duration) -> Self {
        Self {
            command: invocation.command_line(),
            status: Ok(()),
            stdout: stdout.into(),
            stderr: String::new(),
            duration,
        }
    }

    /// Output for a failed invocation
    pub fn failure(invocation: &Invocation, error: BuildError, stderr: impl Into<String>) -> Self {
        Self {
            command: invocation.command_line(),
            status: Err(error),
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
        }
    }
}

/// Result of running a whole job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    /// Module that was built
    pub module: String,
    /// Epoch of the job
    pub epoch: u64,
    /// First failure, if any
    pub outcome: Result<(), BuildError>,
    /// Per-invocation results, up to and including the first failure
    pub outputs: Vec<InvocationOutput>,
    /// Total wall-clock duration
    pub duration: Duration,
}

/// Runs single invocations
pub trait Executor: Send + Sync + 'static {
    /// Run `invocation` to completion
    ///
    /// Never fails: spawn problems are reported through
    /// [`InvocationOutput::status`].
    fn execute(&self, invocation: Invocation) -> BoxFuture<'static, InvocationOutput>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, invocation: Invocation) -> BoxFuture<'static, InvocationOutput> {
        (**self).execute(invocation)
    }
}

/// Run a job's invocations in order, stopping at the first failure
pub async fn run_plan<E: Executor + ?Sized>(executor: &E, job: Job) -> JobResult {
    let started = Instant::now();
    let mut outputs = Vec::with_capacity(job.plan.len());
    let mut outcome = Ok(());

    for invocation in job.plan.invocations() {
        tracing::debug!(module = %job.module, epoch = job.epoch, "$ {invocation}");
        let output = executor.execute(invocation.clone()).await;
        let failed = output.status.clone().err();
        outputs.push(output);

        if let Some(err) = failed {
            outcome = Err(err);
            break;
        }
    }

    JobResult {
        module: job.module,
        epoch: job.epoch,
        outcome,
        outputs,
        duration: started.elapsed(),
    }
}
