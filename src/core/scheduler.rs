//! Build coordinator
//!
//! One coordinating task owns the [`BuildQueue`] and is the only writer of
//! build state. A fixed pool of worker tasks takes [`Job`]s from a shared
//! channel, runs them through an [`Executor`] and sends [`JobResult`]s back.
//! Change notifications arrive as [`SchedulerEvent`]s.
//!
//! The coordinator only hands out a job when a worker slot is idle, so a
//! module in `Running` is always actually executing.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::defaults;
use crate::core::executor::{run_plan, Executor, Job, JobResult};
use crate::core::graph::{DependencyGraph, GraphBuilder};
use crate::core::queue::{BuildQueue, CompletionEffect};
use crate::core::report::BuildReport;
use crate::core::state::{QueueReason, Transition};

/// Input to a running scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A source file in the named module changed
    ModuleChanged(String),
    /// A manifest or bundler config in this module directory changed
    ManifestChanged(PathBuf),
    /// Stop dispatching, let running jobs finish, then return
    Shutdown,
}

/// Progress hook for presentation
///
/// All methods are called from the coordinator task, in order.
pub trait SchedulerObserver: Send {
    /// A module changed state
    fn transition(&mut self, _transition: &Transition) {}

    /// A job was handed to a worker
    fn job_started(&mut self, _job: &Job) {}

    /// A worker returned a result (before it is applied)
    fn job_finished(&mut self, _result: &JobResult) {}

    /// The graph was re-read after a manifest change
    fn graph_refreshed(&mut self, _graph: &DependencyGraph) {}
}

/// Observer that ignores everything
impl SchedulerObserver for () {}

/// One coordinator wake-up
enum Step {
    Finished(JobResult),
    Event(Option<SchedulerEvent>),
    Idle,
}

/// Drives a [`DependencyGraph`] to a settled state
pub struct Scheduler<E: Executor> {
    graph: DependencyGraph,
    executor: Arc<E>,
    builder: Option<GraphBuilder>,
    jobs: usize,
}

impl<E: Executor> Scheduler<E> {
    /// Create a scheduler with one worker per available CPU
    pub fn new(graph: DependencyGraph, executor: E) -> Self {
        Self {
            graph,
            executor: Arc::new(executor),
            builder: None,
            jobs: defaults::default_jobs(),
        }
    }

    /// Set the worker pool size (at least 1)
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Builder used to re-read modules on `ManifestChanged`
    #[must_use]
    pub fn with_builder(mut self, builder: GraphBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Build everything once and return when no work remains
    pub async fn run(self, observer: &mut dyn SchedulerObserver) -> BuildReport {
        self.drive(None, observer).await
    }

    /// Build, then keep reacting to `events` until `Shutdown` or the
    /// channel closes
    pub async fn watch(
        self,
        events: mpsc::UnboundedReceiver<SchedulerEvent>,
        observer: &mut dyn SchedulerObserver,
    ) -> BuildReport {
        self.drive(Some(events), observer).await
    }

    async fn drive(
        self,
        mut events: Option<mpsc::UnboundedReceiver<SchedulerEvent>>,
        observer: &mut dyn SchedulerObserver,
    ) -> BuildReport {
        let Self {
            mut graph,
            executor,
            builder,
            jobs,
        } = self;

        let mut queue = BuildQueue::new(&graph);
        let (job_tx, job_rx) = mpsc::channel::<Job>(jobs);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let workers: Vec<JoinHandle<()>> = (0..jobs)
            .map(|slot| spawn_worker(slot, Arc::clone(&executor), Arc::clone(&job_rx), result_tx.clone()))
            .collect();
        drop(result_tx);

        tracing::info!("Scheduling {} module(s) on {jobs} worker(s)", graph.len());

        let mut idle = jobs;
        let mut reported = 0;
        let mut draining = false;

        loop {
            if !draining {
                while idle > 0 {
                    let Some(job) = queue.dispatch() else {
                        break;
                    };
                    tracing::info!(module = %job.module, epoch = job.epoch, "Building {}", job.module);
                    observer.job_started(&job);
                    if job_tx.send(job).await.is_err() {
                        tracing::error!("Worker pool closed unexpectedly");
                        draining = true;
                        break;
                    }
                    idle -= 1;
                }
            }
            reported = flush_journal(&queue, reported, observer);

            let busy = idle < jobs;
            let listening = events.is_some() && !draining;
            if !busy && !listening {
                break;
            }

            let step = next_step(&mut result_rx, &mut events, busy, listening).await;

            match step {
                Step::Finished(result) => {
                    idle += 1;
                    observer.job_finished(&result);
                    let module = result.module.clone();
                    let elapsed = result.duration;
                    match queue.complete(result) {
                        CompletionEffect::Succeeded => {
                            tracing::info!(module = %module, "Built {module} in {:.1}s", elapsed.as_secs_f64());
                        }
                        CompletionEffect::Requeued => {
                            tracing::info!(module = %module, "{module} changed while building, rebuilding");
                        }
                        CompletionEffect::Failed | CompletionEffect::Ignored => {}
                    }
                }
                Step::Event(Some(SchedulerEvent::ModuleChanged(name))) => {
                    tracing::debug!(module = %name, "Change notification");
                    queue.retrigger(&name, QueueReason::FileChanged);
                }
                Step::Event(Some(SchedulerEvent::ManifestChanged(dir))) => {
                    let Some(builder) = &builder else {
                        tracing::warn!("Ignoring manifest change in {}: no graph builder", dir.display());
                        continue;
                    };
                    match builder.refresh(&graph, &dir) {
                        Ok(updated) => {
                            let changed = updated
                                .nodes()
                                .find(|n| n.working_dir == dir)
                                .map(|n| n.name().to_string())
                                .unwrap_or_default();
                            graph = updated;
                            queue.reconcile(&graph, &changed);
                            observer.graph_refreshed(&graph);
                        }
                        Err(e) => tracing::warn!("Failed to re-read {}: {e}", dir.display()),
                    }
                }
                Step::Event(Some(SchedulerEvent::Shutdown)) => {
                    tracing::info!("Shutting down after {} running job(s)", jobs - idle);
                    draining = true;
                }
                Step::Event(None) => {
                    tracing::debug!("Event channel closed");
                    events = None;
                }
                Step::Idle => {
                    tracing::error!("Workers stopped with {} job(s) outstanding", jobs - idle);
                    break;
                }
            }
        }

        flush_journal(&queue, reported, observer);
        drop(job_tx);
        futures::future::join_all(workers).await;

        BuildReport::new(&queue)
    }
}

fn spawn_worker<E: Executor>(
    slot: usize,
    executor: Arc<E>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::UnboundedSender<JobResult>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let job = jobs.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            let result = run_plan(&*executor, job).await;
            if results.send(result).is_err() {
                break;
            }
        }
        tracing::trace!(slot, "Worker exiting");
    })
}

/// Wait for the next thing to do
///
/// Finished jobs win over events so a completed build is recorded before a
/// change notification for the same module is applied.
async fn next_step(
    results: &mut mpsc::UnboundedReceiver<JobResult>,
    events: &mut Option<mpsc::UnboundedReceiver<SchedulerEvent>>,
    busy: bool,
    listening: bool,
) -> Step {
    tokio::select! {
        biased;
        Some(result) = results.recv(), if busy => Step::Finished(result),
        event = next_event(events), if listening => Step::Event(event),
        else => Step::Idle,
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<SchedulerEvent>>,
) -> Option<SchedulerEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Hand new journal entries to the observer; returns the new cursor
fn flush_journal(queue: &BuildQueue, from: usize, observer: &mut dyn SchedulerObserver) -> usize {
    let journal = queue.journal();
    for transition in &journal[from..] {
        observer.transition(transition);
    }
    journal.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::InvocationOutput;
    use crate::core::graph::ModuleNode;
    use crate::core::manifest::ModuleManifest;
    use crate::core::planner::Invocation;
    use crate::core::state::{BuildState, FailureReason};
    use crate::error::BuildError;
    use crate::test_utils::generators::single_step_plan;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// In-memory executor keyed by the module directory's base name
    #[derive(Clone, Default)]
    struct Scripted {
        failing: Arc<BTreeSet<String>>,
        gate: Option<Arc<Semaphore>>,
        started: Option<mpsc::UnboundedSender<String>>,
        log: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: Arc::new(names.iter().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }

        /// Runs block until the test adds permits; starts are reported
        fn gated() -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
            let gate = Arc::new(Semaphore::new(0));
            let (tx, rx) = mpsc::unbounded_channel();
            let executor = Self {
                gate: Some(Arc::clone(&gate)),
                started: Some(tx),
                ..Self::default()
            };
            (executor, gate, rx)
        }

        fn runs(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Executor for Scripted {
        fn execute(&self, invocation: Invocation) -> BoxFuture<'static, InvocationOutput> {
            let this = self.clone();
            async move {
                let module = invocation
                    .working_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                this.log.lock().unwrap().push(module.clone());
                if let Some(started) = &this.started {
                    let _ = started.send(module.clone());
                }
                if let Some(gate) = &this.gate {
                    gate.acquire().await.unwrap().forget();
                }
                if this.failing.contains(&module) {
                    InvocationOutput::failure(
                        &invocation,
                        BuildError::ExitStatus {
                            command: invocation.command_line(),
                            code: Some(2),
                        },
                        "error TS2304",
                    )
                } else {
                    InvocationOutput::success(&invocation, "done", Duration::from_millis(1))
                }
            }
            .boxed()
        }
    }

    fn node(name: &str, deps: &[&str]) -> ModuleNode {
        let manifest = deps
            .iter()
            .fold(ModuleManifest::new(name), |m, d| m.with_dep(*d));
        ModuleNode::new(manifest, format!("/ui/{name}")).with_plan(single_step_plan(name))
    }

    fn chain() -> DependencyGraph {
        DependencyGraph::from_nodes([node("a", &[]), node("b", &["a"]), node("c", &["b"])])
    }

    /// Sequence numbers at which `module` entered `Running`, with epochs
    fn starts(report: &BuildReport, module: &str) -> Vec<(u64, u64)> {
        report
            .journal
            .iter()
            .filter(|t| t.module == module && t.state == BuildState::Running)
            .map(|t| (t.seq, t.epoch))
            .collect()
    }

    #[derive(Default)]
    struct Counting {
        started: usize,
        finished: usize,
        transitions: usize,
    }

    impl SchedulerObserver for Counting {
        fn transition(&mut self, _transition: &Transition) {
            self.transitions += 1;
        }
        fn job_started(&mut self, _job: &Job) {
            self.started += 1;
        }
        fn job_finished(&mut self, _result: &JobResult) {
            self.finished += 1;
        }
    }

    #[tokio::test]
    async fn test_one_shot_builds_in_dependency_order() {
        let executor = Scripted::default();
        let graph = DependencyGraph::from_nodes([
            node("common", &[]),
            node("game", &["common"]),
            node("site", &[]),
            node("round", &["game", "site", "chessground"]),
        ]);
        let mut observer = Counting::default();

        let report = Scheduler::new(graph, executor.clone())
            .with_jobs(2)
            .run(&mut observer)
            .await;

        assert!(!report.has_failures());
        assert_eq!(report.succeeded().count(), 4);
        assert_eq!(observer.started, 4);
        assert_eq!(observer.finished, 4);
        assert_eq!(observer.transitions, report.journal.len());

        let runs = executor.runs();
        let position = |name: &str| runs.iter().position(|r| r == name).unwrap();
        assert!(position("common") < position("game"));
        assert!(position("game") < position("round"));
        assert!(position("site") < position("round"));
    }

    #[tokio::test]
    async fn test_failure_blocks_chain() {
        let executor = Scripted::failing(&["a"]);
        let report = Scheduler::new(chain(), executor.clone()).run(&mut ()).await;

        assert_eq!(executor.runs(), vec!["a"]);
        assert!(report.has_failures());
        assert_eq!(
            report.module("c").map(|m| &m.state),
            Some(&BuildState::Failed(FailureReason::BlockedBy("a".into())))
        );
        assert_eq!(
            report.reason_chain("c"),
            vec!["blocked by a".to_string(), "a: 'build a' exited with status 2".into()]
        );
    }

    #[tokio::test]
    async fn test_cycle_issues_no_invocations() {
        let executor = Scripted::default();
        let graph = DependencyGraph::from_nodes([
            node("a", &["c"]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("free", &[]),
        ]);

        let report = Scheduler::new(graph, executor.clone()).run(&mut ()).await;

        assert_eq!(executor.runs(), vec!["free"]);
        for name in ["a", "b", "c"] {
            assert_eq!(
                report.module(name).map(|m| &m.state),
                Some(&BuildState::Failed(FailureReason::DependencyCycle))
            );
        }
    }

    #[tokio::test]
    async fn test_retriggers_during_run_coalesce() {
        let (executor, gate, mut started) = Scripted::gated();
        let graph = DependencyGraph::from_nodes([node("m", &[])]);
        let (tx, rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler::new(graph, executor.clone()).with_jobs(2);
        let handle = tokio::spawn(async move { scheduler.watch(rx, &mut ()).await });

        assert_eq!(started.recv().await.as_deref(), Some("m"));
        tx.send(SchedulerEvent::ModuleChanged("m".into())).unwrap();
        tx.send(SchedulerEvent::ModuleChanged("m".into())).unwrap();
        gate.add_permits(10);

        assert_eq!(started.recv().await.as_deref(), Some("m"));
        tx.send(SchedulerEvent::Shutdown).unwrap();
        let report = handle.await.unwrap();

        assert_eq!(executor.runs(), vec!["m", "m"]);
        assert_eq!(starts(&report, "m").iter().map(|(_, e)| *e).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(report.module("m").map(|m| &m.state), Some(&BuildState::Succeeded));
    }

    #[tokio::test]
    async fn test_retrigger_rebuilds_dependents_in_order() {
        let (executor, gate, mut started) = Scripted::gated();
        let (tx, rx) = mpsc::unbounded_channel();
        gate.add_permits(3);

        let scheduler = Scheduler::new(chain(), executor.clone()).with_jobs(4);
        let handle = tokio::spawn(async move { scheduler.watch(rx, &mut ()).await });

        for expected in ["a", "b", "c"] {
            assert_eq!(started.recv().await.as_deref(), Some(expected));
        }
        tx.send(SchedulerEvent::ModuleChanged("a".into())).unwrap();
        gate.add_permits(3);
        for expected in ["a", "b", "c"] {
            assert_eq!(started.recv().await.as_deref(), Some(expected));
        }
        tx.send(SchedulerEvent::Shutdown).unwrap();
        let report = handle.await.unwrap();

        let (a, b, c) = (starts(&report, "a"), starts(&report, "b"), starts(&report, "c"));
        assert_eq!((a[1].1, b[1].1, c[1].1), (1, 1, 1));
        assert!(a[1].0 < b[1].0 && b[1].0 < c[1].0);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_closed_event_channel_ends_watch() {
        let executor = Scripted::default();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);

        let report = Scheduler::new(chain(), executor.clone()).watch(rx, &mut ()).await;
        assert_eq!(report.succeeded().count(), 3);
    }

    #[tokio::test]
    async fn test_manifest_change_adds_module() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        for name in ["a", "b"] {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }
        std::fs::write(root.join("a/package.json"), r#"{"scripts": {"dev": "tsc"}}"#).unwrap();
        std::fs::write(root.join("b/package.json"), r#"{"scripts": {"dev": "tsc"}}"#).unwrap();

        let builder = GraphBuilder::default();
        let graph = builder.build(root).unwrap();
        let (executor, gate, mut started) = Scripted::gated();
        gate.add_permits(100);
        let (tx, rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler::new(graph, executor.clone())
            .with_jobs(1)
            .with_builder(builder);
        let handle = tokio::spawn(async move { scheduler.watch(rx, &mut ()).await });
        for _ in 0..2 {
            started.recv().await.unwrap();
        }

        std::fs::create_dir_all(root.join("n")).unwrap();
        std::fs::write(
            root.join("n/package.json"),
            r#"{"dependencies": {"a": "*"}, "scripts": {"dev": "tsc"}}"#,
        )
        .unwrap();
        tx.send(SchedulerEvent::ManifestChanged(root.join("n"))).unwrap();

        assert_eq!(started.recv().await.as_deref(), Some("n"));
        tx.send(SchedulerEvent::Shutdown).unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report.module("n").map(|m| &m.state), Some(&BuildState::Succeeded));
        assert_eq!(executor.runs().iter().filter(|r| *r == "a").count(), 1);
    }

    fn finished(module: &str) -> JobResult {
        JobResult {
            module: module.to_string(),
            epoch: 0,
            outcome: Ok(()),
            outputs: vec![],
            duration: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_finished_jobs_are_handled_before_events() {
        let (result_tx, mut results) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut events = Some(event_rx);
        event_tx.send(SchedulerEvent::ModuleChanged("a".into())).unwrap();
        result_tx.send(finished("a")).unwrap();
        result_tx.send(finished("b")).unwrap();

        let mut order = Vec::new();
        for _ in 0..3 {
            match next_step(&mut results, &mut events, true, true).await {
                Step::Finished(result) => order.push(format!("done {}", result.module)),
                Step::Event(Some(SchedulerEvent::ModuleChanged(name))) => order.push(format!("changed {name}")),
                Step::Event(_) | Step::Idle => order.push("other".into()),
            }
        }

        assert_eq!(order, vec!["done a", "done b", "changed a"]);
    }

    #[tokio::test]
    async fn test_idle_when_nothing_to_wait_for() {
        let (_result_tx, mut results) = mpsc::unbounded_channel();
        let mut events = None;
        assert!(matches!(
            next_step(&mut results, &mut events, false, false).await,
            Step::Idle
        ));
    }

    mod properties {
        use super::*;
        use crate::test_utils::generators::acyclic_graph;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn test_every_module_settles(graph in acyclic_graph(10), jobs in 1usize..4) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let executor = Scripted::default();
                let report = runtime.block_on(
                    Scheduler::new(graph.clone(), executor.clone()).with_jobs(jobs).run(&mut ()),
                );

                prop_assert_eq!(report.succeeded().count(), graph.len());
                prop_assert_eq!(executor.runs().len(), graph.len());
            }
        }
    }
}
