//! Scheduling state machine
//!
//! [`BuildQueue`] owns every module's [`BuildState`], epoch and pending work.
//! It is synchronous and does no I/O; the async coordinator in
//! [`crate::core::scheduler`] drives it with dispatches, completions and
//! change notifications.
//!
//! ```text
//! Pending -> Queued -> Running -> Succeeded
//!    ^                    |   \-> Failed
//!    |                    |
//!    +-- retrigger -------+ (dirty while Running: re-queued on completion)
//! ```
//!
//! Invariants:
//! - a module is admitted (`Pending -> Queued`) only when every dependency
//!   is `Succeeded`
//! - a module is `Running` in at most one slot; retriggers during a run set
//!   a dirty flag and never start a second run
//! - a failure marks every transitive dependent `Failed(BlockedBy(..))`
//!   without queueing it
//! - a queued item whose epoch is no longer current is discarded at dispatch

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::core::executor::{Job, JobResult};
use crate::core::graph::DependencyGraph;
use crate::core::planner::BuildPlan;
use crate::core::state::{BuildState, FailureReason, QueueReason, Transition, WorkItem};

/// Scheduler-owned record for one module
#[derive(Debug, Clone)]
struct ModuleEntry {
    state: BuildState,
    epoch: u64,
    dependencies: BTreeSet<String>,
    dependents: BTreeSet<String>,
    plan: Arc<BuildPlan>,
    exclusion: Option<FailureReason>,
    /// Reasons gathered for the next run
    reasons: BTreeSet<QueueReason>,
    /// Retriggers received while `Running`
    dirty: Option<BTreeSet<QueueReason>>,
    runs: u32,
    last_result: Option<JobResult>,
}

impl ModuleEntry {
    fn from_graph(graph: &DependencyGraph, name: &str) -> Option<Self> {
        let node = graph.get(name)?;
        Some(Self {
            state: BuildState::Pending,
            epoch: 0,
            dependencies: node.dependencies.clone(),
            dependents: node.dependents.clone(),
            plan: Arc::new(node.build_plan.clone()),
            exclusion: graph.exclusions().get(name).cloned(),
            reasons: BTreeSet::from([QueueReason::Initial]),
            dirty: None,
            runs: 0,
            last_result: None,
        })
    }
}

/// Snapshot of one module for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    /// Module name
    pub name: String,
    /// Current state
    pub state: BuildState,
    /// Current epoch
    pub epoch: u64,
    /// Number of dispatched runs
    pub runs: u32,
    /// Result of the most recent completed run
    pub last_result: Option<JobResult>,
}

/// What a completion did to the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEffect {
    /// Result accepted; module is now `Succeeded`
    Succeeded,
    /// Result accepted; module and its dependents failed
    Failed,
    /// Module was dirtied mid-run and went straight back to the queue
    Requeued,
    /// Result belonged to a superseded epoch or removed module
    Ignored,
}

/// What a retrigger did to the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetriggerEffect {
    /// Module reset to `Pending` at a new epoch
    Reset,
    /// Module is running; a rerun was recorded
    MarkedDirty,
    /// Module already waiting; reasons merged
    Coalesced,
    /// Module is not in the graph
    Unknown,
}

/// Outcome of checking a `Pending` module against its dependencies
enum Admission {
    Wait,
    Fail(FailureReason),
    /// Nothing to run
    Skip,
    Queue,
}

/// Dependency-aware work queue
#[derive(Debug, Default)]
pub struct BuildQueue {
    entries: BTreeMap<String, ModuleEntry>,
    queue: VecDeque<WorkItem>,
    journal: Vec<Transition>,
    next_seq: u64,
}

impl BuildQueue {
    /// Create the queue for a freshly built graph
    ///
    /// Excluded modules start `Failed` and block their dependents. Every
    /// other module starts `Pending`, then admission runs once over the whole
    /// graph.
    pub fn new(graph: &DependencyGraph) -> Self {
        let mut queue = Self::default();

        for name in graph.names() {
            if let Some(entry) = ModuleEntry::from_graph(graph, name) {
                queue.entries.insert(name.to_string(), entry);
            }
        }
        let order = graph.topological_order();
        for name in &order {
            queue.record(name);
        }

        queue.evaluate_all(&order);
        queue
    }

    /// Current state of a module
    pub fn state(&self, name: &str) -> Option<&BuildState> {
        self.entries.get(name).map(|e| &e.state)
    }

    /// Current epoch of a module
    pub fn epoch(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|e| e.epoch)
    }

    /// Whether any module is queued or running
    pub fn has_work(&self) -> bool {
        self.entries
            .values()
            .any(|e| matches!(e.state, BuildState::Queued | BuildState::Running))
    }

    /// Whether every module is `Succeeded` or `Failed`
    pub fn is_settled(&self) -> bool {
        self.entries.values().all(|e| e.state.is_terminal())
    }

    /// Number of modules currently running
    pub fn running(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == BuildState::Running)
            .count()
    }

    /// Modules stuck in `Pending`
    pub fn pending(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state == BuildState::Pending)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every state change so far, in order
    pub fn journal(&self) -> &[Transition] {
        &self.journal
    }

    /// Per-module snapshot, by name
    pub fn statuses(&self) -> Vec<ModuleStatus> {
        self.entries
            .iter()
            .map(|(name, e)| ModuleStatus {
                name: name.clone(),
                state: e.state.clone(),
                epoch: e.epoch,
                runs: e.runs,
                last_result: e.last_result.clone(),
            })
            .collect()
    }

    /// Take the next runnable item, marking its module `Running`
    ///
    /// Items whose epoch has been superseded are discarded on the way.
    pub fn dispatch(&mut self) -> Option<Job> {
        while let Some(item) = self.queue.pop_front() {
            let Some(entry) = self.entries.get_mut(&item.module) else {
                tracing::debug!(module = %item.module, "Discarding work item for removed module");
                continue;
            };
            if entry.state != BuildState::Queued || entry.epoch != item.epoch {
                tracing::debug!(
                    module = %item.module,
                    epoch = item.epoch,
                    current = entry.epoch,
                    "Discarding stale work item"
                );
                continue;
            }

            entry.state = BuildState::Running;
            entry.runs += 1;
            let job = Job {
                module: item.module.clone(),
                epoch: entry.epoch,
                reasons: std::mem::take(&mut entry.reasons),
                plan: Arc::clone(&entry.plan),
            };
            self.record(&item.module);
            return Some(job);
        }
        None
    }

    /// Apply a worker's result
    pub fn complete(&mut self, result: JobResult) -> CompletionEffect {
        let name = result.module.clone();
        let Some(entry) = self.entries.get_mut(&name) else {
            tracing::debug!(module = %name, "Ignoring result for removed module");
            return CompletionEffect::Ignored;
        };
        if entry.state != BuildState::Running || entry.epoch != result.epoch {
            tracing::debug!(module = %name, epoch = result.epoch, "Ignoring stale result");
            return CompletionEffect::Ignored;
        }

        let outcome = result.outcome.clone();
        entry.last_result = Some(result);

        if let Some(reasons) = entry.dirty.take() {
            entry.epoch += 1;
            entry.state = BuildState::Pending;
            entry.reasons = reasons;
            self.record(&name);
            self.invalidate_dependents(&name);
            self.evaluate(&name);
            return CompletionEffect::Requeued;
        }

        match outcome {
            Ok(()) => {
                self.succeed(&name);
                CompletionEffect::Succeeded
            }
            Err(err) => {
                self.fail(&name, FailureReason::Build(err));
                CompletionEffect::Failed
            }
        }
    }

    /// React to a change in module `name`
    pub fn retrigger(&mut self, name: &str, reason: QueueReason) -> RetriggerEffect {
        let effect = self.mark(name, reason);
        if effect == RetriggerEffect::Reset {
            self.evaluate(name);
        }
        effect
    }

    /// Record a change without running admission
    fn mark(&mut self, name: &str, reason: QueueReason) -> RetriggerEffect {
        let Some(entry) = self.entries.get_mut(name) else {
            return RetriggerEffect::Unknown;
        };

        match entry.state {
            BuildState::Running => {
                entry.dirty.get_or_insert_with(BTreeSet::new).insert(reason);
                tracing::debug!(module = %name, epoch = entry.epoch, "Marked dirty while running");
                RetriggerEffect::MarkedDirty
            }
            BuildState::Queued => {
                entry.reasons.insert(reason);
                let epoch = entry.epoch;
                if let Some(item) = self
                    .queue
                    .iter_mut()
                    .find(|i| i.module == name && i.epoch == epoch)
                {
                    item.reasons.insert(reason);
                }
                RetriggerEffect::Coalesced
            }
            BuildState::Pending => {
                entry.reasons.insert(reason);
                RetriggerEffect::Coalesced
            }
            BuildState::Succeeded | BuildState::Failed(_) => {
                entry.epoch += 1;
                entry.state = BuildState::Pending;
                entry.reasons = BTreeSet::from([reason]);
                self.record(name);
                self.invalidate_dependents(name);
                RetriggerEffect::Reset
            }
        }
    }

    /// Adopt a re-read graph after a manifest change in `changed`
    ///
    /// New modules start `Pending`, removed ones are dropped, and every module
    /// whose exclusion appeared, disappeared or changed is retriggered along
    /// with `changed` itself.
    pub fn reconcile(&mut self, graph: &DependencyGraph, changed: &str) {
        let removed: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !graph.contains(name))
            .cloned()
            .collect();
        for name in &removed {
            tracing::info!(module = %name, "Module removed from graph");
            self.entries.remove(name);
        }
        self.queue.retain(|item| !removed.contains(&item.module));

        let mut touched: BTreeSet<String> = BTreeSet::new();
        for node in graph.nodes() {
            let name = node.name();
            let exclusion = graph.exclusions().get(name).cloned();
            match self.entries.get_mut(name) {
                Some(entry) => {
                    entry.dependencies = node.dependencies.clone();
                    entry.dependents = node.dependents.clone();
                    if *entry.plan != node.build_plan {
                        entry.plan = Arc::new(node.build_plan.clone());
                    }
                    if entry.exclusion != exclusion {
                        entry.exclusion = exclusion;
                        touched.insert(name.to_string());
                    }
                }
                None => {
                    if let Some(entry) = ModuleEntry::from_graph(graph, name) {
                        tracing::info!(module = %name, "Module added to graph");
                        self.entries.insert(name.to_string(), entry);
                        self.record(name);
                    }
                }
            }
        }
        if self.entries.contains_key(changed) {
            touched.insert(changed.to_string());
        }

        for name in &touched {
            self.mark(name, QueueReason::FileChanged);
        }

        // edges may have changed under queued items; re-admit them
        let queued: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == BuildState::Queued)
            .map(|(name, _)| name.clone())
            .collect();
        for name in queued {
            if let Some(entry) = self.entries.get_mut(&name) {
                entry.epoch += 1;
                entry.state = BuildState::Pending;
                self.record(&name);
            }
        }

        self.evaluate_all(&graph.topological_order());
    }

    /// Admission: move `name` out of `Pending` if its dependencies allow it
    fn evaluate(&mut self, name: &str) {
        let Some(entry) = self.entries.get(name) else {
            return;
        };
        if entry.state != BuildState::Pending {
            return;
        }

        match self.admission(entry) {
            Admission::Wait => {}
            Admission::Fail(reason) => self.fail(name, reason),
            Admission::Skip => self.succeed(name),
            Admission::Queue => {
                let Some(entry) = self.entries.get_mut(name) else {
                    return;
                };
                entry.state = BuildState::Queued;
                self.queue.push_back(WorkItem {
                    module: name.to_string(),
                    epoch: entry.epoch,
                    reasons: entry.reasons.clone(),
                });
                self.record(name);
            }
        }
    }

    fn admission(&self, entry: &ModuleEntry) -> Admission {
        if let Some(reason) = &entry.exclusion {
            return Admission::Fail(reason.clone());
        }

        let mut ready = true;
        for dep in &entry.dependencies {
            match self.entries.get(dep).map(|d| &d.state) {
                Some(BuildState::Succeeded) | None => {}
                Some(BuildState::Failed(reason)) => {
                    let root = reason.blocked_by().unwrap_or(dep).to_string();
                    return Admission::Fail(FailureReason::BlockedBy(root));
                }
                Some(_) => ready = false,
            }
        }

        if !ready {
            Admission::Wait
        } else if entry.plan.is_empty() {
            Admission::Skip
        } else {
            Admission::Queue
        }
    }

    fn evaluate_all(&mut self, order: &[String]) {
        for name in order {
            self.evaluate(name);
        }
    }

    fn succeed(&mut self, name: &str) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        entry.state = BuildState::Succeeded;
        let dependents: Vec<String> = entry.dependents.iter().cloned().collect();
        self.record(name);

        for dependent in dependents {
            self.evaluate(&dependent);
        }
    }

    /// Mark `name` failed and block everything downstream of it
    fn fail(&mut self, name: &str, reason: FailureReason) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        let root = reason.blocked_by().unwrap_or(name).to_string();
        tracing::warn!(module = %name, epoch = entry.epoch, "Failed: {reason}");
        entry.state = BuildState::Failed(reason);
        self.record(name);

        for dependent in self.downstream(name) {
            let Some(entry) = self.entries.get_mut(&dependent) else {
                continue;
            };
            match entry.state {
                BuildState::Running => {
                    entry
                        .dirty
                        .get_or_insert_with(BTreeSet::new)
                        .insert(QueueReason::DependencyChanged);
                }
                // keeps the module that failed first
                BuildState::Failed(_) => {}
                BuildState::Queued | BuildState::Pending | BuildState::Succeeded => {
                    if entry.state == BuildState::Queued {
                        entry.epoch += 1;
                    }
                    // excluded modules report their own reason, never the upstream one
                    let reason = entry
                        .exclusion
                        .clone()
                        .unwrap_or_else(|| FailureReason::BlockedBy(root.clone()));
                    entry.state = BuildState::Failed(reason);
                    self.record(&dependent);
                }
            }
        }
    }

    /// Reset everything downstream of `name` to `Pending` at a new epoch
    fn invalidate_dependents(&mut self, name: &str) {
        for dependent in self.downstream(name) {
            let Some(entry) = self.entries.get_mut(&dependent) else {
                continue;
            };
            if entry.state == BuildState::Running {
                entry
                    .dirty
                    .get_or_insert_with(BTreeSet::new)
                    .insert(QueueReason::DependencyChanged);
                continue;
            }
            if entry.state != BuildState::Pending && entry.state != BuildState::Queued {
                entry.reasons.clear();
            }
            entry.epoch += 1;
            entry.state = BuildState::Pending;
            entry.reasons.insert(QueueReason::DependencyChanged);
            self.record(&dependent);
        }
    }

    /// Transitive dependents of `name`, nearest first
    fn downstream(&self, name: &str) -> Vec<String> {
        let mut seen: BTreeSet<&str> = BTreeSet::from([name]);
        let mut order = Vec::new();
        let mut frontier: VecDeque<&str> = VecDeque::from([name]);

        while let Some(current) = frontier.pop_front() {
            let Some(entry) = self.entries.get(current) else {
                continue;
            };
            for dependent in &entry.dependents {
                if seen.insert(dependent) {
                    order.push(dependent.clone());
                    frontier.push_back(dependent);
                }
            }
        }

        order
    }

    fn record(&mut self, name: &str) {
        let Some(entry) = self.entries.get(name) else {
            return;
        };
        tracing::debug!(module = %name, epoch = entry.epoch, "-> {}", entry.state);
        self.next_seq += 1;
        self.journal.push(Transition {
            seq: self.next_seq,
            module: name.to_string(),
            epoch: entry.epoch,
            state: entry.state.clone(),
        });
    }
}
