//! End-of-run report
//!
//! Lists every module by terminal state. Failed modules carry their reason
//! chain: their own reason, followed by the root failure when they were
//! blocked by another module.

use serde::Serialize;
use std::time::Duration;

use crate::core::executor::JobResult;
use crate::core::queue::{BuildQueue, ModuleStatus};
use crate::core::state::{BuildState, Transition};

/// Final state of one module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    /// Module name
    pub name: String,
    /// State at the end of the run
    pub state: BuildState,
    /// Epoch at the end of the run
    pub epoch: u64,
    /// Number of dispatched runs
    pub runs: u32,
    /// Own reason, then the root cause for blocked modules
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Most recent completed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<JobResult>,
}

/// Result of a scheduling run
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Modules, by name
    pub modules: Vec<ModuleReport>,
    /// Every state transition, in order
    pub journal: Vec<Transition>,
}

impl BuildReport {
    /// Snapshot the queue
    pub fn new(queue: &BuildQueue) -> Self {
        let statuses = queue.statuses();
        let modules = statuses
            .iter()
            .map(|status| ModuleReport {
                name: status.name.clone(),
                state: status.state.clone(),
                epoch: status.epoch,
                runs: status.runs,
                reasons: reason_chain(&statuses, status),
                last_result: status.last_result.clone(),
            })
            .collect();

        Self {
            modules,
            journal: queue.journal().to_vec(),
        }
    }

    /// Look up a module
    pub fn module(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Modules that ended `Succeeded`
    pub fn succeeded(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules
            .iter()
            .filter(|m| m.state == BuildState::Succeeded)
    }

    /// Modules that ended `Failed`
    pub fn failed(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules
            .iter()
            .filter(|m| matches!(m.state, BuildState::Failed(_)))
    }

    /// Modules that never settled (only after a shutdown)
    pub fn unsettled(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules.iter().filter(|m| !m.state.is_terminal())
    }

    /// Whether any module failed
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Reason chain of `name`; empty unless it failed
    pub fn reason_chain(&self, name: &str) -> Vec<String> {
        self.module(name).map(|m| m.reasons.clone()).unwrap_or_default()
    }

    /// Sum of the last run's duration over all modules
    pub fn build_time(&self) -> Duration {
        self.modules
            .iter()
            .filter_map(|m| m.last_result.as_ref())
            .map(|r| r.duration)
            .sum()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn reason_chain(statuses: &[ModuleStatus], status: &ModuleStatus) -> Vec<String> {
    let BuildState::Failed(reason) = &status.state else {
        return Vec::new();
    };

    let mut chain = vec![reason.to_string()];
    if let Some(detail) = reason.detail() {
        chain.push(detail);
    }
    if let Some(root) = reason.blocked_by() {
        if let Some(BuildState::Failed(cause)) = statuses
            .iter()
            .find(|s| s.name == root)
            .map(|s| &s.state)
        {
            chain.push(format!("{root}: {cause}"));
        }
    }
    chain
}
