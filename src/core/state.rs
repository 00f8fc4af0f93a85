//! Per-module build state
//!
//! These values are owned by the scheduler's coordinator. Workers never see
//! them; they only receive an immutable plan and hand back a result.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::BuildError;

/// Build state of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BuildState {
    /// Waiting for dependencies
    Pending,
    /// Admitted to the dispatch queue
    Queued,
    /// Executing in a worker slot
    Running,
    /// Last run finished successfully
    Succeeded,
    /// Excluded, failed or blocked
    Failed(FailureReason),
}

impl BuildState {
    /// Whether the module has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    /// Short state label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Why a module ended up `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Member of a dependency cycle
    DependencyCycle,
    /// Build script could not be tokenized
    InvalidBuildScript(String),
    /// Manifest or bundler config could not be parsed
    InvalidManifest(String),
    /// An invocation failed or could not be run
    Build(BuildError),
    /// A transitive dependency failed; names the module that failed first
    BlockedBy(String),
}

impl FailureReason {
    /// Module at the root of a blocked chain, if this is a cascade failure
    pub fn blocked_by(&self) -> Option<&str> {
        match self {
            Self::BlockedBy(module) => Some(module),
            _ => None,
        }
    }

    /// Extra detail beyond the short reason
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::InvalidBuildScript(detail) | Self::InvalidManifest(detail) => {
                Some(detail.clone())
            }
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyCycle => f.write_str("dependency cycle"),
            Self::InvalidBuildScript(_) => f.write_str("invalid build script"),
            Self::InvalidManifest(_) => f.write_str("invalid manifest"),
            Self::Build(err) => write!(f, "{err}"),
            Self::BlockedBy(module) => write!(f, "blocked by {module}"),
        }
    }
}

/// Why a module was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueReason {
    /// First build of the run
    Initial,
    /// An upstream module was rebuilt
    DependencyChanged,
    /// A file in the module changed
    FileChanged,
}

impl fmt::Display for QueueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::DependencyChanged => write!(f, "dependency changed"),
            Self::FileChanged => write!(f, "file changed"),
        }
    }
}

/// A queued request to build one module at one epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Module to build
    pub module: String,
    /// Epoch the item was created for
    pub epoch: u64,
    /// Coalesced reasons
    pub reasons: BTreeSet<QueueReason>,
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Global sequence number, strictly increasing
    pub seq: u64,
    /// Module that changed
    pub module: String,
    /// Module epoch after the change
    pub epoch: u64,
    /// New state
    pub state: BuildState,
}
