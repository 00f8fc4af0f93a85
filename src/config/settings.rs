//! Workspace settings
//!
//! Reads optional overrides from `bleep.toml` at the workspace root.
//! Every field is optional; unset values fall back to [`crate::config::defaults`].
//!
//! ```toml
//! [workspace]
//! ignore = ["@build", "node_modules"]
//! exclude = ["tutor"]
//!
//! [planner]
//! scripts = ["compile", "dev"]
//!
//! [scheduler]
//! jobs = 4
//! timeout_secs = 600
//!
//! [watch]
//! debounce_ms = 300
//! extensions = [".ts", ".scss"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::defaults;
use crate::error::SettingsError;

/// Workspace settings loaded from `bleep.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Module discovery settings
    #[serde(default)]
    pub workspace: WorkspaceSettings,

    /// Command planning settings
    #[serde(default)]
    pub planner: PlannerSettings,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// File watching settings
    #[serde(default)]
    pub watch: WatchSettings,
}

/// Module discovery settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSettings {
    /// Directory names never walked into
    pub ignore: Option<Vec<String>>,

    /// Module names dropped from the graph
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Command planning settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerSettings {
    /// Script names planned per module, in order
    pub scripts: Option<Vec<String>>,

    /// Package manager wrapper executable
    pub package_manager: Option<String>,
}

/// Scheduler settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Worker pool size
    pub jobs: Option<usize>,

    /// Per-invocation deadline in seconds
    pub timeout_secs: Option<u64>,
}

/// File watching settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSettings {
    /// Debounce window in milliseconds
    pub debounce_ms: Option<u64>,

    /// File name suffixes that count as source changes
    pub extensions: Option<Vec<String>>,
}

impl Settings {
    /// Load settings from `<root>/bleep.toml`, or defaults if the file is absent
    pub fn load(root: &Path) -> Result<Self, SettingsError> {
        Self::load_from_path(&root.join(defaults::SETTINGS_FILE))
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let settings: Self = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;

        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.scheduler.jobs == Some(0) {
            return Err(SettingsError::Invalid {
                name: "scheduler.jobs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scheduler.timeout_secs == Some(0) {
            return Err(SettingsError::Invalid {
                name: "scheduler.timeout_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if matches!(&self.planner.scripts, Some(scripts) if scripts.is_empty()) {
            return Err(SettingsError::Invalid {
                name: "planner.scripts".to_string(),
                message: "must name at least one script".to_string(),
            });
        }
        Ok(())
    }

    /// Directory names skipped during discovery
    pub fn ignore_names(&self) -> Vec<String> {
        self.workspace.ignore.clone().unwrap_or_else(|| {
            defaults::IGNORE_NAMES
                .iter()
                .map(ToString::to_string)
                .collect()
        })
    }

    /// Script names to plan
    pub fn scripts(&self) -> Vec<String> {
        self.planner.scripts.clone().unwrap_or_else(|| {
            defaults::BUILD_SCRIPTS
                .iter()
                .map(ToString::to_string)
                .collect()
        })
    }

    /// Package manager wrapper
    pub fn package_manager(&self) -> &str {
        self.planner
            .package_manager
            .as_deref()
            .unwrap_or(defaults::PACKAGE_MANAGER)
    }

    /// Worker pool size
    pub fn jobs(&self) -> usize {
        self.scheduler.jobs.unwrap_or_else(defaults::default_jobs)
    }

    /// Per-invocation deadline, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.scheduler.timeout_secs.map(Duration::from_secs)
    }

    /// Debounce window for file change events
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(
            self.watch
                .debounce_ms
                .unwrap_or(defaults::WATCH_DEBOUNCE_MS),
        )
    }

    /// File name suffixes whose change retriggers a build
    pub fn watch_extensions(&self) -> Vec<String> {
        self.watch.extensions.clone().unwrap_or_else(|| {
            defaults::WATCH_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect()
        })
    }
}
