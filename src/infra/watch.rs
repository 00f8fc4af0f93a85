//! File change notification
//!
//! [`FsWatcher`] watches the workspace recursively through a debounced
//! `notify` watcher and turns changed paths into [`SchedulerEvent`]s with a
//! [`PathClassifier`].

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::defaults;
use crate::core::graph::DependencyGraph;
use crate::core::scheduler::SchedulerEvent;
use crate::error::WatchError;
use crate::infra::walk;

/// Files whose change requires re-reading the module
const MODULE_CONFIG_FILES: &[&str] = &[
    defaults::MANIFEST_FILE,
    defaults::BUNDLE_CONFIG_FILE,
    defaults::TSCONFIG_FILE,
];

/// Maps changed paths to scheduler events
#[derive(Debug, Clone)]
pub struct PathClassifier {
    root: PathBuf,
    ignore: Vec<String>,
    /// Suffixes of files that count as sources
    extensions: Vec<String>,
    /// Module directories, deepest first
    modules: Vec<(PathBuf, String)>,
}

impl PathClassifier {
    /// Create a classifier for the modules of `graph`
    pub fn new(root: impl Into<PathBuf>, ignore: Vec<String>, graph: &DependencyGraph) -> Self {
        let mut classifier = Self {
            root: root.into(),
            ignore,
            extensions: defaults::WATCH_EXTENSIONS.iter().map(ToString::to_string).collect(),
            modules: Vec::new(),
        };
        classifier.update(graph);
        classifier
    }

    /// Replace the source file suffixes
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Pick up added or removed modules
    pub fn update(&mut self, graph: &DependencyGraph) {
        self.modules = graph
            .nodes()
            .map(|n| (n.working_dir.clone(), n.name().to_string()))
            .collect();
        self.modules
            .sort_by_key(|(dir, _)| std::cmp::Reverse(dir.components().count()));
    }

    /// Event for one changed path, if it concerns a module
    pub fn classify(&self, path: &Path) -> Option<SchedulerEvent> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let skipped = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|name| walk::is_skipped_name(name, &self.ignore));
        if skipped {
            return None;
        }

        let file_name = path.file_name()?.to_str()?;
        if MODULE_CONFIG_FILES.contains(&file_name) {
            let dir = path.parent()?;
            if dir == self.root {
                return None;
            }
            return Some(SchedulerEvent::ManifestChanged(dir.to_path_buf()));
        }
        // build outputs written next to sources must not retrigger the build
        if !self.extensions.iter().any(|ext| file_name.ends_with(ext.as_str())) {
            return None;
        }

        self.modules
            .iter()
            .find(|(dir, _)| path.starts_with(dir))
            .map(|(_, name)| SchedulerEvent::ModuleChanged(name.clone()))
    }

    /// Classify a batch, dropping duplicates
    pub fn classify_all<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        for event in paths.into_iter().filter_map(|p| self.classify(p)) {
            if !events.contains(&event) {
                events.push(event);
            }
        }
        events
    }
}

/// Recursive, debounced watcher of the workspace root
pub struct FsWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    classifier: Arc<Mutex<PathClassifier>>,
}

impl FsWatcher {
    /// Start watching `root`, sending classified events to `events`
    pub fn start(
        root: &Path,
        classifier: PathClassifier,
        debounce: Duration,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> Result<Self, WatchError> {
        let classifier = Arc::new(Mutex::new(classifier));
        let shared = Arc::clone(&classifier);

        let handler = move |result: DebounceEventResult| match result {
            Ok(batch) => {
                let classified = shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .classify_all(batch.iter().map(|e| e.path.as_path()));
                for event in classified {
                    tracing::debug!("Change: {event:?}");
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!("Watch error: {e:?}"),
        };

        let setup_error = |e: notify::Error| WatchError::Setup {
            path: root.to_path_buf(),
            error: e.to_string(),
        };
        let mut debouncer = new_debouncer(debounce, handler).map_err(setup_error)?;
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(setup_error)?;

        tracing::info!("Watching {} (debounce: {}ms)", root.display(), debounce.as_millis());
        Ok(Self {
            _debouncer: debouncer,
            classifier,
        })
    }

    /// Shared classifier, for updating after the graph changes
    pub fn classifier(&self) -> Arc<Mutex<PathClassifier>> {
        Arc::clone(&self.classifier)
    }
}
