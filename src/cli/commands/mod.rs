//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod graph;
pub mod plan;
pub mod watch;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::output::{self, OutputConfig};
use crate::config::Settings;
use crate::core::graph::{DependencyGraph, GraphBuilder};
use crate::core::planner::{CommandPlanner, PlannerConfig};
use crate::error::GraphError;

/// Workspace selection shared by all commands
#[derive(Args, Debug, Clone)]
pub struct WorkspaceArgs {
    /// Workspace root containing the modules
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Build script to run per module, repeatable (default: dev)
    #[arg(short, long = "script", value_name = "NAME")]
    pub scripts: Vec<String>,
}

/// Scheduling options for `build` and `watch`
#[derive(Args, Debug, Clone, Default)]
pub struct SchedulerArgs {
    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Fail invocations running longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build every module once, in dependency order
    Build {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        #[command(flatten)]
        scheduler: SchedulerArgs,
    },

    /// Build, then rebuild modules and their dependents on change
    Watch {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        #[command(flatten)]
        scheduler: SchedulerArgs,
    },

    /// Show the module dependency graph
    Graph {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Output Graphviz DOT
        #[arg(long)]
        dot: bool,
    },

    /// Show the planned build invocations
    Plan {
        /// Only show this module
        module: Option<String>,

        #[command(flatten)]
        workspace: WorkspaceArgs,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, output: &OutputConfig) -> Result<()> {
        match self {
            Self::Build {
                workspace,
                scheduler,
            } => {
                let workspace = Workspace::discover(&workspace, output)?;
                let options = SchedulerOptions::resolve(&scheduler, &workspace.settings);
                build::execute(workspace, options, output).await
            }
            Self::Watch {
                workspace,
                scheduler,
            } => {
                let workspace = Workspace::discover(&workspace, output)?;
                let options = SchedulerOptions::resolve(&scheduler, &workspace.settings);
                watch::execute(workspace, options, output).await
            }
            Self::Graph { workspace, dot } => {
                let workspace = Workspace::load(&workspace)?;
                graph::execute(&workspace.graph, dot, output)
            }
            Self::Plan { module, workspace } => {
                let workspace = Workspace::load(&workspace)?;
                plan::execute(&workspace.graph, module.as_deref(), output)
            }
        }
    }
}

/// A discovered workspace: settings, graph and the builder that made it
pub struct Workspace {
    /// Canonical workspace root
    pub root: PathBuf,
    /// Settings from `bleep.toml`
    pub settings: Settings,
    /// Builder configured from settings and flags
    pub builder: GraphBuilder,
    /// Module graph
    pub graph: DependencyGraph,
}

impl Workspace {
    /// Read settings and build the graph for `args.root`
    pub fn load(args: &WorkspaceArgs) -> Result<Self> {
        let root = args
            .root
            .canonicalize()
            .map_err(|_| GraphError::RootNotFound {
                path: args.root.clone(),
            })?;
        let settings = Settings::load(&root).context("Failed to load settings")?;
        let builder = graph_builder(&settings, &args.scripts);
        let graph = builder
            .build(&root)
            .with_context(|| format!("Failed to discover modules in {}", root.display()))?;

        Ok(Self {
            root,
            settings,
            builder,
            graph,
        })
    }

    /// [`Workspace::load`] behind a spinner when output is interactive
    pub fn discover(args: &WorkspaceArgs, config: &OutputConfig) -> Result<Self> {
        let workspace = if config.interactive() {
            let spinner = output::create_spinner("Discovering modules...");
            let workspace = Self::load(args);
            spinner.finish_and_clear();
            workspace?
        } else {
            Self::load(args)?
        };

        for (name, reason) in workspace.graph.exclusions() {
            tracing::warn!(module = %name, "Excluded from the build: {reason}");
        }
        Ok(workspace)
    }
}

/// Graph builder for the settings, with CLI scripts taking precedence
pub fn graph_builder(settings: &Settings, scripts: &[String]) -> GraphBuilder {
    let scripts = if scripts.is_empty() {
        settings.scripts()
    } else {
        scripts.to_vec()
    };
    let planner = CommandPlanner::new(
        PlannerConfig::default()
            .with_scripts(scripts)
            .with_package_manager(settings.package_manager()),
    );

    GraphBuilder::new(planner)
        .with_ignore(settings.ignore_names())
        .with_exclude(settings.workspace.exclude.clone())
}

/// Effective scheduling options (flags over settings over defaults)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Worker pool size
    pub jobs: usize,
    /// Per-invocation deadline
    pub timeout: Option<Duration>,
}

impl SchedulerOptions {
    /// Merge CLI flags with settings
    pub fn resolve(args: &SchedulerArgs, settings: &Settings) -> Self {
        Self {
            jobs: args.jobs.unwrap_or_else(|| settings.jobs()).max(1),
            timeout: args
                .timeout
                .map(Duration::from_secs)
                .or_else(|| settings.timeout()),
        }
    }
}
