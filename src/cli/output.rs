//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status messages and the end-of-run report.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

use crate::core::executor::{Job, JobResult};
use crate::core::graph::DependencyGraph;
use crate::core::report::BuildReport;
use crate::core::scheduler::SchedulerObserver;
use crate::core::state::{BuildState, Transition};

/// Output settings from the global CLI flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Suppress all output except errors
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// Verbosity level (count of `-v`)
    pub verbose: u8,
}

impl OutputConfig {
    /// Create output settings
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Default `tracing` level for these flags
    pub fn log_directive(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, 2) => "debug",
            (false, _) => "trace",
        }
    }

    /// Whether human-readable progress should be shown
    pub fn interactive(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a progress bar for module builds
pub fn create_build_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} modules ({msg})")
    {
        pb.set_style(style.progress_chars("█▓▒░"));
    }
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Prefix every line of `text` with the module name
pub fn attribute(module: &str, text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("[{module}] {line}"))
        .collect()
}

/// Renders scheduler progress on a progress bar
pub struct ProgressObserver {
    bar: ProgressBar,
    config: OutputConfig,
    states: BTreeMap<String, BuildState>,
}

impl ProgressObserver {
    /// Create an observer for `modules` modules
    pub fn new(config: OutputConfig, modules: usize) -> Self {
        let bar = if config.interactive() {
            create_build_bar(modules as u64)
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            config,
            states: BTreeMap::new(),
        }
    }

    /// Remove the progress bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn print(&self, line: &str) {
        if self.bar.is_hidden() {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    fn refresh(&self) {
        let settled = self.states.values().filter(|s| s.is_terminal()).count();
        let running: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, s)| **s == BuildState::Running)
            .map(|(name, _)| name.as_str())
            .collect();
        self.bar.set_position(settled as u64);
        self.bar.set_message(if running.is_empty() {
            "idle".to_string()
        } else {
            running.join(", ")
        });
    }
}

impl SchedulerObserver for ProgressObserver {
    fn transition(&mut self, transition: &Transition) {
        if let BuildState::Failed(reason) = &transition.state {
            if !self.config.json && reason.blocked_by().is_none() {
                self.print(&format!("{} {}: {reason}", status::ERROR, transition.module));
            }
        }
        self.states
            .insert(transition.module.clone(), transition.state.clone());
        self.refresh();
    }

    fn job_started(&mut self, job: &Job) {
        if self.config.verbose > 0 && !self.config.json {
            let reasons: Vec<String> = job.reasons.iter().map(ToString::to_string).collect();
            self.print(&format!("{} {} ({})", status::INFO, job.module, reasons.join(", ")));
        }
    }

    fn job_finished(&mut self, result: &JobResult) {
        if self.config.json {
            return;
        }
        let show = result.outcome.is_err() || self.config.verbose > 0;
        if !show {
            return;
        }
        for output in &result.outputs {
            for line in attribute(&result.module, &output.stdout)
                .into_iter()
                .chain(attribute(&result.module, &output.stderr))
            {
                self.print(&line);
            }
        }
        if result.outcome.is_ok() && self.config.interactive() {
            self.print(&format!(
                "{} {} ({:.1}s)",
                status::SUCCESS,
                result.module,
                result.duration.as_secs_f64()
            ));
        }
    }

    fn graph_refreshed(&mut self, graph: &DependencyGraph) {
        self.states.retain(|name, _| graph.contains(name));
        self.bar.set_length(graph.len() as u64);
        self.refresh();
    }
}

/// Print the end-of-run report
pub fn print_report(report: &BuildReport, config: &OutputConfig) -> Result<()> {
    if config.json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    for module in report.failed() {
        eprintln!("{} {}", status::ERROR, module.name);
        for reason in &module.reasons {
            eprintln!("    {reason}");
        }
    }
    if config.quiet {
        return Ok(());
    }

    let unsettled: Vec<&str> = report.unsettled().map(|m| m.name.as_str()).collect();
    if !unsettled.is_empty() {
        println!("{} Not built: {}", status::WARNING, unsettled.join(", "));
    }

    let succeeded = report.succeeded().count();
    let failed = report.failed().count();
    if failed == 0 {
        println!("{} Build complete!", status::SUCCESS);
    } else {
        println!("{} Build finished with failures", status::ERROR);
    }
    println!("  Modules built: {succeeded}");
    if failed > 0 {
        println!("  Modules failed: {failed}");
    }
    println!("  Build time: {:.1}s", report.build_time().as_secs_f64());

    Ok(())
}

/// Print an error with its cause chain
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}
