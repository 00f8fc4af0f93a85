//! Command planning
//!
//! Expands a module's build scripts into concrete [`Invocation`]s. Parsing and
//! normalization happen once per module per scheduling epoch; execution never
//! looks at raw script text.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::manifest::ModuleManifest;
use crate::error::PlanError;

/// One external process to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Program to execute
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Working directory (the module's directory)
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Create an invocation from a token list (`program arg...`)
    ///
    /// Returns `None` for an empty token list.
    pub fn from_tokens(tokens: Vec<String>, working_dir: &Path) -> Option<Self> {
        let mut tokens = tokens.into_iter();
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
            working_dir: working_dir.to_path_buf(),
        })
    }

    /// Shell-like rendering for logs and reports
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|token| {
                if token.is_empty() || token.contains(char::is_whitespace) {
                    format!("'{token}'")
                } else {
                    token.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Invocations planned from one script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationGroup {
    /// Script name the group was planned from
    pub script: String,
    /// Sub-commands, in order
    pub invocations: Vec<Invocation>,
}

/// Ordered invocation groups for one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    /// Groups, in execution order
    pub groups: Vec<InvocationGroup>,
}

impl BuildPlan {
    /// An empty plan (module is complete without running anything)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether nothing needs to run
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.invocations.is_empty())
    }

    /// All invocations across groups, in order
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.groups.iter().flat_map(|g| g.invocations.iter())
    }

    /// Number of invocations
    pub fn len(&self) -> usize {
        self.invocations().count()
    }

    /// Multi-line rendering, one `script: command` line per invocation
    pub fn display(&self) -> String {
        self.groups
            .iter()
            .flat_map(|g| {
                g.invocations
                    .iter()
                    .map(move |inv| format!("{}: {}", g.script, inv.command_line()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Planner settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Script names to plan, in order
    pub scripts: Vec<String>,
    /// Sub-command separator
    pub separator: String,
    /// Token removed from every argument list
    pub exec_path_placeholder: String,
    /// Package manager wrapper
    pub package_manager: String,
    /// Package-script runner program
    pub script_runner: String,
    /// Bundler program
    pub bundler: String,
    /// Flag making the bundler apply every configured target
    pub bundler_all_targets_flag: String,
    /// Type-checker program
    pub type_checker: String,
    /// Type-checker incremental flag
    pub incremental_flag: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            scripts: defaults::BUILD_SCRIPTS.iter().map(ToString::to_string).collect(),
            separator: defaults::COMMAND_SEPARATOR.to_string(),
            exec_path_placeholder: defaults::EXEC_PATH_PLACEHOLDER.to_string(),
            package_manager: defaults::PACKAGE_MANAGER.to_string(),
            script_runner: defaults::SCRIPT_RUNNER.to_string(),
            bundler: defaults::BUNDLER.to_string(),
            bundler_all_targets_flag: defaults::BUNDLER_ALL_TARGETS_FLAG.to_string(),
            type_checker: defaults::TYPE_CHECKER.to_string(),
            incremental_flag: defaults::TYPE_CHECKER_INCREMENTAL_FLAG.to_string(),
        }
    }
}

impl PlannerConfig {
    /// Set the script names to plan
    #[must_use]
    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Set the package manager wrapper
    #[must_use]
    pub fn with_package_manager(mut self, package_manager: impl Into<String>) -> Self {
        self.package_manager = package_manager.into();
        self
    }
}

/// Translates module scripts into invocation plans
#[derive(Debug, Clone, Default)]
pub struct CommandPlanner {
    config: PlannerConfig,
}

impl CommandPlanner {
    /// Create a planner with the given settings
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Planner settings
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan a module's build
    ///
    /// Each configured script present in the manifest becomes one group. A
    /// module with none of the scripts gets an empty plan.
    pub fn plan(&self, manifest: &ModuleManifest, working_dir: &Path) -> Result<BuildPlan, PlanError> {
        let mut groups = Vec::new();

        for script in &self.config.scripts {
            let Some(text) = manifest.scripts.get(script) else {
                continue;
            };

            let invocations = split_commands(text, &self.config.separator)?
                .into_iter()
                .map(|tokens| {
                    let tokens = self.normalize(tokens);
                    Invocation::from_tokens(tokens, working_dir)
                        .ok_or_else(|| PlanError::EmptyCommand { script: text.clone() })
                })
                .collect::<Result<Vec<_>, _>>()?;

            tracing::debug!(
                module = %manifest.name,
                script = %script,
                "Planned {} invocation(s)",
                invocations.len()
            );
            groups.push(InvocationGroup {
                script: script.clone(),
                invocations,
            });
        }

        Ok(BuildPlan { groups })
    }

    /// Apply the tool compatibility rules to one sub-command
    ///
    /// Rules run in a fixed order and re-applying them is a no-op.
    pub fn normalize(&self, tokens: Vec<String>) -> Vec<String> {
        let cfg = &self.config;
        let mut tokens: Vec<String> = tokens
            .into_iter()
            .filter(|t| *t != cfg.exec_path_placeholder)
            .collect();

        if tokens.first() == Some(&cfg.script_runner) {
            tokens.insert(0, cfg.package_manager.clone());
        }

        let effective = self.effective_program(&tokens).map(str::to_string);

        if effective.as_deref() == Some(cfg.bundler.as_str())
            && !tokens.contains(&cfg.bundler_all_targets_flag)
        {
            tokens.push(cfg.bundler_all_targets_flag.clone());
        }

        if effective.as_deref() == Some(cfg.type_checker.as_str())
            && !tokens.contains(&cfg.incremental_flag)
        {
            tokens.push(cfg.incremental_flag.clone());
        }

        // the bundler binary lives in the workspace tool dir, reachable through the wrapper
        if tokens.first() == Some(&cfg.bundler) {
            tokens.insert(0, cfg.package_manager.clone());
        }

        tokens
    }

    /// Program the sub-command actually runs, looking through the wrapper
    fn effective_program<'a>(&self, tokens: &'a [String]) -> Option<&'a str> {
        match tokens {
            [wrapper, inner, ..] if *wrapper == self.config.package_manager => Some(inner.as_str()),
            [program, ..] => Some(program.as_str()),
            [] => None,
        }
    }
}

/// Split script text into sub-commands, each tokenized on whitespace
///
/// Single or double quotes group text containing spaces into one token; the
/// separator is only recognized outside quotes.
pub fn split_commands(script: &str, separator: &str) -> Result<Vec<Vec<String>>, PlanError> {
    let mut commands: Vec<Vec<String>> = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut rest = script;

    if script.trim().is_empty() {
        return Ok(commands);
    }

    while let Some(c) = rest.chars().next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if !separator.is_empty() && rest.starts_with(separator) {
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            }
            if tokens.is_empty() {
                return Err(PlanError::EmptyCommand {
                    script: script.to_string(),
                });
            }
            commands.push(std::mem::take(&mut tokens));
            rest = &rest[separator.len()..];
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                in_token = true;
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
        rest = &rest[c.len_utf8()..];
    }

    if let Some(quote) = quote {
        return Err(PlanError::UnterminatedQuote {
            script: script.to_string(),
            quote,
        });
    }
    if in_token {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(PlanError::EmptyCommand {
            script: script.to_string(),
        });
    }
    commands.push(tokens);

    Ok(commands)
}
