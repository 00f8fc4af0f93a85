//! Default configuration values

/// Manifest file that marks a directory as a module
pub const MANIFEST_FILE: &str = "package.json";

/// Bundler configuration file inside a module
pub const BUNDLE_CONFIG_FILE: &str = "rollup.config.mjs";

/// Type-checker configuration file inside a module
pub const TSCONFIG_FILE: &str = "tsconfig.json";

/// Optional workspace settings file at the root
pub const SETTINGS_FILE: &str = "bleep.toml";

/// Directory names never treated as modules or walked into
pub const IGNORE_NAMES: &[&str] = &[
    "@build",
    "@types",
    "_watch",
    "build",
    "dist",
    "node_modules",
];

/// Scripts planned for each module, in order
pub const BUILD_SCRIPTS: &[&str] = &["dev"];

/// Token separating sub-commands inside a script
pub const COMMAND_SEPARATOR: &str = "&&";

/// Placeholder for the package manager's own executable path
pub const EXEC_PATH_PLACEHOLDER: &str = "$npm_execpath";

/// Package manager wrapper used for script runners and tool binaries
pub const PACKAGE_MANAGER: &str = "yarn";

/// Program name of a package-script runner invocation
pub const SCRIPT_RUNNER: &str = "run";

/// Bundler binary
pub const BUNDLER: &str = "rollup";

/// Bundler flag applying every configured target
pub const BUNDLER_ALL_TARGETS_FLAG: &str = "--config-all";

/// Type-checker binary
pub const TYPE_CHECKER: &str = "tsc";

/// Type-checker incremental-mode flag
pub const TYPE_CHECKER_INCREMENTAL_FLAG: &str = "--incremental";

/// Workspace-relative directory holding installed tool binaries
pub const TOOL_BIN_DIR: &str = "node_modules/.bin";

/// Debounce window for file change events (milliseconds)
pub const WATCH_DEBOUNCE_MS: u64 = 300;

/// File name suffixes whose change retriggers a module's build
///
/// Build outputs (`.js`, `.tsbuildinfo`, `.css`) are left out so a build
/// does not retrigger itself.
pub const WATCH_EXTENSIONS: &[&str] = &[".ts", ".json", ".mjs", ".tsconfig", ".scss"];

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;

/// Default number of parallel build jobs (available parallelism)
pub fn default_jobs() -> usize {
    num_cpus::get().max(1)
}
