//! Module manifest (package.json) reading
//!
//! A directory is a module when it holds a manifest. The manifest names the
//! module's declared dependencies and its build scripts; nothing else in it
//! matters to the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::config::defaults;
use crate::error::ManifestError;

/// A module's manifest, immutable once read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique module name (the directory's base name)
    pub name: String,

    /// Declared dependency names, possibly naming third-party packages
    pub declared_deps: BTreeSet<String>,

    /// Script name -> raw command line
    pub scripts: BTreeMap<String, String>,
}

impl ModuleManifest {
    /// Create a manifest with no dependencies and no scripts
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_deps: BTreeSet::new(),
            scripts: BTreeMap::new(),
        }
    }

    /// Add a declared dependency
    #[must_use]
    pub fn with_dep(mut self, dep: impl Into<String>) -> Self {
        self.declared_deps.insert(dep.into());
        self
    }

    /// Add a script
    #[must_use]
    pub fn with_script(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), command.into());
        self
    }
}

/// Reads manifests from module directories
pub trait ManifestReader: Send + Sync {
    /// Read the manifest in `dir`
    ///
    /// Returns `Ok(None)` when `dir` is not a module. A manifest that exists
    /// but cannot be parsed is an error the caller reports without aborting.
    fn read(&self, dir: &Path) -> Result<Option<ModuleManifest>, ManifestError>;
}

/// Raw `package.json` shape; unknown keys are ignored
#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,

    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// [`ManifestReader`] for `package.json` manifests
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageJsonReader;

impl PackageJsonReader {
    /// Parse manifest text for the module named `name`
    pub fn parse(name: &str, content: &str) -> Result<ModuleManifest, serde_json::Error> {
        let pkg: PackageJson = serde_json::from_str(content)?;

        let declared_deps = pkg
            .dependencies
            .into_keys()
            .chain(pkg.dev_dependencies.into_keys())
            .collect();

        Ok(ModuleManifest {
            name: name.to_string(),
            declared_deps,
            scripts: pkg.scripts,
        })
    }
}

impl ManifestReader for PackageJsonReader {
    fn read(&self, dir: &Path) -> Result<Option<ModuleManifest>, ManifestError> {
        let path = dir.join(defaults::MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| ManifestError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;

        let name = module_name(dir);
        Self::parse(&name, &content)
            .map(Some)
            .map_err(|e| ManifestError::Parse {
                path,
                error: e.to_string(),
            })
    }
}

/// Module name for a directory (its base name)
pub fn module_name(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}
