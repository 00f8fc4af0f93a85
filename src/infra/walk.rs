//! Module tree traversal
//!
//! Yields candidate module directories under a workspace root. Hidden
//! directories and ignore-listed names are pruned together with everything
//! below them.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::GraphError;

/// Whether a directory name is hidden or ignore-listed
pub fn is_skipped_name(name: &str, ignore: &[String]) -> bool {
    name.starts_with('.') || ignore.iter().any(|i| i == name)
}

fn is_skipped(entry: &DirEntry, ignore: &[String]) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| is_skipped_name(name, ignore))
}

/// Candidate module directories below `root`, in sorted path order
///
/// `root` itself is included only when `include_root` is set (used when
/// re-reading a single module's subtree). Unreadable directories are logged
/// and skipped.
pub fn candidate_dirs(
    root: &Path,
    ignore: &[String],
    include_root: bool,
) -> Result<Vec<PathBuf>, GraphError> {
    if !root.is_dir() {
        return Err(GraphError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_skipped(e, ignore)));

    let mut dirs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable path: {e}");
                continue;
            }
        };
        if !entry.file_type().is_dir() || (entry.depth() == 0 && !include_root) {
            continue;
        }
        dirs.push(entry.into_path());
    }

    Ok(dirs)
}

/// Lexically normalize a path (resolve `.` and `..` without touching disk)
pub fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
