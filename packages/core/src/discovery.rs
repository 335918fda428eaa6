//! Module discovery in the module storage root.
//!
//! Every readable directory directly under the root is a module, named after
//! the directory. Anything else is skipped with a warning.

use std::io;
use std::path::{Component, Path};

use walkdir::WalkDir;

use crate::error::{Result, RuntimeError};

/// List module names under `root`, sorted.
///
/// The root is enumerated once. Failing to read the root itself is an
/// error; unreadable entries below it are skipped.
pub fn discover_modules(root: &Path) -> Result<Vec<String>> {
    let discovery = |source: io::Error| RuntimeError::Discovery {
        path: root.to_path_buf(),
        source,
    };

    let mut modules = Vec::new();
    for entry in WalkDir::new(root).max_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let message = e.to_string();
                return Err(discovery(
                    e.into_io_error().unwrap_or_else(|| io::Error::other(message)),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable module entry");
                continue;
            }
        };

        if entry.depth() == 0 {
            if !entry.file_type().is_dir() {
                return Err(discovery(io::Error::other("not a directory")));
            }
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type().is_dir() {
            tracing::warn!(module = %name, "skipping module entry: not a directory");
            continue;
        }
        if let Err(e) = std::fs::read_dir(entry.path()) {
            tracing::warn!(module = %name, error = %e, "skipping module entry: unreadable");
            continue;
        }
        if validate_module_name(&name).is_err() {
            tracing::warn!(module = %name, "skipping module entry: invalid name");
            continue;
        }
        modules.push(name);
    }

    modules.sort();
    Ok(modules)
}

/// A module name must be exactly one normal path component.
pub fn validate_module_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == name && !name.contains('\\') => Ok(()),
        _ => Err(RuntimeError::InvalidModuleName(name.to_string())),
    }
}
