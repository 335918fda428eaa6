//! Host configuration: where module storage, scripts and the bootstrap
//! override live.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// Directory layout for a deployment.
///
/// Only `data_dir` is required; the other directories default to
/// `<data_dir>/base`, `<data_dir>/modules` and `<data_dir>/scripts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub data_dir: PathBuf,

    /// Holds the bootstrap override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// One subdirectory per module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_dir: Option<PathBuf>,

    /// Script files runnable by name from the admin surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
}

impl HostConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            base_dir: None,
            modules_dir: None,
            scripts_dir: None,
        }
    }

    /// Read a JSON configuration file. Relative directories in the file are
    /// resolved against the file's parent directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: HostConfig = serde_json::from_str(&text)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))?;
        if let Some(parent) = path.parent() {
            config.resolve_relative_to(parent);
        }
        Ok(config)
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("base"))
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.modules_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("modules"))
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("scripts"))
    }

    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.modules_dir().join(module)
    }

    /// Create the base, modules and scripts directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.base_dir(), self.modules_dir(), self.scripts_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, root: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        resolve(&mut self.data_dir);
        for dir in [&mut self.base_dir, &mut self.modules_dir, &mut self.scripts_dir]
            .into_iter()
            .flatten()
        {
            resolve(dir);
        }
    }
}
