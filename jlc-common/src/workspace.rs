//! Workspace file locations.

use crate::config::{ConfigError, RunnerConfig};
use crate::sourcemap::{HierarchyNode, SourcemapError};
use std::path::{Path, PathBuf};

/// Sourcemap file name, relative to the workspace root.
pub const SOURCEMAP_FILE_NAME: &str = "sourcemap.json";

/// Run configuration file name, relative to the workspace root.
pub const CONFIG_FILE_NAME: &str = "jest-runner.toml";

/// A project directory holding the sourcemap and run configuration.
///
/// Both files are re-read on every access; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sourcemap_path(&self) -> PathBuf {
        self.root.join(SOURCEMAP_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn load_sourcemap(&self) -> Result<HierarchyNode, SourcemapError> {
        HierarchyNode::load(&self.sourcemap_path())
    }

    pub fn load_config(&self) -> Result<RunnerConfig, ConfigError> {
        RunnerConfig::load(&self.config_path())
    }

    /// Whether `path` names this workspace's sourcemap file.
    pub fn is_sourcemap(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name == SOURCEMAP_FILE_NAME)
    }
}
