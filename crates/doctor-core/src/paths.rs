use crate::error::{DoctorError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and directory names under the Claude home
// ---------------------------------------------------------------------------

pub const SETTINGS_FILE: &str = "settings.json";
pub const MEMORY_FILE: &str = "CLAUDE.md";
pub const MARKETPLACES_DIR: &str = "plugins/marketplaces";
pub const PLUGIN_CACHE_DIR: &str = "plugins/cache";
pub const DEBUG_DIR: &str = "debug";
pub const PROJECTS_DIR: &str = "projects";

// ---------------------------------------------------------------------------
// ClaudePaths
// ---------------------------------------------------------------------------

/// The on-disk layout this tool diagnoses, resolved once per process.
#[derive(Debug, Clone)]
pub struct ClaudePaths {
    pub home: PathBuf,
}

impl ClaudePaths {
    /// Resolve the Claude home directory.
    ///
    /// Priority: explicit path (`--claude-home` / `CLAUDE_HOME`), then
    /// `~/.claude`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Ok(Self {
                home: p.to_path_buf(),
            });
        }
        let home = home::home_dir().ok_or(DoctorError::HomeNotFound)?;
        Ok(Self {
            home: home.join(".claude"),
        })
    }

    pub fn settings(&self) -> PathBuf {
        self.home.join(SETTINGS_FILE)
    }

    pub fn memory(&self) -> PathBuf {
        self.home.join(MEMORY_FILE)
    }

    pub fn marketplaces_dir(&self) -> PathBuf {
        self.home.join(MARKETPLACES_DIR)
    }

    pub fn plugin_cache_dir(&self) -> PathBuf {
        self.home.join(PLUGIN_CACHE_DIR)
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.home.join(DEBUG_DIR)
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.home.join(PROJECTS_DIR)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
