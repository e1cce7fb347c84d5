//! Project settings, stored as TOML next to the project file.
//!
//! ```toml
//! [relations]
//! purge_singleton_sets = true
//! none_value = "none"
//!
//! [saving]
//! create_backups = true
//! atomic_writes = true
//!
//! [autosave]
//! enabled = false
//! debounce_ms = 5000
//! max_delay_ms = 60000
//! ```

use std::fs;
use std::path::Path;

use mks_core::AutoSaveConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};

/// File name looked up next to a project file.
pub const SETTINGS_FILENAME: &str = "markable-studio.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationSettings {
    /// Dissolve sets left with a single member.
    pub purge_singleton_sets: bool,
    /// Value of a relation attribute that points nowhere.
    pub none_value: String,
}

impl Default for RelationSettings {
    fn default() -> Self {
        Self {
            purge_singleton_sets: true,
            none_value: mks_model::DEFAULT_NONE_VALUE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    /// Rename the previous file to a timestamped `.bak` before writing.
    pub create_backups: bool,
    pub atomic_writes: bool,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            create_backups: true,
            atomic_writes: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relations: RelationSettings,
    pub saving: SaveSettings,
    pub autosave: AutoSaveConfig,
}

impl Settings {
    /// Load settings, failing on unreadable or malformed files.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PersistenceError::io("read", path, e))?;
        let settings = toml::from_str(&content).map_err(|e| PersistenceError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from `path` if it exists, defaults otherwise.
    ///
    /// A broken file is reported and replaced by defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            tracing::warn!("{e}, using defaults");
            Self::default()
        })
    }

    /// Settings for the project at `project_path`.
    pub fn for_project(project_path: &Path) -> Self {
        let dir = project_path.parent().unwrap_or_else(|| Path::new(""));
        Self::load_or_default(&dir.join(SETTINGS_FILENAME))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| PersistenceError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        crate::io::write_file(path, content.as_bytes(), self.saving.atomic_writes)?;
        tracing::info!("Saved settings to {}", path.display());
        Ok(())
    }
}
