//! Auto-save configuration.

use serde::{Deserialize, Serialize};

/// Configuration for auto-saving dirty levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Whether auto-save is enabled.
    pub enabled: bool,

    /// Quiet period after the last edit before a level is saved.
    pub debounce_ms: u64,

    /// Upper bound on how long an edit may stay unsaved while edits keep
    /// arriving.
    pub max_delay_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 5_000,
            max_delay_ms: 60_000,
        }
    }
}

impl AutoSaveConfig {
    /// An enabled config with the default timings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Decide from the time since the last edit and the time since the first
    /// unsaved edit.
    pub fn should_save(&self, since_last_change_ms: u64, since_first_unsaved_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }
        since_last_change_ms >= self.debounce_ms || since_first_unsaved_ms >= self.max_delay_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let config = AutoSaveConfig::default();
        assert!(!config.enabled);
        assert!(!config.should_save(100_000, 100_000));
    }

    #[test]
    fn debounce_and_max_delay() {
        let config = AutoSaveConfig::enabled();
        assert!(!config.should_save(1_000, 1_000));
        assert!(config.should_save(5_000, 5_000));
        // Edits keep arriving, but the first one is too old.
        assert!(config.should_save(200, 61_000));
    }
}
