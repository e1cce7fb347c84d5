//! Dirty state of one level.

use std::time::Instant;

use super::AutoSaveConfig;

/// Tracks whether a level has unsaved edits.
///
/// Drives debounced auto-save and the per-level dirty flag shown by the CLI.
/// A failed save leaves the level dirty so the caller can retry.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    /// Whether the level has edits not yet written to disk.
    dirty: bool,

    /// When the most recent edit was made.
    last_change: Option<Instant>,

    /// When the first unsaved edit was made.
    /// Reset when saved.
    first_unsaved_change: Option<Instant>,

    /// Whether a save of the level is in progress.
    saving: bool,
}

impl DirtyTracker {
    /// Create a tracker with no unsaved edits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the level has unsaved edits.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Check if a save is in progress.
    #[inline]
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Record an edit.
    pub fn mark_dirty(&mut self) {
        let now = Instant::now();
        self.dirty = true;
        self.last_change = Some(now);

        // Only the first edit since the last save starts the max-delay clock.
        if self.first_unsaved_change.is_none() {
            self.first_unsaved_change = Some(now);
        }
    }

    /// Forget all pending edits, e.g. right after a load.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.saving = false;
        self.last_change = None;
        self.first_unsaved_change = None;
    }

    /// Mark that a save has started.
    pub fn start_save(&mut self) {
        self.saving = true;
    }

    /// Mark that the level file was written.
    pub fn save_complete(&mut self) {
        self.dirty = false;
        self.saving = false;
        self.first_unsaved_change = None;
    }

    /// Mark that a save has failed. The level stays dirty.
    pub fn save_failed(&mut self) {
        self.saving = false;
    }

    /// Milliseconds since the last edit.
    pub fn ms_since_last_change(&self) -> Option<u64> {
        self.last_change.map(|t| t.elapsed().as_millis() as u64)
    }

    /// Milliseconds since the first unsaved edit.
    pub fn ms_since_first_unsaved(&self) -> Option<u64> {
        self.first_unsaved_change
            .map(|t| t.elapsed().as_millis() as u64)
    }

    /// Check if the level is due for an auto-save under `config`.
    pub fn should_auto_save(&self, config: &AutoSaveConfig) -> bool {
        if !self.dirty || self.saving || !config.enabled {
            return false;
        }
        match (self.ms_since_last_change(), self.ms_since_first_unsaved()) {
            (Some(since_last), Some(since_first)) => config.should_save(since_last, since_first),
            _ => false,
        }
    }
}
