//! Unsaved-change tracking for annotation levels.
//!
//! Provides:
//! - `DirtyTracker` - Tracks unsaved edits on one level with debounce timing
//! - `AutoSaveConfig` - User settings for auto-save behavior

mod config;
mod tracker;

pub use config::AutoSaveConfig;
pub use tracker::DirtyTracker;
