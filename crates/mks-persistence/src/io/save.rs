//! Saving levels.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use mks_core::MarkableLevel;

use super::level::render_level;
use crate::error::{PersistenceError, Result};
use crate::settings::SaveSettings;

/// What a save request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing to write.
    Clean,
    /// The level is read-only; nothing was written.
    ReadOnly,
    Written { backup: Option<PathBuf> },
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// `<file name>.<timestamp>.bak` next to `path`.
pub fn backup_path(path: &Path, at: NaiveDateTime) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{}.bak", at.format("%Y%m%dT%H%M%S")))
}

/// A backup name not yet taken, for saves within the same second.
fn free_backup_path(path: &Path) -> PathBuf {
    let candidate = backup_path(path, Local::now().naive_local());
    if !candidate.exists() {
        return candidate;
    }
    let stem = candidate.with_extension("");
    (1..)
        .map(|n| PathBuf::from(format!("{}.{n}.bak", stem.display())))
        .find(|candidate| !candidate.exists())
        .unwrap_or(candidate)
}

/// Write `bytes` to `path`, through a temp file and rename when `atomic`.
pub fn write_file(path: &Path, bytes: &[u8], atomic: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PersistenceError::io("create directory", parent, e))?;
    }

    if !atomic {
        return fs::write(path, bytes).map_err(|e| PersistenceError::io("write", path, e));
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path).map_err(|e| PersistenceError::io("create", &temp_path, e))?;
    file.write_all(bytes)
        .map_err(|e| PersistenceError::io("write", &temp_path, e))?;
    file.sync_all()
        .map_err(|e| PersistenceError::io("sync", &temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| PersistenceError::AtomicWriteFailed {
        temp_path: temp_path.clone(),
        target_path: path.to_path_buf(),
        source: e,
    })
}

/// Levels that can be written back to their markables file.
pub trait LevelFile {
    /// Write the level if it has unsaved edits.
    ///
    /// An existing file is first renamed to a timestamped backup when
    /// `options.create_backups` is set. A failed save leaves the level dirty.
    fn save_markables(&mut self, path: &Path, options: &SaveSettings) -> Result<SaveOutcome>;
}

impl LevelFile for MarkableLevel {
    fn save_markables(&mut self, path: &Path, options: &SaveSettings) -> Result<SaveOutcome> {
        if !self.is_dirty() {
            tracing::debug!(level = self.name(), "Level is clean, not saving");
            return Ok(SaveOutcome::Clean);
        }
        if self.is_read_only() {
            tracing::warn!(level = self.name(), "Level is read-only, not saving");
            return Ok(SaveOutcome::ReadOnly);
        }

        self.dirty_tracker_mut().start_save();
        match write_level(self, path, options) {
            Ok(backup) => {
                self.dirty_tracker_mut().save_complete();
                tracing::info!(level = self.name(), markables = self.len(), "Saved level to {}", path.display());
                Ok(SaveOutcome::Written { backup })
            }
            Err(e) => {
                self.dirty_tracker_mut().save_failed();
                tracing::error!(level = self.name(), "Saving to {} failed: {e}", path.display());
                Err(e)
            }
        }
    }
}

fn write_level(level: &MarkableLevel, path: &Path, options: &SaveSettings) -> Result<Option<PathBuf>> {
    let bytes = render_level(level)?;
    let backup = if options.create_backups && path.exists() {
        let backup = free_backup_path(path);
        fs::rename(path, &backup).map_err(|e| PersistenceError::io("back up", path, e))?;
        tracing::debug!("Backed up {} to {}", path.display(), backup.display());
        Some(backup)
    } else {
        None
    };
    write_file(path, &bytes, options.atomic_writes)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use mks_core::{IdAllocator, MarkableRecord};
    use mks_model::{AnnotationScheme, DiscourseIndex, Fragment, TokenRecord};
    use tempfile::tempdir;

    fn level() -> MarkableLevel {
        let discourse =
            DiscourseIndex::new((1..=4).map(|i| TokenRecord::new(format!("word_{i}"), format!("w{i}")))).unwrap();
        let mut level = MarkableLevel::new("coref", Arc::new(discourse), AnnotationScheme::default());
        level.create_markables(vec![MarkableRecord::new("markable_1", "word_1..word_2")]);
        level
    }

    #[test]
    fn backup_name_carries_timestamp() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        assert_eq!(
            backup_path(Path::new("/data/coref_level.xml"), at),
            PathBuf::from("/data/coref_level.xml.20240309T140507.bak")
        );
    }

    #[test]
    fn clean_level_is_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coref.xml");
        let mut level = level();
        let outcome = level.save_markables(&path, &SaveSettings::default()).unwrap();
        assert_eq!(outcome, SaveOutcome::Clean);
        assert!(!path.exists());
    }

    #[test]
    fn read_only_level_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coref.xml");
        let mut level = level();
        let mut ids = IdAllocator::new();
        level
            .add_markable(&mut ids, &[Fragment::new(["word_3"]).unwrap()], Vec::<(String, String)>::new())
            .unwrap();
        level.mark_read_only("level name mismatch");

        let outcome = level.save_markables(&path, &SaveSettings::default()).unwrap();
        assert_eq!(outcome, SaveOutcome::ReadOnly);
        assert!(level.is_dirty());
        assert!(!path.exists());
    }

    #[test]
    fn dirty_level_is_written_and_backed_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coref.xml");
        fs::write(&path, "old").unwrap();

        let mut level = level();
        let mut ids = IdAllocator::new();
        level
            .add_markable(&mut ids, &[Fragment::new(["word_3"]).unwrap()], Vec::<(String, String)>::new())
            .unwrap();

        let outcome = level.save_markables(&path, &SaveSettings::default()).unwrap();
        let SaveOutcome::Written { backup: Some(backup) } = outcome else {
            panic!("expected a backup, got {outcome:?}");
        };
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old");
        assert!(fs::read_to_string(&path).unwrap().contains("mmax_level=\"coref\""));
        assert!(!level.is_dirty());

        // A second save right away is a no-op.
        assert_eq!(level.save_markables(&path, &SaveSettings::default()).unwrap(), SaveOutcome::Clean);
    }

    #[test]
    fn failed_write_keeps_level_dirty() {
        let dir = tempdir().unwrap();
        // A directory where the file should go.
        let path = dir.path().join("coref.xml");
        fs::create_dir(&path).unwrap();

        let mut level = level();
        let mut ids = IdAllocator::new();
        level
            .add_markable(&mut ids, &[Fragment::new(["word_4"]).unwrap()], Vec::<(String, String)>::new())
            .unwrap();
        let options = SaveSettings {
            create_backups: false,
            atomic_writes: false,
        };
        assert!(level.save_markables(&path, &options).is_err());
        assert!(level.is_dirty());
    }
}
