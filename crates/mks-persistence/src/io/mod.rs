//! File formats and save handling.
//!
//! Every format is XML except the settings file:
//! - base data (`<words>`)
//! - markable levels (`<markables>`)
//! - annotation schemes (`<annotationscheme>`)
//! - level customizations (`<customization>`)

mod customization;
mod level;
mod save;
mod scheme;
mod words;

use std::fs;
use std::path::Path;

use crate::error::{PersistenceError, Result};

pub use customization::{load_customization, parse_customization};
pub use level::{
    LevelDocument, MARKABLES_DOCTYPE, NAMESPACE_BASE, open_level, parse_level, read_level_file, render_level,
};
pub use save::{LevelFile, SaveOutcome, backup_path, write_file};
pub use scheme::{load_scheme, parse_scheme, render_scheme};
pub use words::{load_words, parse_words, render_words};

pub(crate) fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PersistenceError::io("read", path, e))
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}
