//! Files of a Markable Studio project.
//!
//! A project is a descriptor (`.mmax`) naming one base data file and any
//! number of levels. Each level has a markables file and optionally an
//! annotation scheme and a customization. All of these are XML; project
//! settings are TOML.
//!
//! # Features
//!
//! - **Tolerant level loading**: bad markables are reported and skipped
//! - **Backups**: the previous level file is kept as a timestamped `.bak`
//! - **Atomic writes**: temp file plus rename
//! - **Auto-save** driven by each level's dirty tracker
//!
//! # Example
//!
//! ```ignore
//! use mks_persistence::Project;
//!
//! let mut project = Project::open(Path::new("story.mmax"))?;
//! project.chart_mut().create_set("coref", "coref_class", &["markable_1", "markable_7"])?;
//! project.save_all()?;
//! ```

mod error;
mod io;
mod project;
mod settings;
mod xml;

pub use error::{PersistenceError, Result};
pub use io::{
    LevelDocument, LevelFile, MARKABLES_DOCTYPE, NAMESPACE_BASE, SaveOutcome, backup_path, load_customization,
    load_scheme, load_words, open_level, parse_customization, parse_level, parse_scheme, parse_words,
    read_level_file, render_level, render_scheme, render_words, write_file,
};
pub use project::{LevelEntry, PROJECT_EXTENSION, Project, ProjectDescriptor, parse_project};
pub use settings::{RelationSettings, SETTINGS_FILENAME, SaveSettings, Settings};
