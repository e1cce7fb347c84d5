//! Markable engine for Markable Studio.
//!
//! This crate keeps markables, their per-level indices and their relations
//! consistent under editing:
//!
//! - `markable` - a single span with derived positions
//! - `level` - one annotation layer with token, boundary and order indices
//! - `relation` - sets and pointers driven by attribute values
//! - `chart` - all levels of a discourse plus ID allocation
//! - `query` - attribute filters and results
//! - `customization` - per-level display styles
//! - `autosave` - dirty tracking and auto-save timing

pub mod autosave;
pub mod chart;
pub mod customization;
pub mod error;
pub mod ids;
pub mod level;
pub mod markable;
pub mod query;
pub mod relation;

pub use autosave::{AutoSaveConfig, DirtyTracker};
pub use chart::{LevelFilter, MarkableChart, ReorderDirection};
pub use customization::{Customization, RenderStyle, StyleRule};
pub use error::{CoreError, Result};
pub use ids::{IdAllocator, MARKABLE_ID_PREFIX, SET_ID_PREFIX, numeric_suffix};
pub use level::{
    LEVEL_REFERENCE_SEPARATOR, LevelStatus, LoadIssue, LoadIssueKind, LoadReport, MarkableLevel, MarkableRecord,
};
pub use markable::{Markable, discourse_order};
pub use query::{AttributeFilter, MarkableQuery, QueryHit, QueryResult};
pub use relation::{
    MarkablePointer, MarkableRelation, MarkableSet, POINTER_TARGET_SEPARATOR, RelationKind, parse_pointer_targets,
};
