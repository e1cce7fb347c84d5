//! Core data definitions for Markable Studio.
//!
//! - `discourse` - tokens and the position index
//! - `span` - fragments and span expressions
//! - `scheme` - annotation scheme attribute definitions
//! - `attributes` - attribute dictionaries

pub mod attributes;
pub mod discourse;
pub mod error;
pub mod scheme;
pub mod span;

pub use attributes::AttributeMap;
pub use discourse::{DiscourseElement, DiscourseIndex, TokenRecord};
pub use error::{ModelError, Result};
pub use scheme::{AnnotationScheme, AttributeIssue, AttributeKind, DEFAULT_NONE_VALUE, SchemeAttribute};
pub use span::{
    Fragment, fragments_from_positions, normalize_fragments, parse_span, positions_of_fragments,
    serialize_span,
};
