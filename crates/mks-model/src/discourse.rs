//! The discourse: the loaded token sequence and its positional index.
//!
//! Every token gets a dense, 0-based discourse position in document order.
//! Positions are the only ordering used for span contiguity and for the
//! comparators elsewhere in the workspace. Display coordinates come from a
//! plain layout where tokens are separated by a single space.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A token as read from base data, before positions are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl TokenRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A loaded token. Immutable for the lifetime of the discourse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscourseElement {
    pub id: String,
    pub text: String,
    pub position: usize,
    pub attributes: BTreeMap<String, String>,
}

/// Ordered tokens plus the maps between token ID, position and display offset.
#[derive(Debug, Clone, Default)]
pub struct DiscourseIndex {
    elements: Vec<DiscourseElement>,
    positions: HashMap<String, usize>,
    /// Display start offset (in chars) of each token, indexed by position.
    display_starts: Vec<usize>,
}

impl DiscourseIndex {
    /// Build the index from tokens in document order.
    pub fn new(tokens: impl IntoIterator<Item = TokenRecord>) -> Result<Self> {
        let mut elements = Vec::new();
        let mut positions = HashMap::new();
        let mut display_starts = Vec::new();
        let mut offset = 0usize;

        for (position, token) in tokens.into_iter().enumerate() {
            if positions.insert(token.id.clone(), position).is_some() {
                return Err(ModelError::DuplicateToken(token.id));
            }
            if position > 0 {
                offset += 1;
            }
            display_starts.push(offset);
            offset += token.text.chars().count();
            elements.push(DiscourseElement {
                id: token.id,
                text: token.text,
                position,
                attributes: token.attributes,
            });
        }

        Ok(Self {
            elements,
            positions,
            display_starts,
        })
    }

    /// Number of tokens.
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Discourse position of a token.
    pub fn discourse_position_of(&self, token_id: &str) -> Result<usize> {
        self.positions
            .get(token_id)
            .copied()
            .ok_or_else(|| ModelError::TokenNotFound(token_id.to_string()))
    }

    /// Whether the token belongs to this discourse.
    pub fn contains(&self, token_id: &str) -> bool {
        self.positions.contains_key(token_id)
    }

    /// Token ID at a position, `None` when out of range.
    pub fn token_id_at(&self, position: usize) -> Option<&str> {
        self.elements.get(position).map(|e| e.id.as_str())
    }

    pub fn element_at(&self, position: usize) -> Option<&DiscourseElement> {
        self.elements.get(position)
    }

    pub fn element(&self, token_id: &str) -> Result<&DiscourseElement> {
        let position = self.discourse_position_of(token_id)?;
        Ok(&self.elements[position])
    }

    pub fn elements(&self) -> impl Iterator<Item = &DiscourseElement> {
        self.elements.iter()
    }

    /// Display offset of the first char of the token at `position`.
    pub fn display_start(&self, position: usize) -> Option<usize> {
        self.display_starts.get(position).copied()
    }

    /// Display offset one past the last char of the token at `position`.
    pub fn display_end(&self, position: usize) -> Option<usize> {
        let start = self.display_start(position)?;
        Some(start + self.elements[position].text.chars().count())
    }

    /// Token position covering a display offset.
    ///
    /// Offsets that fall on a separator or past the end map to `None`.
    pub fn position_at_display_offset(&self, offset: usize) -> Option<usize> {
        let candidate = match self.display_starts.binary_search(&offset) {
            Ok(position) => position,
            Err(0) => return None,
            Err(insert_at) => insert_at - 1,
        };
        let end = self.display_end(candidate)?;
        (offset < end).then_some(candidate)
    }

    /// The full display text (tokens separated by single spaces).
    pub fn display_text(&self) -> String {
        let mut text = String::new();
        for (idx, element) in self.elements.iter().enumerate() {
            if idx > 0 {
                text.push(' ');
            }
            text.push_str(&element.text);
        }
        text
    }

    /// Resolve token IDs to sorted, deduplicated positions.
    pub fn positions_of<S: AsRef<str>>(&self, token_ids: &[S]) -> Result<Vec<usize>> {
        let mut positions = token_ids
            .iter()
            .map(|id| self.discourse_position_of(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        positions.sort_unstable();
        positions.dedup();
        Ok(positions)
    }
}
