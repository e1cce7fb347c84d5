//! A single annotated span.
//!
//! A markable keeps its covered positions as the source of truth and derives
//! everything else (fragments, extremes, display spans) from them in one step.
//! Structural changes go through the owning [`MarkableLevel`], which
//! re-registers the markable in its indices.
//!
//! [`MarkableLevel`]: crate::level::MarkableLevel

use std::cmp::Ordering;

use serde::Serialize;

use mks_model::{AttributeMap, DiscourseIndex, Fragment, fragments_from_positions, serialize_span};

/// Sort key for discourse order: start, then shorter extent, then fewer
/// tokens, then ID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct OrderKey {
    leftmost: usize,
    rightmost: usize,
    size: usize,
    id: String,
}

impl OrderKey {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn leftmost(&self) -> usize {
        self.leftmost
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Markable {
    id: String,
    level: String,
    fragments: Vec<Fragment>,
    attributes: AttributeMap,
    #[serde(skip)]
    in_search_result: bool,
    #[serde(skip)]
    positions: Vec<usize>,
    #[serde(skip)]
    display_spans: Vec<(usize, usize)>,
}

impl Markable {
    /// `positions` must be sorted, deduplicated and non-empty.
    pub(crate) fn new(
        id: String,
        level: String,
        positions: Vec<usize>,
        attributes: AttributeMap,
        discourse: &DiscourseIndex,
    ) -> Self {
        let mut markable = Self {
            id,
            level,
            fragments: Vec::new(),
            attributes,
            in_search_result: false,
            positions: Vec::new(),
            display_spans: Vec::new(),
        };
        markable.set_positions(positions, discourse);
        markable
    }

    /// Replace the covered positions and recompute all derived fields.
    pub(crate) fn set_positions(&mut self, positions: Vec<usize>, discourse: &DiscourseIndex) {
        debug_assert!(!positions.is_empty());
        self.fragments = fragments_from_positions(&positions, discourse);
        self.display_spans = self
            .fragments
            .iter()
            .filter_map(|fragment| {
                let start = discourse.discourse_position_of(fragment.first()).ok()?;
                let end = discourse.discourse_position_of(fragment.last()).ok()?;
                Some((discourse.display_start(start)?, discourse.display_end(end)?))
            })
            .collect();
        self.positions = positions;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the owning level.
    pub fn level_name(&self) -> &str {
        &self.level
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_discontinuous(&self) -> bool {
        self.fragments.len() > 1
    }

    pub fn leftmost_discourse_position(&self) -> usize {
        self.positions[0]
    }

    pub fn rightmost_discourse_position(&self) -> usize {
        self.positions[self.positions.len() - 1]
    }

    /// Number of covered tokens.
    pub fn size(&self) -> usize {
        self.positions.len()
    }

    /// Covered discourse positions in ascending order.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Display `(start, end)` offsets of each fragment, end exclusive.
    pub fn display_spans(&self) -> &[(usize, usize)] {
        &self.display_spans
    }

    pub fn display_start(&self) -> Option<usize> {
        self.display_spans.first().map(|span| span.0)
    }

    pub fn display_end(&self) -> Option<usize> {
        self.display_spans.last().map(|span| span.1)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    pub fn attribute_value(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    pub fn is_in_search_result(&self) -> bool {
        self.in_search_result
    }

    pub(crate) fn set_in_search_result(&mut self, flag: bool) {
        self.in_search_result = flag;
    }

    pub fn span_expression(&self) -> String {
        serialize_span(&self.fragments)
    }

    pub fn token_ids(&self) -> impl Iterator<Item = &str> {
        self.fragments
            .iter()
            .flat_map(|fragment| fragment.tokens().iter().map(String::as_str))
    }

    pub fn covers(&self, token_id: &str) -> bool {
        self.token_ids().any(|token| token == token_id)
    }

    /// Token text per fragment, fragments joined with ` ... `.
    pub fn text(&self, discourse: &DiscourseIndex) -> String {
        self.fragments
            .iter()
            .map(|fragment| {
                fragment
                    .tokens()
                    .iter()
                    .filter_map(|token| discourse.element(token).ok())
                    .map(|element| element.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" ... ")
    }

    pub(crate) fn order_key(&self) -> OrderKey {
        OrderKey {
            leftmost: self.leftmost_discourse_position(),
            rightmost: self.rightmost_discourse_position(),
            size: self.size(),
            id: self.id.clone(),
        }
    }

    /// Positions after merging `incoming` (sorted, deduplicated) into the span.
    pub(crate) fn merged_positions(&self, incoming: &[usize]) -> Vec<usize> {
        let (Some(&first), Some(&last)) = (incoming.first(), incoming.last()) else {
            return self.positions.clone();
        };
        if last < self.leftmost_discourse_position() {
            let mut merged = incoming.to_vec();
            merged.extend_from_slice(&self.positions);
            merged
        } else if first > self.rightmost_discourse_position() {
            let mut merged = self.positions.clone();
            merged.extend_from_slice(incoming);
            merged
        } else {
            let mut merged = self.positions.clone();
            merged.extend_from_slice(incoming);
            merged.sort_unstable();
            merged.dedup();
            merged
        }
    }

    /// Positions left after removing `outgoing` from the span.
    pub(crate) fn reduced_positions(&self, outgoing: &[usize]) -> Vec<usize> {
        self.positions
            .iter()
            .copied()
            .filter(|position| outgoing.binary_search(position).is_err())
            .collect()
    }
}

/// Discourse order of two markables. Equal starts put the shorter span first.
pub fn discourse_order(a: &Markable, b: &Markable) -> Ordering {
    a.order_key().cmp(&b.order_key())
}
