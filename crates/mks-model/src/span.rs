//! Fragments and span expressions.
//!
//! A span expression lists fragments separated by `,`; each fragment is a
//! single token ID or an inclusive range `first..last`. Ranges are resolved
//! against the tokens actually present in the discourse, never by
//! interpolating numeric ID suffixes.

use serde::{Deserialize, Serialize};

use crate::discourse::DiscourseIndex;
use crate::error::{ModelError, Result};

const RANGE_SEPARATOR: &str = "..";
const FRAGMENT_SEPARATOR: char = ',';

/// A contiguous, non-empty run of token IDs.
///
/// Serialized as a plain list of token IDs; deserializing an empty list fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Fragment {
    tokens: Vec<String>,
}

impl Fragment {
    pub fn new<S: Into<String>>(tokens: impl IntoIterator<Item = S>) -> Result<Self> {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(ModelError::EmptyFragment);
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn first(&self) -> &str {
        &self.tokens[0]
    }

    pub fn last(&self) -> &str {
        &self.tokens[self.tokens.len() - 1]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn expression(&self) -> String {
        if self.tokens.len() == 1 {
            self.first().to_string()
        } else {
            format!("{}{RANGE_SEPARATOR}{}", self.first(), self.last())
        }
    }
}

impl TryFrom<Vec<String>> for Fragment {
    type Error = ModelError;

    fn try_from(tokens: Vec<String>) -> Result<Self> {
        Self::new(tokens)
    }
}

impl From<Fragment> for Vec<String> {
    fn from(fragment: Fragment) -> Self {
        fragment.tokens
    }
}

/// Group sorted, deduplicated positions into canonical fragments.
///
/// Positions outside the discourse are skipped.
pub fn fragments_from_positions(positions: &[usize], discourse: &DiscourseIndex) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut previous: Option<usize> = None;

    for &position in positions {
        let Some(token_id) = discourse.token_id_at(position) else {
            continue;
        };
        if let Some(prev) = previous
            && position != prev + 1
            && !current.is_empty()
        {
            fragments.push(Fragment {
                tokens: std::mem::take(&mut current),
            });
        }
        current.push(token_id.to_string());
        previous = Some(position);
    }
    if !current.is_empty() {
        fragments.push(Fragment { tokens: current });
    }
    fragments
}

/// Sorted, deduplicated positions covered by a list of fragments.
pub fn positions_of_fragments(fragments: &[Fragment], discourse: &DiscourseIndex) -> Result<Vec<usize>> {
    let mut positions = Vec::new();
    for fragment in fragments {
        for token in fragment.tokens() {
            positions.push(discourse.discourse_position_of(token)?);
        }
    }
    positions.sort_unstable();
    positions.dedup();
    Ok(positions)
}

/// Bring arbitrary fragments into canonical form: sorted by position,
/// contiguous runs merged, duplicates dropped.
pub fn normalize_fragments(fragments: &[Fragment], discourse: &DiscourseIndex) -> Result<Vec<Fragment>> {
    let positions = positions_of_fragments(fragments, discourse)?;
    Ok(fragments_from_positions(&positions, discourse))
}

/// Parse a span expression into canonical fragments.
pub fn parse_span(expression: &str, discourse: &DiscourseIndex) -> Result<Vec<Fragment>> {
    let invalid = |reason: String| ModelError::InvalidSpan {
        expression: expression.to_string(),
        reason,
    };

    let mut positions = Vec::new();
    for part in expression.split(FRAGMENT_SEPARATOR) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once(RANGE_SEPARATOR) {
            Some((first, last)) => {
                let (first, last) = (first.trim(), last.trim());
                let start = discourse
                    .discourse_position_of(first)
                    .map_err(|_| invalid(format!("unknown token '{first}'")))?;
                let end = discourse
                    .discourse_position_of(last)
                    .map_err(|_| invalid(format!("unknown token '{last}'")))?;
                if end < start {
                    return Err(invalid(format!("range '{part}' runs backwards")));
                }
                positions.extend(start..=end);
            }
            None => {
                let position = discourse
                    .discourse_position_of(part)
                    .map_err(|_| invalid(format!("unknown token '{part}'")))?;
                positions.push(position);
            }
        }
    }

    if positions.is_empty() {
        return Err(invalid("span is empty".to_string()));
    }
    positions.sort_unstable();
    positions.dedup();
    Ok(fragments_from_positions(&positions, discourse))
}

/// Serialize fragments back to span-expression syntax.
pub fn serialize_span(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(Fragment::expression)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discourse::TokenRecord;

    fn discourse(n: usize) -> DiscourseIndex {
        DiscourseIndex::new(
            (1..=n).map(|i| TokenRecord::new(format!("word_{i}"), format!("w{i}"))),
        )
        .unwrap()
    }

    #[test]
    fn parses_ranges_and_single_tokens() {
        let discourse = discourse(10);
        let fragments = parse_span("word_2..word_4,word_7", &discourse).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].tokens(), ["word_2", "word_3", "word_4"]);
        assert_eq!(fragments[1].tokens(), ["word_7"]);
    }

    #[test]
    fn adjacent_parts_merge_into_one_fragment() {
        let discourse = discourse(5);
        let fragments = parse_span("word_3,word_1..word_2", &discourse).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(serialize_span(&fragments), "word_1..word_3");
    }

    #[test]
    fn ranges_follow_actual_tokens() {
        // IDs with gaps in their numbering still resolve by discourse order.
        let discourse = DiscourseIndex::new(vec![
            TokenRecord::new("word_1", "a"),
            TokenRecord::new("word_5", "b"),
            TokenRecord::new("word_9", "c"),
        ])
        .unwrap();
        let fragments = parse_span("word_1..word_9", &discourse).unwrap();
        assert_eq!(fragments[0].tokens(), ["word_1", "word_5", "word_9"]);
    }

    #[test]
    fn rejects_unknown_and_backwards_ranges() {
        let discourse = discourse(3);
        assert!(matches!(
            parse_span("word_1..word_8", &discourse),
            Err(ModelError::InvalidSpan { .. })
        ));
        assert!(matches!(
            parse_span("word_3..word_1", &discourse),
            Err(ModelError::InvalidSpan { .. })
        ));
        assert!(matches!(
            parse_span(" , ", &discourse),
            Err(ModelError::InvalidSpan { .. })
        ));
    }

    #[test]
    fn empty_fragment_is_rejected() {
        assert_eq!(
            Fragment::new(Vec::<String>::new()),
            Err(ModelError::EmptyFragment)
        );
    }

    #[test]
    fn fragments_deserialize_through_the_constructor() {
        let fragment: Fragment = serde_json::from_str(r#"["word_1","word_2"]"#).unwrap();
        assert_eq!(fragment.first(), "word_1");
        assert_eq!(fragment.last(), "word_2");
        assert_eq!(serde_json::to_string(&fragment).unwrap(), r#"["word_1","word_2"]"#);

        assert!(serde_json::from_str::<Fragment>("[]").is_err());
        assert!(serde_json::from_str::<Fragment>(r#"{"tokens":[]}"#).is_err());
    }
}
