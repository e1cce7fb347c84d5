//! Property tests for span expressions.

use mks_model::{
    DiscourseIndex, TokenRecord, fragments_from_positions, parse_span, positions_of_fragments,
    serialize_span,
};
use proptest::prelude::*;

const TOKENS: usize = 40;

fn discourse() -> DiscourseIndex {
    DiscourseIndex::new((1..=TOKENS).map(|i| TokenRecord::new(format!("word_{i}"), "x"))).unwrap()
}

proptest! {
    #[test]
    fn span_expression_round_trips(positions in prop::collection::btree_set(0..TOKENS, 1..15)) {
        let discourse = discourse();
        let positions: Vec<usize> = positions.into_iter().collect();
        let fragments = fragments_from_positions(&positions, &discourse);

        let expression = serialize_span(&fragments);
        let parsed = parse_span(&expression, &discourse).unwrap();

        prop_assert_eq!(&parsed, &fragments);
        prop_assert_eq!(positions_of_fragments(&parsed, &discourse).unwrap(), positions);
    }

    #[test]
    fn fragments_are_sorted_and_separated(positions in prop::collection::vec(0..TOKENS, 1..20)) {
        let discourse = discourse();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        let fragments = fragments_from_positions(&sorted, &discourse);

        for pair in fragments.windows(2) {
            let end = discourse.discourse_position_of(pair[0].last()).unwrap();
            let start = discourse.discourse_position_of(pair[1].first()).unwrap();
            // A gap of at least one token separates consecutive fragments.
            prop_assert!(start > end + 1);
        }
        for fragment in &fragments {
            let first = discourse.discourse_position_of(fragment.first()).unwrap();
            for (offset, token) in fragment.tokens().iter().enumerate() {
                prop_assert_eq!(discourse.discourse_position_of(token).unwrap(), first + offset);
            }
        }
    }
}

#[test]
fn discontinuous_span_serializes_with_commas() {
    let discourse = discourse();
    let fragments = fragments_from_positions(&[1, 2, 3, 7, 9, 10], &discourse);
    assert_eq!(
        serialize_span(&fragments),
        "word_2..word_4,word_8,word_10..word_11"
    );
}
