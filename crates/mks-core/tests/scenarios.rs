#![allow(missing_docs)]

use std::sync::Arc;

use mks_core::{
    CoreError, Customization, LevelFilter, LevelStatus, LoadIssueKind, MarkableChart, MarkableLevel, MarkableQuery,
    MarkableRecord, AttributeFilter, RenderStyle, ReorderDirection, StyleRule,
};
use mks_model::{AnnotationScheme, AttributeKind, DiscourseIndex, Fragment, SchemeAttribute, TokenRecord};

fn discourse() -> Arc<DiscourseIndex> {
    Arc::new(DiscourseIndex::new((1..=10).map(|i| TokenRecord::new(format!("w{i}"), format!("tok{i}")))).unwrap())
}

fn np_scheme() -> AnnotationScheme {
    AnnotationScheme::new(vec![
        SchemeAttribute::new("type", AttributeKind::NominalList).with_values(["np", "pron"]),
        SchemeAttribute::new("coref", AttributeKind::MarkableSet).ordered(),
        SchemeAttribute::new("antecedent", AttributeKind::MarkablePointer),
    ])
}

fn chart() -> MarkableChart {
    let discourse = discourse();
    let mut chart = MarkableChart::new(discourse.clone());
    chart
        .add_level(MarkableLevel::new("np", discourse, np_scheme()))
        .unwrap();
    chart
}

fn contiguous(tokens: &[&str]) -> Vec<Fragment> {
    vec![Fragment::new(tokens.iter().copied()).unwrap()]
}

fn ids(markables: &[&mks_core::Markable]) -> Vec<String> {
    markables.iter().map(|m| m.id().to_string()).collect()
}

#[test]
fn scenario_a_lookup_by_token() {
    let mut chart = chart();
    let id = chart.add_markable("np", &contiguous(&["w2", "w3", "w4"]), [("type", "np")]).unwrap();

    let level = chart.level("np").unwrap();
    assert_eq!(ids(&level.markables_at_discourse_element("w3", false)), vec![id.clone()]);
    assert!(level.markables_at_discourse_element("w5", false).is_empty());
    assert_eq!(ids(&level.markables_started_at("w2")), vec![id.clone()]);
    assert_eq!(ids(&level.markables_ended_at("w4")), vec![id]);
}

#[test]
fn scenario_b_discontinuous_span() {
    let mut chart = chart();
    let fragments = vec![Fragment::new(["w2"]).unwrap(), Fragment::new(["w4"]).unwrap()];
    let id = chart.add_markable("np", &fragments, [("type", "np")]).unwrap();

    let level = chart.level("np").unwrap();
    let markable = level.markable(&id).unwrap();
    assert!(markable.is_discontinuous());
    assert_eq!(markable.fragment_count(), 2);
    assert_eq!(markable.leftmost_discourse_position(), 1);
    assert_eq!(markable.rightmost_discourse_position(), 3);
    assert_eq!(markable.span_expression(), "w2,w4");
    assert!(level.markables_at_discourse_element("w3", false).is_empty());
    // Each fragment registers its own boundaries.
    assert_eq!(ids(&level.markables_ended_at("w2")), vec![id.clone()]);
    assert_eq!(ids(&level.markables_started_at("w4")), vec![id]);
}

#[test]
fn scenario_c_shorter_span_first_at_equal_start() {
    let mut chart = chart();
    let long = chart.add_markable("np", &contiguous(&["w2", "w3", "w4"]), [("type", "np")]).unwrap();
    let short = chart.add_markable("np", &contiguous(&["w2"]), [("type", "pron")]).unwrap();

    let level = chart.level("np").unwrap();
    assert_eq!(ids(&level.markables_at_discourse_element("w2", true)), vec![short.clone(), long.clone()]);
    let ordered: Vec<&str> = level.markables_in_discourse_order().iter().map(|m| m.id()).collect();
    assert_eq!(ordered, vec![short.as_str(), long.as_str()]);
}

#[test]
fn scenario_d_ordered_set_purges_singleton() {
    let mut chart = chart();
    let m1 = chart.add_markable("np", &contiguous(&["w1"]), [("type", "np")]).unwrap();
    let m2 = chart.add_markable("np", &contiguous(&["w3"]), [("type", "np")]).unwrap();
    let m3 = chart.add_markable("np", &contiguous(&["w5"]), [("type", "pron")]).unwrap();

    let group = chart.create_set("np", "coref", &[m3.as_str(), m1.as_str(), m2.as_str()]).unwrap();
    assert_eq!(group, "set_1");

    let level = chart.level_mut("np").unwrap();
    let set = level.set_containing("coref", &m1).unwrap();
    assert_eq!(set.members(), vec![m1.as_str(), m2.as_str(), m3.as_str()]);
    assert_eq!(set.size(), 3);

    assert!(level.remove_from_set("coref", &m2).unwrap());
    assert_eq!(level.set_containing("coref", &m1).unwrap().size(), 2);
    assert_eq!(level.markable(&m2).unwrap().attribute_value("coref"), Some("none"));

    assert!(level.remove_from_set("coref", &m3).unwrap());
    assert!(level.relation("coref").unwrap().set("set_1").is_none());
    assert_eq!(level.markable(&m1).unwrap().attribute_value("coref"), Some("none"));
    assert_eq!(level.markable(&m3).unwrap().attribute_value("coref"), Some("none"));
    assert!(level.check_consistency().is_empty());
}

#[test]
fn scenario_e_ids_are_never_reused() {
    let mut chart = chart();
    let first = chart.next_free_markable_id();
    let id = chart.add_markable("np", &contiguous(&["w1"]), [("type", "np")]).unwrap();
    chart.delete_markable("np", &id).unwrap();
    let second = chart.next_free_markable_id();

    assert_eq!(first, "markable_1");
    assert_eq!(id, "markable_2");
    assert_eq!(second, "markable_3");
}

#[test]
fn removing_absent_tokens_does_not_dirty() {
    let mut chart = chart();
    let id = chart.add_markable("np", &contiguous(&["w2", "w3"]), [("type", "np")]).unwrap();
    let level = chart.level_mut("np").unwrap();
    level.dirty_tracker_mut().mark_clean();

    assert!(level.remove_discourse_elements(&id, &["w7", "w9"]).unwrap());
    assert!(!level.is_dirty());
    assert_eq!(level.markable(&id).unwrap().span_expression(), "w2..w3");

    // Emptying the span is refused without change.
    assert!(!level.remove_discourse_elements(&id, &["w2", "w3"]).unwrap());
    assert!(!level.is_dirty());
    assert_eq!(level.markable(&id).unwrap().size(), 2);
}

#[test]
fn span_edits_keep_indices_in_step() {
    let mut chart = chart();
    let id = chart.add_markable("np", &contiguous(&["w4", "w5"]), [("type", "np")]).unwrap();
    let level = chart.level_mut("np").unwrap();

    assert!(level.add_discourse_elements(&id, &["w1"]).unwrap());
    assert_eq!(level.markable(&id).unwrap().span_expression(), "w1,w4..w5");
    assert_eq!(ids(&level.markables_at_discourse_element("w1", false)), vec![id.clone()]);

    assert!(level.remove_discourse_elements(&id, &["w4"]).unwrap());
    assert_eq!(level.markable(&id).unwrap().span_expression(), "w1,w5");
    assert!(level.markables_at_discourse_element("w4", false).is_empty());

    assert!(level.update_markable(&id, &contiguous(&["w7", "w8"])).unwrap());
    assert_eq!(level.markable(&id).unwrap().span_expression(), "w7..w8");
    assert!(level.markables_at_discourse_element("w1", false).is_empty());
    assert!(!level.update_markable(&id, &[]).unwrap());

    let err = level.add_discourse_elements(&id, &["nope"]).unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert!(level.check_consistency().is_empty());
}

#[test]
fn bulk_load_reports_and_continues() {
    let discourse = discourse();
    let mut level = MarkableLevel::new("np", discourse, np_scheme());
    let records = vec![
        MarkableRecord::new("markable_4", "w1..w2").on_level("np").with_attribute("TYPE", "pron"),
        MarkableRecord::new("markable_9", "w3").with_attribute("coref", "set_7"),
        MarkableRecord::new("markable_10", "w5").with_attribute("coref", "set_7"),
        MarkableRecord::new("markable_11", "w8").with_attribute("coref", "set_12"),
        MarkableRecord::new("markable_4", "w6"),
        MarkableRecord::new("markable_5", "w2..w99"),
        MarkableRecord {
            id: None,
            span: Some("w1".into()),
            ..Default::default()
        },
        MarkableRecord::new("markable_6", "w9").on_level("coref"),
    ];
    let report = level.create_markables(records);
    level.init_markable_relations();

    assert_eq!(report.loaded, 5);
    assert_eq!(report.max_markable_num, Some(11));
    assert_eq!(report.max_set_num, Some(12));
    let kinds: Vec<LoadIssueKind> = report.issues.iter().map(|issue| issue.kind).collect();
    assert_eq!(
        kinds,
        vec![
            LoadIssueKind::DuplicateId,
            LoadIssueKind::InvalidSpan,
            LoadIssueKind::MissingId,
            LoadIssueKind::LevelMismatch,
        ]
    );
    assert_eq!(report.skipped(), 3);
    assert!(level.is_read_only());

    // Keys take the scheme's casing; missing attributes are defaulted.
    let first = level.markable("markable_4").unwrap();
    assert_eq!(first.attribute_value("type"), Some("pron"));
    assert_eq!(first.attribute_value("antecedent"), Some("none"));

    // The lone set_12 member was purged, the pair survives.
    assert_eq!(level.set_containing("coref", "markable_9").unwrap().size(), 2);
    assert_eq!(level.markable("markable_11").unwrap().attribute_value("coref"), Some("none"));

    // Records come back under this level's name.
    let records = level.to_records();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.level.as_deref() == Some("np")));
}

#[test]
fn seeding_moves_counters_past_loaded_ids() {
    let discourse = discourse();
    let mut chart = MarkableChart::new(discourse.clone());
    let mut level = MarkableLevel::new("np", discourse, np_scheme());
    let report = level.create_markables(vec![MarkableRecord::new("markable_41", "w1")]);
    chart.add_level(level).unwrap();
    chart.seed_counters(&report);

    assert_eq!(chart.next_free_markable_id(), "markable_42");
    assert!(chart.check_consistency().is_empty());
}

#[test]
fn cross_level_pointers_are_cleaned_up() {
    let discourse = discourse();
    let mut chart = chart();
    chart
        .add_level(MarkableLevel::new("sentence", discourse, np_scheme()))
        .unwrap();
    let source = chart.add_markable("np", &contiguous(&["w1"]), [("type", "np")]).unwrap();
    let target = chart.add_markable("sentence", &contiguous(&["w1", "w2"]), [("type", "np")]).unwrap();
    let reference = format!("sentence:{target}");

    assert!(
        chart
            .level_mut("np")
            .unwrap()
            .add_pointer_target("antecedent", &source, &reference)
            .unwrap()
    );
    let resolved = chart.resolve_pointer_target("np", &reference).unwrap();
    assert_eq!(resolved.id(), target);
    assert!(chart.check_consistency().is_empty());

    chart.delete_markable("sentence", &target).unwrap();
    let level = chart.level("np").unwrap();
    assert!(level.relation("antecedent").unwrap().pointer(&source).is_none());
    assert_eq!(level.markable(&source).unwrap().attribute_value("antecedent"), Some("none"));
}

#[test]
fn chart_lookup_per_level_and_filter() {
    let discourse = discourse();
    let mut chart = chart();
    chart
        .add_level(MarkableLevel::new("Sentence", discourse, np_scheme()))
        .unwrap();
    let np = chart.add_markable("np", &contiguous(&["w3"]), [("type", "np")]).unwrap();
    let sentence = chart.add_markable("SENTENCE", &contiguous(&["w1", "w2", "w3"]), [("type", "np")]).unwrap();

    let slots = chart.markables_at_discourse_position(2, LevelFilter::All);
    assert_eq!(slots.len(), 2);
    assert_eq!(ids(&slots[0]), vec![np]);
    assert_eq!(ids(&slots[1]), vec![sentence]);

    chart.set_level_status("sentence", LevelStatus::Inactive).unwrap();
    let slots = chart.markables_at_discourse_position(2, LevelFilter::Visible);
    assert_eq!(slots.len(), 2);
    assert!(slots[1].is_empty());
    assert!(chart.markables_at_discourse_position(99, LevelFilter::All).iter().all(Vec::is_empty));
    assert!(chart.level("missing").is_err());
}

#[test]
fn top_attributes_percolate_up() {
    let discourse = discourse();
    let top_style = Customization::new(vec![StyleRule::new(
        "type",
        Some("np".into()),
        RenderStyle {
            foreground: Some("blue".into()),
            ..Default::default()
        },
    )]);
    let bottom_style = Customization::new(vec![StyleRule::new(
        "type",
        None,
        RenderStyle {
            foreground: Some("red".into()),
            background: Some("yellow".into()),
            ..Default::default()
        },
    )]);
    let mut chart = MarkableChart::new(discourse.clone());
    chart
        .add_level(MarkableLevel::new("top", discourse.clone(), np_scheme()).with_customization(top_style))
        .unwrap();
    chart
        .add_level(MarkableLevel::new("bottom", discourse, np_scheme()).with_customization(bottom_style))
        .unwrap();
    chart.add_markable("top", &contiguous(&["w2"]), [("type", "np")]).unwrap();
    chart.add_markable("bottom", &contiguous(&["w2", "w3"]), [("type", "pron")]).unwrap();

    let style = chart.top_attributes_at_discourse_element("w2");
    assert_eq!(style.foreground.as_deref(), Some("blue"));
    assert_eq!(style.background.as_deref(), Some("yellow"));

    let style = chart.top_attributes_at_discourse_element("w3");
    assert_eq!(style.foreground.as_deref(), Some("red"));

    // Hidden levels contribute nothing.
    chart.level_mut("top").unwrap().set_visible(false);
    let style = chart.top_attributes_at_discourse_element("w2");
    assert_eq!(style.foreground.as_deref(), Some("red"));

    // Moving the bottom level to the top lets it win.
    chart.level_mut("top").unwrap().set_visible(true);
    assert!(chart.reorder_markable_layers(ReorderDirection::Up, 1));
    assert_eq!(chart.level("bottom").unwrap().position(), 0);
    let style = chart.top_attributes_at_discourse_element("w2");
    assert_eq!(style.foreground.as_deref(), Some("red"));
    assert!(!chart.reorder_markable_layers(ReorderDirection::Up, 0));
    assert!(!chart.reorder_markable_layers(ReorderDirection::Down, 1));
}

#[test]
fn query_returns_hits_in_discourse_order() {
    let mut chart = chart();
    let late = chart.add_markable("np", &contiguous(&["w8"]), [("type", "pron")]).unwrap();
    chart.add_markable("np", &contiguous(&["w4"]), [("type", "np")]).unwrap();
    let early = chart.add_markable("np", &contiguous(&["w1", "w2"]), [("type", "pron")]).unwrap();

    let query = MarkableQuery::new().filter(AttributeFilter::equals("type", "pron"));
    let result = chart.query(&query);
    let found: Vec<&str> = result.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(found, vec![early.as_str(), late.as_str()]);
    assert_eq!(result.hits()[0].text, "tok1 tok2");

    chart.mark_search_results(&result).unwrap();
    assert!(chart.level("np").unwrap().markable(&early).unwrap().is_in_search_result());
    chart.clear_search_results();
    assert!(!chart.level("np").unwrap().markable(&early).unwrap().is_in_search_result());

    let query = MarkableQuery::new().filter(AttributeFilter::matches("type", "p.*").unwrap());
    assert_eq!(chart.query(&query).len(), 2);
}

fn capped_scheme() -> AnnotationScheme {
    AnnotationScheme::new(vec![
        SchemeAttribute::new("coref", AttributeKind::MarkableSet).ordered().with_max_size(2),
        SchemeAttribute::new("antecedent", AttributeKind::MarkablePointer).with_max_size(1),
    ])
}

fn capped_chart() -> MarkableChart {
    let discourse = discourse();
    let mut chart = MarkableChart::new(discourse.clone());
    chart
        .add_level(MarkableLevel::new("capped", discourse, capped_scheme()))
        .unwrap();
    chart
}

#[test]
fn cross_level_cleanup_ignores_level_name_case() {
    let discourse = discourse();
    let mut chart = chart();
    chart
        .add_level(MarkableLevel::new("Sentence", discourse, np_scheme()))
        .unwrap();
    let source = chart.add_markable("np", &contiguous(&["w1"]), [("type", "np")]).unwrap();
    let sibling = chart.add_markable("np", &contiguous(&["w3"]), [("type", "np")]).unwrap();
    let target = chart.add_markable("Sentence", &contiguous(&["w1", "w2"]), [("type", "np")]).unwrap();

    let np = chart.level_mut("np").unwrap();
    assert!(np.add_pointer_target("antecedent", &source, &format!("sentence:{target}")).unwrap());
    assert!(np.add_pointer_target("antecedent", &sibling, &format!("NP:{source}")).unwrap());
    assert!(chart.check_consistency().is_empty());

    chart.delete_markable("sentence", &target).unwrap();
    let np = chart.level("np").unwrap();
    assert!(np.relation("antecedent").unwrap().pointer(&source).is_none());
    assert_eq!(np.markable(&source).unwrap().attribute_value("antecedent"), Some("none"));

    // References written with the level prefix count on their own level too.
    chart.delete_markable("np", &source).unwrap();
    let np = chart.level("np").unwrap();
    assert!(np.relation("antecedent").unwrap().pointer(&sibling).is_none());
    assert!(chart.check_consistency().is_empty());
}

#[test]
fn new_markables_need_existing_pointer_targets() {
    let mut chart = chart();
    let err = chart
        .add_markable("np", &contiguous(&["w1"]), [("antecedent", "markable_999")])
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownMarkable { ref id, .. } if id == "markable_999"));

    let level = chart.level("np").unwrap();
    assert!(level.is_empty());
    assert!(level.markables_at_discourse_element("w1", false).is_empty());
    assert!(!level.is_dirty());

    let first = chart.add_markable("np", &contiguous(&["w1"]), [("type", "np")]).unwrap();
    let second = chart
        .add_markable("np", &contiguous(&["w2"]), [("antecedent", first.as_str())])
        .unwrap();
    let level = chart.level("np").unwrap();
    assert_eq!(level.relation("antecedent").unwrap().pointer(&second).unwrap().targets(), [first]);
    assert!(chart.check_consistency().is_empty());
}

#[test]
fn new_markables_keep_only_allowed_pointer_targets() {
    let mut chart = capped_chart();
    let a = chart.add_markable("capped", &contiguous(&["w1"]), [("coref", "none")]).unwrap();
    let b = chart.add_markable("capped", &contiguous(&["w2"]), [("coref", "none")]).unwrap();
    let value = format!("{a};{b}");
    let c = chart
        .add_markable("capped", &contiguous(&["w3"]), [("antecedent", value.as_str())])
        .unwrap();

    let level = chart.level("capped").unwrap();
    assert_eq!(level.relation("antecedent").unwrap().pointer(&c).unwrap().targets(), [a.clone()]);
    assert_eq!(level.markable(&c).unwrap().attribute_value("antecedent"), Some(a.as_str()));
}

#[test]
fn markables_cannot_point_at_themselves() {
    let mut chart = chart();
    let id = chart.add_markable("np", &contiguous(&["w1"]), [("type", "np")]).unwrap();
    let level = chart.level_mut("np").unwrap();
    let before = level.markable(&id).unwrap().attribute_value("antecedent").map(str::to_string);

    assert!(!level.add_pointer_target("antecedent", &id, &id).unwrap());
    assert!(!level.set_attribute(&id, "antecedent", &id).unwrap());
    assert!(level.relation("antecedent").unwrap().pointer(&id).is_none());
    assert_eq!(level.markable(&id).unwrap().attribute_value("antecedent").map(str::to_string), before);
}

#[test]
fn oversized_sets_are_refused_before_any_change() {
    let mut chart = capped_chart();
    let members: Vec<String> = ["w1", "w2", "w3"]
        .iter()
        .map(|token| chart.add_markable("capped", &contiguous(&[*token]), [("coref", "none")]).unwrap())
        .collect();
    let refs: Vec<&str> = members.iter().map(String::as_str).collect();

    let err = chart.create_set("capped", "coref", &refs).unwrap_err();
    assert_eq!(
        err,
        CoreError::SetTooLarge {
            attribute: "coref".to_string(),
            max: 2,
            requested: 3,
        }
    );
    let level = chart.level("capped").unwrap();
    assert_eq!(level.relation("coref").unwrap().group_count(), 0);
    for id in &members {
        assert_eq!(level.markable(id).unwrap().attribute_value("coref"), Some("none"));
    }

    let group = chart.create_set("capped", "coref", &refs[..2]).unwrap();
    let level = chart.level("capped").unwrap();
    assert_eq!(level.relation("coref").unwrap().set(&group).unwrap().members(), refs[..2].to_vec());
}

#[test]
fn joining_a_full_set_leaves_the_attribute_alone() {
    let mut chart = capped_chart();
    let members: Vec<String> = ["w1", "w2", "w3"]
        .iter()
        .map(|token| chart.add_markable("capped", &contiguous(&[*token]), [("coref", "none")]).unwrap())
        .collect();
    let group = chart
        .create_set("capped", "coref", &[members[0].as_str(), members[1].as_str()])
        .unwrap();

    let level = chart.level_mut("capped").unwrap();
    assert!(!level.set_attribute(&members[2], "coref", &group).unwrap());
    assert_eq!(level.markable(&members[2]).unwrap().attribute_value("coref"), Some("none"));
    assert_eq!(
        level.set_containing("coref", &members[0]).unwrap().members(),
        vec![members[0].as_str(), members[1].as_str()]
    );
    assert!(level.set_containing("coref", &members[2]).is_none());
}
