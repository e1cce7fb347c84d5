//! Annotation levels.
//!
//! A [`MarkableLevel`] owns its markables and every structure derived from
//! them: the per-token indices, the fragment start/end indices, the
//! discourse-order index and the relations driven by scheme attributes.
//! Each public mutation checks its preconditions first, then updates all of
//! these before returning.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mks_model::{
    AnnotationScheme, AttributeIssue, AttributeKind, AttributeMap, DiscourseIndex, Fragment,
    fragments_from_positions, parse_span, positions_of_fragments,
};

use crate::autosave::DirtyTracker;
use crate::customization::Customization;
use crate::error::{CoreError, Result};
use crate::ids::{IdAllocator, MARKABLE_ID_PREFIX, SET_ID_PREFIX, numeric_suffix};
use crate::markable::{Markable, OrderKey, discourse_order};
use crate::query::MarkableQuery;
use crate::relation::{MarkableRelation, MarkableSet, parse_pointer_targets};

/// Separates a level name from a markable ID in cross-level references.
pub const LEVEL_REFERENCE_SEPARATOR: char = ':';

// =============================================================================
// STATUS
// =============================================================================

/// Mutually exclusive level status selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    /// Hidden and not editable.
    Inactive,
    /// Visible and editable.
    #[default]
    Active,
    /// Visible but not editable.
    Visible,
}

impl LevelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Visible => "visible",
        }
    }
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LOAD RECORDS
// =============================================================================

/// A markable as persisted: structural fields plus raw attribute pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkableRecord {
    pub id: Option<String>,
    pub span: Option<String>,
    /// The `mmax_level` value.
    pub level: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl MarkableRecord {
    pub fn new(id: impl Into<String>, span: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            span: Some(span.into()),
            level: None,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn on_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadIssueKind {
    MissingId,
    MissingSpan,
    InvalidSpan,
    DuplicateId,
    LevelMismatch,
    MissingNamespace,
    MissingDoctype,
    Malformed,
}

/// A recoverable problem found while loading a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadIssue {
    pub kind: LoadIssueKind,
    pub markable: Option<String>,
    pub message: String,
}

impl LoadIssue {
    pub fn new(kind: LoadIssueKind, markable: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            markable,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.markable {
            Some(id) => write!(f, "{id}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    /// Largest `markable_N` suffix seen.
    pub max_markable_num: Option<u64>,
    /// Largest `set_N` suffix seen in set attributes.
    pub max_set_num: Option<u64>,
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    pub fn skipped(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| {
                !matches!(
                    issue.kind,
                    LoadIssueKind::LevelMismatch | LoadIssueKind::MissingNamespace | LoadIssueKind::MissingDoctype
                )
            })
            .count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

// =============================================================================
// INDICES
// =============================================================================

type TokenIndex = HashMap<String, BTreeSet<String>>;

/// Everything derivable from the markable map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LevelIndices {
    at_token: TokenIndex,
    started_at_token: TokenIndex,
    ended_at_token: TokenIndex,
    order: BTreeSet<OrderKey>,
}

fn index_insert(index: &mut TokenIndex, token: &str, id: &str) {
    index.entry(token.to_string()).or_default().insert(id.to_string());
}

fn index_remove(index: &mut TokenIndex, token: &str, id: &str) {
    if let Some(ids) = index.get_mut(token) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(token);
        }
    }
}

impl LevelIndices {
    fn build<'a>(markables: impl IntoIterator<Item = &'a Markable>) -> Self {
        let mut indices = Self::default();
        for markable in markables {
            indices.register(markable);
        }
        indices
    }

    fn register(&mut self, markable: &Markable) {
        let id = markable.id();
        for fragment in markable.fragments() {
            index_insert(&mut self.started_at_token, fragment.first(), id);
            index_insert(&mut self.ended_at_token, fragment.last(), id);
            for token in fragment.tokens() {
                index_insert(&mut self.at_token, token, id);
            }
        }
        self.order.insert(markable.order_key());
    }

    fn unregister(&mut self, markable: &Markable) {
        let id = markable.id();
        for fragment in markable.fragments() {
            index_remove(&mut self.started_at_token, fragment.first(), id);
            index_remove(&mut self.ended_at_token, fragment.last(), id);
            for token in fragment.tokens() {
                index_remove(&mut self.at_token, token, id);
            }
        }
        self.order.remove(&markable.order_key());
    }
}

// =============================================================================
// LEVEL
// =============================================================================

/// One annotation layer over the discourse.
#[derive(Debug, Clone)]
pub struct MarkableLevel {
    name: String,
    discourse: Arc<DiscourseIndex>,
    scheme: AnnotationScheme,
    customization: Customization,
    namespace: Option<String>,
    markables: HashMap<String, Markable>,
    indices: LevelIndices,
    /// Keyed by the scheme's attribute name.
    relations: BTreeMap<String, MarkableRelation>,
    active: bool,
    visible: bool,
    read_only: bool,
    dirty: DirtyTracker,
    position: usize,
    purge_singletons: bool,
}

fn unknown_relation(level: &str, attribute: &str, expected: &'static str) -> CoreError {
    CoreError::UnknownRelation {
        level: level.to_string(),
        attribute: attribute.to_string(),
        expected,
    }
}

fn is_cross_level(target: &str) -> bool {
    target.contains(LEVEL_REFERENCE_SEPARATOR)
}

fn refers_to(reference: &str, level: &str, id: &str) -> bool {
    reference
        .split_once(LEVEL_REFERENCE_SEPARATOR)
        .is_some_and(|(target_level, target)| target == id && target_level.eq_ignore_ascii_case(level))
}

impl MarkableLevel {
    pub fn new(name: impl Into<String>, discourse: Arc<DiscourseIndex>, scheme: AnnotationScheme) -> Self {
        let mut level = Self {
            name: name.into(),
            discourse,
            scheme,
            customization: Customization::default(),
            namespace: None,
            markables: HashMap::new(),
            indices: LevelIndices::default(),
            relations: BTreeMap::new(),
            active: true,
            visible: true,
            read_only: false,
            dirty: DirtyTracker::new(),
            position: 0,
            purge_singletons: true,
        };
        level.relations = level.empty_relations();
        level
    }

    #[must_use]
    pub fn with_customization(mut self, customization: Customization) -> Self {
        self.customization = customization;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_purge_singletons(mut self, purge: bool) -> Self {
        self.purge_singletons = purge;
        self
    }

    /// Use `none_value` for relation attributes still on the default sentinel.
    #[must_use]
    pub fn with_none_value(mut self, none_value: &str) -> Self {
        let attributes = self
            .scheme
            .attributes()
            .iter()
            .cloned()
            .map(|mut attribute| {
                if attribute.kind.is_relation() && attribute.none_value == mks_model::DEFAULT_NONE_VALUE {
                    attribute.none_value = none_value.to_string();
                }
                attribute
            })
            .collect();
        self.scheme = AnnotationScheme::new(attributes);
        self.relations = self.empty_relations();
        self
    }

    fn empty_relations(&self) -> BTreeMap<String, MarkableRelation> {
        self.scheme
            .relation_attributes()
            .filter_map(MarkableRelation::from_scheme)
            .map(|relation| (relation.attribute_name().to_string(), relation))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn discourse(&self) -> &Arc<DiscourseIndex> {
        &self.discourse
    }

    pub fn scheme(&self) -> &AnnotationScheme {
        &self.scheme
    }

    pub fn customization(&self) -> &Customization {
        &self.customization
    }

    pub fn set_customization(&mut self, customization: Customization) {
        self.customization = customization;
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn len(&self) -> usize {
        self.markables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markables.is_empty()
    }

    /// Stacking position in the owning chart; 0 is the top.
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn status(&self) -> LevelStatus {
        if self.active {
            LevelStatus::Active
        } else if self.visible {
            LevelStatus::Visible
        } else {
            LevelStatus::Inactive
        }
    }

    pub fn set_status(&mut self, status: LevelStatus) {
        (self.active, self.visible) = match status {
            LevelStatus::Inactive => (false, false),
            LevelStatus::Active => (true, true),
            LevelStatus::Visible => (false, true),
        };
        debug!(level = %self.name, status = %status, "level status changed");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the level without touching its active flag.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Lock the level for the rest of the session. Cannot be undone.
    pub fn mark_read_only(&mut self, reason: &str) {
        if !self.read_only {
            warn!(level = %self.name, reason, "level is now read-only");
        }
        self.read_only = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn dirty_tracker(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub fn dirty_tracker_mut(&mut self) -> &mut DirtyTracker {
        &mut self.dirty
    }

    pub fn purges_singletons(&self) -> bool {
        self.purge_singletons
    }

    pub fn set_purge_singletons(&mut self, purge: bool) {
        self.purge_singletons = purge;
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn contains(&self, id: &str) -> bool {
        self.markables.contains_key(id)
    }

    pub fn markable(&self, id: &str) -> Result<&Markable> {
        self.markables.get(id).ok_or_else(|| self.unknown_markable(id))
    }

    pub fn markables(&self) -> impl Iterator<Item = &Markable> {
        self.markables.values()
    }

    /// Same-level pointer targets must name existing markables.
    fn check_pointer_targets(&self, targets: &[String]) -> Result<()> {
        match targets
            .iter()
            .find(|target| !is_cross_level(target) && !self.markables.contains_key(target.as_str()))
        {
            Some(target) => Err(self.unknown_markable(target)),
            None => Ok(()),
        }
    }

    fn unknown_markable(&self, id: &str) -> CoreError {
        CoreError::UnknownMarkable {
            level: self.name.clone(),
            id: id.to_string(),
        }
    }

    fn collect(&self, ids: Option<&BTreeSet<String>>, sort: bool) -> Vec<&Markable> {
        let mut found: Vec<&Markable> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.markables.get(id))
            .collect();
        if sort {
            found.sort_by(|a, b| discourse_order(a, b));
        }
        found
    }

    /// Markables covering a token. Unsorted results come in ID order.
    pub fn markables_at_discourse_element(&self, token_id: &str, sort: bool) -> Vec<&Markable> {
        self.collect(self.indices.at_token.get(token_id), sort)
    }

    pub fn markables_at_discourse_position(&self, position: usize, sort: bool) -> Vec<&Markable> {
        match self.discourse.token_id_at(position) {
            Some(token_id) => self.markables_at_discourse_element(token_id, sort),
            None => Vec::new(),
        }
    }

    /// Markables with a fragment starting at the token, in discourse order.
    pub fn markables_started_at(&self, token_id: &str) -> Vec<&Markable> {
        self.collect(self.indices.started_at_token.get(token_id), true)
    }

    /// Markables with a fragment ending at the token, in discourse order.
    pub fn markables_ended_at(&self, token_id: &str) -> Vec<&Markable> {
        self.collect(self.indices.ended_at_token.get(token_id), true)
    }

    pub fn markables_in_discourse_order(&self) -> Vec<&Markable> {
        self.indices
            .order
            .iter()
            .filter_map(|key| self.markables.get(key.id()))
            .collect()
    }

    /// Markables lying entirely within positions `from..=to`.
    pub fn markables_in_range(&self, from: usize, to: usize) -> Vec<&Markable> {
        self.indices
            .order
            .iter()
            .take_while(|key| key.leftmost() <= to)
            .filter(|key| key.leftmost() >= from)
            .filter_map(|key| self.markables.get(key.id()))
            .filter(|markable| markable.rightmost_discourse_position() <= to)
            .collect()
    }

    pub fn query(&self, query: &MarkableQuery) -> Vec<&Markable> {
        self.markables_in_discourse_order()
            .into_iter()
            .filter(|markable| query.accepts(markable))
            .collect()
    }

    pub fn set_search_result(&mut self, id: &str, flag: bool) -> Result<()> {
        let level = self.name.clone();
        let markable = self
            .markables
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownMarkable {
                level,
                id: id.to_string(),
            })?;
        markable.set_in_search_result(flag);
        Ok(())
    }

    pub fn clear_search_results(&mut self) {
        for markable in self.markables.values_mut() {
            markable.set_in_search_result(false);
        }
    }

    // -------------------------------------------------------------------------
    // Relations
    // -------------------------------------------------------------------------

    pub fn relations(&self) -> impl Iterator<Item = &MarkableRelation> {
        self.relations.values()
    }

    pub fn relation(&self, attribute: &str) -> Option<&MarkableRelation> {
        self.relations.get(&self.scheme.canonical_key(attribute))
    }

    pub fn set_containing(&self, attribute: &str, id: &str) -> Option<&MarkableSet> {
        self.relation(attribute)?.set_containing(id)
    }

    /// Build one relation per set or pointer attribute from current values,
    /// then purge singleton sets when the policy is on.
    pub fn init_markable_relations(&mut self) {
        let order: Vec<String> = self
            .indices
            .order
            .iter()
            .map(|key| key.id().to_string())
            .collect();
        let mut relations = self.empty_relations();
        for relation in relations.values_mut() {
            relation.rebuild(&order, &self.markables);
        }
        self.relations = relations;
        if self.purge_singletons {
            self.purge_singleton_sets();
        }
        debug!(level = %self.name, relations = self.relations.len(), "relations initialised");
    }

    /// Dissolve every set left with fewer than two members.
    pub fn purge_singleton_sets(&mut self) -> usize {
        let mut purged = 0;
        for relation in self.relations.values_mut() {
            purged += relation.purge_singleton_sets(&mut self.markables);
        }
        if purged > 0 {
            self.dirty.mark_dirty();
        }
        purged
    }

    /// Put existing markables into a fresh set with a new group value.
    pub fn create_set(&mut self, ids: &mut IdAllocator, attribute: &str, members: &[&str]) -> Result<String> {
        for member in members {
            self.markable(member)?;
        }
        let key = self.scheme.canonical_key(attribute);
        let relation = self
            .relations
            .get_mut(&key)
            .filter(|relation| relation.is_set())
            .ok_or_else(|| unknown_relation(&self.name, attribute, "set"))?;
        let distinct: BTreeSet<&str> = members.iter().copied().collect();
        if let Some(max) = relation.max_size()
            && distinct.len() > max
        {
            return Err(CoreError::SetTooLarge {
                attribute: relation.attribute_name().to_string(),
                max,
                requested: distinct.len(),
            });
        }
        let group = loop {
            let candidate = ids.next_set_id();
            if relation.set(&candidate).is_none() {
                break candidate;
            }
        };
        for member in members {
            relation.join_set(&group, member, &mut self.markables, self.purge_singletons);
        }
        self.dirty.mark_dirty();
        debug!(level = %self.name, set = %group, members = members.len(), "set created");
        Ok(group)
    }

    /// Move a markable into an existing or new set. False when the set is
    /// full or already holds the markable.
    pub fn add_to_set(&mut self, attribute: &str, group: &str, id: &str) -> Result<bool> {
        self.markable(id)?;
        let key = self.scheme.canonical_key(attribute);
        let relation = self
            .relations
            .get_mut(&key)
            .filter(|relation| relation.is_set())
            .ok_or_else(|| unknown_relation(&self.name, attribute, "set"))?;
        let joined = relation.join_set(group, id, &mut self.markables, self.purge_singletons);
        if joined {
            self.dirty.mark_dirty();
        }
        Ok(joined)
    }

    pub fn remove_from_set(&mut self, attribute: &str, id: &str) -> Result<bool> {
        self.markable(id)?;
        let key = self.scheme.canonical_key(attribute);
        let relation = self
            .relations
            .get_mut(&key)
            .filter(|relation| relation.is_set())
            .ok_or_else(|| unknown_relation(&self.name, attribute, "set"))?;
        let left = relation.leave_set(id, &mut self.markables, self.purge_singletons);
        if left {
            self.dirty.mark_dirty();
        }
        Ok(left)
    }

    /// Point `source` at `target`. Targets of the form `level:id` are not
    /// checked here. False when present already, self-referential or capped.
    pub fn add_pointer_target(&mut self, attribute: &str, source: &str, target: &str) -> Result<bool> {
        self.markable(source)?;
        if !is_cross_level(target) {
            self.markable(target)?;
        }
        if source == target {
            return Ok(false);
        }
        let key = self.scheme.canonical_key(attribute);
        let relation = self
            .relations
            .get_mut(&key)
            .filter(|relation| relation.is_pointer())
            .ok_or_else(|| unknown_relation(&self.name, attribute, "pointer"))?;
        let added = relation.add_pointer_target(source, target, &mut self.markables);
        if added {
            self.dirty.mark_dirty();
        }
        Ok(added)
    }

    pub fn remove_pointer_target(&mut self, attribute: &str, source: &str, target: &str) -> Result<bool> {
        self.markable(source)?;
        let key = self.scheme.canonical_key(attribute);
        let relation = self
            .relations
            .get_mut(&key)
            .filter(|relation| relation.is_pointer())
            .ok_or_else(|| unknown_relation(&self.name, attribute, "pointer"))?;
        let removed = relation.remove_pointer_target(source, target, &mut self.markables);
        if removed {
            self.dirty.mark_dirty();
        }
        Ok(removed)
    }

    /// Drop every `level:id` reference to a markable. The level part matches
    /// in any case.
    pub fn detach_level_reference(&mut self, level: &str, id: &str) -> usize {
        let mut detached = 0;
        for relation in self.relations.values_mut().filter(|r| r.is_pointer()) {
            let references: BTreeSet<String> = relation
                .pointers()
                .flat_map(|pointer| pointer.targets().iter())
                .filter(|target| refers_to(target, level, id))
                .cloned()
                .collect();
            for reference in &references {
                detached += relation.detach_target(reference, &mut self.markables);
            }
        }
        if detached > 0 {
            self.dirty.mark_dirty();
        }
        detached
    }

    /// Enter a new markable into the relations its attributes name.
    fn attach_to_relations(&mut self, id: &str) {
        for relation in self.relations.values_mut() {
            let Some(value) = self
                .markables
                .get(id)
                .and_then(|m| m.attribute_value(relation.attribute_name()))
                .map(str::to_string)
            else {
                continue;
            };
            if relation.is_set() {
                if value.trim().is_empty() || value == relation.none_value() {
                    continue;
                }
                let joined = relation.join_set(&value, id, &mut self.markables, self.purge_singletons);
                let member = relation.set(&value).is_some_and(|set| set.contains(id));
                if !joined && !member {
                    warn!(level = %self.name, markable = id, set = %value, "set is full, attribute reset");
                    let none = relation.none_value().to_string();
                    if let Some(markable) = self.markables.get_mut(id) {
                        markable.attributes_mut().insert(relation.attribute_name(), none);
                    }
                }
            } else {
                let mut targets = parse_pointer_targets(&value, relation.none_value());
                targets.retain(|target| target != id);
                if let Some(max) = relation.max_size()
                    && targets.len() > max
                {
                    warn!(
                        level = %self.name,
                        markable = id,
                        attribute = relation.attribute_name(),
                        dropped = targets.len() - max,
                        "pointer has more targets than allowed, extra targets dropped"
                    );
                    targets.truncate(max);
                }
                relation.set_pointer_targets(id, &targets, &mut self.markables);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Markable lifecycle
    // -------------------------------------------------------------------------

    /// Create a markable with a fresh ID.
    ///
    /// Unset scheme attributes get their defaults. The span is resolved
    /// before any index is touched.
    pub fn add_markable<K, V>(
        &mut self,
        ids: &mut IdAllocator,
        fragments: &[Fragment],
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<String>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let positions = positions_of_fragments(fragments, &self.discourse)?;
        if positions.is_empty() {
            return Err(CoreError::EmptySpan);
        }
        let mut attributes = AttributeMap::canonicalized(attributes, &self.scheme);
        self.scheme.apply_defaults(&mut attributes);
        for relation in self.relations.values().filter(|r| r.is_pointer()) {
            let Some(value) = attributes.get(relation.attribute_name()) else {
                continue;
            };
            let targets = parse_pointer_targets(value, relation.none_value());
            self.check_pointer_targets(&targets)?;
        }

        let id = loop {
            let candidate = ids.next_markable_id();
            if !self.markables.contains_key(&candidate) {
                break candidate;
            }
        };
        let markable = Markable::new(id.clone(), self.name.clone(), positions, attributes, &self.discourse);
        self.indices.register(&markable);
        self.markables.insert(id.clone(), markable);
        self.attach_to_relations(&id);
        self.dirty.mark_dirty();
        debug!(level = %self.name, markable = %id, "markable added");
        Ok(id)
    }

    /// Remove a markable after detaching it from every relation.
    pub fn delete_markable(&mut self, id: &str) -> Result<Markable> {
        if !self.markables.contains_key(id) {
            return Err(self.unknown_markable(id));
        }
        for relation in self.relations.values_mut() {
            relation.remove_markable(id, &mut self.markables, self.purge_singletons);
        }
        let name = self.name.clone();
        self.detach_level_reference(&name, id);
        let markable = self.markables.remove(id).ok_or_else(|| self.unknown_markable(id))?;
        self.indices.unregister(&markable);
        self.dirty.mark_dirty();
        debug!(level = %self.name, markable = id, "markable deleted");
        Ok(markable)
    }

    /// Give a markable new positions and re-register it everywhere.
    fn respan(&mut self, id: &str, positions: Vec<usize>) -> Result<()> {
        let markable = self.markables.get_mut(id).ok_or_else(|| CoreError::UnknownMarkable {
            level: self.name.clone(),
            id: id.to_string(),
        })?;
        self.indices.unregister(markable);
        markable.set_positions(positions, &self.discourse);
        self.indices.register(markable);
        for relation in self.relations.values_mut() {
            relation.refresh_order(id, &self.markables);
        }
        self.dirty.mark_dirty();
        Ok(())
    }

    /// Replace the span of a markable. `Ok(false)` for an empty span.
    pub fn update_markable(&mut self, id: &str, fragments: &[Fragment]) -> Result<bool> {
        let current = self.markable(id)?;
        let positions = positions_of_fragments(fragments, &self.discourse)?;
        if positions.is_empty() {
            return Ok(false);
        }
        if positions.as_slice() == current.positions() {
            return Ok(true);
        }
        self.respan(id, positions)?;
        debug!(level = %self.name, markable = id, "markable span updated");
        Ok(true)
    }

    /// Merge tokens into a markable's span.
    pub fn add_discourse_elements<S: AsRef<str>>(&mut self, id: &str, token_ids: &[S]) -> Result<bool> {
        let current = self.markable(id)?;
        let incoming = self.discourse.positions_of(token_ids)?;
        let merged = current.merged_positions(&incoming);
        if merged.is_empty() {
            return Ok(false);
        }
        if merged.as_slice() == current.positions() {
            return Ok(true);
        }
        self.respan(id, merged)?;
        debug!(level = %self.name, markable = id, added = incoming.len(), "discourse elements added");
        Ok(true)
    }

    /// Remove tokens from a markable's span. `Ok(false)`, with the span
    /// untouched, if nothing would be left.
    pub fn remove_discourse_elements<S: AsRef<str>>(&mut self, id: &str, token_ids: &[S]) -> Result<bool> {
        let current = self.markable(id)?;
        let outgoing = self.discourse.positions_of(token_ids)?;
        let reduced = current.reduced_positions(&outgoing);
        if reduced.is_empty() {
            return Ok(false);
        }
        if reduced.len() == current.size() {
            return Ok(true);
        }
        self.respan(id, reduced)?;
        debug!(level = %self.name, markable = id, "discourse elements removed");
        Ok(true)
    }

    /// Set an attribute, keeping relations in step with relation attributes.
    ///
    /// Returns false when a relation refuses the value (full set, too many
    /// pointer targets).
    pub fn set_attribute(&mut self, id: &str, key: &str, value: &str) -> Result<bool> {
        let current = self.markable(id)?;
        let key = self.scheme.canonical_key(key);
        if current.attribute_value(&key) == Some(value) {
            return Ok(true);
        }

        let accepted = match self.relations.get_mut(&key) {
            Some(relation) if relation.is_set() => {
                if value.trim().is_empty() || value == relation.none_value() {
                    relation.leave_set(id, &mut self.markables, self.purge_singletons);
                    true
                } else {
                    relation.join_set(value, id, &mut self.markables, self.purge_singletons)
                }
            }
            Some(relation) => {
                let targets = parse_pointer_targets(value, relation.none_value());
                if let Some(target) = targets
                    .iter()
                    .find(|t| !is_cross_level(t) && !self.markables.contains_key(t.as_str()))
                {
                    return Err(CoreError::UnknownMarkable {
                        level: self.name.clone(),
                        id: target.clone(),
                    });
                }
                if targets.iter().any(|target| target == id) {
                    false
                } else {
                    relation.set_pointer_targets(id, &targets, &mut self.markables)
                }
            }
            None => {
                if let Some(markable) = self.markables.get_mut(id) {
                    markable.attributes_mut().insert(key.clone(), value);
                }
                true
            }
        };
        if accepted {
            self.dirty.mark_dirty();
            debug!(level = %self.name, markable = id, attribute = %key, value, "attribute set");
        }
        Ok(accepted)
    }

    // -------------------------------------------------------------------------
    // Bulk load and export
    // -------------------------------------------------------------------------

    /// Load persisted markables. Bad records are reported and skipped.
    ///
    /// Relations are not touched; call [`Self::init_markable_relations`]
    /// once all records are in.
    pub fn create_markables(&mut self, records: impl IntoIterator<Item = MarkableRecord>) -> LoadReport {
        let mut report = LoadReport::default();
        let set_attributes: Vec<String> = self
            .scheme
            .attributes()
            .iter()
            .filter(|a| a.kind == AttributeKind::MarkableSet)
            .map(|a| a.name.clone())
            .collect();

        for record in records {
            let Some(id) = record.id.filter(|id| !id.trim().is_empty()) else {
                report.issues.push(LoadIssue::new(
                    LoadIssueKind::MissingId,
                    None,
                    "markable without an id attribute",
                ));
                continue;
            };
            let Some(span) = record.span else {
                report.issues.push(LoadIssue::new(
                    LoadIssueKind::MissingSpan,
                    Some(id),
                    "markable without a span attribute",
                ));
                continue;
            };
            if self.markables.contains_key(&id) {
                report.issues.push(LoadIssue::new(
                    LoadIssueKind::DuplicateId,
                    Some(id),
                    "duplicate markable id",
                ));
                continue;
            }
            let positions = match parse_span(&span, &self.discourse)
                .and_then(|fragments| positions_of_fragments(&fragments, &self.discourse))
            {
                Ok(positions) => positions,
                Err(e) => {
                    report
                        .issues
                        .push(LoadIssue::new(LoadIssueKind::InvalidSpan, Some(id), e.to_string()));
                    continue;
                }
            };
            if let Some(level) = record.level.as_deref()
                && !level.eq_ignore_ascii_case(&self.name)
            {
                report.issues.push(LoadIssue::new(
                    LoadIssueKind::LevelMismatch,
                    Some(id.clone()),
                    format!("mmax_level '{level}' does not match level '{}'", self.name),
                ));
                self.mark_read_only("mmax_level mismatch");
            }

            let mut attributes = AttributeMap::canonicalized(record.attributes, &self.scheme);
            self.scheme.apply_defaults(&mut attributes);
            if let Some(num) = numeric_suffix(&id, MARKABLE_ID_PREFIX) {
                report.max_markable_num = report.max_markable_num.max(Some(num));
            }
            for attribute in &set_attributes {
                if let Some(num) = attributes.get(attribute).and_then(|v| numeric_suffix(v, SET_ID_PREFIX)) {
                    report.max_set_num = report.max_set_num.max(Some(num));
                }
            }

            let markable = Markable::new(id.clone(), self.name.clone(), positions, attributes, &self.discourse);
            self.indices.register(&markable);
            self.markables.insert(id, markable);
            report.loaded += 1;
        }

        for issue in &report.issues {
            warn!(level = %self.name, kind = ?issue.kind, "{issue}");
        }
        info!(
            level = %self.name,
            loaded = report.loaded,
            issues = report.issues.len(),
            "markables loaded"
        );
        report
    }

    /// Persistable records in discourse order.
    pub fn to_records(&self) -> Vec<MarkableRecord> {
        self.markables_in_discourse_order()
            .into_iter()
            .map(|markable| MarkableRecord {
                id: Some(markable.id().to_string()),
                span: Some(markable.span_expression()),
                level: Some(self.name.clone()),
                attributes: markable
                    .attributes()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
            .collect()
    }

    /// Attribute values the scheme does not allow, per markable.
    pub fn validate(&self) -> Vec<(String, AttributeIssue)> {
        self.markables_in_discourse_order()
            .into_iter()
            .flat_map(|markable| {
                self.scheme
                    .validate(markable.attributes())
                    .into_iter()
                    .map(move |issue| (markable.id().to_string(), issue))
            })
            .collect()
    }

    /// Recompute every index from the markable map.
    pub fn rebuild_indices(&mut self) {
        self.indices = LevelIndices::build(self.markables.values());
    }

    /// Describe every disagreement between markables, indices and relations.
    pub fn check_consistency(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for markable in self.markables_in_discourse_order() {
            let canonical = fragments_from_positions(markable.positions(), &self.discourse);
            if canonical.as_slice() != markable.fragments() {
                problems.push(format!("{}: fragments are not canonical", markable.id()));
            }
        }
        let fresh = LevelIndices::build(self.markables.values());
        if fresh.at_token != self.indices.at_token {
            problems.push("token index is out of date".to_string());
        }
        if fresh.started_at_token != self.indices.started_at_token
            || fresh.ended_at_token != self.indices.ended_at_token
        {
            problems.push("fragment start/end index is out of date".to_string());
        }
        if fresh.order != self.indices.order {
            problems.push("discourse order index is out of date".to_string());
        }

        for relation in self.relations.values() {
            let name = relation.attribute_name();
            for set in relation.sets() {
                for member in set.members() {
                    match self.markables.get(member) {
                        None => problems.push(format!("{name}: set {} holds unknown {member}", set.group_value())),
                        Some(m) if m.attribute_value(name) != Some(set.group_value()) => problems.push(format!(
                            "{name}: {member} is in set {} but has value {:?}",
                            set.group_value(),
                            m.attribute_value(name)
                        )),
                        Some(_) => {}
                    }
                }
            }
            for pointer in relation.pointers() {
                let expected = pointer.targets().join(";");
                match self.markables.get(pointer.source()) {
                    None => problems.push(format!("{name}: pointer from unknown {}", pointer.source())),
                    Some(m) if m.attribute_value(name) != Some(expected.as_str()) => {
                        problems.push(format!("{name}: {} does not list its targets", pointer.source()));
                    }
                    Some(_) => {}
                }
                for target in pointer.targets().iter().filter(|t| !is_cross_level(t)) {
                    if !self.markables.contains_key(target) {
                        problems.push(format!("{name}: {} points to unknown {target}", pointer.source()));
                    }
                }
            }
        }
        problems
    }
}
