//! Markable relations: sets and pointers driven by attribute values.
//!
//! A relation is keyed by a scheme attribute. Set relations group markables
//! sharing a value such as `set_4`; pointer relations link one source
//! markable to an ordered list of targets, stored on the source as a
//! `;`-separated attribute value. Relations refer to markables by ID and
//! write the driving attribute whenever membership changes, so attribute
//! values and membership never disagree.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use mks_model::{AttributeKind, SchemeAttribute};

use crate::markable::Markable;

pub(crate) type Markables = HashMap<String, Markable>;

/// Separator between pointer targets in an attribute value.
pub const POINTER_TARGET_SEPARATOR: char = ';';

// =============================================================================
// MARKABLE SET
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum SetMembers {
    /// Kept in discourse order.
    Ordered(Vec<String>),
    Unordered(BTreeSet<String>),
}

/// A group of markables sharing one relation value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkableSet {
    group_value: String,
    ordered: bool,
    members: SetMembers,
}

impl MarkableSet {
    pub fn new(group_value: impl Into<String>, ordered: bool) -> Self {
        let members = if ordered {
            SetMembers::Ordered(Vec::new())
        } else {
            SetMembers::Unordered(BTreeSet::new())
        };
        Self {
            group_value: group_value.into(),
            ordered,
            members,
        }
    }

    pub fn group_value(&self) -> &str {
        &self.group_value
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn size(&self) -> usize {
        match &self.members {
            SetMembers::Ordered(list) => list.len(),
            SetMembers::Unordered(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        match &self.members {
            SetMembers::Ordered(list) => list.iter().any(|member| member == id),
            SetMembers::Unordered(set) => set.contains(id),
        }
    }

    /// Member IDs; discourse order for ordered sets, ID order otherwise.
    pub fn members(&self) -> Vec<&str> {
        match &self.members {
            SetMembers::Ordered(list) => list.iter().map(String::as_str).collect(),
            SetMembers::Unordered(set) => set.iter().map(String::as_str).collect(),
        }
    }

    pub(crate) fn add_member(&mut self, id: &str, markables: &Markables) -> bool {
        if self.contains(id) {
            return false;
        }
        match &mut self.members {
            SetMembers::Unordered(set) => set.insert(id.to_string()),
            SetMembers::Ordered(list) => {
                let at = match markables.get(id).map(Markable::order_key) {
                    Some(key) => list
                        .iter()
                        .position(|member| {
                            markables
                                .get(member)
                                .is_some_and(|other| other.order_key() > key)
                        })
                        .unwrap_or(list.len()),
                    None => list.len(),
                };
                list.insert(at, id.to_string());
                true
            }
        }
    }

    pub(crate) fn remove_member(&mut self, id: &str) -> bool {
        match &mut self.members {
            SetMembers::Ordered(list) => {
                let before = list.len();
                list.retain(|member| member != id);
                list.len() != before
            }
            SetMembers::Unordered(set) => set.remove(id),
        }
    }

    /// Restore discourse order after a member's span changed.
    pub(crate) fn resort(&mut self, markables: &Markables) {
        if let SetMembers::Ordered(list) = &mut self.members {
            list.sort_by_cached_key(|member| markables.get(member).map(Markable::order_key));
        }
    }
}

// =============================================================================
// MARKABLE POINTER
// =============================================================================

/// A directed link from one source markable to ordered targets.
///
/// Targets are markable IDs on the same level, or `level:id` references to
/// markables on another level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkablePointer {
    source: String,
    targets: Vec<String>,
    max_size: Option<usize>,
    #[serde(skip)]
    ambient: bool,
    #[serde(skip)]
    permanent: bool,
}

impl MarkablePointer {
    pub fn new(source: impl Into<String>, max_size: Option<usize>) -> Self {
        Self {
            source: source.into(),
            targets: Vec::new(),
            max_size,
            ambient: false,
            permanent: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn size(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }

    /// True iff a cap is set and reached.
    pub fn has_max_size(&self) -> bool {
        self.max_size.is_some_and(|max| self.targets.len() == max)
    }

    pub fn is_ambient(&self) -> bool {
        self.ambient
    }

    pub fn set_ambient(&mut self, ambient: bool) {
        self.ambient = ambient;
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn set_permanent(&mut self, permanent: bool) {
        self.permanent = permanent;
    }

    pub(crate) fn add_target(&mut self, target: &str) -> bool {
        if self.has_target(target) || self.max_size.is_some_and(|max| self.targets.len() >= max) {
            return false;
        }
        self.targets.push(target.to_string());
        true
    }

    pub(crate) fn remove_target(&mut self, target: &str) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t != target);
        self.targets.len() != before
    }

    fn attribute_value(&self, none_value: &str) -> String {
        if self.targets.is_empty() {
            none_value.to_string()
        } else {
            self.targets.join(&POINTER_TARGET_SEPARATOR.to_string())
        }
    }
}

/// Split a pointer attribute value into target references.
pub fn parse_pointer_targets(value: &str, none_value: &str) -> Vec<String> {
    if value.trim().is_empty() || value == none_value {
        return Vec::new();
    }
    let mut targets: Vec<String> = Vec::new();
    for target in value.split(POINTER_TARGET_SEPARATOR).map(str::trim) {
        if !target.is_empty() && !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }
    targets
}

// =============================================================================
// MARKABLE RELATION
// =============================================================================

/// Membership storage of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RelationKind {
    /// Group value -> set.
    Set(BTreeMap<String, MarkableSet>),
    /// Source markable ID -> pointer.
    Pointer(BTreeMap<String, MarkablePointer>),
}

/// A relation driven by one scheme attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkableRelation {
    attribute: String,
    max_size: Option<usize>,
    ordered: bool,
    none_value: String,
    kind: RelationKind,
}

fn write_attribute(markables: &mut Markables, id: &str, attribute: &str, value: &str) {
    if let Some(markable) = markables.get_mut(id) {
        markable.attributes_mut().insert(attribute, value);
    }
}

impl MarkableRelation {
    pub fn new_set(attribute: impl Into<String>, ordered: bool, max_size: Option<usize>) -> Self {
        Self {
            attribute: attribute.into(),
            max_size,
            ordered,
            none_value: mks_model::DEFAULT_NONE_VALUE.to_string(),
            kind: RelationKind::Set(BTreeMap::new()),
        }
    }

    pub fn new_pointer(attribute: impl Into<String>, max_size: Option<usize>) -> Self {
        Self {
            attribute: attribute.into(),
            max_size,
            ordered: false,
            none_value: mks_model::DEFAULT_NONE_VALUE.to_string(),
            kind: RelationKind::Pointer(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_none_value(mut self, none_value: impl Into<String>) -> Self {
        self.none_value = none_value.into();
        self
    }

    /// Build the relation for a set or pointer attribute.
    pub fn from_scheme(attribute: &SchemeAttribute) -> Option<Self> {
        let relation = match attribute.kind {
            AttributeKind::MarkableSet => {
                Self::new_set(attribute.name.clone(), attribute.ordered, attribute.max_size)
            }
            AttributeKind::MarkablePointer => {
                Self::new_pointer(attribute.name.clone(), attribute.max_size)
            }
            _ => return None,
        };
        Some(relation.with_none_value(attribute.none_value.clone()))
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute
    }

    pub fn none_value(&self) -> &str {
        &self.none_value
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn is_set(&self) -> bool {
        matches!(self.kind, RelationKind::Set(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, RelationKind::Pointer(_))
    }

    /// Number of sets or pointers.
    pub fn group_count(&self) -> usize {
        match &self.kind {
            RelationKind::Set(sets) => sets.len(),
            RelationKind::Pointer(pointers) => pointers.len(),
        }
    }

    pub fn sets(&self) -> impl Iterator<Item = &MarkableSet> {
        match &self.kind {
            RelationKind::Set(sets) => Some(sets.values()),
            RelationKind::Pointer(_) => None,
        }
        .into_iter()
        .flatten()
    }

    pub fn set(&self, group_value: &str) -> Option<&MarkableSet> {
        match &self.kind {
            RelationKind::Set(sets) => sets.get(group_value),
            RelationKind::Pointer(_) => None,
        }
    }

    pub fn set_containing(&self, id: &str) -> Option<&MarkableSet> {
        self.sets().find(|set| set.contains(id))
    }

    pub fn pointers(&self) -> impl Iterator<Item = &MarkablePointer> {
        match &self.kind {
            RelationKind::Pointer(pointers) => Some(pointers.values()),
            RelationKind::Set(_) => None,
        }
        .into_iter()
        .flatten()
    }

    pub fn pointer(&self, source: &str) -> Option<&MarkablePointer> {
        match &self.kind {
            RelationKind::Pointer(pointers) => pointers.get(source),
            RelationKind::Set(_) => None,
        }
    }

    pub fn pointer_mut(&mut self, source: &str) -> Option<&mut MarkablePointer> {
        match &mut self.kind {
            RelationKind::Pointer(pointers) => pointers.get_mut(source),
            RelationKind::Set(_) => None,
        }
    }

    pub fn pointers_targeting(&self, target: &str) -> Vec<&MarkablePointer> {
        self.pointers()
            .filter(|pointer| pointer.has_target(target))
            .collect()
    }

    /// Whether the markable takes part in this relation in any role.
    pub fn contains(&self, id: &str) -> bool {
        match &self.kind {
            RelationKind::Set(sets) => sets.values().any(|set| set.contains(id)),
            RelationKind::Pointer(pointers) => {
                pointers.contains_key(id) || pointers.values().any(|p| p.has_target(id))
            }
        }
    }

    /// Members of the set holding `id`, or the targets of its pointer.
    pub fn members_of(&self, id: &str) -> Vec<&str> {
        match &self.kind {
            RelationKind::Set(sets) => sets
                .values()
                .find(|set| set.contains(id))
                .map(MarkableSet::members)
                .unwrap_or_default(),
            RelationKind::Pointer(pointers) => pointers
                .get(id)
                .map(|p| p.targets().iter().map(String::as_str).collect())
                .unwrap_or_default(),
        }
    }

    // -------------------------------------------------------------------------
    // Set membership
    // -------------------------------------------------------------------------

    /// Move `id` into the set `group`, leaving its current set first.
    ///
    /// Returns false when the markable already belongs to `group` or the
    /// target set is full.
    pub(crate) fn join_set(&mut self, group: &str, id: &str, markables: &mut Markables, purge: bool) -> bool {
        let Self {
            attribute,
            max_size,
            ordered,
            none_value,
            kind,
        } = self;
        let RelationKind::Set(sets) = kind else {
            return false;
        };
        if let Some(set) = sets.get(group) {
            if set.contains(id) {
                return false;
            }
            if max_size.is_some_and(|max| set.size() >= max) {
                return false;
            }
        }
        leave_set(sets, attribute, none_value, id, markables, purge);
        sets.entry(group.to_string())
            .or_insert_with(|| MarkableSet::new(group, *ordered))
            .add_member(id, markables);
        write_attribute(markables, id, attribute, group);
        debug!(attribute = %attribute, set = group, markable = id, "joined set");
        true
    }

    /// Take `id` out of its set, purging a resulting singleton if asked.
    pub(crate) fn leave_set(&mut self, id: &str, markables: &mut Markables, purge: bool) -> bool {
        let Self {
            attribute,
            none_value,
            kind,
            ..
        } = self;
        match kind {
            RelationKind::Set(sets) => leave_set(sets, attribute, none_value, id, markables, purge),
            RelationKind::Pointer(_) => false,
        }
    }

    /// Dissolve every set with fewer than two members.
    pub(crate) fn purge_singleton_sets(&mut self, markables: &mut Markables) -> usize {
        let Self {
            attribute,
            none_value,
            kind,
            ..
        } = self;
        let RelationKind::Set(sets) = kind else {
            return 0;
        };
        let degenerate: Vec<String> = sets
            .iter()
            .filter(|(_, set)| set.size() < 2)
            .map(|(group, _)| group.clone())
            .collect();
        for group in &degenerate {
            if let Some(set) = sets.remove(group) {
                for member in set.members() {
                    write_attribute(markables, member, attribute, none_value);
                }
            }
        }
        if !degenerate.is_empty() {
            debug!(attribute = %attribute, purged = degenerate.len(), "purged singleton sets");
        }
        degenerate.len()
    }

    // -------------------------------------------------------------------------
    // Pointer targets
    // -------------------------------------------------------------------------

    /// Append a target to the source's pointer, creating it if needed.
    ///
    /// Returns false when the target is already present or the cap is reached.
    pub(crate) fn add_pointer_target(&mut self, source: &str, target: &str, markables: &mut Markables) -> bool {
        let Self {
            attribute,
            max_size,
            none_value,
            kind,
            ..
        } = self;
        let RelationKind::Pointer(pointers) = kind else {
            return false;
        };
        let pointer = pointers
            .entry(source.to_string())
            .or_insert_with(|| MarkablePointer::new(source, *max_size));
        let added = pointer.add_target(target);
        let value = pointer.attribute_value(none_value);
        if pointer.is_empty() {
            pointers.remove(source);
        }
        if added {
            write_attribute(markables, source, attribute, &value);
        }
        added
    }

    pub(crate) fn remove_pointer_target(&mut self, source: &str, target: &str, markables: &mut Markables) -> bool {
        let Self {
            attribute,
            none_value,
            kind,
            ..
        } = self;
        let RelationKind::Pointer(pointers) = kind else {
            return false;
        };
        let Some(pointer) = pointers.get_mut(source) else {
            return false;
        };
        if !pointer.remove_target(target) {
            return false;
        }
        let value = pointer.attribute_value(none_value);
        if pointer.is_empty() {
            pointers.remove(source);
        }
        write_attribute(markables, source, attribute, &value);
        true
    }

    /// Replace all targets of a source. Fails without change if the list
    /// exceeds the cap.
    pub(crate) fn set_pointer_targets(&mut self, source: &str, targets: &[String], markables: &mut Markables) -> bool {
        if self.max_size.is_some_and(|max| targets.len() > max) {
            return false;
        }
        let Self {
            attribute,
            max_size,
            none_value,
            kind,
            ..
        } = self;
        let RelationKind::Pointer(pointers) = kind else {
            return false;
        };
        pointers.remove(source);
        let mut pointer = MarkablePointer::new(source, *max_size);
        for target in targets {
            pointer.add_target(target);
        }
        let value = pointer.attribute_value(none_value);
        if !pointer.is_empty() {
            pointers.insert(source.to_string(), pointer);
        }
        write_attribute(markables, source, attribute, &value);
        true
    }

    /// Drop `target` from every pointer, removing pointers left empty.
    pub(crate) fn detach_target(&mut self, target: &str, markables: &mut Markables) -> usize {
        let sources: Vec<String> = self
            .pointers_targeting(target)
            .into_iter()
            .map(|pointer| pointer.source().to_string())
            .collect();
        for source in &sources {
            self.remove_pointer_target(source, target, markables);
        }
        sources.len()
    }

    /// Remove every trace of `id` from the relation.
    pub(crate) fn remove_markable(&mut self, id: &str, markables: &mut Markables, purge: bool) -> bool {
        if self.is_set() {
            return self.leave_set(id, markables, purge);
        }
        let had_pointer = match &mut self.kind {
            RelationKind::Pointer(pointers) => pointers.remove(id).is_some(),
            RelationKind::Set(_) => false,
        };
        if had_pointer {
            write_attribute(markables, id, &self.attribute, &self.none_value);
        }
        let detached = self.detach_target(id, markables);
        had_pointer || detached > 0
    }

    /// Rebuild membership from attribute values, visiting `order` in sequence.
    pub(crate) fn rebuild(&mut self, order: &[String], markables: &Markables) {
        let Self {
            attribute,
            max_size,
            ordered,
            none_value,
            kind,
        } = self;
        let attribute: &str = attribute;
        let none_value: &str = none_value;
        match kind {
            RelationKind::Set(sets) => {
                sets.clear();
                for id in order {
                    let Some(value) = markables.get(id).and_then(|m| m.attribute_value(attribute)) else {
                        continue;
                    };
                    if value.trim().is_empty() || value == none_value {
                        continue;
                    }
                    sets.entry(value.to_string())
                        .or_insert_with(|| MarkableSet::new(value, *ordered))
                        .add_member(id, markables);
                }
            }
            RelationKind::Pointer(pointers) => {
                pointers.clear();
                for id in order {
                    let Some(value) = markables.get(id).and_then(|m| m.attribute_value(attribute)) else {
                        continue;
                    };
                    let targets = parse_pointer_targets(value, none_value);
                    if targets.is_empty() {
                        continue;
                    }
                    // Loaded data may exceed the cap; keep it as found.
                    let mut pointer = MarkablePointer::new(id.as_str(), None);
                    for target in &targets {
                        pointer.add_target(target);
                    }
                    pointer.max_size = *max_size;
                    pointers.insert(id.clone(), pointer);
                }
            }
        }
    }

    /// Re-sort the ordered set holding `id` after its span changed.
    pub(crate) fn refresh_order(&mut self, id: &str, markables: &Markables) {
        if let RelationKind::Set(sets) = &mut self.kind
            && let Some(set) = sets.values_mut().find(|set| set.contains(id))
        {
            set.resort(markables);
        }
    }
}

fn leave_set(
    sets: &mut BTreeMap<String, MarkableSet>,
    attribute: &str,
    none_value: &str,
    id: &str,
    markables: &mut Markables,
    purge: bool,
) -> bool {
    let Some(group) = sets
        .iter()
        .find(|(_, set)| set.contains(id))
        .map(|(group, _)| group.clone())
    else {
        return false;
    };
    let Some(set) = sets.get_mut(&group) else {
        return false;
    };
    set.remove_member(id);
    write_attribute(markables, id, attribute, none_value);

    if set.is_empty() {
        sets.remove(&group);
    } else if purge && set.size() == 1 {
        if let Some(set) = sets.remove(&group) {
            for member in set.members() {
                write_attribute(markables, member, attribute, none_value);
            }
        }
        debug!(attribute, set = %group, "purged singleton set");
    }
    true
}
