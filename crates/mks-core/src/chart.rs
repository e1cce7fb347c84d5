//! All levels of one discourse.
//!
//! The chart owns its levels in stacking order (index 0 is the top) and the
//! ID allocator shared by every level of the document.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mks_model::{DiscourseIndex, Fragment};

use crate::customization::RenderStyle;
use crate::error::{CoreError, Result};
use crate::ids::{IdAllocator, MARKABLE_ID_PREFIX, numeric_suffix};
use crate::level::{LEVEL_REFERENCE_SEPARATOR, LevelStatus, LoadReport, MarkableLevel};
use crate::markable::Markable;
use crate::query::{MarkableQuery, QueryHit, QueryResult};

/// Which levels a chart-wide lookup considers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelFilter {
    #[default]
    All,
    Active,
    Visible,
}

impl LevelFilter {
    pub fn accepts(&self, level: &MarkableLevel) -> bool {
        match self {
            Self::All => true,
            Self::Active => level.is_active(),
            Self::Visible => level.is_visible(),
        }
    }
}

/// Direction of a layer move. `Up` is towards the top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderDirection {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct MarkableChart {
    discourse: Arc<DiscourseIndex>,
    ordered_levels: Vec<MarkableLevel>,
    /// Lower-cased name -> index into `ordered_levels`.
    levels: HashMap<String, usize>,
    ids: IdAllocator,
}

impl MarkableChart {
    pub fn new(discourse: Arc<DiscourseIndex>) -> Self {
        Self {
            discourse,
            ordered_levels: Vec::new(),
            levels: HashMap::new(),
            ids: IdAllocator::new(),
        }
    }

    pub fn discourse(&self) -> &Arc<DiscourseIndex> {
        &self.discourse
    }

    // -------------------------------------------------------------------------
    // Levels
    // -------------------------------------------------------------------------

    /// Add a level at the bottom of the stack.
    pub fn add_level(&mut self, mut level: MarkableLevel) -> Result<()> {
        let key = level.name().to_lowercase();
        if self.levels.contains_key(&key) {
            return Err(CoreError::DuplicateLevel(level.name().to_string()));
        }
        let position = self.ordered_levels.len();
        level.set_position(position);
        debug!(level = %level.name(), position, "level added");
        self.levels.insert(key, position);
        self.ordered_levels.push(level);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.levels
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| CoreError::UnknownLevel(name.to_string()))
    }

    pub fn level(&self, name: &str) -> Result<&MarkableLevel> {
        let idx = self.index_of(name)?;
        Ok(&self.ordered_levels[idx])
    }

    pub fn level_mut(&mut self, name: &str) -> Result<&mut MarkableLevel> {
        let idx = self.index_of(name)?;
        Ok(&mut self.ordered_levels[idx])
    }

    pub fn level_count(&self) -> usize {
        self.ordered_levels.len()
    }

    /// Levels from the top of the stack down.
    pub fn levels_in_order(&self) -> impl Iterator<Item = &MarkableLevel> {
        self.ordered_levels.iter()
    }

    pub fn levels_in_order_mut(&mut self) -> impl Iterator<Item = &mut MarkableLevel> {
        self.ordered_levels.iter_mut()
    }

    pub fn active_levels(&self) -> impl Iterator<Item = &MarkableLevel> {
        self.ordered_levels.iter().filter(|level| level.is_active())
    }

    pub fn set_level_status(&mut self, name: &str, status: LevelStatus) -> Result<()> {
        self.level_mut(name)?.set_status(status);
        Ok(())
    }

    /// Swap the level at `position` with its neighbour. False at the boundary.
    pub fn reorder_markable_layers(&mut self, direction: ReorderDirection, position: usize) -> bool {
        let len = self.ordered_levels.len();
        let other = match direction {
            ReorderDirection::Up if position > 0 && position < len => position - 1,
            ReorderDirection::Down if position + 1 < len => position + 1,
            _ => return false,
        };
        self.ordered_levels.swap(position, other);
        for idx in [position, other] {
            let level = &mut self.ordered_levels[idx];
            level.set_position(idx);
            self.levels.insert(level.name().to_lowercase(), idx);
        }
        debug!(from = position, to = other, "levels reordered");
        true
    }

    // -------------------------------------------------------------------------
    // IDs
    // -------------------------------------------------------------------------

    pub fn next_free_markable_id(&mut self) -> String {
        self.ids.next_markable_id()
    }

    pub fn next_free_set_id(&mut self) -> String {
        self.ids.next_set_id()
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Advance the counters past the maxima a level load reported.
    pub fn seed_counters(&mut self, report: &LoadReport) {
        if let Some(num) = report.max_markable_num {
            self.ids.observe_markable_num(num);
        }
        if let Some(num) = report.max_set_num {
            self.ids.observe_set_num(num);
        }
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    pub fn add_markable<K, V>(
        &mut self,
        level: &str,
        fragments: &[Fragment],
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<String>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let idx = self.index_of(level)?;
        self.ordered_levels[idx].add_markable(&mut self.ids, fragments, attributes)
    }

    /// Delete a markable and drop `level:id` references to it elsewhere.
    pub fn delete_markable(&mut self, level: &str, id: &str) -> Result<Markable> {
        let idx = self.index_of(level)?;
        let markable = self.ordered_levels[idx].delete_markable(id)?;
        let name = self.ordered_levels[idx].name().to_string();
        for other in &mut self.ordered_levels {
            other.detach_level_reference(&name, id);
        }
        Ok(markable)
    }

    pub fn create_set(&mut self, level: &str, attribute: &str, members: &[&str]) -> Result<String> {
        let idx = self.index_of(level)?;
        self.ordered_levels[idx].create_set(&mut self.ids, attribute, members)
    }

    // -------------------------------------------------------------------------
    // Cross-level queries
    // -------------------------------------------------------------------------

    /// One slot per level in stacking order; filtered-out levels give empty
    /// slots. Each slot is in discourse order.
    pub fn markables_at_discourse_position(&self, position: usize, filter: LevelFilter) -> Vec<Vec<&Markable>> {
        self.ordered_levels
            .iter()
            .map(|level| {
                if filter.accepts(level) {
                    level.markables_at_discourse_position(position, true)
                } else {
                    Vec::new()
                }
            })
            .collect()
    }

    pub fn markables_at_discourse_element(&self, token_id: &str, filter: LevelFilter) -> Result<Vec<Vec<&Markable>>> {
        let position = self.discourse.discourse_position_of(token_id)?;
        Ok(self.markables_at_discourse_position(position, filter))
    }

    /// Merge display styles at a token from the bottom level up.
    ///
    /// Hidden levels are skipped. A style field set by a higher contribution
    /// wins; unset fields keep the value from below.
    pub fn top_attributes_at_discourse_element(&self, token_id: &str) -> RenderStyle {
        let mut style = RenderStyle::default();
        for level in self.ordered_levels.iter().rev().filter(|level| level.is_visible()) {
            for markable in level.markables_at_discourse_element(token_id, true) {
                style.overlay(&level.customization().style_for(markable));
            }
        }
        style
    }

    /// Resolve a pointer target written on `from_level`: a plain ID on the
    /// same level or a `level:id` reference.
    pub fn resolve_pointer_target(&self, from_level: &str, target: &str) -> Result<&Markable> {
        match target.split_once(LEVEL_REFERENCE_SEPARATOR) {
            Some((level, id)) => self.level(level)?.markable(id),
            None => self.level(from_level)?.markable(target),
        }
    }

    pub fn query(&self, query: &MarkableQuery) -> QueryResult {
        let hits = self
            .ordered_levels
            .iter()
            .filter(|level| query.includes_level(level.name()))
            .flat_map(|level| {
                level.query(query).into_iter().map(move |markable| QueryHit {
                    level: level.name().to_string(),
                    id: markable.id().to_string(),
                    span: markable.span_expression(),
                    text: markable.text(&self.discourse),
                    leftmost: markable.leftmost_discourse_position(),
                })
            })
            .collect();
        QueryResult::new(hits)
    }

    /// Flag every hit as a search result. Earlier flags are cleared.
    pub fn mark_search_results(&mut self, result: &QueryResult) -> Result<()> {
        self.clear_search_results();
        for hit in result.iter() {
            self.level_mut(&hit.level)?.set_search_result(&hit.id, true)?;
        }
        Ok(())
    }

    pub fn clear_search_results(&mut self) {
        for level in &mut self.ordered_levels {
            level.clear_search_results();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.ordered_levels.iter().any(MarkableLevel::is_dirty)
    }

    pub fn dirty_levels(&self) -> impl Iterator<Item = &MarkableLevel> {
        self.ordered_levels.iter().filter(|level| level.is_dirty())
    }

    /// Problems per level plus dangling cross-level references and counters
    /// that lag behind existing IDs, as (level name, problem) pairs.
    pub fn check_consistency(&self) -> Vec<(String, String)> {
        let mut problems = Vec::new();
        for level in &self.ordered_levels {
            let name = level.name();
            for problem in level.check_consistency() {
                problems.push((name.to_string(), problem));
            }
            for relation in level.relations().filter(|r| r.is_pointer()) {
                for pointer in relation.pointers() {
                    for target in pointer
                        .targets()
                        .iter()
                        .filter(|t| t.contains(LEVEL_REFERENCE_SEPARATOR))
                    {
                        if self.resolve_pointer_target(name, target).is_err() {
                            problems.push((
                                name.to_string(),
                                format!("{} points to unresolved {target}", pointer.source()),
                            ));
                        }
                    }
                }
            }
            let next = self.ids.peek_markable_num();
            for markable in level.markables() {
                if numeric_suffix(markable.id(), MARKABLE_ID_PREFIX).is_some_and(|num| num >= next) {
                    problems.push((
                        name.to_string(),
                        format!("{} is not below the next free id number {next}", markable.id()),
                    ));
                }
            }
        }
        if problems.is_empty() {
            info!(levels = self.ordered_levels.len(), "chart is consistent");
        }
        problems
    }
}
