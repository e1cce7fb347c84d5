//! Attribute filters over markables and the results they produce.

use regex::Regex;
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::markable::Markable;

/// One condition on a markable attribute. Keys are matched against
/// canonical attribute names, values case-sensitively.
#[derive(Debug, Clone)]
pub enum AttributeFilter {
    Equals { key: String, value: String },
    NotEquals { key: String, value: String },
    Matches { key: String, pattern: Regex },
    /// The attribute is present with a non-empty value.
    Exists { key: String },
}

impl AttributeFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn not_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Compile `pattern`; the whole value must match.
    pub fn matches(key: impl Into<String>, pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored).map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::Matches {
            key: key.into(),
            pattern,
        })
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists { key: key.into() }
    }

    /// Parse `key=value`, `key!=value`, `key~regex` or a bare `key`.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if let Some((key, value)) = expression.split_once("!=") {
            return Ok(Self::not_equals(key.trim(), value.trim()));
        }
        if let Some((key, pattern)) = expression.split_once('~') {
            return Self::matches(key.trim(), pattern.trim());
        }
        if let Some((key, value)) = expression.split_once('=') {
            return Ok(Self::equals(key.trim(), value.trim()));
        }
        Ok(Self::exists(expression))
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. }
            | Self::NotEquals { key, .. }
            | Self::Matches { key, .. }
            | Self::Exists { key } => key,
        }
    }

    pub fn accepts(&self, markable: &Markable) -> bool {
        let actual = markable.attribute_value(self.key());
        match self {
            Self::Equals { value, .. } => actual == Some(value.as_str()),
            Self::NotEquals { value, .. } => actual != Some(value.as_str()),
            Self::Matches { pattern, .. } => actual.is_some_and(|v| pattern.is_match(v)),
            Self::Exists { .. } => actual.is_some_and(|v| !v.is_empty()),
        }
    }
}

/// A conjunction of filters, optionally limited to some levels.
#[derive(Debug, Clone, Default)]
pub struct MarkableQuery {
    filters: Vec<AttributeFilter>,
    levels: Vec<String>,
}

impl MarkableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: AttributeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restrict to a level (case-insensitive). May be called repeatedly.
    #[must_use]
    pub fn on_level(mut self, level: impl Into<String>) -> Self {
        self.levels.push(level.into());
        self
    }

    pub fn filters(&self) -> &[AttributeFilter] {
        &self.filters
    }

    pub fn includes_level(&self, level: &str) -> bool {
        self.levels.is_empty() || self.levels.iter().any(|l| l.eq_ignore_ascii_case(level))
    }

    pub fn accepts(&self, markable: &Markable) -> bool {
        self.filters.iter().all(|filter| filter.accepts(markable))
    }
}

/// One matching markable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryHit {
    pub level: String,
    pub id: String,
    pub span: String,
    pub text: String,
    #[serde(skip)]
    pub(crate) leftmost: usize,
}

/// Hits in discourse order; ties keep level stacking order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryResult {
    hits: Vec<QueryHit>,
}

impl QueryResult {
    pub(crate) fn new(mut hits: Vec<QueryHit>) -> Self {
        hits.sort_by_key(|hit| hit.leftmost);
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[QueryHit] {
        &self.hits
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryHit> {
        self.hits.iter()
    }

    pub fn on_level<'a>(&'a self, level: &'a str) -> impl Iterator<Item = &'a QueryHit> {
        self.hits
            .iter()
            .filter(move |hit| hit.level.eq_ignore_ascii_case(level))
    }
}
