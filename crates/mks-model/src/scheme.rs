//! Annotation scheme: the attribute definitions a level's markables follow.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeMap;

/// Value used by relation attributes that point nowhere.
pub const DEFAULT_NONE_VALUE: &str = "none";

/// Kind of a scheme attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    NominalList,
    NominalButton,
    FreeText,
    MarkableSet,
    MarkablePointer,
}

impl AttributeKind {
    /// Parse the scheme-file spelling (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nominal_list" => Some(Self::NominalList),
            "nominal_button" => Some(Self::NominalButton),
            "freetext" | "free_text" => Some(Self::FreeText),
            "markable_set" => Some(Self::MarkableSet),
            "markable_pointer" => Some(Self::MarkablePointer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NominalList => "nominal_list",
            Self::NominalButton => "nominal_button",
            Self::FreeText => "freetext",
            Self::MarkableSet => "markable_set",
            Self::MarkablePointer => "markable_pointer",
        }
    }

    /// Set and pointer attributes drive markable relations.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::MarkableSet | Self::MarkablePointer)
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self, Self::NominalList | Self::NominalButton)
    }
}

/// One attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeAttribute {
    pub name: String,
    pub kind: AttributeKind,
    /// Allowed values for nominal kinds, in declaration order.
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    /// Cap on set members or pointer targets; `None` is unbounded.
    #[serde(default)]
    pub max_size: Option<usize>,
    /// Whether set members keep discourse order.
    #[serde(default)]
    pub ordered: bool,
    #[serde(default = "default_none_value")]
    pub none_value: String,
}

fn default_none_value() -> String {
    DEFAULT_NONE_VALUE.to_string()
}

impl SchemeAttribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            values: Vec::new(),
            default_value: None,
            max_size: None,
            ordered: false,
            none_value: default_none_value(),
        }
    }

    #[must_use]
    pub fn with_values<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    #[must_use]
    pub fn with_none_value(mut self, value: impl Into<String>) -> Self {
        self.none_value = value.into();
        self
    }

    /// Value given to markables that do not set this attribute.
    pub fn effective_default(&self) -> String {
        if let Some(value) = &self.default_value {
            return value.clone();
        }
        match self.kind {
            AttributeKind::NominalList | AttributeKind::NominalButton => {
                self.values.first().cloned().unwrap_or_default()
            }
            AttributeKind::FreeText => String::new(),
            AttributeKind::MarkableSet | AttributeKind::MarkablePointer => self.none_value.clone(),
        }
    }

    /// Whether `value` is acceptable for this attribute.
    pub fn accepts(&self, value: &str) -> bool {
        match self.kind {
            AttributeKind::NominalList | AttributeKind::NominalButton => {
                self.values.is_empty() || self.values.iter().any(|v| v.eq_ignore_ascii_case(value))
            }
            AttributeKind::FreeText => true,
            AttributeKind::MarkableSet => value == self.none_value || !value.trim().is_empty(),
            AttributeKind::MarkablePointer => {
                value == self.none_value
                    || value.split(';').all(|target| !target.trim().is_empty())
            }
        }
    }
}

/// A problem found when checking attributes against the scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeIssue {
    pub attribute: String,
    pub value: String,
    pub message: String,
}

/// The attribute definitions of one level.
#[derive(Debug, Clone, Default)]
pub struct AnnotationScheme {
    attributes: Vec<SchemeAttribute>,
    /// Lower-cased name -> index into `attributes`.
    by_key: HashMap<String, usize>,
}

impl AnnotationScheme {
    pub fn new(attributes: Vec<SchemeAttribute>) -> Self {
        let by_key = attributes
            .iter()
            .enumerate()
            .map(|(idx, attribute)| (attribute.name.to_lowercase(), idx))
            .collect();
        Self { attributes, by_key }
    }

    pub fn attributes(&self) -> &[SchemeAttribute] {
        &self.attributes
    }

    /// Look up an attribute by name, ignoring case.
    pub fn attribute(&self, key: &str) -> Option<&SchemeAttribute> {
        self.by_key
            .get(&key.to_lowercase())
            .map(|&idx| &self.attributes[idx])
    }

    /// The scheme's spelling of `key`; unknown keys are lower-cased.
    pub fn canonical_key(&self, key: &str) -> String {
        match self.attribute(key) {
            Some(attribute) => attribute.name.clone(),
            None => key.to_lowercase(),
        }
    }

    pub fn relation_attributes(&self) -> impl Iterator<Item = &SchemeAttribute> {
        self.attributes.iter().filter(|a| a.kind.is_relation())
    }

    /// Fill every scheme attribute missing from `attributes` with its default.
    pub fn apply_defaults(&self, attributes: &mut AttributeMap) {
        for attribute in &self.attributes {
            if !attributes.contains_key(&attribute.name) {
                attributes.insert(attribute.name.clone(), attribute.effective_default());
            }
        }
    }

    /// Check values against their definitions. Unknown keys are not issues.
    pub fn validate(&self, attributes: &AttributeMap) -> Vec<AttributeIssue> {
        let mut issues = Vec::new();
        for (key, value) in attributes.iter() {
            let Some(attribute) = self.attribute(key) else {
                continue;
            };
            if !attribute.accepts(value) {
                issues.push(AttributeIssue {
                    attribute: attribute.name.clone(),
                    value: value.to_string(),
                    message: format!(
                        "value '{value}' is not allowed for {} attribute '{}'",
                        attribute.kind.as_str(),
                        attribute.name
                    ),
                });
            }
        }
        issues
    }
}
