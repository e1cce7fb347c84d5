//! Per-level display styles keyed by attribute values.

use serde::{Deserialize, Serialize};

use crate::markable::Markable;

/// Display attributes contributed by a level. Unset fields leave the value
/// from lower levels in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strikethrough: Option<bool>,
}

impl RenderStyle {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Lay `higher` over `self`: every field `higher` sets wins.
    pub fn overlay(&mut self, higher: &RenderStyle) {
        fn take<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
        take(&mut self.foreground, higher.foreground.as_ref());
        take(&mut self.background, higher.background.as_ref());
        take(&mut self.bold, higher.bold.as_ref());
        take(&mut self.italic, higher.italic.as_ref());
        take(&mut self.underline, higher.underline.as_ref());
        take(&mut self.strikethrough, higher.strikethrough.as_ref());
    }
}

/// Applies `style` to markables whose `attribute` has `value`.
///
/// A rule without a value matches any markable that carries the attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    pub attribute: String,
    pub value: Option<String>,
    pub style: RenderStyle,
}

impl StyleRule {
    pub fn new(attribute: impl Into<String>, value: Option<String>, style: RenderStyle) -> Self {
        Self {
            attribute: attribute.into(),
            value,
            style,
        }
    }

    pub fn matches(&self, markable: &Markable) -> bool {
        match (markable.attribute_value(&self.attribute), &self.value) {
            (Some(actual), Some(expected)) => actual.eq_ignore_ascii_case(expected),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Ordered style rules of one level; later rules override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customization {
    rules: Vec<StyleRule>,
}

impl Customization {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn style_for(&self, markable: &Markable) -> RenderStyle {
        let mut style = RenderStyle::default();
        for rule in self.rules.iter().filter(|rule| rule.matches(markable)) {
            style.overlay(&rule.style);
        }
        style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_keeps_unset_fields() {
        let mut lower = RenderStyle {
            foreground: Some("red".into()),
            bold: Some(true),
            ..Default::default()
        };
        let higher = RenderStyle {
            foreground: Some("blue".into()),
            underline: Some(true),
            ..Default::default()
        };
        lower.overlay(&higher);
        assert_eq!(lower.foreground.as_deref(), Some("blue"));
        assert_eq!(lower.bold, Some(true));
        assert_eq!(lower.underline, Some(true));
        assert_eq!(lower.background, None);
    }

    #[test]
    fn empty_style() {
        assert!(RenderStyle::default().is_empty());
        let style = RenderStyle {
            italic: Some(false),
            ..Default::default()
        };
        assert!(!style.is_empty());
    }
}
