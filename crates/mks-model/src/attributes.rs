//! Attribute dictionaries with canonical-cased keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scheme::AnnotationScheme;

/// A markable's attributes. Keys are stored exactly as given; callers
/// canonicalize at the boundary with [`AttributeMap::canonicalized`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, String>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw pairs, rewriting each key to the scheme's casing.
    pub fn canonicalized<K, V>(pairs: impl IntoIterator<Item = (K, V)>, scheme: &AnnotationScheme) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (scheme.canonical_key(key.as_ref()), value.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{AttributeKind, SchemeAttribute};

    #[test]
    fn canonicalized_rewrites_known_keys() {
        let scheme = AnnotationScheme::new(vec![SchemeAttribute::new(
            "Gender",
            AttributeKind::NominalList,
        )]);
        let map = AttributeMap::canonicalized([("GENDER", "fem"), ("Extra", "x")], &scheme);
        assert_eq!(map.get("Gender"), Some("fem"));
        assert_eq!(map.get("extra"), Some("x"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn serializes_as_plain_object() {
        let map: AttributeMap = [("type", "np")].into_iter().collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"type":"np"}"#);
    }
}
