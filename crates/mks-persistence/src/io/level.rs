//! Markable level files.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <!DOCTYPE markables SYSTEM "markables.dtd">
//! <markables xmlns="www.eml.org/NameSpaces/coref">
//! <markable id="markable_1" span="word_1..word_3" mmax_level="coref" type="np"/>
//! </markables>
//! ```
//!
//! `id`, `span` and `mmax_level` are structural; every other attribute goes
//! into the markable's attribute map.

use std::path::Path;

use mks_core::{LoadIssue, LoadIssueKind, LoadReport, MarkableLevel, MarkableRecord};
use super::read_file;
use crate::error::Result;
use crate::xml::{Node, XmlOut, read_nodes, root};

const KIND: &str = "level";

/// DOCTYPE content written to every level file.
pub const MARKABLES_DOCTYPE: &str = "markables SYSTEM \"markables.dtd\"";

/// Namespace prefix for levels that did not declare one.
pub const NAMESPACE_BASE: &str = "www.eml.org/NameSpaces/";

const STRUCTURAL: [&str; 3] = ["id", "span", "mmax_level"];

/// A level file as read, before it is applied to a level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelDocument {
    pub namespace: Option<String>,
    pub has_doctype: bool,
    pub records: Vec<MarkableRecord>,
    /// Header problems; record problems are found when loading.
    pub issues: Vec<LoadIssue>,
}

pub fn parse_level(xml: &str, path: &Path) -> Result<LevelDocument> {
    let nodes = read_nodes(xml, KIND, path)?;
    let root_attributes = root(&nodes, "markables", KIND, path)?;

    let mut document = LevelDocument {
        namespace: Node::attribute(root_attributes, "xmlns").map(str::to_string),
        has_doctype: nodes.iter().any(|node| matches!(node, Node::DocType(_))),
        ..Default::default()
    };
    if document.namespace.is_none() {
        document.issues.push(LoadIssue::new(
            LoadIssueKind::MissingNamespace,
            None,
            format!("{} declares no namespace", path.display()),
        ));
    }
    if !document.has_doctype {
        document.issues.push(LoadIssue::new(
            LoadIssueKind::MissingDoctype,
            None,
            format!("{} has no DOCTYPE declaration", path.display()),
        ));
    }

    for node in &nodes {
        let Node::Open { name, attributes, .. } = node else {
            continue;
        };
        if !name.eq_ignore_ascii_case("markable") {
            continue;
        }
        document.records.push(MarkableRecord {
            id: Node::attribute(attributes, "id").map(str::to_string),
            span: Node::attribute(attributes, "span").map(str::to_string),
            level: Node::attribute(attributes, "mmax_level").map(str::to_string),
            attributes: attributes
                .iter()
                .filter(|(key, _)| !STRUCTURAL.iter().any(|s| key.eq_ignore_ascii_case(s)))
                .cloned()
                .collect(),
        });
    }
    Ok(document)
}

pub fn read_level_file(path: &Path) -> Result<LevelDocument> {
    let xml = read_file(path)?;
    parse_level(&xml, path)
}

/// Fill an empty level from its file and initialise its relations.
///
/// A missing file leaves the level empty. Header issues come first in the
/// report.
pub fn open_level(level: MarkableLevel, path: &Path) -> Result<(MarkableLevel, LoadReport)> {
    let document = if path.exists() {
        read_level_file(path)?
    } else {
        tracing::info!(level = level.name(), "No level file at {}, starting empty", path.display());
        LevelDocument {
            has_doctype: true,
            ..Default::default()
        }
    };

    let mut level = match document.namespace {
        Some(namespace) => level.with_namespace(namespace),
        None => level,
    };
    let mut report = level.create_markables(document.records);
    level.init_markable_relations();
    for issue in &document.issues {
        tracing::warn!(level = level.name(), "{issue}");
    }
    let mut issues = document.issues;
    issues.append(&mut report.issues);
    report.issues = issues;
    Ok((level, report))
}

/// Render a level as a markables document in discourse order.
pub fn render_level(level: &MarkableLevel) -> Result<Vec<u8>> {
    let namespace = level
        .namespace()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{NAMESPACE_BASE}{}", level.name()));

    let mut out = XmlOut::new()?;
    out.doctype(MARKABLES_DOCTYPE)?;
    out.open("markables", &[("xmlns", namespace.as_str())])?;
    for record in level.to_records() {
        let span = record.span.unwrap_or_default();
        let id = record.id.unwrap_or_default();
        let mut attributes: Vec<(&str, &str)> =
            vec![("id", id.as_str()), ("span", span.as_str()), ("mmax_level", level.name())];
        attributes.extend(record.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        out.empty("markable", &attributes)?;
    }
    out.close("markables")?;
    Ok(out.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mks_model::{AnnotationScheme, AttributeKind, DiscourseIndex, SchemeAttribute, TokenRecord};

    fn discourse() -> Arc<DiscourseIndex> {
        Arc::new(DiscourseIndex::new((1..=6).map(|i| TokenRecord::new(format!("word_{i}"), format!("w{i}")))).unwrap())
    }

    fn scheme() -> AnnotationScheme {
        AnnotationScheme::new(vec![
            SchemeAttribute::new("type", AttributeKind::NominalList).with_values(["np", "pron"]),
        ])
    }

    #[test]
    fn structural_attributes_are_split_off() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE markables SYSTEM "markables.dtd">
<markables xmlns="www.eml.org/NameSpaces/coref">
<markable id="markable_1" span="word_1..word_3" mmax_level="coref" type="np"/>
<markable span="word_4"/>
</markables>"#;
        let document = parse_level(xml, Path::new("coref.xml")).unwrap();
        assert_eq!(document.namespace.as_deref(), Some("www.eml.org/NameSpaces/coref"));
        assert!(document.has_doctype);
        assert!(document.issues.is_empty());
        assert_eq!(
            document.records[0],
            MarkableRecord::new("markable_1", "word_1..word_3")
                .on_level("coref")
                .with_attribute("type", "np")
        );
        assert_eq!(document.records[1].id, None);
    }

    #[test]
    fn missing_header_parts_are_reported() {
        let document = parse_level("<markables></markables>", Path::new("x.xml")).unwrap();
        let kinds: Vec<LoadIssueKind> = document.issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![LoadIssueKind::MissingNamespace, LoadIssueKind::MissingDoctype]);
    }

    #[test]
    fn wrong_root_is_an_error() {
        assert!(parse_level("<words/>", Path::new("x.xml")).is_err());
    }

    #[test]
    fn rendered_level_parses_back() {
        let mut level = MarkableLevel::new("coref", discourse(), scheme());
        level.create_markables(vec![
            MarkableRecord::new("markable_2", "word_3,word_5..word_6").with_attribute("type", "pron"),
            MarkableRecord::new("markable_1", "word_1..word_2").with_attribute("note", "a \"b\" & c"),
        ]);
        let bytes = render_level(&level).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<markables xmlns=\"www.eml.org/NameSpaces/coref\">"));

        let document = parse_level(&text, Path::new("coref.xml")).unwrap();
        assert!(document.issues.is_empty());
        let ids: Vec<Option<&str>> = document.records.iter().map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("markable_1"), Some("markable_2")]);
        assert_eq!(document.records[1].span.as_deref(), Some("word_3,word_5..word_6"));
        assert!(
            document.records[0]
                .attributes
                .contains(&("note".to_string(), "a \"b\" & c".to_string()))
        );
    }
}
