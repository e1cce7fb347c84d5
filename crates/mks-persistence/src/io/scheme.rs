//! Annotation scheme files.
//!
//! ```xml
//! <annotationscheme>
//! <attribute name="type" type="nominal_list" default="np">
//! <value name="np"/>
//! <value name="pron"/>
//! </attribute>
//! <attribute name="coref_class" type="markable_set" max_size="-1" ordered="true"/>
//! </annotationscheme>
//! ```

use std::path::Path;

use mks_model::{AnnotationScheme, AttributeKind, SchemeAttribute};

use super::{parse_flag, read_file};
use crate::error::{PersistenceError, Result};
use crate::xml::{Node, XmlOut, read_nodes, root};

const KIND: &str = "scheme";

fn attribute_from(attributes: &[(String, String)], path: &Path) -> Result<SchemeAttribute> {
    let name = Node::attribute(attributes, "name")
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| PersistenceError::invalid(KIND, path, "attribute without a name"))?;
    let kind_name = Node::attribute(attributes, "type").unwrap_or("freetext");
    let kind = AttributeKind::parse(kind_name).ok_or_else(|| {
        PersistenceError::invalid(KIND, path, format!("attribute '{name}' has unknown type '{kind_name}'"))
    })?;

    let mut attribute = SchemeAttribute::new(name, kind);
    if let Some(default) = Node::attribute(attributes, "default") {
        attribute = attribute.with_default(default);
    }
    if let Some(none_value) = Node::attribute(attributes, "none_value") {
        attribute = attribute.with_none_value(none_value);
    }
    if let Some(max_size) = Node::attribute(attributes, "max_size") {
        let max_size: i64 = max_size.trim().parse().map_err(|_| {
            PersistenceError::invalid(KIND, path, format!("attribute '{name}' has invalid max_size '{max_size}'"))
        })?;
        // Negative means unbounded.
        if let Ok(max_size) = usize::try_from(max_size) {
            attribute = attribute.with_max_size(max_size);
        }
    }
    if let Some(ordered) = Node::attribute(attributes, "ordered") {
        match parse_flag(ordered) {
            Some(true) => attribute = attribute.ordered(),
            Some(false) => {}
            None => {
                return Err(PersistenceError::invalid(
                    KIND,
                    path,
                    format!("attribute '{name}' has invalid ordered flag '{ordered}'"),
                ));
            }
        }
    }
    Ok(attribute)
}

pub fn parse_scheme(xml: &str, path: &Path) -> Result<AnnotationScheme> {
    let nodes = read_nodes(xml, KIND, path)?;
    root(&nodes, "annotationscheme", KIND, path)?;

    let mut attributes = Vec::new();
    let mut open: Option<SchemeAttribute> = None;
    for node in &nodes {
        match node {
            Node::Open {
                name,
                attributes: xml_attributes,
                empty,
            } if name.eq_ignore_ascii_case("attribute") => {
                let attribute = attribute_from(xml_attributes, path)?;
                if *empty {
                    attributes.push(attribute);
                } else if let Some(previous) = open.replace(attribute) {
                    attributes.push(previous);
                }
            }
            Node::Open {
                name,
                attributes: xml_attributes,
                ..
            } if name.eq_ignore_ascii_case("value") => {
                if let (Some(attribute), Some(value)) = (open.as_mut(), Node::attribute(xml_attributes, "name")) {
                    attribute.values.push(value.to_string());
                }
            }
            Node::Close { name } if name.eq_ignore_ascii_case("attribute") => {
                if let Some(attribute) = open.take() {
                    attributes.push(attribute);
                }
            }
            _ => {}
        }
    }
    Ok(AnnotationScheme::new(attributes))
}

pub fn load_scheme(path: &Path) -> Result<AnnotationScheme> {
    let scheme = parse_scheme(&read_file(path)?, path)?;
    tracing::debug!(attributes = scheme.attributes().len(), "Loaded scheme {}", path.display());
    Ok(scheme)
}

pub fn render_scheme(scheme: &AnnotationScheme) -> Result<Vec<u8>> {
    let mut out = XmlOut::new()?;
    out.open("annotationscheme", &[])?;
    for attribute in scheme.attributes() {
        let max_size = attribute.max_size.map_or_else(|| "-1".to_string(), |size| size.to_string());
        let mut xml_attributes = vec![
            ("name", attribute.name.as_str()),
            ("type", attribute.kind.as_str()),
            ("none_value", attribute.none_value.as_str()),
        ];
        if let Some(default) = &attribute.default_value {
            xml_attributes.push(("default", default.as_str()));
        }
        if attribute.kind.is_relation() {
            xml_attributes.push(("max_size", max_size.as_str()));
            xml_attributes.push(("ordered", if attribute.ordered { "true" } else { "false" }));
        }
        if attribute.values.is_empty() {
            out.empty("attribute", &xml_attributes)?;
        } else {
            out.open("attribute", &xml_attributes)?;
            for value in &attribute.values {
                out.empty("value", &[("name", value.as_str())])?;
            }
            out.close("attribute")?;
        }
    }
    out.close("annotationscheme")?;
    Ok(out.finish())
}
