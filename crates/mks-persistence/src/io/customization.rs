//! Level customization files.
//!
//! ```xml
//! <customization>
//! <rule attribute="type" value="pron" foreground="blue" bold="true"/>
//! <rule attribute="coref_class" background="yellow"/>
//! </customization>
//! ```

use std::path::Path;

use mks_core::{Customization, RenderStyle, StyleRule};

use super::{parse_flag, read_file};
use crate::error::{PersistenceError, Result};
use crate::xml::{Node, read_nodes, root};

const KIND: &str = "customization";

fn flag(attributes: &[(String, String)], key: &str, path: &Path) -> Result<Option<bool>> {
    match Node::attribute(attributes, key) {
        None => Ok(None),
        Some(value) => parse_flag(value)
            .map(Some)
            .ok_or_else(|| PersistenceError::invalid(KIND, path, format!("invalid {key} flag '{value}'"))),
    }
}

pub fn parse_customization(xml: &str, path: &Path) -> Result<Customization> {
    let nodes = read_nodes(xml, KIND, path)?;
    root(&nodes, "customization", KIND, path)?;

    let mut rules = Vec::new();
    for node in &nodes {
        let Node::Open { name, attributes, .. } = node else {
            continue;
        };
        if !name.eq_ignore_ascii_case("rule") {
            continue;
        }
        let attribute = Node::attribute(attributes, "attribute")
            .ok_or_else(|| PersistenceError::invalid(KIND, path, format!("rule #{} names no attribute", rules.len() + 1)))?;
        let style = RenderStyle {
            foreground: Node::attribute(attributes, "foreground").map(str::to_string),
            background: Node::attribute(attributes, "background").map(str::to_string),
            bold: flag(attributes, "bold", path)?,
            italic: flag(attributes, "italic", path)?,
            underline: flag(attributes, "underline", path)?,
            strikethrough: flag(attributes, "strikethrough", path)?,
        };
        let value = Node::attribute(attributes, "value").map(str::to_string);
        rules.push(StyleRule::new(attribute, value, style));
    }
    Ok(Customization::new(rules))
}

pub fn load_customization(path: &Path) -> Result<Customization> {
    parse_customization(&read_file(path)?, path)
}
