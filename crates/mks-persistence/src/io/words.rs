//! Base data (`<words>`) files.

use std::path::Path;

use mks_model::{DiscourseIndex, TokenRecord};

use super::read_file;
use crate::error::{PersistenceError, Result};
use crate::xml::{Node, XmlOut, read_nodes, root};

const KIND: &str = "words";

/// Parse base data into token records in document order.
///
/// Attributes other than `id` become token attributes.
pub fn parse_words(xml: &str, path: &Path) -> Result<Vec<TokenRecord>> {
    let nodes = read_nodes(xml, KIND, path)?;
    root(&nodes, "words", KIND, path)?;

    let mut tokens = Vec::new();
    let mut open: Option<TokenRecord> = None;
    for node in &nodes {
        match node {
            Node::Open {
                name,
                attributes,
                empty,
            } if name.eq_ignore_ascii_case("word") => {
                let id = Node::attribute(attributes, "id")
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| {
                        PersistenceError::invalid(KIND, path, format!("word #{} has no id", tokens.len() + 1))
                    })?;
                let mut token = TokenRecord::new(id, "");
                for (key, value) in attributes.iter().filter(|(k, _)| !k.eq_ignore_ascii_case("id")) {
                    token = token.with_attribute(key.clone(), value.clone());
                }
                if *empty {
                    tokens.push(token);
                } else {
                    open = Some(token);
                }
            }
            Node::Text(text) => {
                if let Some(token) = open.as_mut() {
                    token.text.push_str(text);
                }
            }
            Node::Close { name } if name.eq_ignore_ascii_case("word") => {
                if let Some(token) = open.take() {
                    tokens.push(token);
                }
            }
            _ => {}
        }
    }
    Ok(tokens)
}

/// Load base data and build the discourse index.
pub fn load_words(path: &Path) -> Result<DiscourseIndex> {
    let xml = read_file(path)?;
    let tokens = parse_words(&xml, path)?;
    let discourse = DiscourseIndex::new(tokens).map_err(|source| PersistenceError::BaseData {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(tokens = discourse.len(), "Loaded base data from {}", path.display());
    Ok(discourse)
}

/// Render tokens as a `<words>` document.
pub fn render_words<'a>(tokens: impl IntoIterator<Item = &'a TokenRecord>) -> Result<Vec<u8>> {
    let mut out = XmlOut::new()?;
    out.doctype("words SYSTEM \"words.dtd\"")?;
    out.open("words", &[])?;
    for token in tokens {
        let mut attributes: Vec<(&str, &str)> = vec![("id", token.id.as_str())];
        attributes.extend(token.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        out.text_element("word", &attributes, &token.text)?;
    }
    out.close("words")?;
    Ok(out.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_with_attributes() {
        let xml = r#"<?xml version="1.0"?>
<words>
<word id="word_1" pos="DT">The</word>
<word id="word_2">cat</word>
<word id="word_3"/>
</words>"#;
        let tokens = parse_words(xml, Path::new("w.xml")).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].id, "word_1");
        assert_eq!(tokens[0].text, "The");
        assert_eq!(tokens[0].attributes.get("pos").map(String::as_str), Some("DT"));
        assert_eq!(tokens[2].text, "");
    }

    #[test]
    fn word_without_id_is_rejected() {
        let err = parse_words("<words><word>x</word></words>", Path::new("w.xml")).unwrap_err();
        assert!(err.to_string().contains("words"));
    }

    #[test]
    fn rendered_words_parse_back() {
        let tokens = vec![
            TokenRecord::new("word_1", "Tom & Jerry").with_attribute("pos", "NE"),
            TokenRecord::new("word_2", "ran"),
        ];
        let bytes = render_words(&tokens).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(parse_words(&text, Path::new("w.xml")).unwrap(), tokens);
    }
}
