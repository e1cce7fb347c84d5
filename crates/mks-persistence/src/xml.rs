//! Small XML layer shared by all file formats.
//!
//! Files are read into a flat list of [`Node`]s, which the format modules walk
//! without touching `quick-xml` directly. Writing goes through a [`Writer`]
//! over an in-memory buffer so a file is only touched once it is complete.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{PersistenceError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Open {
        name: String,
        attributes: Vec<(String, String)>,
        /// Self-closing element; no matching `Close` follows.
        empty: bool,
    },
    Close {
        name: String,
    },
    Text(String),
    DocType(String),
}

impl Node {
    pub(crate) fn attribute<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
        attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

fn utf8<'a>(bytes: &'a [u8], kind: &'static str, path: &Path) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| PersistenceError::invalid(kind, path, e.to_string()))
}

fn unescaped<'a>(raw: &'a str, kind: &'static str, path: &Path) -> Result<Cow<'a, str>> {
    unescape(raw).map_err(|e| PersistenceError::invalid(kind, path, e.to_string()))
}

fn open(e: &BytesStart<'_>, empty: bool, kind: &'static str, path: &Path) -> Result<Node> {
    let name = utf8(e.local_name().as_ref(), kind, path)?.to_string();
    let mut attributes = Vec::new();
    for attribute in e.attributes() {
        let attribute = attribute.map_err(|e| PersistenceError::invalid(kind, path, e.to_string()))?;
        let key = utf8(attribute.key.as_ref(), kind, path)?.to_string();
        let raw = utf8(&attribute.value, kind, path)?;
        attributes.push((key, unescaped(raw, kind, path)?.into_owned()));
    }
    Ok(Node::Open {
        name,
        attributes,
        empty,
    })
}

/// Append text to the previous text node, so entity references do not split it.
fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(previous)) = nodes.last_mut() {
        previous.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Read a whole document. Whitespace-only text is dropped, other text kept
/// verbatim with entities resolved.
pub(crate) fn read_nodes(xml: &str, kind: &'static str, path: &Path) -> Result<Vec<Node>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut nodes = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            PersistenceError::invalid(kind, path, format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => {
                depth += 1;
                nodes.push(open(&e, false, kind, path)?);
            }
            Event::Empty(e) => nodes.push(open(&e, true, kind, path)?),
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                let name = utf8(e.local_name().as_ref(), kind, path)?.to_string();
                nodes.push(Node::Close { name });
            }
            Event::Text(e) => {
                let raw = utf8(&e, kind, path)?;
                let text = unescaped(raw, kind, path)?;
                push_text(&mut nodes, &text);
            }
            Event::CData(e) => {
                let text = utf8(&e, kind, path)?.to_string();
                push_text(&mut nodes, &text);
            }
            Event::GeneralRef(e) => {
                let name = utf8(&e, kind, path)?;
                let reference = format!("&{name};");
                let text = unescaped(&reference, kind, path)?.into_owned();
                push_text(&mut nodes, &text);
            }
            Event::DocType(e) => {
                let text = utf8(&e, kind, path)?.trim().to_string();
                nodes.push(Node::DocType(text));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(PersistenceError::invalid(kind, path, "document ends inside an element"));
    }
    nodes.retain(|node| !matches!(node, Node::Text(text) if text.trim().is_empty()));
    Ok(nodes)
}

/// Name and attributes of the first element, or an error naming `expected`.
pub(crate) fn root<'a>(
    nodes: &'a [Node],
    expected: &str,
    kind: &'static str,
    path: &Path,
) -> Result<&'a [(String, String)]> {
    match nodes.iter().find(|node| matches!(node, Node::Open { .. })) {
        Some(Node::Open { name, attributes, .. }) if name.eq_ignore_ascii_case(expected) => Ok(attributes),
        Some(Node::Open { name, .. }) => Err(PersistenceError::invalid(
            kind,
            path,
            format!("expected <{expected}> root element, found <{name}>"),
        )),
        _ => Err(PersistenceError::invalid(kind, path, "document has no root element")),
    }
}

/// In-memory XML writer with newline-separated elements.
pub(crate) struct XmlOut {
    writer: Writer<Vec<u8>>,
}

fn serialization(e: impl std::error::Error + Send + Sync + 'static) -> PersistenceError {
    PersistenceError::Serialization { source: Box::new(e) }
}

impl XmlOut {
    pub(crate) fn new() -> Result<Self> {
        let mut out = Self {
            writer: Writer::new(Vec::new()),
        };
        out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        out.newline()?;
        Ok(out)
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(serialization)
    }

    pub(crate) fn newline(&mut self) -> Result<()> {
        self.event(Event::Text(BytesText::new("\n")))
    }

    /// `<!DOCTYPE content>`; `content` is written as is.
    pub(crate) fn doctype(&mut self, content: &str) -> Result<()> {
        self.event(Event::DocType(BytesText::from_escaped(content)))?;
        self.newline()
    }

    fn start_tag<'a>(name: &'a str, attributes: &[(&str, &str)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for &(key, value) in attributes {
            start.push_attribute((key, value));
        }
        start
    }

    pub(crate) fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        self.event(Event::Start(Self::start_tag(name, attributes)))?;
        self.newline()
    }

    pub(crate) fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))?;
        self.newline()
    }

    pub(crate) fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        self.event(Event::Empty(Self::start_tag(name, attributes)))?;
        self.newline()
    }

    /// `<name attributes>text</name>` on one line.
    pub(crate) fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.event(Event::Start(Self::start_tag(name, attributes)))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}
