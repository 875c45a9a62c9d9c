//! quick-xml backed tree builder.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

use super::node::{XmlAttribute, XmlElement, XmlNode, XML_NS};

/// Reusable parser producing [`XmlElement`] trees.
///
/// Instances are normally borrowed from a [`super::ParserPool`]; the element
/// stack is kept between documents.
#[derive(Debug, Default)]
pub struct XmlParser {
    stack: Vec<XmlElement>,
    documents_parsed: u64,
}

impl XmlParser {
    /// Creates a parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents this parser has handled.
    #[must_use]
    pub const fn documents_parsed(&self) -> u64 {
        self.documents_parsed
    }

    /// Parses a complete document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed input, unbound prefixes,
    /// a `DOCTYPE`, more than one root or no root at all.
    pub fn parse(&mut self, input: &str) -> SamlResult<XmlElement> {
        self.stack.clear();
        self.documents_parsed += 1;

        let mut reader = Reader::from_str(input);
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = self.open(&start)?;
                    self.stack.push(element);
                }
                Event::Empty(start) => {
                    let element = self.open(&start)?;
                    self.close(element, &mut root)?;
                }
                Event::End(_) => {
                    let element = self
                        .stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    self.close(element, &mut root)?;
                }
                Event::Text(text) => {
                    let raw = utf8(text.into_inner())?;
                    let normalized = normalize_newlines(&raw);
                    let value = quick_xml::escape::unescape(&normalized)
                        .map_err(|e| SamlError::XmlParse(e.to_string()))?;
                    self.text(value.into_owned())?;
                }
                Event::CData(data) => {
                    let raw = utf8(data.into_inner())?;
                    self.text(normalize_newlines(&raw).into_owned())?;
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse(
                        "DOCTYPE declarations are not allowed".to_string(),
                    ));
                }
                Event::Comment(_) | Event::PI(_) | Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        if !self.stack.is_empty() {
            self.stack.clear();
            return Err(SamlError::XmlParse("unexpected end of document".to_string()));
        }

        root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
    }

    fn open(&self, start: &BytesStart<'_>) -> SamlResult<XmlElement> {
        let mut scope = self
            .stack
            .last()
            .map(|parent| parent.in_scope_namespaces.clone())
            .unwrap_or_default();
        let mut declarations = Vec::new();
        let mut raw_attributes = Vec::new();

        for attr in start.attributes() {
            let attr = attr?;
            let key = utf8(Cow::Borrowed(attr.key.as_ref()))?.into_owned();
            let raw = utf8(attr.value)?;
            let value = quick_xml::escape::unescape(&normalize_attribute(&raw))
                .map_err(|e| SamlError::XmlParse(e.to_string()))?
                .into_owned();

            if key == "xmlns" {
                if value.is_empty() {
                    scope.remove("");
                } else {
                    scope.insert(String::new(), value.clone());
                }
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.insert(prefix.to_string(), value.clone());
                declarations.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key, value));
            }
        }

        let name = utf8(Cow::Borrowed(start.name().as_ref()))?.into_owned();
        let (prefix, local_name) = split_qname(&name);
        let namespace = match prefix {
            Some(prefix) => Some(resolve_prefix(&scope, prefix)?),
            None => scope.get("").cloned(),
        };

        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let (prefix, local_name) = split_qname(&key);
            let namespace = match prefix {
                Some(prefix) => Some(resolve_prefix(&scope, prefix)?),
                None => None,
            };
            attributes.push(XmlAttribute {
                prefix: prefix.map(str::to_string),
                local_name: local_name.to_string(),
                namespace,
                value,
            });
        }

        Ok(XmlElement {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            namespace,
            namespace_declarations: declarations,
            in_scope_namespaces: scope,
            attributes,
            children: Vec::new(),
        })
    }

    fn close(&mut self, element: XmlElement, root: &mut Option<XmlElement>) -> SamlResult<()> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(XmlNode::Element(element));
            return Ok(());
        }
        if root.is_some() {
            return Err(SamlError::XmlParse("multiple root elements".to_string()));
        }
        *root = Some(element);
        Ok(())
    }

    fn text(&mut self, value: String) -> SamlResult<()> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.push_text(value);
                Ok(())
            }
            None if value.trim().is_empty() => Ok(()),
            None => Err(SamlError::XmlParse(
                "character data outside the root element".to_string(),
            )),
        }
    }
}

fn utf8(bytes: Cow<'_, [u8]>) -> SamlResult<Cow<'_, str>> {
    match bytes {
        Cow::Borrowed(b) => std::str::from_utf8(b)
            .map(Cow::Borrowed)
            .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}"))),
        Cow::Owned(b) => String::from_utf8(b)
            .map(Cow::Owned)
            .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}"))),
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn resolve_prefix(scope: &BTreeMap<String, String>, prefix: &str) -> SamlResult<String> {
    if prefix == "xml" {
        return Ok(XML_NS.to_string());
    }
    scope
        .get(prefix)
        .cloned()
        .ok_or_else(|| SamlError::XmlParse(format!("unbound namespace prefix '{prefix}'")))
}

/// Line-end handling from XML 1.0 §2.11.
fn normalize_newlines(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Attribute-value normalization for CDATA attributes, XML 1.0 §3.3.3.
fn normalize_attribute(raw: &str) -> Cow<'_, str> {
    if raw.contains(['\t', '\n', '\r']) {
        let joined = raw.replace("\r\n", " ");
        Cow::Owned(joined.replace(['\t', '\n', '\r'], " "))
    } else {
        Cow::Borrowed(raw)
    }
}
