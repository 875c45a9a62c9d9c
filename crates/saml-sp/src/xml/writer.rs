//! Tree serialization.
//!
//! Output is written exactly as the tree stands: no indentation is added, so a
//! signed tree serializes to bytes that canonicalize back to what was signed.

use super::c14n::{escape_attribute, escape_text};
use super::node::{XmlElement, XmlNode};

/// Serializes an element and its subtree.
#[must_use]
pub fn to_xml_string(element: &XmlElement) -> String {
    let mut out = String::new();
    write(element, &mut out);
    out
}

/// Serializes an element as a standalone document with an XML declaration.
#[must_use]
pub fn to_document_string(element: &XmlElement) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    write(element, &mut out);
    out
}

fn write(element: &XmlElement, out: &mut String) {
    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);

    for (prefix, uri) in &element.namespace_declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attribute(uri));
        out.push('"');
    }

    for attr in &element.attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape_attribute(&attr.value));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    for child in &element.children {
        match child {
            XmlNode::Element(el) => write(el, out),
            XmlNode::Text(text) => out.push_str(&escape_text(text)),
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}
