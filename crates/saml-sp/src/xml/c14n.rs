//! Canonical XML.
//!
//! Implements Exclusive XML Canonicalization 1.0, including the
//! `InclusiveNamespaces` prefix list, and Canonical XML 1.0 over an element
//! subtree. Comments never reach the tree, so the "with comments" variants
//! produce identical output.

use std::collections::BTreeMap;

use super::node::{XmlElement, XmlNode};

/// Token standing for the default namespace in a prefix list.
const DEFAULT_PREFIX_TOKEN: &str = "#default";

/// Canonicalization flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum C14nMode {
    /// `http://www.w3.org/2001/10/xml-exc-c14n#`
    Exclusive,
    /// `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
    Inclusive,
}

/// Canonicalizes `element` as the apex of a document subset.
#[must_use]
pub fn canonicalize(element: &XmlElement, mode: C14nMode) -> String {
    canonicalize_with_prefixes(element, mode, &[])
}

/// Canonicalizes `element` with an `InclusiveNamespaces` prefix list.
///
/// Listed prefixes (`#default` for the default namespace) are handled with
/// the inclusive rules: rendered wherever they are in scope and not already
/// rendered by an output ancestor. The list is ignored in inclusive mode,
/// where every in-scope namespace is rendered anyway.
#[must_use]
pub fn canonicalize_with_prefixes(
    element: &XmlElement,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> String {
    let canonicalizer = Canonicalizer {
        mode,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == DEFAULT_PREFIX_TOKEN { "" } else { p.as_str() })
            .collect(),
    };
    let mut out = String::new();
    canonicalizer.write(element, &BTreeMap::new(), &mut out);
    out
}

struct Canonicalizer<'a> {
    mode: C14nMode,
    inclusive_prefixes: Vec<&'a str>,
}

impl Canonicalizer<'_> {
    fn write(&self, element: &XmlElement, rendered: &BTreeMap<String, String>, out: &mut String) {
        let needed = match self.mode {
            C14nMode::Exclusive => self.exclusive_namespaces(element, rendered),
            C14nMode::Inclusive => inclusive_namespaces(element, rendered),
        };
        write_element(element, rendered, needed, out, |child, scope, out| {
            self.write(child, scope, out);
        });
    }

    fn exclusive_namespaces(
        &self,
        element: &XmlElement,
        rendered: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut utilized: BTreeMap<String, String> = BTreeMap::new();
        utilized.insert(
            element.prefix.clone().unwrap_or_default(),
            element.namespace.clone().unwrap_or_default(),
        );
        for attr in &element.attributes {
            if let (Some(prefix), Some(ns)) = (&attr.prefix, &attr.namespace) {
                if prefix != "xml" {
                    utilized.insert(prefix.clone(), ns.clone());
                }
            }
        }
        for prefix in &self.inclusive_prefixes {
            if let Some(uri) = element.in_scope_namespaces.get(*prefix) {
                utilized.insert((*prefix).to_string(), uri.clone());
            }
        }

        let mut needed = BTreeMap::new();
        for (prefix, uri) in utilized {
            let already = rendered.get(&prefix);
            if already == Some(&uri) {
                continue;
            }
            // An empty default namespace only needs rendering to undo an
            // inherited non-empty one.
            if prefix.is_empty() && uri.is_empty() && already.is_none() {
                continue;
            }
            needed.insert(prefix, uri);
        }
        needed
    }
}

fn inclusive_namespaces(
    element: &XmlElement,
    rendered: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut needed = BTreeMap::new();
    for (prefix, uri) in &element.in_scope_namespaces {
        if rendered.get(prefix) != Some(uri) {
            needed.insert(prefix.clone(), uri.clone());
        }
    }
    if !element.in_scope_namespaces.contains_key("") {
        if let Some(default) = rendered.get("") {
            if !default.is_empty() {
                needed.insert(String::new(), String::new());
            }
        }
    }
    needed
}

fn write_element(
    element: &XmlElement,
    rendered: &BTreeMap<String, String>,
    needed: BTreeMap<String, String>,
    out: &mut String,
    recurse: impl Fn(&XmlElement, &BTreeMap<String, String>, &mut String),
) {
    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);

    // BTreeMap order puts the default namespace (empty prefix) first.
    for (prefix, uri) in &needed {
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

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| {
        let left = (a.namespace.as_deref().unwrap_or(""), a.local_name.as_str());
        let right = (b.namespace.as_deref().unwrap_or(""), b.local_name.as_str());
        left.cmp(&right)
    });
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape_attribute(&attr.value));
        out.push('"');
    }
    out.push('>');

    let scope = if needed.is_empty() {
        None
    } else {
        let mut merged = rendered.clone();
        merged.extend(needed);
        Some(merged)
    };
    let scope_ref = scope.as_ref().unwrap_or(rendered);

    for child in &element.children {
        match child {
            XmlNode::Element(el) => recurse(el, scope_ref, out),
            XmlNode::Text(text) => out.push_str(&escape_text(text)),
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// Escapes character data the way canonical XML requires.
pub(crate) fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#xD;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escapes an attribute value the way canonical XML requires.
pub(crate) fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlParser;

    fn parse(xml: &str) -> XmlElement {
        XmlParser::new().parse(xml).unwrap()
    }

    #[test]
    fn exclusive_renders_only_used_namespaces() {
        let root = parse(
            r#"<a:Root xmlns:a="urn:a" xmlns:unused="urn:u"><a:Child z="2" b:y="1" xmlns:b="urn:b" a="0"/></a:Root>"#,
        );
        assert_eq!(
            canonicalize(&root, C14nMode::Exclusive),
            r#"<a:Root xmlns:a="urn:a"><a:Child xmlns:b="urn:b" a="0" z="2" b:y="1"></a:Child></a:Root>"#
        );
    }

    #[test]
    fn exclusive_subtree_pulls_namespace_from_ancestor() {
        let root = parse(r#"<p:Outer xmlns:p="urn:p" xmlns:s="urn:s"><s:Inner ID="x">v</s:Inner></p:Outer>"#);
        let inner = root.child("urn:s", "Inner").unwrap();
        assert_eq!(
            canonicalize(inner, C14nMode::Exclusive),
            r#"<s:Inner xmlns:s="urn:s" ID="x">v</s:Inner>"#
        );
    }

    #[test]
    fn inclusive_subtree_keeps_all_in_scope_namespaces() {
        let root = parse(r#"<p:Outer xmlns:p="urn:p" xmlns:s="urn:s"><s:Inner>v</s:Inner></p:Outer>"#);
        let inner = root.child("urn:s", "Inner").unwrap();
        assert_eq!(
            canonicalize(inner, C14nMode::Inclusive),
            r#"<s:Inner xmlns:p="urn:p" xmlns:s="urn:s">v</s:Inner>"#
        );
    }

    #[test]
    fn default_namespace_is_undone_when_needed() {
        let root = parse(r#"<Root xmlns="urn:d"><Child xmlns=""/></Root>"#);
        assert_eq!(
            canonicalize(&root, C14nMode::Exclusive),
            r#"<Root xmlns="urn:d"><Child xmlns=""></Child></Root>"#
        );
    }

    #[test]
    fn prefix_list_renders_namespace_used_only_in_content() {
        let root = parse(
            r#"<p:Outer xmlns:p="urn:p" xmlns:xs="urn:xs" xmlns:xsi="urn:xsi"><p:Inner ID="x"><p:Value xsi:type="xs:string">v</p:Value></p:Inner></p:Outer>"#,
        );
        let inner = root.child("urn:p", "Inner").unwrap();

        assert_eq!(
            canonicalize(inner, C14nMode::Exclusive),
            r#"<p:Inner xmlns:p="urn:p" ID="x"><p:Value xmlns:xsi="urn:xsi" xsi:type="xs:string">v</p:Value></p:Inner>"#
        );
        assert_eq!(
            canonicalize_with_prefixes(inner, C14nMode::Exclusive, &["xs".to_string()]),
            r#"<p:Inner xmlns:p="urn:p" xmlns:xs="urn:xs" ID="x"><p:Value xmlns:xsi="urn:xsi" xsi:type="xs:string">v</p:Value></p:Inner>"#
        );
    }

    #[test]
    fn prefix_list_skips_prefixes_out_of_scope() {
        let root = parse(r#"<p:Root xmlns:p="urn:p" xmlns="urn:d"><p:Leaf/></p:Root>"#);
        let prefixes = ["missing".to_string(), "#default".to_string()];
        assert_eq!(
            canonicalize_with_prefixes(&root, C14nMode::Exclusive, &prefixes),
            r#"<p:Root xmlns="urn:d" xmlns:p="urn:p"><p:Leaf></p:Leaf></p:Root>"#
        );
    }

    #[test]
    fn escaping() {
        let root = parse("<r a=\"&quot;&#9;&lt;\">&amp;&gt;&#13;</r>");
        assert_eq!(
            canonicalize(&root, C14nMode::Exclusive),
            "<r a=\"&quot;&#x9;&lt;\">&amp;&gt;&#xD;</r>"
        );
    }
}
