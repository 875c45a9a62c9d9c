//! XML element tree.

use std::collections::BTreeMap;

/// Namespace permanently bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlAttribute {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Unescaped, normalized value.
    pub value: String,
}

impl XmlAttribute {
    /// Creates an unqualified attribute.
    pub fn new(local_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_name: local_name.into(),
            namespace: None,
            value: value.into(),
        }
    }

    /// Returns the name as written, `prefix:local` or `local`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Nested element.
    Element(XmlElement),
    /// Character data, unescaped.
    Text(String),
}

/// An element and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Declarations made on this element, as `(prefix, uri)`; the default
    /// namespace uses the empty prefix.
    pub namespace_declarations: Vec<(String, String)>,
    /// Every binding in scope at this element, including inherited ones.
    pub in_scope_namespaces: BTreeMap<String, String>,
    /// Attributes other than namespace declarations, in document order.
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes in document order.
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an element in `namespace` written with `prefix`.
    ///
    /// No declaration is added; use [`XmlElement::declare_namespace`] on the
    /// element that should carry it.
    pub fn new(prefix: Option<&str>, namespace: &str, local_name: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
            namespace: Some(namespace.to_string()),
            ..Self::default()
        }
    }

    /// Declares `prefix` (empty for the default namespace) on this element.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespace_declarations
            .push((prefix.to_string(), uri.to_string()));
        self.in_scope_namespaces
            .insert(prefix.to_string(), uri.to_string());
    }

    /// Builder form of [`XmlElement::declare_namespace`].
    #[must_use]
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.declare_namespace(prefix, uri);
        self
    }

    /// Builder form of [`XmlElement::set_attribute`].
    #[must_use]
    pub fn with_attribute(mut self, local_name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(local_name, value);
        self
    }

    /// Builder that appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push_child(child);
        self
    }

    /// Builder that appends text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Returns the name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Returns true if this element is `{namespace}local_name`.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns the value of an unqualified attribute.
    #[must_use]
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Sets or replaces an unqualified attribute.
    pub fn set_attribute(&mut self, local_name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute::new(local_name, value)),
        }
    }

    /// Returns the `ID` attribute (`Id` is accepted as well).
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attribute("ID").or_else(|| self.attribute("Id"))
    }

    /// Iterates over child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// Returns the first child element named `{namespace}local_name`.
    #[must_use]
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.is(namespace, local_name))
    }

    /// Iterates over child elements named `{namespace}local_name`.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.child_elements()
            .filter(move |el| el.is(namespace, local_name))
    }

    /// Concatenated text of the direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Trimmed text of the first matching child, if present.
    #[must_use]
    pub fn child_text(&self, namespace: &str, local_name: &str) -> Option<String> {
        self.child(namespace, local_name)
            .map(|el| el.text().trim().to_string())
    }

    /// Appends a child element.
    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Appends text.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    /// Returns the node index of the first matching child element.
    #[must_use]
    pub fn child_position(&self, namespace: &str, local_name: &str) -> Option<usize> {
        self.children.iter().position(|node| match node {
            XmlNode::Element(el) => el.is(namespace, local_name),
            XmlNode::Text(_) => false,
        })
    }

    /// Inserts a child element at node index `index`.
    pub fn insert_child(&mut self, index: usize, child: XmlElement) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
    }

    /// Removes and returns the first matching child element.
    pub fn take_child(&mut self, namespace: &str, local_name: &str) -> Option<XmlElement> {
        let index = self.child_position(namespace, local_name)?;
        match self.children.remove(index) {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    /// Finds the element whose `ID` equals `id`, searching this subtree.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&XmlElement> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find_by_id(id))
    }
}
