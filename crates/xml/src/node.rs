//! Element nodes.

use crate::escape::{escape_attr, escape_text};
use std::fmt::{self, Display, Formatter, Write};

/// A child of an element: a nested element or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    /// A nested element.
    Element(Node),
    /// A text run.
    Text(String),
}

/// An XML element with attributes and children.
///
/// Names keep their prefix as written (`xscript:http`); [`Node::local_name`]
/// and [`Node::prefix`] split it on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Child>,
}

impl Node {
    /// An element with the given (possibly prefixed) name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The name as written, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name without its prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// The namespace prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// An attribute value by exact name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in document order.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Set an attribute, replacing an existing one of the same name.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    /// Builder-style [`Node::set_attr`].
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Append a child element.
    pub fn push_element(&mut self, node: Node) {
        self.children.push(Child::Element(node));
    }

    /// Append a text run.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Child::Text(text.into()));
    }

    /// Builder-style [`Node::push_element`].
    pub fn with_element(mut self, node: Node) -> Self {
        self.push_element(node);
        self
    }

    /// Builder-style [`Node::push_text`].
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// All children in document order.
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Mutable access to the children.
    pub fn children_mut(&mut self) -> &mut Vec<Child> {
        &mut self.children
    }

    /// Child elements only.
    pub fn elements(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|child| match child {
            Child::Element(node) => Some(node),
            Child::Text(_) => None,
        })
    }

    /// The first child element.
    pub fn first_element(&self) -> Option<&Node> {
        self.elements().next()
    }

    /// Direct text content (concatenated text children).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Child::Text(text) = child {
                out.push_str(text);
            }
        }
        out
    }

    /// True when the element has no children at all.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn write_xml(&self, out: &mut String) -> fmt::Result {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attrs {
            write!(out, " {}=\"{}\"", name, escape_attr(value))?;
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return Ok(());
        }
        out.push('>');
        for child in &self.children {
            match child {
                Child::Element(node) => node.write_xml(out)?,
                Child::Text(text) => out.push_str(&escape_text(text)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_xml(&mut out)?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_prefixes() {
        let node = Node::new("xscript:http");
        assert_eq!(node.name(), "xscript:http");
        assert_eq!(node.local_name(), "http");
        assert_eq!(node.prefix(), Some("xscript"));
        assert_eq!(Node::new("page").prefix(), None);
    }

    #[test]
    fn serialization() {
        let node = Node::new("r")
            .with_attr("a", "1 & 2")
            .with_element(Node::new("empty"))
            .with_text("x < y");
        assert_eq!(node.to_string(), "<r a=\"1 &amp; 2\"><empty/>x &lt; y</r>");
    }

    #[test]
    fn set_attr_replaces() {
        let mut node = Node::new("n");
        node.set_attr("k", "1");
        node.set_attr("k", "2");
        assert_eq!(node.attr("k"), Some("2"));
        assert_eq!(node.attrs().len(), 1);
    }
}
