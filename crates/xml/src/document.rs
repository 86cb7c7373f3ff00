//! Documents: parsing and serialization.

use crate::{Child, Error, Node, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt::{self, Display, Formatter};

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    root: Option<Node>,
}

impl Document {
    /// An empty document with no root element.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A document around an existing root element.
    pub fn with_root(root: Node) -> Self {
        Self { root: Some(root) }
    }

    /// Parse a document from its textual form.
    pub fn parse(input: &str) -> Result<Self> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<Node> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let node = element_from_start(&start)?;
                    stack.push(node);
                }
                Event::Empty(start) => {
                    let node = element_from_start(&start)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let node = stack.pop().ok_or(Error::UnbalancedDocument)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    let text = text.unescape()?.into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_text(text);
                    } else if !text.trim().is_empty() {
                        return Err(Error::TextOutsideRoot);
                    }
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(cdata.as_ref()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_text(text);
                    }
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(Error::UnbalancedDocument);
        }
        match root {
            Some(root) => Ok(Self { root: Some(root) }),
            None => Err(Error::NoRootElement),
        }
    }

    /// The root element.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Mutable access to the root element.
    pub fn root_mut(&mut self) -> Option<&mut Node> {
        self.root.as_mut()
    }

    /// Replace the root element.
    pub fn set_root(&mut self, root: Node) {
        self.root = Some(root);
    }

    /// Consume the document, yielding its root.
    pub fn into_root(self) -> Option<Node> {
        self.root
    }

    /// True when the document has no root element (the "empty result"
    /// produced e.g. by a 304 cache confirmation).
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Serialize the root element without an XML declaration.
    pub fn serialize_root(&self) -> String {
        self.root.as_ref().map(Node::to_string).unwrap_or_default()
    }

    /// Serialize with the standard declaration line.
    pub fn serialize(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str(&self.serialize_root());
        out
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Node> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut node = Node::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.set_attr(key, value);
    }
    Ok(node)
}

fn attach(stack: &mut Vec<Node>, root: &mut Option<Node>, node: Node) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_element(node);
        Ok(())
    } else if root.is_none() {
        *root = Some(node);
        Ok(())
    } else {
        Err(Error::MultipleRoots)
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize_root())
    }
}

impl From<Node> for Document {
    fn from(root: Node) -> Self {
        Self::with_root(root)
    }
}

impl std::str::FromStr for Document {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Walk helpers used by the splice stage: child paths address elements by
// their element (not child) index at each level.
impl Document {
    /// The element at `path`, where each component is an element index.
    pub fn element_at(&self, path: &[usize]) -> Option<&Node> {
        let mut current = self.root()?;
        for &index in path {
            current = current.elements().nth(index)?;
        }
        Some(current)
    }

    /// Replace the element at `path` with zero or more nodes.
    ///
    /// With an empty replacement the element is removed and its
    /// position collapses.
    pub fn splice_at(&mut self, path: &[usize], replacement: Vec<Node>) -> Result<()> {
        let Some(root) = self.root.as_mut() else {
            return Err(Error::NoRootElement);
        };
        if path.is_empty() {
            return match replacement.into_iter().next() {
                Some(node) => {
                    self.root = Some(node);
                    Ok(())
                }
                None => {
                    self.root = None;
                    Ok(())
                }
            };
        }
        let Some((&last, parents)) = path.split_last() else {
            return Err(Error::BadSplicePath);
        };
        let mut current = root;
        for &index in parents {
            let child_pos = element_child_position(current, index).ok_or(Error::BadSplicePath)?;
            match &mut current.children_mut()[child_pos] {
                Child::Element(node) => current = node,
                Child::Text(_) => return Err(Error::BadSplicePath),
            }
        }
        let child_pos = element_child_position(current, last).ok_or(Error::BadSplicePath)?;
        let children = current.children_mut();
        children.remove(child_pos);
        for (offset, node) in replacement.into_iter().enumerate() {
            children.insert(child_pos + offset, Child::Element(node));
        }
        Ok(())
    }
}

fn element_child_position(parent: &Node, element_index: usize) -> Option<usize> {
    parent
        .children()
        .iter()
        .enumerate()
        .filter(|(_, child)| matches!(child, Child::Element(_)))
        .nth(element_index)
        .map(|(pos, _)| pos)
}
