//! XPath-subset selectors.
//!
//! Supports the coordinate expressions scripts actually use as XPointer
//! splice points: absolute paths (`/page/item`), descendant searches
//! (`//item`, `/page//item`), wildcards (`/page/*`) and the whole-root
//! expression (`.` or `/`). Name tests match local names, ignoring
//! prefixes.

use crate::{Error, Node, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(String),
}

impl NameTest {
    fn matches(&self, node: &Node) -> bool {
        match self {
            Self::Any => true,
            Self::Name(name) => node.local_name() == name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    descendant: bool,
    name: NameTest,
}

/// A compiled selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    steps: Vec<Step>,
}

impl Selector {
    /// Compile an expression. An `xpointer(...)` wrapper is accepted
    /// and stripped.
    pub fn parse(expression: &str) -> Result<Self> {
        let mut expr = expression.trim();
        if let Some(inner) = expr
            .strip_prefix("xpointer(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            expr = inner.trim();
        }
        if expr.is_empty() || expr == "." || expr == "/" {
            return Ok(Self { steps: Vec::new() });
        }

        let mut steps = Vec::new();
        let mut descendant = false;
        let path = expr.strip_prefix('/').unwrap_or(expr);
        for segment in path.split('/') {
            if segment.is_empty() {
                // the empty segment between two slashes: `a//b`
                descendant = true;
                continue;
            }
            if segment.contains(['[', ']', '@']) {
                return Err(Error::BadSelector(expression.to_owned()));
            }
            let name = if segment == "*" {
                NameTest::Any
            } else {
                NameTest::Name(segment.to_owned())
            };
            steps.push(Step { descendant, name });
            descendant = false;
        }
        if descendant {
            return Err(Error::BadSelector(expression.to_owned()));
        }
        Ok(Self { steps })
    }

    /// Whether this selector selects the root itself.
    pub fn selects_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Evaluate against a root element, returning matches in document
    /// order.
    pub fn select<'a>(&self, root: &'a Node) -> Vec<&'a Node> {
        if self.steps.is_empty() {
            return vec![root];
        }

        // the first step matches against the root element itself (the
        // implicit document node is its parent)
        let mut current: Vec<&Node> = Vec::new();
        let first = &self.steps[0];
        if first.descendant {
            collect_descendants_and_self(root, &first.name, &mut current);
        } else if first.name.matches(root) {
            current.push(root);
        }

        for step in &self.steps[1..] {
            let mut next = Vec::new();
            for node in current {
                if step.descendant {
                    for child in node.elements() {
                        collect_descendants_and_self(child, &step.name, &mut next);
                    }
                } else {
                    next.extend(child_matches(node, &step.name));
                }
            }
            current = next;
        }
        current
    }

    /// The first match, if any.
    pub fn select_first<'a>(&self, root: &'a Node) -> Option<&'a Node> {
        self.select(root).into_iter().next()
    }
}

fn child_matches<'a>(node: &'a Node, test: &NameTest) -> Vec<&'a Node> {
    node.elements().filter(|child| test.matches(child)).collect()
}

fn collect_descendants_and_self<'a>(node: &'a Node, test: &NameTest, out: &mut Vec<&'a Node>) {
    if test.matches(node) {
        out.push(node);
    }
    for child in node.elements() {
        collect_descendants_and_self(child, test, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;

    fn doc() -> Document {
        Document::parse("<page><list><a>1</a><b/><a>2</a></list><a>3</a></page>").unwrap()
    }

    #[test]
    fn root_expressions() {
        for expr in [".", "/", "", "xpointer(.)"] {
            let selector = Selector::parse(expr).unwrap();
            assert!(selector.selects_root());
        }
    }

    #[test]
    fn absolute_path() {
        let doc = doc();
        let selector = Selector::parse("/page/list/a").unwrap();
        let found = selector.select(doc.root().unwrap());
        let texts: Vec<String> = found.iter().map(|n| n.text()).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }

    #[test]
    fn descendant_search() {
        let doc = doc();
        let selector = Selector::parse("//a").unwrap();
        let found = selector.select(doc.root().unwrap());
        assert_eq!(found.len(), 3);
        assert_eq!(found[2].text(), "3");
    }

    #[test]
    fn wildcard() {
        let doc = doc();
        let selector = Selector::parse("/page/*").unwrap();
        let found = selector.select(doc.root().unwrap());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name(), "list");
    }

    #[test]
    fn mismatched_root_selects_nothing() {
        let doc = doc();
        let selector = Selector::parse("/other/a").unwrap();
        assert!(selector.select(doc.root().unwrap()).is_empty());
    }

    #[test]
    fn unsupported_syntax_is_rejected() {
        assert!(Selector::parse("/a[1]").is_err());
        assert!(Selector::parse("//@attr").is_err());
        assert!(Selector::parse("/a//").is_err());
    }
}
