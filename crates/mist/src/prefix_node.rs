//! Prefix-named result fragments.

use xscript_core::State;
use xscript_xml::Node;

/// Builds the `<prefix><arg name="…">value</arg>…</prefix>` fragment
/// shared by the echo methods, optionally mirroring every entry into
/// state under `prefix + name`.
#[derive(Debug)]
pub struct PrefixNode<'a> {
    prefix: String,
    node: Node,
    state: Option<&'a State>,
}

impl<'a> PrefixNode<'a> {
    /// A fragment named by `prefix`.
    pub fn new(prefix: &str, state: Option<&'a State>) -> Self {
        Self {
            prefix: prefix.to_owned(),
            node: Node::new(prefix.to_owned()),
            state,
        }
    }

    /// Record one entry.
    pub fn set_parameter(&mut self, name: &str, value: &str) {
        self.node.push_element(
            Node::new("arg")
                .with_attr("name", name)
                .with_text(value),
        );
        if let Some(state) = self.state {
            state.set_string(&format!("{}{}", self.prefix, name), value);
        }
    }

    /// Record a multi-valued entry; the state mirror joins values with
    /// commas.
    pub fn set_parameters(&mut self, name: &str, values: &[&str]) {
        for value in values {
            self.node.push_element(
                Node::new("arg")
                    .with_attr("name", name)
                    .with_text(*value),
            );
        }
        if let Some(state) = self.state {
            state.set_string(&format!("{}{}", self.prefix, name), values.join(","));
        }
    }

    /// Finish and return the fragment.
    pub fn into_node(self) -> Node {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_fragment_and_mirrors_state() {
        let state = State::new();
        let mut node = PrefixNode::new("request_", Some(&state));
        node.set_parameter("text", "moscow");
        node.set_parameters("tag", &["a", "b"]);
        assert_eq!(
            node.into_node().to_string(),
            "<request_><arg name=\"text\">moscow</arg>\
             <arg name=\"tag\">a</arg><arg name=\"tag\">b</arg></request_>"
        );
        assert_eq!(state.as_string("request_text"), "moscow");
        assert_eq!(state.as_string("request_tag"), "a,b");
    }

    #[test]
    fn no_state_mirror() {
        let mut node = PrefixNode::new("p_", None);
        node.set_parameter("k", "v");
        assert_eq!(node.into_node().attr("name"), None);
    }
}
