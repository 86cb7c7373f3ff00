//! Block guards.

use crate::{ScriptError, State};
use xscript_xml::Node;

/// A boolean precondition on a block, evaluated against [`State`]
/// before argument assembly.
///
/// `<xscript:guard state="k"/>` passes when `k` is truthy;
/// `value="v"` compares for string equality instead; `not="1"` negates
/// the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    state_key: String,
    value: Option<String>,
    negate: bool,
}

impl Guard {
    /// Parse a guard element.
    pub fn parse(node: &Node) -> Result<Self, ScriptError> {
        let state_key = node
            .attr("state")
            .filter(|key| !key.is_empty())
            .ok_or(ScriptError::MalformedGuard)?
            .to_owned();
        Ok(Self {
            state_key,
            value: node.attr("value").map(str::to_owned),
            negate: matches!(node.attr("not"), Some("1") | Some("yes")),
        })
    }

    /// Evaluate the guard.
    pub fn check(&self, state: &State) -> bool {
        let passed = match &self.value {
            Some(expected) => state.has(&self.state_key) && state.as_string(&self.state_key) == *expected,
            None => state.is(&self.state_key),
        };
        passed != self.negate
    }
}
