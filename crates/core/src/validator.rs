//! Declarative parameter validators.

use crate::{InvokeError, ScriptError, State};
use fancy_regex::Regex;
use xscript_xml::Node;

#[derive(Debug)]
enum Kind {
    NonEmpty,
    Regex(Box<Regex>),
}

/// A validator declared on a parameter via the `validator` attribute.
///
/// A failing check is an invoke error; when `guard-name` is declared
/// the named state flag is set so guards can react to the failure.
#[derive(Debug)]
pub struct Validator {
    kind: Kind,
    guard_name: Option<String>,
}

impl Validator {
    /// Build the validator declared on `node`, if any.
    pub fn parse(node: &Node) -> Result<Option<Self>, ScriptError> {
        let Some(name) = node.attr("validator") else {
            return Ok(None);
        };
        let kind = match name {
            "nonempty" => Kind::NonEmpty,
            "regex" => {
                let pattern = node
                    .attr("pattern")
                    .ok_or_else(|| ScriptError::BadValidator("regex without pattern".into()))?;
                let regex = Regex::new(pattern)
                    .map_err(|e| ScriptError::BadValidator(format!("pattern: {e}")))?;
                Kind::Regex(Box::new(regex))
            }
            other => return Err(ScriptError::BadValidator(other.to_owned())),
        };
        Ok(Some(Self {
            kind,
            guard_name: node.attr("guard-name").map(str::to_owned),
        }))
    }

    /// Check an evaluated parameter value.
    pub fn check(&self, state: &State, param_id: &str, value: &str) -> Result<(), InvokeError> {
        let ok = match &self.kind {
            Kind::NonEmpty => !value.is_empty(),
            Kind::Regex(regex) => regex.is_match(value).unwrap_or(false),
        };
        if ok {
            return Ok(());
        }
        if let Some(guard) = &self.guard_name {
            state.set_bool(guard, true);
        }
        Err(InvokeError::new("validation failed")
            .with("param-id", param_id)
            .with("value", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_node(attrs: &[(&str, &str)]) -> Node {
        let mut node = Node::new("xscript:param");
        for (name, value) in attrs {
            node.set_attr(*name, *value);
        }
        node
    }

    #[test]
    fn absent_validator() {
        assert!(Validator::parse(&param_node(&[("id", "x")]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn nonempty() {
        let validator = Validator::parse(&param_node(&[("validator", "nonempty")]))
            .unwrap()
            .unwrap();
        let state = State::new();
        assert!(validator.check(&state, "p", "value").is_ok());
        assert!(validator.check(&state, "p", "").is_err());
    }

    #[test]
    fn regex_with_guard_flag() {
        let validator = Validator::parse(&param_node(&[
            ("validator", "regex"),
            ("pattern", "^[0-9]+$"),
            ("guard-name", "bad_input"),
        ]))
        .unwrap()
        .unwrap();
        let state = State::new();
        assert!(validator.check(&state, "p", "123").is_ok());
        assert!(!state.is("bad_input"));
        assert!(validator.check(&state, "p", "12a").is_err());
        assert!(state.is("bad_input"));
    }

    #[test]
    fn unknown_validator_is_a_script_error() {
        assert!(Validator::parse(&param_node(&[("validator", "nope")])).is_err());
    }
}
