//! JSON→XML conversion for `application/json` block responses.

use crate::{Document, Node, Result};
use serde_json::Value;

/// Convert a JSON text into a document rooted at `<data>`.
///
/// Objects become child elements named by their keys, arrays repeat the
/// enclosing element name, scalars become text content, `null` becomes
/// an empty element. Keys that are not valid element names are emitted
/// as `<param name="…">`.
pub fn json_to_document(input: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(input)?;
    let mut root = Node::new("data");
    build(&mut root, &value);
    Ok(Document::with_root(root))
}

fn build(parent: &mut Node, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => parent.push_text(if *b { "1" } else { "0" }),
        Value::Number(n) => parent.push_text(n.to_string()),
        Value::String(s) => parent.push_text(s.clone()),
        Value::Array(items) => {
            for item in items {
                let mut element = Node::new("element");
                build(&mut element, item);
                parent.push_element(element);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let mut element = if is_valid_name(key) {
                    Node::new(key.clone())
                } else {
                    Node::new("param").with_attr("name", key.clone())
                };
                build(&mut element, item);
                parent.push_element(element);
            }
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn object_to_elements() {
        let doc = json_to_document(r#"{"name":"moscow","count":3}"#).unwrap();
        assert_eq!(
            doc.serialize_root(),
            "<data><count>3</count><name>moscow</name></data>"
        );
    }

    #[test]
    fn arrays_repeat() {
        let doc = json_to_document(r#"{"items":[1,2]}"#).unwrap();
        assert_eq!(
            doc.serialize_root(),
            "<data><items><element>1</element><element>2</element></items></data>"
        );
    }

    #[test]
    fn awkward_keys_become_params() {
        let doc = json_to_document(r#"{"1bad key":null}"#).unwrap();
        assert_eq!(
            doc.serialize_root(),
            "<data><param name=\"1bad key\"/></data>"
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(json_to_document("{not json").is_err());
    }
}
