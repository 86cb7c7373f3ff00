#![forbid(unsafe_code)]
#![deny(nonstandard_style, unused_qualifications)]

/*!
Owned XML document model for the xscript engine.

Scripts are parsed once and shared immutably across requests, so the
document model is plain owned data with no interior pointers: a
[`Document`] owns a tree of [`Node`]s, nodes can be cloned freely, and
splicing block results into a script is ordinary tree surgery.

The [`Selector`] type implements the XPath subset used for XPointer
splice coordinates.
*/

mod node;
pub use node::{Child, Node};

mod document;
pub use document::Document;

mod escape;
pub use escape::{escape_attr, escape_text};

mod selector;
pub use selector::Selector;

mod json;
pub use json::json_to_document;

mod sanitize;
pub use sanitize::sanitize_html;

mod error;
pub use error::Error;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, Error>;
