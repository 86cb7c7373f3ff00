//! Errors of the document layer.

use thiserror::Error;

/// Concrete errors raised while parsing or manipulating documents.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Underlying XML syntax error.
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),

    /// A close tag without a matching open tag, or vice versa.
    #[error("unbalanced document")]
    UnbalancedDocument,

    /// Non-whitespace text outside the root element.
    #[error("text content outside of the root element")]
    TextOutsideRoot,

    /// More than one root element.
    #[error("document has multiple root elements")]
    MultipleRoots,

    /// An input with no root element at all.
    #[error("document has no root element")]
    NoRootElement,

    /// A splice path that does not address an element.
    #[error("splice path does not address an element")]
    BadSplicePath,

    /// An unsupported selector expression.
    #[error("cannot parse selector: {0}")]
    BadSelector(String),

    /// Malformed JSON input to the JSON→XML conversion.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
