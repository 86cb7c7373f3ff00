//! Error taxonomy of the invocation pipeline.
//!
//! Block failures are values, not panics: every block invocation
//! returns `Result<Document, InvokeError>` and the pipeline matches on
//! the error kind at the block boundary.

use thiserror::Error;
use xscript_xml::Node;

/// How the pipeline reacts to a failed block invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeErrorKind {
    /// Runtime failure: an `<xscript_invoke_failed>` element replaces
    /// the block output.
    Error,
    /// Structurally wrong request (bad arity, disallowed parameter
    /// type, bad URL scheme): terminates the whole request with 500.
    Critical,
    /// Transient transport failure or upstream 5xx: consumed by the
    /// retry loop, then demoted to [`InvokeErrorKind::Error`].
    Retry,
    /// The request was cancelled: the block contributes neither output
    /// nor an error node.
    Skipped,
}

/// A block invocation failure with its key/value info bag.
#[derive(Debug, Clone)]
pub struct InvokeError {
    kind: InvokeErrorKind,
    message: String,
    info: Vec<(String, String)>,
    body: Option<Node>,
}

impl InvokeError {
    /// A plain invoke error.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(InvokeErrorKind::Error, message)
    }

    /// A request-fatal error.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::with_kind(InvokeErrorKind::Critical, message)
    }

    /// A retryable error.
    pub fn retry(message: impl Into<String>) -> Self {
        Self::with_kind(InvokeErrorKind::Retry, message)
    }

    /// A cancellation marker.
    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_kind(InvokeErrorKind::Skipped, message)
    }

    fn with_kind(kind: InvokeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            info: Vec::new(),
            body: None,
        }
    }

    /// Attach an info entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Attach an info entry.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.info.push((key.into(), value.into()));
    }

    /// Attach an upstream error body to be embedded into the error
    /// document.
    pub fn attach_body(&mut self, node: Node) {
        self.body = Some(node);
    }

    /// The error kind.
    pub fn kind(&self) -> InvokeErrorKind {
        self.kind
    }

    /// The bare message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The info bag.
    pub fn info(&self) -> &[(String, String)] {
        &self.info
    }

    /// Demote a retryable error once its attempts are exhausted.
    pub fn demoted(mut self) -> Self {
        if self.kind == InvokeErrorKind::Retry {
            self.kind = InvokeErrorKind::Error;
        }
        self
    }

    /// The `<xscript_invoke_failed>` element substituted for the block
    /// output.
    pub fn error_document(&self) -> Node {
        let mut node = Node::new("xscript_invoke_failed").with_attr("error", self.message.clone());
        for (key, value) in &self.info {
            node.set_attr(key.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            node.push_element(body.clone());
        }
        node
    }

    /// Message plus info bag, for logs.
    pub fn what_info(&self) -> String {
        let mut out = self.message.clone();
        for (key, value) in &self.info {
            out.push_str(". ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
        }
        out
    }
}

impl std::fmt::Display for InvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.what_info())
    }
}

impl std::error::Error for InvokeError {}

impl From<xscript_xml::Error> for InvokeError {
    fn from(err: xscript_xml::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// The producer computed a result that must not be stored (e.g. a
/// multipart POST).
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct SkipCache(pub String);

/// Script-load failures. Fatal: the request serving the script returns
/// 500.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScriptError {
    /// Ill-formed script XML.
    #[error(transparent)]
    Xml(#[from] xscript_xml::Error),

    /// A block element whose namespace has no registered extension.
    #[error("unknown block extension: {0}")]
    UnknownExtension(String),

    /// A method name no extension recognizes.
    #[error("nonexistent method call: {0}")]
    UnknownMethod(String),

    /// A parameter with an unknown `type` attribute.
    #[error("unknown parameter type: {0}")]
    UnknownParamType(String),

    /// A numeric literal parameter that does not parse as its type.
    #[error("cannot parse {type_name} parameter value: {value}")]
    BadParamValue {
        /// The declared type.
        type_name: &'static str,
        /// The offending literal.
        value: String,
    },

    /// A malformed attribute value (`timeout`, `retry-count`,
    /// `cache-strategy`, ...).
    #[error("cannot parse {attribute} value: {value}")]
    BadAttribute {
        /// The attribute name.
        attribute: &'static str,
        /// The offending value.
        value: String,
    },

    /// An invalid header or query-param id.
    #[error("{0}")]
    BadParamId(String),

    /// An unknown validator name or a malformed validator pattern.
    #[error("bad validator: {0}")]
    BadValidator(String),

    /// An unknown protocol-arg key.
    #[error("unknown protocol arg: {0}")]
    UnknownProtocolArg(String),

    /// Guard without a state attribute, or similar.
    #[error("malformed guard")]
    MalformedGuard,

    /// Duplicate registration of an extension name.
    #[error("registering duplicate extension: {0}")]
    DuplicateExtension(String),

    /// Script file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
