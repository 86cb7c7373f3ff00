//! Stylesheet-stage errors.

use thiserror::Error;

/// Failures inside the stylesheet stage. Extension-function failures
/// are caught at the call boundary: the error is logged against the
/// current context and an empty result is pushed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum XsltError {
    /// Wrong number of arguments to an extension function.
    #[error("{function}: expected {expected} argument(s), got {got}")]
    Arity {
        /// The function name.
        function: &'static str,
        /// Expected argument count (rendered).
        expected: String,
        /// Actual argument count.
        got: usize,
    },

    /// A stylesheet that could not be compiled.
    #[error("cannot compile stylesheet {path}: {reason}")]
    Compile {
        /// The stylesheet path.
        path: String,
        /// The engine's diagnostic.
        reason: String,
    },

    /// A failure while applying a compiled stylesheet.
    #[error("transform failed: {0}")]
    Apply(String),

    /// Any other extension-function failure.
    #[error("{0}")]
    Function(String),
}
