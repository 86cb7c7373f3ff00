//! Errors of the request/response layer.

use thiserror::Error;

/// Concrete errors raised while parsing requests or building responses.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An encoded NUL byte in a URL component.
    #[error("Null symbol in URL is not allowed")]
    NulInUrl,

    /// The body was shorter than `Content-Length` promised.
    #[error("short request body: expected {expected} bytes, got {got}")]
    ShortBody {
        /// Declared `Content-Length`.
        expected: usize,
        /// Bytes actually received.
        got: usize,
    },

    /// A multipart content type without a `boundary` attribute.
    #[error("no boundary found")]
    NoBoundary,

    /// Header/status/cookie mutation after the headers-sent latch.
    #[error("headers already sent")]
    HeadersSent,

    /// Body access on a response detached to a binary writer, or a
    /// second detach.
    #[error("response is detached to a binary writer")]
    Detached,

    /// [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
