#![forbid(unsafe_code)]
#![deny(nonstandard_style, unused_qualifications)]

/*!
Request/response model for the xscript engine.

This crate owns everything that happens between a CGI-style environment
and the byte stream written back to the client: zero-copy range
utilities, the case-insensitive header map, cookies, the immutable
[`Request`] view with its environment/multipart parsers, and the
buffered single-shot [`Response`].
*/

pub mod range;

mod urlencoding;
pub use urlencoding::{urldecode, urlencode, urlencode_all};

mod encoding;
pub use encoding::Encoder;

mod status;
pub use status::reason_phrase;

mod headers;
pub use headers::{HeaderName, HeaderValues, Headers, KnownHeaderName};

mod cookie;
pub use cookie::Cookie;

mod request;
pub use request::{Request, RequestFile};

mod parser;
pub use parser::{normalize_input_header_name, normalize_output_header_name, parse_query};

mod multipart;
pub use multipart::get_boundary;

mod response;
pub use response::{BinaryWriter, Response};

mod error;
pub use error::Error;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, Error>;
