#![forbid(unsafe_code)]
#![deny(nonstandard_style, unused_qualifications)]

/*!
Remote http blocks.

An `<xscript:http>` element fetches an XML fragment over HTTP with one
of seven request shapes (`getHttp`, `getBinaryPage`, `post`,
`postHttp`, `postByRequest`, `getByRequest`, `getByState`). The
outbound exchange itself lives in [`HttpHelper`] behind the
[`Connector`] trait, so tests drive the block machinery against
scripted transports.
*/

mod helper;
pub use helper::{Connector, HttpHelper, TcpConnector, Transport};
pub use url::Url;

mod query_params;
pub use query_params::QueryParamData;

mod http_block;
pub use http_block::{HttpBlock, HttpExtension, HttpMethod};
