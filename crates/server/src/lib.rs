#![forbid(unsafe_code)]
#![deny(nonstandard_style, unused_qualifications)]

/*!
The server loop: accepts a [`RequestData`](xscript_core::RequestData),
resolves the script by filename, drives the invocation pipeline and
leaves the serialized response in the bundle's response object.
Completed contexts are released through the cleanup manager off the
request path.
*/

mod settings;
pub use settings::ServerSettings;

mod server;
pub use server::Server;
