//! Protocol-argument resolution.

use xscript_http::Request;

/// The keys a `protocolarg` parameter may name.
pub(crate) const PROTOCOL_ARG_KEYS: &[&str] = &[
    "path",
    "query",
    "uri",
    "host",
    "pathinfo",
    "realpath",
    "secure",
    "method",
    "http_user",
    "remote_ip",
    "content-length",
    "content-encoding",
    "content-type",
];

/// Resolve a protocol arg against the inbound request. Unknown keys
/// yield an empty string; key validity is checked at script-parse time.
pub fn protocol_arg(request: &Request, key: &str) -> String {
    match key {
        "path" => request.script_name().to_owned(),
        "query" => request.query_string().to_owned(),
        "uri" => request.uri(),
        "host" => request.host().to_owned(),
        "pathinfo" => request.path_info().to_owned(),
        "realpath" => request.script_filename().to_owned(),
        "secure" => (if request.is_secure() { "yes" } else { "no" }).to_owned(),
        "method" => request.method().to_owned(),
        "http_user" => request.remote_user().to_owned(),
        "remote_ip" => request.real_ip().to_owned(),
        "content-length" => request
            .content_length()
            .map(|n| n.to_string())
            .unwrap_or_default(),
        "content-encoding" => request.content_encoding().to_owned(),
        "content-type" => request.content_type().to_owned(),
        _ => String::new(),
    }
}
