//! The immutable request view.

use crate::multipart::{parse_multipart, Part};
use crate::parser::{normalize_input_header_name, parse_cookies, parse_query};
use crate::range::starts_with_ci;
use crate::{get_boundary, Encoder, Error, Headers, KnownHeaderName};
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// An uploaded file. The content is a borrowed range into the request
/// body buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFile {
    remote_name: String,
    content_type: String,
    begin: usize,
    end: usize,
}

impl RequestFile {
    /// The client-side file name.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// The declared MIME type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The file content, resolved against the request body.
    pub fn data<'a>(&self, body: &'a [u8]) -> &'a [u8] {
        &body[self.begin..self.end]
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// True for zero-length uploads.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// An inbound request, immutable after construction.
///
/// Built from a CGI-style environment: `HTTP_*` variables become
/// headers, `HTTP_COOKIE` additionally yields cookies, everything else
/// is kept as a variable. Query and body arguments are merged into one
/// ordered argument list.
#[derive(Debug, Default)]
pub struct Request {
    vars: HashMap<String, String>,
    headers: Headers,
    cookies: BTreeMap<String, String>,
    args: Vec<(String, String)>,
    files: HashMap<String, Vec<RequestFile>>,
    body: Vec<u8>,
}

impl Request {
    /// Parse `KEY=VALUE` environment lines plus an optional body.
    ///
    /// Convenience wrapper over [`Request::from_env`] for callers (and
    /// tests) holding textual lines.
    pub fn from_env_lines(lines: &[&str], body: Vec<u8>, encoder: &Encoder) -> Result<Self, Error> {
        let pairs: Vec<(&str, &[u8])> = lines
            .iter()
            .map(|line| {
                let (key, value) = line.split_once('=').unwrap_or((*line, ""));
                (key, value.as_bytes())
            })
            .collect();
        Self::from_env(&pairs, body, encoder)
    }

    /// Construct a request from environment variables and a raw body.
    pub fn from_env(
        env: &[(&str, &[u8])],
        body: Vec<u8>,
        encoder: &Encoder,
    ) -> Result<Self, Error> {
        let mut request = Self {
            body,
            ..Self::default()
        };

        for (key, value) in env {
            if key.eq_ignore_ascii_case("HTTP_COOKIE") {
                for (name, cookie) in parse_cookies(value, encoder) {
                    request.cookies.insert(name, cookie);
                }
                let name = normalize_input_header_name(&key["HTTP_".len()..]);
                request
                    .headers
                    .append(name.as_str(), encoder.recover(crate::range::trim(value)));
            } else if starts_with_ci(key.as_bytes(), b"HTTP_") {
                let name = normalize_input_header_name(&key["HTTP_".len()..]);
                request
                    .headers
                    .append(name.as_str(), encoder.recover(crate::range::trim(value)));
            } else {
                if key.eq_ignore_ascii_case("CONTENT_TYPE") {
                    request
                        .headers
                        .append(KnownHeaderName::ContentType, encoder.recover(value));
                }
                request
                    .vars
                    .insert((*key).to_owned(), encoder.recover(value));
            }
        }

        request.parse_arguments(encoder)?;
        log::debug!(
            "parsed request: {} {} ({} args, {} headers)",
            request.method(),
            request.uri(),
            request.args.len(),
            request.headers.len()
        );
        Ok(request)
    }

    fn parse_arguments(&mut self, encoder: &Encoder) -> Result<(), Error> {
        let method = self.method().to_owned();
        let body_expected = method.eq_ignore_ascii_case("POST") || method.eq_ignore_ascii_case("PUT");

        if body_expected {
            if let Some(expected) = self.content_length() {
                if self.body.len() < expected {
                    return Err(Error::ShortBody {
                        expected,
                        got: self.body.len(),
                    });
                }
            }
        }

        let content_type = self.content_type().to_owned();
        if body_expected && starts_with_ci(content_type.as_bytes(), b"multipart/form-data") {
            let boundary = get_boundary(&content_type)?;
            let body = std::mem::take(&mut self.body);
            for part in parse_multipart(&body, &boundary, encoder)? {
                match part {
                    Part::Arg { name, value } => self.args.push((name, value)),
                    Part::File {
                        name,
                        remote_name,
                        content_type,
                        begin,
                        end,
                    } => self.files.entry(name).or_default().push(RequestFile {
                        remote_name,
                        content_type,
                        begin,
                        end,
                    }),
                }
            }
            self.body = body;
        } else if body_expected && !self.body.is_empty() {
            let body = std::mem::take(&mut self.body);
            self.args = parse_query(&body, encoder)?;
            self.body = body;
        } else {
            let query = self.query_string().to_owned();
            self.args = parse_query(query.as_bytes(), encoder)?;
        }
        Ok(())
    }

    /// A CGI variable by exact name.
    pub fn var(&self, name: &str) -> &str {
        self.vars.get(name).map(String::as_str).unwrap_or("")
    }

    /// Whether the CGI variable is present.
    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// The request method (`REQUEST_METHOD`).
    pub fn method(&self) -> &str {
        self.var("REQUEST_METHOD")
    }

    /// The raw query string.
    pub fn query_string(&self) -> &str {
        self.var("QUERY_STRING")
    }

    /// `SCRIPT_NAME`.
    pub fn script_name(&self) -> &str {
        self.var("SCRIPT_NAME")
    }

    /// `SCRIPT_FILENAME`.
    pub fn script_filename(&self) -> &str {
        self.var("SCRIPT_FILENAME")
    }

    /// `DOCUMENT_ROOT`.
    pub fn document_root(&self) -> &str {
        self.var("DOCUMENT_ROOT")
    }

    /// `PATH_INFO`.
    pub fn path_info(&self) -> &str {
        self.var("PATH_INFO")
    }

    /// `REMOTE_USER`.
    pub fn remote_user(&self) -> &str {
        self.var("REMOTE_USER")
    }

    /// `REMOTE_ADDR`.
    pub fn remote_addr(&self) -> &str {
        self.var("REMOTE_ADDR")
    }

    /// Script name plus query string.
    pub fn uri(&self) -> String {
        let script_name = self.script_name();
        let query = self.query_string();
        if query.is_empty() {
            script_name.to_owned()
        } else {
            format!("{script_name}?{query}")
        }
    }

    /// The `Host` header.
    pub fn host(&self) -> &str {
        self.header(KnownHeaderName::Host).unwrap_or("")
    }

    /// The client address, preferring a proxy-provided `X-Real-IP`.
    pub fn real_ip(&self) -> &str {
        self.header(KnownHeaderName::XRealIp)
            .unwrap_or_else(|| self.remote_addr())
    }

    /// The outbound `X-Forwarded-For` chain: any inbound chain with the
    /// peer address appended.
    pub fn x_forwarded_for(&self) -> String {
        let addr = self.remote_addr();
        match self.header(KnownHeaderName::XForwardedFor) {
            Some(existing) if !existing.is_empty() => format!("{existing}, {addr}"),
            _ => addr.to_owned(),
        }
    }

    /// Whether the request arrived over TLS (`HTTPS` variable).
    pub fn is_secure(&self) -> bool {
        let https = self.var("HTTPS");
        https.eq_ignore_ascii_case("on") || https == "1" || https.eq_ignore_ascii_case("yes")
    }

    /// The request content type.
    pub fn content_type(&self) -> &str {
        self.header(KnownHeaderName::ContentType).unwrap_or("")
    }

    /// `CONTENT_LENGTH`, when present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        let raw = self.var("CONTENT_LENGTH");
        if raw.is_empty() {
            None
        } else {
            raw.parse().ok()
        }
    }

    /// The request `Content-Encoding`.
    pub fn content_encoding(&self) -> &str {
        self.header(KnownHeaderName::ContentEncoding).unwrap_or("")
    }

    /// A header value by case-insensitive name.
    pub fn header(&self, name: impl Into<crate::HeaderName>) -> Option<&str> {
        self.headers.get(name)
    }

    /// The full header map.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// A cookie value by exact name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// All cookies, ordered by name.
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// The first argument with the given name.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every argument with the given name, in order.
    pub fn args_of(&self, name: &str) -> Vec<&str> {
        self.args
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The full ordered argument list.
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Distinct argument names, in first-occurrence order.
    pub fn arg_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.args {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Uploaded files posted under `name`.
    pub fn files(&self, name: &str) -> Option<&[RequestFile]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// The raw request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
