//! One outbound HTTP exchange.
//!
//! The helper owns the transport handle for a single request/response
//! round trip: it shapes the head, performs the blocking exchange,
//! captures the body and classifies the response content type. The
//! transport comes from a [`Connector`], so everything above the
//! socket is testable without a network.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime};
use url::Url;
use xscript_core::{InvokeError, Tag};

/// A blocking byte stream carrying one HTTP exchange.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Produces transports for outbound exchanges.
pub trait Connector: Send + Sync {
    /// Open a transport to the URL's host within `timeout`.
    fn connect(&self, url: &Url, timeout: Duration) -> std::io::Result<Box<dyn Transport>>;
}

/// The production connector: plain TCP with connect/read/write
/// timeouts. TLS is delegated to deployments that install their own
/// connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, url: &Url, timeout: Duration) -> std::io::Result<Box<dyn Transport>> {
        if url.scheme() != "http" {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("scheme {} requires a custom connector", url.scheme()),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no host"))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let mut last_error =
            std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses");
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    return Ok(Box::new(stream));
                }
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }
}

const MAX_HEAD: usize = 64 * 1024;

/// One outbound exchange: URL, appended headers, optional body, and
/// the captured response.
pub struct HttpHelper {
    url: Url,
    timeout: Duration,
    method: &'static str,
    headers_out: Vec<String>,
    body: Option<Vec<u8>>,
    sent_modified_since: bool,
    status: u16,
    // lowercased names, duplicates preserved in arrival order
    response_headers: Vec<(String, String)>,
    content: Vec<u8>,
    content_type: String,
    charset: String,
}

impl std::fmt::Debug for HttpHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHelper")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("status", &self.status)
            .finish()
    }
}

impl HttpHelper {
    /// Prepare an exchange against `url` with the given budget.
    pub fn new(url: &str, timeout_ms: i64) -> Result<Self, InvokeError> {
        let parsed = Url::parse(url)
            .map_err(|e| InvokeError::new(format!("invalid url: {e}")).with("url", url))?;
        Ok(Self {
            url: parsed,
            timeout: Duration::from_millis(timeout_ms.max(1) as u64),
            method: "GET",
            headers_out: Vec::new(),
            body: None,
            sent_modified_since: false,
            status: 0,
            response_headers: Vec::new(),
            content: Vec::new(),
            content_type: String::new(),
            charset: String::new(),
        })
    }

    /// The full URL.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The URL without its query part.
    pub fn base(&self) -> String {
        match self.url.as_str().split_once('?') {
            Some((base, _)) => base.to_owned(),
            None => self.url.as_str().to_owned(),
        }
    }

    /// Append caller headers, injecting `Expect:`, `Connection: close`
    /// and a conditional `If-Modified-Since` unless the caller already
    /// set them.
    pub fn append_headers(&mut self, headers: &[String], modified_since: Option<SystemTime>) {
        let mut expect = false;
        let mut connection = false;
        let mut if_modified_since = false;
        for header in headers {
            if starts_ci(header, "expect:") {
                expect = true;
            } else if starts_ci(header, "connection:") {
                connection = true;
            } else if starts_ci(header, "if-modified-since:") {
                if_modified_since = true;
            }
            self.headers_out.push(header.clone());
        }
        if !expect {
            self.headers_out.push("Expect:".to_owned());
        }
        if !connection {
            self.headers_out.push("Connection: close".to_owned());
        }
        if if_modified_since {
            self.sent_modified_since = true;
        } else if let Some(since) = modified_since {
            self.headers_out
                .push(format!("If-Modified-Since: {}", httpdate::fmt_http_date(since)));
            self.sent_modified_since = true;
        }
    }

    /// Switch to POST and attach the body.
    pub fn post_data(&mut self, data: Vec<u8>) {
        self.method = "POST";
        self.body = Some(data);
    }

    /// Whether a conditional `If-Modified-Since` was sent.
    pub fn sent_modified_since(&self) -> bool {
        self.sent_modified_since
    }

    /// Perform the blocking round trip. Transport failures are
    /// retryable.
    pub fn perform(&mut self, connector: &dyn Connector) -> Result<u16, InvokeError> {
        let result = self.exchange(connector);
        match result {
            Ok(()) => {
                self.detect_content_type();
                log::debug!("{} {} -> {}", self.method, self.url, self.status);
                Ok(self.status)
            }
            Err(error) => {
                Err(InvokeError::retry(error.to_string()).with("url", self.url.as_str()))
            }
        }
    }

    fn exchange(&mut self, connector: &dyn Connector) -> std::io::Result<()> {
        let mut transport = connector.connect(&self.url, self.timeout)?;

        let mut head = String::new();
        let path = match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_owned(),
        };
        head.push_str(&format!("{} {} HTTP/1.1\r\n", self.method, path));
        if let Some(host) = self.url.host_str() {
            match self.url.port() {
                Some(port) => head.push_str(&format!("Host: {host}:{port}\r\n")),
                None => head.push_str(&format!("Host: {host}\r\n")),
            }
        }
        for header in &self.headers_out {
            head.push_str(header);
            head.push_str("\r\n");
        }
        if let Some(body) = &self.body {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        transport.write_all(head.as_bytes())?;
        if let Some(body) = &self.body {
            transport.write_all(body)?;
        }
        transport.flush()?;

        self.read_response(transport.as_mut())
    }

    fn read_response(&mut self, transport: &mut dyn Transport) -> std::io::Result<()> {
        let mut buffer = Vec::with_capacity(8 * 1024);
        let mut chunk = [0u8; 8 * 1024];
        let head_len = loop {
            if let Some(pos) = memchr::memmem::find(&buffer, b"\r\n\r\n") {
                break pos + 4;
            }
            if buffer.len() > MAX_HEAD {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "response head too long",
                ));
            }
            let read = transport.read(&mut chunk)?;
            if read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before response head",
                ));
            }
            buffer.extend_from_slice(&chunk[..read]);
        };

        let mut header_storage = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Response::new(&mut header_storage);
        let status = match parsed.parse(&buffer[..head_len]) {
            Ok(httparse::Status::Complete(_)) => parsed.code.unwrap_or(0),
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "malformed response head",
                ))
            }
        };
        self.status = status;

        let mut content_length = None;
        let mut chunked = false;
        self.response_headers.clear();
        for header in parsed.headers.iter() {
            let name = header.name.to_ascii_lowercase();
            let value = String::from_utf8_lossy(header.value).trim().to_owned();
            if name == "content-length" {
                content_length = value.parse::<usize>().ok();
            }
            if name == "transfer-encoding" && value.eq_ignore_ascii_case("chunked") {
                chunked = true;
            }
            self.response_headers.push((name, value));
        }

        let mut body = buffer[head_len..].to_vec();
        if chunked {
            read_to_end(transport, &mut body)?;
            self.content = decode_chunked(&body)?;
            return Ok(());
        }
        match content_length {
            Some(length) => {
                while body.len() < length {
                    let read = transport.read(&mut chunk)?;
                    if read == 0 {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed mid-body",
                        ));
                    }
                    body.extend_from_slice(&chunk[..read]);
                }
                body.truncate(length);
            }
            None => read_to_end(transport, &mut body)?,
        }
        self.content = body;
        Ok(())
    }

    /// The response status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The captured response body.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Whether any body bytes were captured.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// The response headers, lowercased, duplicates preserved.
    pub fn headers(&self) -> &[(String, String)] {
        &self.response_headers
    }

    /// First value of a response header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a response header, in order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.response_headers
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Split the `Content-Type` header into type and charset. Absent
    /// headers default to `text/xml` in `windows-1251`, the engine's
    /// historical upstream default.
    pub fn detect_content_type(&mut self) {
        let Some(value) = self.header("content-type") else {
            self.content_type = "text/xml".to_owned();
            self.charset = "windows-1251".to_owned();
            return;
        };
        if let Ok(parsed) = value.parse::<mime::Mime>() {
            self.content_type = parsed.essence_str().to_owned();
            self.charset = parsed
                .get_param(mime::CHARSET)
                .map(|charset| charset.as_str().to_owned())
                .unwrap_or_default();
            return;
        }
        // tokenizer fallback for headers mime refuses
        let value = value.to_owned();
        self.content_type.clear();
        self.charset.clear();
        for token in value.split([' ', ';']).filter(|t| !t.is_empty()) {
            if self.content_type.is_empty() {
                let token = token.split(',').next().unwrap_or(token);
                self.content_type = token.to_owned();
            } else if let Some(charset) = token.strip_prefix("charset=") {
                self.charset = charset.to_owned();
            }
        }
    }

    /// The detected media type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The detected charset (may be empty).
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Classify the status per the block protocol: 2xx and local
    /// results pass, 304 requires a prior conditional, 4xx is an
    /// invoke error, 5xx is retryable.
    pub fn check_status(&self) -> Result<(), InvokeError> {
        let failure = if self.status >= 500 {
            Some(InvokeError::retry(format!("server responded {}", self.status)))
        } else if self.status >= 400 {
            Some(InvokeError::new(format!("server responded {}", self.status)))
        } else if self.status == 304 && !self.sent_modified_since {
            Some(InvokeError::new(
                "server responded not-modified but if-modified-since was not sent",
            ))
        } else if self.status == 0 && self.content.is_empty() {
            Some(InvokeError::new(
                "empty local content: possibly not performed",
            ))
        } else {
            None
        };
        match failure {
            Some(mut error) => {
                error.add("url", self.url.as_str());
                error.add("status", self.status.to_string());
                if !self.content_type.is_empty() {
                    error.add("content-type", self.content_type.clone());
                }
                Err(error)
            }
            None => Ok(()),
        }
    }

    /// Build the result tag from `Last-Modified` and `Expires`; a 304
    /// yields `modified = false`.
    pub fn create_tag(&self) -> Tag {
        let mut tag = Tag::new();
        if self.status == 304 {
            tag.modified = false;
        } else if self.status == 200 || self.status == 0 {
            tag.last_modified = self
                .header("last-modified")
                .and_then(|value| httpdate::parse_http_date(value).ok());
            tag.expire_time = self
                .header("expires")
                .and_then(|value| httpdate::parse_http_date(value).ok());
        }
        tag
    }

    /// Whether the captured content type is one of the XML types.
    pub fn is_xml(&self) -> bool {
        let Some((main, sub)) = self.content_type.split_once('/') else {
            return false;
        };
        if main.eq_ignore_ascii_case("text") {
            return sub.eq_ignore_ascii_case("xml")
                || sub.eq_ignore_ascii_case("xml-external-parsed-entity");
        }
        if main.eq_ignore_ascii_case("application") {
            if let Some((_, suffix)) = sub.rsplit_once('+') {
                return suffix.eq_ignore_ascii_case("xml");
            }
            return sub.eq_ignore_ascii_case("xml")
                || sub.eq_ignore_ascii_case("xml-external-parsed-entity")
                || sub.eq_ignore_ascii_case("xml-dtd");
        }
        false
    }

    /// Whether the captured content type is JSON.
    pub fn is_json(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("application/json")
    }

    /// Whether the captured content type is HTML.
    pub fn is_html(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("text/html")
    }

    /// Whether the captured content type is any other `text/*`.
    pub fn is_text(&self) -> bool {
        self.content_type
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("text/"))
    }

    /// Decode the captured body to UTF-8 using the response charset.
    pub fn content_string(&self) -> String {
        if self.charset.is_empty() || self.charset.eq_ignore_ascii_case("utf-8") {
            return String::from_utf8_lossy(&self.content).into_owned();
        }
        match encoding_rs::Encoding::for_label(self.charset.as_bytes()) {
            Some(encoding) => encoding.decode(&self.content).0.into_owned(),
            None => String::from_utf8_lossy(&self.content).into_owned(),
        }
    }
}

fn starts_ci(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn read_to_end(transport: &mut dyn Transport, buffer: &mut Vec<u8>) -> std::io::Result<()> {
    let mut chunk = [0u8; 8 * 1024];
    loop {
        let read = transport.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

fn decode_chunked(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let bad = || std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed chunked body");
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;
    loop {
        let line_end = memchr::memmem::find(rest, b"\r\n").ok_or_else(bad)?;
        let size_line = std::str::from_utf8(&rest[..line_end]).map_err(|_| bad())?;
        let size_token = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_token, 16).map_err(|_| bad())?;
        rest = &rest[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if rest.len() < size + 2 {
            return Err(bad());
        }
        out.extend_from_slice(&rest[..size]);
        if &rest[size..size + 2] != b"\r\n" {
            return Err(bad());
        }
        rest = &rest[size + 2..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_detection() {
        let mut helper = HttpHelper::new("http://u.example/x", 1000).unwrap();
        helper
            .response_headers
            .push(("content-type".into(), "text/xml; charset=koi8-r".into()));
        helper.detect_content_type();
        assert_eq!(helper.content_type(), "text/xml");
        assert_eq!(helper.charset(), "koi8-r");
        assert!(helper.is_xml());
    }

    #[test]
    fn missing_content_type_defaults() {
        let mut helper = HttpHelper::new("http://u.example/x", 1000).unwrap();
        helper.detect_content_type();
        assert_eq!(helper.content_type(), "text/xml");
        assert_eq!(helper.charset(), "windows-1251");
    }

    #[test]
    fn xml_taxonomy() {
        let cases = [
            ("text/xml", true),
            ("application/xml", true),
            ("application/xhtml+xml", true),
            ("application/xml-dtd", true),
            ("application/xml-external-parsed-entity", true),
            ("text/html", false),
            ("application/json", false),
            ("text/plain", false),
        ];
        let mut helper = HttpHelper::new("http://u.example/", 1000).unwrap();
        for (content_type, expected) in cases {
            helper.content_type = content_type.to_owned();
            assert_eq!(helper.is_xml(), expected, "{content_type}");
        }
    }

    #[test]
    fn status_classification() {
        let mut helper = HttpHelper::new("http://u.example/", 1000).unwrap();
        helper.status = 200;
        assert!(helper.check_status().is_ok());
        helper.status = 404;
        let error = helper.check_status().unwrap_err();
        assert_eq!(error.kind(), xscript_core::InvokeErrorKind::Error);
        helper.status = 503;
        let error = helper.check_status().unwrap_err();
        assert_eq!(error.kind(), xscript_core::InvokeErrorKind::Retry);
        helper.status = 304;
        assert!(helper.check_status().is_err());
        helper.sent_modified_since = true;
        assert!(helper.check_status().is_ok());
    }

    #[test]
    fn header_injection() {
        let mut helper = HttpHelper::new("http://u.example/", 1000).unwrap();
        helper.append_headers(
            &["X-One: 1".to_owned(), "Connection: keep-alive".to_owned()],
            None,
        );
        assert!(helper.headers_out.contains(&"Expect:".to_owned()));
        assert!(!helper.headers_out.contains(&"Connection: close".to_owned()));
        assert!(!helper.sent_modified_since());

        let mut helper = HttpHelper::new("http://u.example/", 1000).unwrap();
        helper.append_headers(&[], Some(SystemTime::UNIX_EPOCH));
        assert!(helper
            .headers_out
            .iter()
            .any(|h| h.starts_with("If-Modified-Since: Thu, 01 Jan 1970")));
        assert!(helper.sent_modified_since());
    }

    #[test]
    fn chunked_decoding() {
        let body = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        assert_eq!(decode_chunked(body).unwrap(), b"Wikipedia");
        assert!(decode_chunked(b"zz\r\n").is_err());
    }
}
