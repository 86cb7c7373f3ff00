//! The buffered, single-shot response.
//!
//! Headers, cookies and status are mutable until the first body byte is
//! produced; after that the headers-sent latch is set and any further
//! header mutation fails. The body is either buffered in memory or
//! handed to a deferred [`BinaryWriter`] (the detached mode used for
//! binary pass-through).

use crate::{reason_phrase, Cookie, Error, HeaderName, Headers, KnownHeaderName};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;

/// Deferred body writer, used when the body is produced outside the
/// response buffer (e.g. proxied binary content).
pub trait BinaryWriter: Send {
    /// Body size in bytes, for the `Content-Length` header.
    fn size(&self) -> usize;
    /// Emit the body into `out`.
    fn write_body(&self, out: &mut dyn Write) -> std::io::Result<()>;
}

#[derive(Default)]
struct Inner {
    status: u16,
    headers: Headers,
    cookies: BTreeMap<String, Cookie>,
    headers_sent: bool,
    body: Vec<u8>,
    writer: Option<Box<dyn BinaryWriter>>,
}

/// The response under construction for one request.
///
/// All methods take `&self`; the response is shared between the request
/// thread and stylesheet extension functions.
#[derive(Default)]
pub struct Response {
    inner: Mutex<Inner>,
    // write_mutex serializes body emission; always acquired after inner
    write_mutex: Mutex<()>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Response")
            .field("status", &inner.status)
            .field("headers", &inner.headers)
            .field("headers_sent", &inner.headers_sent)
            .field("body_len", &inner.body.len())
            .finish()
    }
}

impl Response {
    /// A fresh response with status 200 and no headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current status code (200 when unset).
    pub fn status(&self) -> u16 {
        let inner = self.inner.lock();
        if inner.status == 0 {
            200
        } else {
            inner.status
        }
    }

    /// Set the status code. Fails once headers are sent.
    pub fn set_status(&self, status: u16) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.headers_sent {
            return Err(Error::HeadersSent);
        }
        inner.status = status;
        Ok(())
    }

    /// Set a header, replacing previous values. A CR or LF in the value
    /// truncates it at the first occurrence. Fails once headers are
    /// sent.
    pub fn set_header(
        &self,
        name: impl Into<HeaderName>,
        value: impl Into<String>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.headers_sent {
            return Err(Error::HeadersSent);
        }
        let mut value = value.into();
        if let Some(pos) = value.find(['\r', '\n']) {
            value.truncate(pos);
        }
        inner.headers.insert(name, value);
        Ok(())
    }

    /// A previously set header value.
    pub fn header(&self, name: impl Into<HeaderName>) -> Option<String> {
        self.inner.lock().headers.get(name).map(str::to_owned)
    }

    /// Snapshot of the current header map.
    pub fn headers(&self) -> Headers {
        self.inner.lock().headers.clone()
    }

    /// Add (or replace, by name) a cookie. Fails once headers are sent.
    pub fn add_cookie(&self, cookie: Cookie) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.headers_sent {
            return Err(Error::HeadersSent);
        }
        inner.cookies.insert(cookie.name().to_owned(), cookie);
        Ok(())
    }

    /// Status 302 plus a `Location` header.
    pub fn redirect(&self, location: &str) -> Result<(), Error> {
        self.set_status(302)?;
        self.set_header(KnownHeaderName::Location, location)
    }

    /// Whether the headers-sent latch has been set.
    pub fn headers_sent(&self) -> bool {
        self.inner.lock().headers_sent
    }

    /// Append body bytes, latching the headers.
    pub fn write(&self, data: &[u8]) -> Result<usize, Error> {
        let mut inner = self.inner.lock();
        if inner.writer.is_some() {
            return Err(Error::Detached);
        }
        inner.headers_sent = true;
        let _write_guard = self.write_mutex.lock();
        inner.body.extend_from_slice(data);
        Ok(data.len())
    }

    /// Detach the body to a deferred writer, latching the headers.
    ///
    /// Only one of `write` and `detach` may be used per response.
    pub fn detach(&self, writer: Box<dyn BinaryWriter>) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.headers_sent || inner.writer.is_some() {
            return Err(Error::Detached);
        }
        inner.headers_sent = true;
        inner.writer = Some(writer);
        Ok(())
    }

    /// Replace the response with an error page. Resets any buffered
    /// body; a no-op if headers are already sent.
    pub fn send_error(&self, status: u16, message: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.headers_sent {
            return Err(Error::HeadersSent);
        }
        inner.status = status;
        inner.headers = Headers::new();
        inner
            .headers
            .insert(KnownHeaderName::ContentType, "text/html");
        inner.body.clear();
        inner.body.extend_from_slice(
            format!(
                "<html><body><h1>{} {}</h1>{}</body></html>",
                status,
                reason_phrase(status),
                message
            )
            .as_bytes(),
        );
        inner.headers_sent = true;
        Ok(())
    }

    /// The buffered body, for inspection.
    pub fn body(&self) -> Vec<u8> {
        self.inner.lock().body.clone()
    }

    /// Serialize the full wire form: a synthetic `Status` header line,
    /// the header map, `Set-Cookie` lines in cookie-name order, a blank
    /// line, then the body.
    pub fn serialize(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let mut inner = self.inner.lock();
        inner.headers_sent = true;

        let status = if inner.status == 0 { 200 } else { inner.status };
        write!(out, "Status: {} {}\r\n", status, reason_phrase(status))?;

        let body_size = match &inner.writer {
            Some(writer) => writer.size(),
            None => inner.body.len(),
        };
        if !inner.headers.has(KnownHeaderName::ContentLength) {
            write!(out, "Content-Length: {body_size}\r\n")?;
        }
        write!(out, "{}", inner.headers)?;
        for cookie in inner.cookies.values() {
            write!(out, "Set-Cookie: {cookie}\r\n")?;
        }
        write!(out, "\r\n")?;

        let _write_guard = self.write_mutex.lock();
        match &inner.writer {
            Some(writer) => writer.write_body(out),
            None => out.write_all(&inner.body),
        }
    }
}
