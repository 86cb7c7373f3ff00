//! Case-insensitive header map.
//!
//! Header names the engine consults are represented as a
//! [`KnownHeaderName`] variant so lookups skip string hashing entirely;
//! everything else is kept under its lowercase form. Iteration order is
//! known headers (sorted) followed by unknown headers.

use hashbrown::HashMap;
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

macro_rules! known_headers {
    ( $( ($capitalized:literal, $variant:ident) ),+ $(,)? ) => {
        /// Headers the engine itself reads or writes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[non_exhaustive]
        pub enum KnownHeaderName {
            $(
                #[doc = concat!("The `", $capitalized, "` header.")]
                $variant,
            )+
        }

        impl AsRef<str> for KnownHeaderName {
            fn as_ref(&self) -> &str {
                match self {
                    $( Self::$variant => $capitalized, )+
                }
            }
        }

        impl FromStr for KnownHeaderName {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($capitalized) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(())
            }
        }
    };
}

known_headers! {
    ("Accept", Accept),
    ("Accept-Encoding", AcceptEncoding),
    ("Authorization", Authorization),
    ("Cache-Control", CacheControl),
    ("Connection", Connection),
    ("Content-Encoding", ContentEncoding),
    ("Content-Length", ContentLength),
    ("Content-Type", ContentType),
    ("Cookie", Cookie),
    ("Date", Date),
    ("Expect", Expect),
    ("Expires", Expires),
    ("Host", Host),
    ("If-Modified-Since", IfModifiedSince),
    ("Keep-Alive", KeepAlive),
    ("Last-Modified", LastModified),
    ("Location", Location),
    ("Pragma", Pragma),
    ("Referer", Referer),
    ("Server", Server),
    ("Set-Cookie", SetCookie),
    ("Status", Status),
    ("Transfer-Encoding", TransferEncoding),
    ("User-Agent", UserAgent),
    ("Via", Via),
    ("X-Forwarded-For", XForwardedFor),
    ("X-Real-IP", XRealIp),
}

impl Display for KnownHeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The name of a header: a [`KnownHeaderName`] or the lowercase form of
/// anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderName {
    /// A header the engine knows about.
    Known(KnownHeaderName),
    /// Any other header, stored lowercase.
    Unknown(String),
}

impl HeaderName {
    /// Canonical display form: the known capitalization, or each
    /// `-`-separated component capitalized.
    pub fn display_name(&self) -> String {
        match self {
            Self::Known(k) => k.as_ref().to_owned(),
            Self::Unknown(s) => crate::normalize_output_header_name(s),
        }
    }

    /// The lowercase form used for comparisons.
    pub fn lower_name(&self) -> String {
        match self {
            Self::Known(k) => k.as_ref().to_ascii_lowercase(),
            Self::Unknown(s) => s.clone(),
        }
    }
}

impl From<KnownHeaderName> for HeaderName {
    fn from(k: KnownHeaderName) -> Self {
        Self::Known(k)
    }
}

impl From<&str> for HeaderName {
    fn from(s: &str) -> Self {
        match s.parse::<KnownHeaderName>() {
            Ok(known) => Self::Known(known),
            Err(()) => Self::Unknown(s.to_ascii_lowercase()),
        }
    }
}

impl From<String> for HeaderName {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// One or several values for a single header name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderValues(SmallVec<[String; 1]>);

impl HeaderValues {
    /// The first value, if any.
    pub fn one(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Append another value.
    pub fn append(&mut self, value: String) {
        self.0.push(value);
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no values are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<String> for HeaderValues {
    fn from(value: String) -> Self {
        Self(smallvec![value])
    }
}

impl From<&str> for HeaderValues {
    fn from(value: &str) -> Self {
        Self(smallvec![value.to_owned()])
    }
}

/// The header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct Headers {
    known: BTreeMap<KnownHeaderName, HeaderValues>,
    unknown: HashMap<String, HeaderValues>,
}

impl Headers {
    /// An empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of distinct header names.
    pub fn len(&self) -> usize {
        self.known.len() + self.unknown.len()
    }

    /// True when the map holds no headers.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unknown.is_empty()
    }

    /// Append `value` under `name`, keeping existing values.
    pub fn append(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        let value = value.into();
        match name.into() {
            HeaderName::Known(k) => self.known.entry(k).or_default().append(value),
            HeaderName::Unknown(n) => self.unknown.entry(n).or_default().append(value),
        }
    }

    /// Replace any existing values of `name` with `value`.
    pub fn insert(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        let values = HeaderValues::from(value.into());
        match name.into() {
            HeaderName::Known(k) => {
                self.known.insert(k, values);
            }
            HeaderName::Unknown(n) => {
                self.unknown.insert(n, values);
            }
        }
    }

    /// The first value stored under `name`.
    pub fn get(&self, name: impl Into<HeaderName>) -> Option<&str> {
        self.get_values(name).and_then(HeaderValues::one)
    }

    /// All values stored under `name`.
    pub fn get_values(&self, name: impl Into<HeaderName>) -> Option<&HeaderValues> {
        match name.into() {
            HeaderName::Known(k) => self.known.get(&k),
            HeaderName::Unknown(n) => self.unknown.get(&n),
        }
    }

    /// Whether any value is stored under `name`.
    pub fn has(&self, name: impl Into<HeaderName>) -> bool {
        self.get_values(name).is_some()
    }

    /// Remove and return the values stored under `name`.
    pub fn remove(&mut self, name: impl Into<HeaderName>) -> Option<HeaderValues> {
        match name.into() {
            HeaderName::Known(k) => self.known.remove(&k),
            HeaderName::Unknown(n) => self.unknown.remove(&n),
        }
    }

    /// Iterate over `(name, values)` pairs, known names first.
    pub fn iter(&self) -> impl Iterator<Item = (HeaderName, &HeaderValues)> {
        self.known
            .iter()
            .map(|(k, v)| (HeaderName::Known(*k), v))
            .chain(
                self.unknown
                    .iter()
                    .map(|(n, v)| (HeaderName::Unknown(n.clone()), v)),
            )
    }

    /// All header names in display form.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|(name, _)| name.display_name()).collect()
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (name, values) in self.iter() {
            for value in values.iter() {
                write!(f, "{name}: {value}\r\n")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("content-type", "text/xml");
        assert_eq!(headers.get(KnownHeaderName::ContentType), Some("text/xml"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/xml"));
    }

    #[test]
    fn unknown_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("X-Custom-Thing", "1");
        assert_eq!(headers.get("x-custom-thing"), Some("1"));
        assert_eq!(
            HeaderName::from("x-custom-thing").display_name(),
            "X-Custom-Thing"
        );
    }

    #[test]
    fn append_accumulates() {
        let mut headers = Headers::new();
        headers.append(KnownHeaderName::SetCookie, "a=1");
        headers.append(KnownHeaderName::SetCookie, "b=2");
        let values = headers.get_values(KnownHeaderName::SetCookie).unwrap();
        assert_eq!(values.iter().collect::<Vec<_>>(), vec!["a=1", "b=2"]);
    }

    #[test]
    fn display_emits_crlf_lines() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::ContentType, "text/xml");
        assert_eq!(headers.to_string(), "Content-Type: text/xml\r\n");
    }
}
