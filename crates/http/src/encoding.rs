//! Legacy-encoding recovery.
//!
//! Inbound header, cookie and argument values are required to be UTF-8.
//! Values that fail validation are assumed to be in a configured legacy
//! encoding (cp1251 by default, matching the engine's historical
//! deployment base) and re-decoded from it.

use encoding_rs::Encoding;

/// Converts byte strings of unknown provenance into valid UTF-8.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    legacy: &'static Encoding,
}

impl Encoder {
    /// An encoder recovering from the given legacy encoding label
    /// (`"cp1251"`, `"latin1"`, ...). `None` for unknown labels.
    pub fn new(label: &str) -> Option<Self> {
        Encoding::for_label(label.as_bytes()).map(|legacy| Self { legacy })
    }

    /// The historical default: windows-1251.
    pub fn cp1251() -> Self {
        Self {
            legacy: encoding_rs::WINDOWS_1251,
        }
    }

    /// The name of the legacy encoding.
    pub fn legacy_name(&self) -> &'static str {
        self.legacy.name()
    }

    /// Return `bytes` as a `String`, re-decoding from the legacy
    /// encoding when it is not valid UTF-8.
    pub fn recover(&self, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_owned(),
            Err(_) => {
                let (decoded, _, _) = self.legacy.decode(bytes);
                decoded.into_owned()
            }
        }
    }

    /// Encode a UTF-8 string into the legacy encoding. Characters with
    /// no mapping are replaced by `&#N;` numeric references.
    pub fn encode_to_legacy(&self, s: &str) -> Vec<u8> {
        let (encoded, _, _) = self.legacy.encode(s);
        encoded.into_owned()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::cp1251()
    }
}
