//! Sum-typed values.

use std::fmt::{self, Display, Formatter};

/// A dynamically typed value as carried by [`State`](crate::State),
/// block arguments and cache metadata.
///
/// Every value has a canonical textual form and a self-describing
/// binary encoding (little-endian, length-prefixed) used by the cache
/// entry format.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypedValue {
    /// No value.
    #[default]
    Nil,
    /// A boolean; canonical form `"1"`/`"0"`.
    Bool(bool),
    /// A 32-bit signed integer.
    I32(i32),
    /// A 32-bit unsigned integer.
    U32(u32),
    /// A 64-bit signed integer.
    I64(i64),
    /// A 64-bit unsigned integer.
    U64(u64),
    /// A double-precision float.
    F64(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list of values.
    Array(Vec<TypedValue>),
    /// An ordered list of named values.
    Map(Vec<(String, TypedValue)>),
}

const TAG_NIL: u16 = 0;
const TAG_BOOL: u16 = 1;
const TAG_I32: u16 = 1 << 1;
const TAG_U32: u16 = 1 << 2;
const TAG_I64: u16 = 1 << 3;
const TAG_U64: u16 = 1 << 4;
const TAG_F64: u16 = 1 << 5;
const TAG_STRING: u16 = 1 << 6;
const TAG_ARRAY: u16 = 1 << 7;
const TAG_MAP: u16 = 1 << 8;

impl TypedValue {
    /// The human-readable type name (`"String"`, `"Long"`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Bool(_) => "Boolean",
            Self::I32(_) => "Long",
            Self::U32(_) => "ULong",
            Self::I64(_) => "LongLong",
            Self::U64(_) => "ULongLong",
            Self::F64(_) => "Double",
            Self::String(_) => "String",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
        }
    }

    /// True for [`TypedValue::Nil`].
    pub fn nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// The canonical textual form.
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    /// Truthiness: false for nil, false, numeric zero and the empty or
    /// whitespace string. Any non-empty string is true, including
    /// `"0"`.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::I32(n) => *n != 0,
            Self::U32(n) => *n != 0,
            Self::I64(n) => *n != 0,
            Self::U64(n) => *n != 0,
            Self::F64(n) => n.abs() > f64::EPSILON,
            Self::String(s) => !s.trim().is_empty(),
            Self::Array(_) | Self::Map(_) => true,
        }
    }

    /// Append the binary encoding to `out`.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tag().to_le_bytes());
        match self {
            Self::Array(items) => {
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for item in items {
                    item.serialize(out);
                }
            }
            Self::Map(entries) => {
                out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for (key, value) in entries {
                    write_bytes(out, key.as_bytes());
                    value.serialize(out);
                }
            }
            _ => {
                let text = self.to_string();
                write_bytes(out, text.as_bytes());
            }
        }
    }

    /// Decode one value from the front of `data`, returning the value
    /// and the remaining bytes.
    pub fn deserialize(data: &[u8]) -> Option<(Self, &[u8])> {
        let (tag_bytes, rest) = split_at(data, 2)?;
        let tag = u16::from_le_bytes([tag_bytes[0], tag_bytes[1]]);
        match tag {
            TAG_ARRAY => {
                let (count, mut rest) = read_count(rest)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let (item, tail) = Self::deserialize(rest)?;
                    items.push(item);
                    rest = tail;
                }
                Some((Self::Array(items), rest))
            }
            TAG_MAP => {
                let (count, mut rest) = read_count(rest)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let (key, tail) = read_bytes(rest)?;
                    let key = String::from_utf8(key.to_vec()).ok()?;
                    let (value, tail) = Self::deserialize(tail)?;
                    entries.push((key, value));
                    rest = tail;
                }
                Some((Self::Map(entries), rest))
            }
            _ => {
                let (bytes, rest) = read_bytes(rest)?;
                let text = std::str::from_utf8(bytes).ok()?;
                let value = match tag {
                    TAG_NIL => Self::Nil,
                    TAG_BOOL => Self::Bool(text == "1"),
                    TAG_I32 => Self::I32(text.parse().ok()?),
                    TAG_U32 => Self::U32(text.parse().ok()?),
                    TAG_I64 => Self::I64(text.parse().ok()?),
                    TAG_U64 => Self::U64(text.parse().ok()?),
                    TAG_F64 => Self::F64(text.parse().ok()?),
                    TAG_STRING => Self::String(text.to_owned()),
                    _ => return None,
                };
                Some((value, rest))
            }
        }
    }

    fn tag(&self) -> u16 {
        match self {
            Self::Nil => TAG_NIL,
            Self::Bool(_) => TAG_BOOL,
            Self::I32(_) => TAG_I32,
            Self::U32(_) => TAG_U32,
            Self::I64(_) => TAG_I64,
            Self::U64(_) => TAG_U64,
            Self::F64(_) => TAG_F64,
            Self::String(_) => TAG_STRING,
            Self::Array(_) => TAG_ARRAY,
            Self::Map(_) => TAG_MAP,
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn split_at(data: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if data.len() < n {
        None
    } else {
        Some(data.split_at(n))
    }
}

fn read_count(data: &[u8]) -> Option<(usize, &[u8])> {
    let (bytes, rest) = split_at(data, 4)?;
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Some((count as usize, rest))
}

fn read_bytes(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let (count, rest) = read_count(data)?;
    split_at(rest, count)
}

impl Display for TypedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => Ok(()),
            Self::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Self::I32(n) => write!(f, "{n}"),
            Self::U32(n) => write!(f, "{n}"),
            Self::I64(n) => write!(f, "{n}"),
            Self::U64(n) => write!(f, "{n}"),
            Self::F64(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(entries) => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for TypedValue {
    fn from(n: i32) -> Self {
        Self::I32(n)
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        Self::I64(n)
    }
}

impl From<f64> for TypedValue {
    fn from(n: f64) -> Self {
        Self::F64(n)
    }
}
