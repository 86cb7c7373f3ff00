//! Ordered string→value mapping.

use crate::TypedValue;
use std::collections::BTreeMap;

/// An ordered map of [`TypedValue`]s with typed accessors and prefix
/// erase. Key comparison is exact; iteration is in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedMap {
    values: BTreeMap<String, TypedValue>,
}

impl TypedMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Remove one entry.
    pub fn erase(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn erase_prefix(&mut self, prefix: &str) {
        self.values.retain(|key, _| !key.starts_with(prefix));
    }

    /// Insert or replace an entry.
    pub fn set(&mut self, name: impl Into<String>, value: TypedValue) {
        self.values.insert(name.into(), value);
    }

    /// The stored value, or [`TypedValue::Nil`] when absent.
    pub fn find(&self, name: &str) -> &TypedValue {
        static NIL: TypedValue = TypedValue::Nil;
        self.values.get(name).unwrap_or(&NIL)
    }

    /// Whether an entry exists under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical textual form of an entry; empty for missing entries.
    pub fn as_string(&self, name: &str) -> String {
        self.find(name).as_string()
    }

    /// Textual form with a fallback for missing entries.
    pub fn as_string_or(&self, name: &str, default: &str) -> String {
        if self.has(name) {
            self.as_string(name)
        } else {
            default.to_owned()
        }
    }

    /// Truthiness of an entry (missing entries are false).
    pub fn as_bool(&self, name: &str) -> bool {
        self.find(name).as_bool()
    }

    /// Numeric value of an entry; missing or empty entries are 0,
    /// unparseable ones `None`.
    pub fn as_i64(&self, name: &str) -> Option<i64> {
        match self.find(name) {
            TypedValue::Nil => Some(0),
            TypedValue::Bool(b) => Some(i64::from(*b)),
            TypedValue::I32(n) => Some(i64::from(*n)),
            TypedValue::U32(n) => Some(i64::from(*n)),
            TypedValue::I64(n) => Some(*n),
            TypedValue::U64(n) => i64::try_from(*n).ok(),
            TypedValue::F64(n) => Some(*n as i64),
            TypedValue::String(s) if s.is_empty() => Some(0),
            TypedValue::String(s) => s.parse().ok(),
            TypedValue::Array(_) | TypedValue::Map(_) => None,
        }
    }

    /// Float value of an entry, with the same conventions as
    /// [`TypedMap::as_i64`].
    pub fn as_f64(&self, name: &str) -> Option<f64> {
        match self.find(name) {
            TypedValue::Nil => Some(0.0),
            TypedValue::F64(n) => Some(*n),
            TypedValue::String(s) if s.is_empty() => Some(0.0),
            TypedValue::String(s) => s.parse().ok(),
            other => other.as_string().parse().ok().or(Some(0.0)),
        }
    }

    /// Truthiness test used by guards: false for missing entries,
    /// otherwise the value's own truthiness.
    pub fn is(&self, name: &str) -> bool {
        self.values.get(name).map_or(false, TypedValue::as_bool)
    }

    /// Entries whose key starts with `prefix`.
    pub fn values_with_prefix(&self, prefix: &str) -> Vec<(String, TypedValue)> {
        self.values
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_iteration() {
        let mut map = TypedMap::new();
        map.set("b", TypedValue::I32(2));
        map.set("a", TypedValue::I32(1));
        assert_eq!(map.keys(), vec!["a", "b"]);
    }

    #[test]
    fn prefix_erase() {
        let mut map = TypedMap::new();
        map.set("pref_one", TypedValue::I32(1));
        map.set("pref_two", TypedValue::I32(2));
        map.set("other", TypedValue::I32(3));
        map.erase_prefix("pref_");
        assert_eq!(map.keys(), vec!["other"]);
    }

    #[test]
    fn numeric_conversions() {
        let mut map = TypedMap::new();
        map.set("n", TypedValue::from("15"));
        map.set("bad", TypedValue::from("abc"));
        assert_eq!(map.as_i64("n"), Some(15));
        assert_eq!(map.as_i64("missing"), Some(0));
        assert_eq!(map.as_i64("bad"), None);
    }
}
