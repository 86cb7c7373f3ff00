//! Per-request typed key/value state.

use crate::{TypedMap, TypedValue};
use parking_lot::Mutex;

/// A thread-safe [`TypedMap`] scoped to one request.
///
/// Any write is visible to subsequent reads in program order;
/// concurrent reads are safe. Blocks communicate through it and guards
/// read it.
#[derive(Debug, Default)]
pub struct State {
    data: Mutex<TypedMap>,
}

impl State {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Remove one entry.
    pub fn erase(&self, key: &str) {
        self.data.lock().erase(key);
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn erase_prefix(&self, prefix: &str) {
        self.data.lock().erase_prefix(prefix);
    }

    /// Store a boolean.
    pub fn set_bool(&self, name: &str, value: bool) {
        self.data.lock().set(name, TypedValue::Bool(value));
    }

    /// Truthiness of an entry.
    pub fn as_bool(&self, name: &str) -> bool {
        self.data.lock().as_bool(name)
    }

    /// Store a 32-bit integer.
    pub fn set_long(&self, name: &str, value: i32) {
        self.data.lock().set(name, TypedValue::I32(value));
    }

    /// Store a 64-bit integer.
    pub fn set_longlong(&self, name: &str, value: i64) {
        self.data.lock().set(name, TypedValue::I64(value));
    }

    /// Numeric value of an entry; `None` when unparseable.
    pub fn as_longlong(&self, name: &str) -> Option<i64> {
        self.data.lock().as_i64(name)
    }

    /// Store a float.
    pub fn set_double(&self, name: &str, value: f64) {
        self.data.lock().set(name, TypedValue::F64(value));
    }

    /// Float value of an entry; `None` when unparseable.
    pub fn as_double(&self, name: &str) -> Option<f64> {
        self.data.lock().as_f64(name)
    }

    /// Store a string.
    pub fn set_string(&self, name: &str, value: impl Into<String>) {
        self.data.lock().set(name, TypedValue::String(value.into()));
    }

    /// Canonical textual form of an entry; empty when missing.
    pub fn as_string(&self, name: &str) -> String {
        self.data.lock().as_string(name)
    }

    /// Textual form with a fallback for missing entries.
    pub fn as_string_or(&self, name: &str, default: &str) -> String {
        self.data.lock().as_string_or(name, default)
    }

    /// Store an arbitrary typed value.
    pub fn set(&self, name: &str, value: TypedValue) {
        self.data.lock().set(name, value);
    }

    /// The stored value, or [`TypedValue::Nil`] when absent.
    pub fn typed_value(&self, name: &str) -> TypedValue {
        self.data.lock().find(name).clone()
    }

    /// Whether an entry exists.
    pub fn has(&self, name: &str) -> bool {
        self.data.lock().has(name)
    }

    /// All keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.data.lock().keys()
    }

    /// Snapshot of all entries, in key order.
    pub fn values(&self) -> Vec<(String, TypedValue)> {
        self.data
            .lock()
            .iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect()
    }

    /// Copy the value of `src` to `dest`.
    pub fn copy(&self, src: &str, dest: &str) {
        let mut data = self.data.lock();
        let value = data.find(src).clone();
        data.set(dest, value);
    }

    /// The guard truthiness test: false for missing keys, numeric
    /// zero, empty string and boolean false; true otherwise. The
    /// string `"0"` is truthy.
    pub fn is(&self, name: &str) -> bool {
        self.data.lock().is(name)
    }
}
