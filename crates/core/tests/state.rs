use pretty_assertions::assert_eq;
use xscript_core::{State, TypedValue};

#[test]
fn bools() {
    let state = State::new();
    state.set_bool("true_key", true);
    assert!(state.has("true_key"));
    assert!(state.as_bool("true_key"));
    assert_eq!(state.as_longlong("true_key"), Some(1));
    assert_eq!(state.as_string("true_key"), "1");

    state.set_bool("false_key", false);
    assert!(!state.as_bool("false_key"));
    assert_eq!(state.as_longlong("false_key"), Some(0));
    assert_eq!(state.as_string("false_key"), "0");
}

#[test]
fn longs() {
    let state = State::new();
    state.set_long("long_key", 15);
    assert!(state.as_bool("long_key"));
    assert_eq!(state.as_longlong("long_key"), Some(15));
    assert_eq!(state.as_string("long_key"), "15");
}

#[test]
fn strings() {
    let state = State::new();
    state.set_string("string_key", "test");
    assert!(state.as_bool("string_key"));
    assert_eq!(state.as_string("string_key"), "test");

    state.set_string("empty_key", "");
    assert!(state.has("empty_key"));
    assert!(!state.as_bool("empty_key"));
    assert_eq!(state.as_longlong("empty_key"), Some(0));
}

#[test]
fn doubles() {
    let state = State::new();
    state.set_double("d", 2.5);
    assert_eq!(state.as_double("d"), Some(2.5));
    assert_eq!(state.as_string("d"), "2.5");
}

#[test]
fn clear_all_and_prefix() {
    let state = State::new();
    state.set_string("pref_a", "1");
    state.set_string("pref_b", "2");
    state.set_string("other", "3");
    state.erase_prefix("pref_");
    assert!(!state.has("pref_a"));
    assert!(!state.has("pref_b"));
    assert!(state.has("other"));
    state.clear();
    assert!(state.keys().is_empty());
}

#[test]
fn bad_cast_is_none() {
    let state = State::new();
    state.set_string("not_a_number", "fifteen");
    assert_eq!(state.as_longlong("not_a_number"), None);
}

#[test]
fn nonexistent_defaults() {
    let state = State::new();
    assert_eq!(state.as_string("missing"), "");
    assert_eq!(state.as_string_or("missing", "fallback"), "fallback");
    assert_eq!(state.as_longlong("missing"), Some(0));
}

#[test]
fn is_truthiness() {
    let state = State::new();
    assert!(!state.is("missing"));

    state.set_long("zero", 0);
    assert!(!state.is("zero"));

    state.set_string("empty", "");
    assert!(!state.is("empty"));

    state.set_bool("flag", false);
    assert!(!state.is("flag"));

    // the literal string "0" is truthy
    state.set_string("zero_string", "0");
    assert!(state.is("zero_string"));

    state.set_long("one", 1);
    assert!(state.is("one"));
}

#[test]
fn copy_and_values() {
    let state = State::new();
    state.set_string("src", "payload");
    state.copy("src", "dest");
    assert_eq!(state.as_string("dest"), "payload");

    state.set(
        "typed",
        TypedValue::Array(vec![TypedValue::I32(1), TypedValue::I32(2)]),
    );
    assert_eq!(state.typed_value("typed").as_string(), "1,2");

    let keys = state.keys();
    assert_eq!(keys, vec!["dest", "src", "typed"]);
}

#[test]
fn concurrent_writes_are_visible() {
    use std::sync::Arc;
    let state = Arc::new(State::new());
    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let state = state.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                state.set_long(&format!("t{thread_id}_{i}"), i);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(state.keys().len(), 400);
}
