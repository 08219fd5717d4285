// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_hash_map_lookup() {
    let mut map = HashMap::new();
    let id = TestId::new();
    map.insert(id, 42);
    assert_eq!(map.get(id.as_str()), Some(&42));
}

#[test]
fn define_id_short_truncates() {
    let id = TestId::from_string("tst-abcdefghijklmnop");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn define_id_short_returns_full_when_shorter() {
    let id = TestId::from_string("tst-ab");
    assert_eq!(id.short(8), "ab");
}

#[test]
fn define_id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn define_id_from_string_roundtrips_through_display() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id.to_string(), "tst-abc123");
}

#[test]
fn define_id_new_has_stable_prefix() {
    let id = TestId::new();
    assert!(id.as_str().starts_with(TestId::PREFIX));
}

#[test]
fn define_id_eq_str() {
    let id = TestId::from_string("tst-xyz");
    assert_eq!(id, "tst-xyz");
    assert_eq!(id, "tst-xyz".to_string().as_str());
}

#[test]
fn idbuf_debug_and_empty() {
    assert!(IdBuf::empty().is_empty());
    let buf = IdBuf::new("hello");
    assert_eq!(format!("{:?}", buf), "\"hello\"");
}

#[test]
fn short_helper_truncates_by_chars() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}
