//! Property-based tests for cache key serialization.
//!
//! - Determinism: the same segments always serialize to the same string
//! - Injectivity: different segment lists never share a serialized form

use proptest::prelude::*;
use quire::cache::{CacheKey, KeySegment};

/// Strings biased towards the separator and escape characters.
fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9:=-]{0,8}".prop_map(String::from),
        "[:\\\\sn0-9]{0,6}".prop_map(String::from),
        Just(String::new()),
        Just(":".to_string()),
        Just("\\".to_string()),
    ]
}

fn segment_strategy() -> impl Strategy<Value = KeySegment> {
    prop_oneof![
        text_strategy().prop_map(KeySegment::Str),
        any::<i64>().prop_map(KeySegment::Num),
        (-3i64..3).prop_map(KeySegment::Num),
    ]
}

fn key_strategy() -> impl Strategy<Value = CacheKey> {
    prop::collection::vec(segment_strategy(), 1..=6)
        .prop_map(|segments| CacheKey::new(segments).expect("non-empty segments"))
}

proptest! {
    #[test]
    fn serialization_is_deterministic(key in key_strategy()) {
        let rebuilt = CacheKey::new(key.segments().to_vec()).expect("non-empty segments");
        prop_assert_eq!(key.serialize(), rebuilt.serialize());
    }

    #[test]
    fn distinct_keys_serialize_distinctly(a in key_strategy(), b in key_strategy()) {
        prop_assume!(a != b);
        prop_assert_ne!(a.serialize(), b.serialize());
    }

    #[test]
    fn numeric_and_text_segments_never_collide(n in any::<i64>()) {
        let numeric = CacheKey::new(vec![KeySegment::Num(n)]).expect("non-empty");
        let textual = CacheKey::new(vec![KeySegment::Str(n.to_string())]).expect("non-empty");
        prop_assert_ne!(numeric.serialize(), textual.serialize());
    }

    #[test]
    fn separator_inside_text_does_not_split_segments(left in text_strategy(), right in text_strategy()) {
        let joined = CacheKey::new(vec![KeySegment::Str(format!("{left}:{right}"))]).expect("non-empty");
        let split = CacheKey::new(vec![
            KeySegment::Str(left),
            KeySegment::Str(right),
        ])
        .expect("non-empty");
        prop_assert_ne!(joined.serialize(), split.serialize());
    }
}

#[test]
fn empty_key_is_rejected() {
    assert!(CacheKey::new(Vec::new()).is_err());
}
