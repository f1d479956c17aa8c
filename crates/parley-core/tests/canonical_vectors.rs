#![allow(clippy::expect_used, clippy::unwrap_used)]

use parley_core::{canonicalize_json, Error};
use serde::Deserialize;

/// `expected: null` marks an input that must be rejected.
#[derive(Debug, Deserialize)]
struct Vector {
    name: String,
    input: serde_json::Value,
    expected: Option<String>,
}

fn vectors() -> Vec<Vector> {
    serde_json::from_str(include_str!("../../../fixtures/canonical/vectors.json")).unwrap()
}

#[test]
fn golden_vectors() {
    let vectors = vectors();
    assert!(vectors.len() >= 4);

    for v in &vectors {
        match (&v.expected, canonicalize_json(&v.input)) {
            (Some(expected), Ok(got)) => assert_eq!(&got, expected, "{}", v.name),
            (None, Err(Error::NonCanonicalNumber(_))) => {}
            (expected, got) => panic!("{}: expected {expected:?}, got {got:?}", v.name),
        }
    }
}

#[test]
fn canonical_output_is_a_fixed_point() {
    for v in vectors().iter().filter(|v| v.expected.is_some()) {
        let once = canonicalize_json(&v.input).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
        assert_eq!(canonicalize_json(&reparsed).unwrap(), once, "{}", v.name);
    }
}
