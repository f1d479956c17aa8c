//! Property-based tests for the identity codec and signatures

#![allow(clippy::expect_used, clippy::unwrap_used)]

use parley_core::{canonicalize_json, did, Keypair, Signature};
use proptest::prelude::*;

proptest! {
    /// Every valid Ed25519 key survives an encode/decode cycle unchanged
    #[test]
    fn did_round_trip(seed in any::<[u8; 32]>()) {
        let public_key = Keypair::from_seed(&seed).public_key();
        let id = did::encode(&public_key);
        prop_assert!(id.starts_with(did::DID_KEY_PREFIX));
        prop_assert_eq!(did::decode(&id).unwrap(), public_key);
    }

    /// Decoding arbitrary text never panics
    #[test]
    fn did_decode_total(input in ".*") {
        let _ = did::decode(&input);
        let _ = did::decode(&format!("{}{}", did::DID_KEY_PREFIX, input));
    }

    /// Base64 signature encoding is lossless
    #[test]
    fn signature_base64_round_trip(message in any::<Vec<u8>>()) {
        let keypair = Keypair::generate();
        let signature = keypair.sign(&message);
        let restored = Signature::from_base64(&signature.to_base64()).unwrap();
        prop_assert!(keypair.public_key().verify(&message, &restored));
    }

    /// Canonicalization does not depend on insertion order
    #[test]
    fn canonical_order_independent(
        entries in proptest::collection::btree_map("[a-z_]{1,8}", ".*", 0..8)
    ) {
        let forward: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let reversed: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        let a = canonicalize_json(&serde_json::Value::Object(forward)).unwrap();
        let b = canonicalize_json(&serde_json::Value::Object(reversed)).unwrap();
        prop_assert_eq!(&a, &b);

        // Canonical output is valid JSON that parses back to the same strings.
        let parsed: serde_json::Value = serde_json::from_str(&a).unwrap();
        for (k, v) in &entries {
            prop_assert_eq!(parsed[k].as_str(), Some(v.as_str()));
        }
    }
}
