//! `did:key` identity codec for Ed25519 public keys.
//!
//! An identifier is `did:key:z` followed by the base58btc encoding of the
//! two-byte Ed25519 multicodec tag (`0xed 0x01`) and the 32 raw key bytes.
//! Identifiers are self-describing: a verifier can recover the public key
//! without any lookup.

use crate::error::{Error, Result};
use crate::signing::PublicKey;

/// Prefix of every Ed25519 `did:key` identifier (`z` is the base58btc multibase tag).
pub const DID_KEY_PREFIX: &str = "did:key:z";

/// Multicodec varint for an Ed25519 public key.
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

const KEY_LEN: usize = 32;

/// Encode raw public key bytes as a `did:key` identifier.
pub fn encode_raw(key: &[u8; KEY_LEN]) -> String {
    let mut tagged = Vec::with_capacity(ED25519_MULTICODEC.len() + KEY_LEN);
    tagged.extend_from_slice(&ED25519_MULTICODEC);
    tagged.extend_from_slice(key);
    format!("{DID_KEY_PREFIX}{}", bs58::encode(tagged).into_string())
}

/// Encode a public key as a `did:key` identifier.
///
/// # Examples
///
/// ```rust
/// use parley_core::{did, Keypair};
///
/// let keypair = Keypair::from_seed(&[7u8; 32]);
/// let id = did::encode(&keypair.public_key());
/// assert!(id.starts_with("did:key:z6Mk"));
/// assert_eq!(did::decode(&id).unwrap(), keypair.public_key());
/// ```
pub fn encode(public_key: &PublicKey) -> String {
    encode_raw(public_key.as_bytes())
}

/// Decode a `did:key` identifier into raw key bytes without curve validation.
pub fn decode_raw(did: &str) -> Result<[u8; KEY_LEN]> {
    let payload = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| Error::InvalidDid(format!("missing {DID_KEY_PREFIX} prefix")))?;

    let bytes = bs58::decode(payload)
        .into_vec()
        .map_err(|e| Error::InvalidDid(format!("invalid base58 payload: {e}")))?;

    let expected = ED25519_MULTICODEC.len() + KEY_LEN;
    if bytes.len() != expected {
        return Err(Error::InvalidDid(format!(
            "decoded length {} (expected {expected})",
            bytes.len()
        )));
    }

    let (tag, key) = bytes.split_at(ED25519_MULTICODEC.len());
    if tag != ED25519_MULTICODEC {
        return Err(Error::InvalidDid(format!(
            "unexpected multicodec tag 0x{}",
            hex::encode(tag)
        )));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(key);
    Ok(out)
}

/// Decode a `did:key` identifier into a verified Ed25519 public key.
pub fn decode(did: &str) -> Result<PublicKey> {
    let raw = decode_raw(did)?;
    PublicKey::from_bytes(&raw)
}

/// Whether `id` has the shape of an Ed25519 `did:key` (prefix only; the payload is not decoded).
pub fn is_did_key(id: &str) -> bool {
    id.len() > DID_KEY_PREFIX.len() && id.starts_with(DID_KEY_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Keypair;

    #[test]
    fn known_vector_prefix() {
        // Every Ed25519 did:key starts with z6Mk because of the 0xed01 tag.
        for seed in [[0u8; 32], [1u8; 32], [0xffu8; 32]] {
            let kp = Keypair::from_seed(&seed);
            assert!(encode(&kp.public_key()).starts_with("did:key:z6Mk"));
        }
    }

    #[test]
    fn round_trip() {
        let kp = Keypair::generate();
        let did = encode(&kp.public_key());
        assert_eq!(decode(&did).unwrap(), kp.public_key());
    }

    #[test]
    fn rejects_wrong_prefix() {
        let kp = Keypair::generate();
        let did = encode(&kp.public_key());
        let wrong = did.replace("did:key:", "did:web:");
        let err = decode(&wrong).unwrap_err().to_string();
        assert!(err.contains("prefix"), "{err}");
    }

    #[test]
    fn rejects_invalid_base58() {
        // '0', 'O', 'I' and 'l' are not in the base58btc alphabet.
        let err = decode("did:key:z0OIl").unwrap_err().to_string();
        assert!(err.contains("base58"), "{err}");
    }

    #[test]
    fn rejects_wrong_length() {
        let short = format!(
            "{DID_KEY_PREFIX}{}",
            bs58::encode([0xed, 0x01, 1, 2, 3]).into_string()
        );
        let err = decode(&short).unwrap_err().to_string();
        assert!(err.contains("length"), "{err}");
    }

    #[test]
    fn rejects_wrong_tag() {
        let mut tagged = vec![0xe7, 0x01];
        tagged.extend_from_slice(Keypair::generate().public_key().as_bytes());
        let secp = format!("{DID_KEY_PREFIX}{}", bs58::encode(tagged).into_string());
        let err = decode(&secp).unwrap_err().to_string();
        assert!(err.contains("tag"), "{err}");
    }

    #[test]
    fn is_did_key_checks_shape_only() {
        assert!(is_did_key("did:key:z6MkNotReallyValid"));
        assert!(!is_did_key("did:key:z"));
        assert!(!is_did_key("acme/alice"));
        assert!(!is_did_key("did:web:example.com"));
    }
}
