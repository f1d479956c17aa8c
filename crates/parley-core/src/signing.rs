//! Ed25519 signing and verification

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use ed25519_dalek::{
    Signature as DalekSignature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::did;
use crate::error::{Error, Result};

/// Anything that can sign on behalf of an agent identity.
///
/// `Keypair` is the self-custody implementation; a custodian signing on an
/// agent's behalf implements the same surface.
pub trait Signer {
    fn public_key(&self) -> PublicKey;
    fn sign(&self, message: &[u8]) -> Result<Signature>;

    /// The `did:key` identifier of the signing key.
    fn did(&self) -> String {
        did::encode(&self.public_key())
    }
}

/// Ed25519 keypair for signing
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("did", &self.did())
            .finish_non_exhaustive()
    }
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from raw seed bytes (32 bytes)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Create from a hex-encoded seed, with or without a `0x` prefix.
    pub fn from_hex(hex_seed: &str) -> Result<Self> {
        let hex_seed = hex_seed.trim();
        let hex_seed = hex_seed.strip_prefix("0x").unwrap_or(hex_seed);
        let bytes = hex::decode(hex_seed).map_err(|e| Error::InvalidHex(e.to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Sign a message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use parley_core::Keypair;
    ///
    /// let keypair = Keypair::generate();
    /// let signature = keypair.sign(b"hello");
    /// assert!(keypair.public_key().verify(b"hello", &signature));
    /// ```
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.signing_key.sign(message),
        }
    }

    /// `did:key` identifier for this keypair's public key.
    pub fn did(&self) -> String {
        did::encode(&self.public_key())
    }

    /// Export seed as hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Signer for Keypair {
    fn public_key(&self) -> PublicKey {
        Keypair::public_key(self)
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(Keypair::sign(self, message))
    }
}

/// Ed25519 public key, serialized as its `did:key` identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Create from raw bytes; rejects encodings that are not valid curve points.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        Ok(Self { verifying_key })
    }

    pub fn from_did(did_key: &str) -> Result<Self> {
        did::decode(did_key)
    }

    pub fn to_did(&self) -> String {
        did::encode(self)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.verifying_key.verify(message, &signature.inner).is_ok()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.verifying_key.as_bytes()
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_did())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        did::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature, carried on the wire as unpadded standard base64.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: DalekSignature::from_bytes(bytes),
        }
    }

    /// Parse base64 (standard alphabet). Padding is optional so that signatures
    /// produced by encoders that pad are still accepted.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim_end_matches('=');
        let bytes = STANDARD_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD.decode(encoded))
            .map_err(|e| Error::InvalidBase64(e.to_string()))?;
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| Error::InvalidSignature)?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.inner.to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"hello agents");
        assert!(keypair.public_key().verify(b"hello agents", &signature));
        assert!(!keypair.public_key().verify(b"hello agent", &signature));
    }

    #[test]
    fn seed_is_deterministic() {
        let a = Keypair::from_seed(&[42u8; 32]);
        let b = Keypair::from_hex(&format!("0x{}", hex::encode([42u8; 32]))).unwrap();
        assert_eq!(a.did(), b.did());
        assert_eq!(a.to_hex(), b.to_hex());
    }

    #[test]
    fn from_hex_rejects_short_seed() {
        assert!(matches!(
            Keypair::from_hex("abcd"),
            Err(Error::InvalidPrivateKey)
        ));
    }

    #[test]
    fn signature_base64_has_no_padding() {
        let sig = Keypair::generate().sign(b"x");
        let encoded = sig.to_base64();
        assert!(!encoded.ends_with('='));
        assert_eq!(encoded.len(), 86);
        assert_eq!(Signature::from_base64(&encoded).unwrap(), sig);
    }

    #[test]
    fn signature_accepts_padded_base64() {
        let sig = Keypair::generate().sign(b"x");
        let padded = STANDARD.encode(sig.to_bytes());
        assert!(padded.ends_with("=="));
        assert_eq!(Signature::from_base64(&padded).unwrap(), sig);
    }

    #[test]
    fn signature_rejects_garbage() {
        assert!(matches!(
            Signature::from_base64("not base64!"),
            Err(Error::InvalidBase64(_))
        ));
        assert!(matches!(
            Signature::from_base64(&STANDARD_NO_PAD.encode([1u8; 10])),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn public_key_serde_uses_did() {
        let kp = Keypair::generate();
        let json = serde_json::to_string(&kp.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", kp.did()));
        let restored: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, kp.public_key());
    }
}
