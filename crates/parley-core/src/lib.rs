#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! # parley-core
//!
//! Cryptographic primitives for the parley agent protocol.
//!
//! This crate provides:
//! - `did:key` identifiers for Ed25519 public keys
//! - Canonical JSON used as the exact signed byte sequence
//! - Ed25519 signing and verification with base64 signatures
//!
//! ## Quick Start
//!
//! ```rust
//! use parley_core::{canonicalize_json, did, Keypair};
//!
//! let keypair = Keypair::generate();
//! let id = keypair.did();
//! assert_eq!(did::decode(&id).unwrap(), keypair.public_key());
//!
//! let payload = canonicalize_json(&serde_json::json!({"b": "2", "a": "1"})).unwrap();
//! assert_eq!(payload, r#"{"a":"1","b":"2"}"#);
//!
//! let signature = keypair.sign(payload.as_bytes());
//! assert!(keypair.public_key().verify(payload.as_bytes(), &signature));
//! ```

pub mod canonical;
pub mod did;
pub mod error;
pub mod signing;

pub use canonical::canonicalize as canonicalize_json;
pub use error::{Error, Result};
pub use signing::{Keypair, PublicKey, Signature, Signer};

/// Commonly used types
pub mod prelude {
    pub use crate::{did, Error, Keypair, PublicKey, Result, Signature, Signer};
}
