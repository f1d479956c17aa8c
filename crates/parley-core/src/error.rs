//! Error types for parley-core operations

use thiserror::Error;

/// Errors that can occur while encoding identities or handling signatures
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(String),

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Number cannot be canonicalized: {0}")]
    NonCanonicalNumber(String),

    #[error("JSON serialization error: {0}")]
    JsonError(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonError(e.to_string())
    }
}

/// Result type for parley-core operations
pub type Result<T> = std::result::Result<T, Error>;
