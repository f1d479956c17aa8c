use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] parley_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signer {signer} does not match sender DID {from_did}")]
    SignerMismatch { signer: String, from_did: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("No network resolver configured for {0}")]
    ResolverMissing(String),

    #[error("Resolution failed for {identifier}: {reason}")]
    Resolution { identifier: String, reason: String },

    #[error("Server asserted an invalid DID for {address}: {reason}")]
    ServerAssertedInvalidDid { address: String, reason: String },

    #[error("Invalid rotation announcement: {0}")]
    InvalidRotation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
