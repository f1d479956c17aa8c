#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! # parley
//!
//! Agent-to-agent trust and messaging on top of [`parley_core`].
//!
//! - Signed message envelopes and their verification
//! - Trust-on-first-use pins keyed by `did:key`, persisted to one file
//! - Identity resolution (offline for `did:key`, registry for addresses)
//! - Key rotation announcements that carry a pin across a key change
//! - Chat sessions: send a message and wait for the reply over an event stream
//!
//! ## Verifying an inbound envelope
//!
//! ```rust
//! use std::sync::Arc;
//! use parley::{envelope, MessageEnvelope, MessageKind, PinStore, SenderContext, TrustPipeline};
//! use parley::{PinResult, VerificationStatus};
//! use parley_core::Keypair;
//!
//! let bob = Keypair::generate();
//! let mut env = MessageEnvelope::new(MessageKind::Mail, "org/bob", "org/alice", "hello")
//!     .with_dids(bob.did(), "");
//! envelope::sign(&mut env, &bob).unwrap();
//!
//! let pipeline = TrustPipeline::new(Arc::new(PinStore::new()), None);
//! let outcome = pipeline.verify_inbound(&env, &SenderContext::default());
//! assert_eq!(outcome.status, VerificationStatus::Verified);
//! assert_eq!(outcome.pin, Some(PinResult::New));
//! ```

pub mod chat;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pinning;
pub mod resolver;
pub mod rotation;
pub mod trust;
pub mod types;

pub use config::ClientConfig;
pub use envelope::{MessageEnvelope, MessageKind, VerificationStatus};
pub use error::{Error, Result};
pub use pinning::{Pin, PinResult, PinStore, PinTable};
pub use resolver::{
    ChainResolver, DidKeyResolver, IdentityResolver, RegistryClient, RegistryRecord,
    ServerResolver, StableIdResolver,
};
pub use rotation::{rotation_payload, RotationAnnouncement, RotationContext};
pub use trust::{SenderContext, TrustOutcome, TrustPipeline};
pub use types::{AgentIdentity, Custody, Lifetime, ResolutionPath};
