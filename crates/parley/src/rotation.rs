//! Key rotation announcements.
//!
//! A self-custody agent rotating its key signs
//! `{"new_did":..,"old_did":..,"timestamp":..}` with the *old* key. Peers that
//! hit an identity mismatch for a known address accept the new DID when that
//! signature verifies against the DID they had pinned.
//!
//! A custodial agent graduating to self custody cannot produce that signature
//! itself (the custodian held the old key), so graduation is its own variant.
//! It only applies to a pin recorded as custodial, must present a self-custody
//! key, and must be vouched for and delivered by the custodian that served the
//! old pin.

use parley_core::{canonicalize_json, did, Signature, Signer};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::types::Custody;

/// The receiver's side of a rotation: what is pinned for the address and
/// who is presenting the new DID.
#[derive(Clone, Copy, Debug)]
pub struct RotationContext<'a> {
    pub pinned_did: &'a str,
    pub pinned_server: &'a str,
    pub pinned_custody: Custody,
    pub presenting_custody: Custody,
    /// Server that delivered the announcement.
    pub presenting_server: &'a str,
}

/// Canonical bytes signed by the old key.
pub fn rotation_payload(old_did: &str, new_did: &str, timestamp: &str) -> Result<String> {
    let value = json!({
        "new_did": new_did,
        "old_did": old_did,
        "timestamp": timestamp,
    });
    Ok(canonicalize_json(&value)?)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RotationAnnouncement {
    /// Old key attests the move to the new key.
    SelfSigned {
        old_did: String,
        new_did: String,
        timestamp: String,
        rotation_signature: String,
    },
    /// Custodial -> self custody; vouched for by the custodian server.
    Graduation {
        old_did: String,
        new_did: String,
        timestamp: String,
        custodian: String,
    },
}

impl RotationAnnouncement {
    /// Sign a rotation from `old_key` to `new_did`.
    pub fn sign(old_key: &dyn Signer, new_did: &str, timestamp: impl Into<String>) -> Result<Self> {
        let old_did = old_key.did();
        let timestamp = timestamp.into();
        if old_did == new_did {
            return Err(Error::InvalidRotation("new DID equals old DID".into()));
        }
        let payload = rotation_payload(&old_did, new_did, &timestamp)?;
        let signature = old_key.sign(payload.as_bytes())?;
        Ok(Self::SelfSigned {
            old_did,
            new_did: new_did.to_string(),
            timestamp,
            rotation_signature: signature.to_base64(),
        })
    }

    pub fn graduation(
        old_did: impl Into<String>,
        new_did: impl Into<String>,
        timestamp: impl Into<String>,
        custodian: impl Into<String>,
    ) -> Self {
        Self::Graduation {
            old_did: old_did.into(),
            new_did: new_did.into(),
            timestamp: timestamp.into(),
            custodian: custodian.into(),
        }
    }

    pub fn old_did(&self) -> &str {
        match self {
            Self::SelfSigned { old_did, .. } | Self::Graduation { old_did, .. } => old_did,
        }
    }

    pub fn new_did(&self) -> &str {
        match self {
            Self::SelfSigned { new_did, .. } | Self::Graduation { new_did, .. } => new_did,
        }
    }

    /// Check the announcement against what is currently pinned for the address.
    pub fn verify(&self, ctx: &RotationContext<'_>) -> Result<()> {
        let pinned_did = ctx.pinned_did;
        if self.old_did() != pinned_did {
            return Err(Error::InvalidRotation(format!(
                "announced old DID {} is not the pinned DID {pinned_did}",
                self.old_did()
            )));
        }
        if self.old_did() == self.new_did() {
            return Err(Error::InvalidRotation("new DID equals old DID".into()));
        }
        did::decode(self.new_did())
            .map_err(|e| Error::InvalidRotation(format!("new DID: {e}")))?;

        match self {
            Self::SelfSigned {
                old_did,
                new_did,
                timestamp,
                rotation_signature,
            } => {
                let old_key = did::decode(old_did)
                    .map_err(|e| Error::InvalidRotation(format!("old DID: {e}")))?;
                let signature = Signature::from_base64(rotation_signature)
                    .map_err(|e| Error::InvalidRotation(format!("signature: {e}")))?;
                let payload = rotation_payload(old_did, new_did, timestamp)?;
                if !old_key.verify(payload.as_bytes(), &signature) {
                    return Err(Error::InvalidRotation(
                        "signature does not verify against old key".into(),
                    ));
                }
                Ok(())
            }
            Self::Graduation { custodian, .. } => {
                if ctx.pinned_custody != Custody::Custodial {
                    return Err(Error::InvalidRotation(
                        "graduation from a pin that was not custodial".into(),
                    ));
                }
                if ctx.presenting_custody != Custody::SelfCustody {
                    return Err(Error::InvalidRotation(
                        "graduation must present a self-custody key".into(),
                    ));
                }
                let pinned_server = ctx.pinned_server;
                if pinned_server.is_empty() || custodian != pinned_server {
                    return Err(Error::InvalidRotation(format!(
                        "graduation vouched by {custodian:?}, pin was served by {pinned_server:?}"
                    )));
                }
                if ctx.presenting_server != pinned_server {
                    return Err(Error::InvalidRotation(format!(
                        "graduation delivered by {:?}, not the custodian",
                        ctx.presenting_server
                    )));
                }
                Ok(())
            }
        }
    }
}
