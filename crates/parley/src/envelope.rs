//! Signed message envelopes.
//!
//! The signature covers a canonical JSON object built from the identity
//! relevant fields only. `signature` and `signing_key_id` ride along on the
//! wire but are never part of the signed bytes.

use parley_core::{canonicalize_json, did, Signature, Signer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Current UTC time as RFC 3339 with second precision (`2026-01-01T00:00:00Z`).
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Mail,
    Chat,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Mail => "mail",
            MessageKind::Chat => "chat",
        }
    }
}

/// Outcome of checking an envelope's signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Signature valid, key held by the sender itself.
    Verified,
    /// Signature valid, key held by a custodian on the sender's behalf.
    VerifiedCustodial,
    /// No DID or signature (legacy sender) or a DID outside this scheme.
    Unverified,
    /// Malformed DID, undecodable signature, or signature mismatch.
    Failed,
    /// Signature valid but the address is pinned to a different DID.
    IdentityMismatch,
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified | VerificationStatus::VerifiedCustodial
        )
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::VerifiedCustodial => "verified_custodial",
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Failed => "failed",
            VerificationStatus::IdentityMismatch => "identity_mismatch",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Sender address.
    pub from: String,
    #[serde(default)]
    pub from_did: String,
    /// Recipient address.
    pub to: String,
    #[serde(default)]
    pub to_did: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,
}

impl MessageEnvelope {
    pub fn new(
        kind: MessageKind,
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            body: body.into(),
            timestamp: now_rfc3339(),
            ..Self::default()
        }
    }

    pub fn with_dids(mut self, from_did: impl Into<String>, to_did: impl Into<String>) -> Self {
        self.from_did = from_did.into();
        self.to_did = to_did.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_stable_ids(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from_stable_id = from;
        self.to_stable_id = to;
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Canonical signed payload for an envelope.
///
/// Required fields are always present (even when empty); `message_id` and the
/// stable-id aliases are included only when non-empty.
pub fn canonical_payload(env: &MessageEnvelope) -> Result<String> {
    let mut fields = Map::new();
    fields.insert("body".into(), Value::String(env.body.clone()));
    fields.insert("from".into(), Value::String(env.from.clone()));
    fields.insert("from_did".into(), Value::String(env.from_did.clone()));
    fields.insert("subject".into(), Value::String(env.subject.clone()));
    fields.insert("timestamp".into(), Value::String(env.timestamp.clone()));
    fields.insert("to".into(), Value::String(env.to.clone()));
    fields.insert("to_did".into(), Value::String(env.to_did.clone()));
    fields.insert("type".into(), Value::String(env.kind.as_str().into()));

    if let Some(id) = non_empty(&env.message_id) {
        fields.insert("message_id".into(), Value::String(id.into()));
    }
    if let Some(id) = non_empty(&env.from_stable_id) {
        fields.insert("from_stable_id".into(), Value::String(id.into()));
    }
    if let Some(id) = non_empty(&env.to_stable_id) {
        fields.insert("to_stable_id".into(), Value::String(id.into()));
    }

    Ok(canonicalize_json(&Value::Object(fields))?)
}

/// Sign an envelope in place, setting `signature` and `signing_key_id`.
///
/// An empty `from_did` is filled from the signer; a non-empty one must match it.
pub fn sign(env: &mut MessageEnvelope, signer: &dyn Signer) -> Result<()> {
    let signer_did = signer.did();
    if env.from_did.is_empty() {
        env.from_did = signer_did.clone();
    } else if env.from_did != signer_did {
        return Err(Error::SignerMismatch {
            signer: signer_did,
            from_did: env.from_did.clone(),
        });
    }

    let payload = canonical_payload(env)?;
    let signature = signer.sign(payload.as_bytes())?;
    env.signature = Some(signature.to_base64());
    env.signing_key_id = Some(signer_did);
    Ok(())
}

/// Check an envelope's signature. Never touches the network or the pin store.
pub fn verify(env: &MessageEnvelope) -> VerificationStatus {
    let Some(signature) = non_empty(&env.signature) else {
        return VerificationStatus::Unverified;
    };
    if env.from_did.is_empty() {
        return VerificationStatus::Unverified;
    }

    if let Some(key_id) = non_empty(&env.signing_key_id) {
        if key_id != env.from_did {
            tracing::debug!(
                from_did = %env.from_did,
                signing_key_id = %key_id,
                "signing key does not match sender DID"
            );
            return VerificationStatus::Failed;
        }
    }

    if !did::is_did_key(&env.from_did) {
        return VerificationStatus::Unverified;
    }

    let public_key = match did::decode(&env.from_did) {
        Ok(pk) => pk,
        Err(err) => {
            tracing::debug!(from_did = %env.from_did, error = %err, "sender DID does not decode");
            return VerificationStatus::Failed;
        }
    };

    let signature = match Signature::from_base64(signature) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::debug!(error = %err, "signature does not decode");
            return VerificationStatus::Failed;
        }
    };

    let payload = match canonical_payload(env) {
        Ok(p) => p,
        Err(err) => {
            tracing::debug!(error = %err, "canonical payload rebuild failed");
            return VerificationStatus::Failed;
        }
    };

    if public_key.verify(payload.as_bytes(), &signature) {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Failed
    }
}
