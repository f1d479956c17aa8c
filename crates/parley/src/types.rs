use chrono::{DateTime, Utc};
use parley_core::PublicKey;
use serde::{Deserialize, Serialize};

/// Who holds an agent's private key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Custody {
    /// The agent holds its own key.
    #[default]
    #[serde(rename = "self")]
    SelfCustody,
    /// An intermediary signs on the agent's behalf.
    Custodial,
}

/// Whether a peer's identity is long-lived (pinned) or disposable (never pinned).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    #[default]
    Persistent,
    Ephemeral,
}

/// Which resolver produced an [`AgentIdentity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Decoded offline from a `did:key`.
    DidKey,
    /// Looked up through the network registry.
    Server,
    /// Decoded offline and supplemented from a local pin.
    Pin,
}

/// Resolved metadata about a peer agent.
///
/// A fresh value is produced by every resolution; callers may cache it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub did: String,
    /// Namespaced address, e.g. `acme/alice`. Empty when resolved from a bare DID with no pin.
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub public_key: PublicKey,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub custody: Custody,
    #[serde(default)]
    pub lifetime: Lifetime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    pub resolved_at: DateTime<Utc>,
    pub resolved_via: ResolutionPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custody_wire_names() {
        assert_eq!(
            serde_json::to_string(&Custody::SelfCustody).unwrap(),
            "\"self\""
        );
        assert_eq!(
            serde_json::to_string(&Custody::Custodial).unwrap(),
            "\"custodial\""
        );
        let c: Custody = serde_json::from_str("\"self\"").unwrap();
        assert_eq!(c, Custody::SelfCustody);
    }

    #[test]
    fn lifetime_wire_names() {
        let l: Lifetime = serde_json::from_str("\"ephemeral\"").unwrap();
        assert_eq!(l, Lifetime::Ephemeral);
        assert_eq!(
            serde_json::to_string(&Lifetime::Persistent).unwrap(),
            "\"persistent\""
        );
    }
}
