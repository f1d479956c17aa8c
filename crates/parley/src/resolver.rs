//! Identity resolution.
//!
//! [`ChainResolver`] dispatches on the identifier's shape: a `did:key` is
//! decoded offline (and enriched from a local pin when one exists), anything
//! else is treated as an address and looked up through a [`RegistryClient`].
//! The DID a registry returns is decoded before it is trusted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parley_core::did;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pinning::PinStore;
use crate::types::{AgentIdentity, Custody, Lifetime, ResolutionPath};

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, identifier: &str) -> Result<AgentIdentity>;
}

/// What a registry reports for an address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub did: String,
    pub address: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub custody: Custody,
    #[serde(default)]
    pub lifetime: Lifetime,
    #[serde(default)]
    pub stable_id: Option<String>,
}

/// Network-backed address lookup (implemented by the transport layer).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<RegistryRecord>;
}

/// Optional second-layer alias service mapping a DID to a rotation-stable id.
#[async_trait]
pub trait StableIdResolver: Send + Sync {
    async fn stable_id(&self, did: &str) -> Result<Option<String>>;
}

/// Offline resolution of `did:key` identifiers.
#[derive(Clone, Default)]
pub struct DidKeyResolver {
    pins: Option<Arc<PinStore>>,
}

impl DidKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pins(pins: Arc<PinStore>) -> Self {
        Self { pins: Some(pins) }
    }
}

#[async_trait]
impl IdentityResolver for DidKeyResolver {
    async fn resolve(&self, identifier: &str) -> Result<AgentIdentity> {
        if !did::is_did_key(identifier) {
            return Err(Error::Resolution {
                identifier: identifier.to_string(),
                reason: "not a did:key identifier".into(),
            });
        }
        let public_key = did::decode(identifier)?;

        let mut identity = AgentIdentity {
            did: identifier.to_string(),
            address: String::new(),
            handle: None,
            public_key,
            server: String::new(),
            custody: Custody::SelfCustody,
            lifetime: Lifetime::Persistent,
            stable_id: None,
            resolved_at: Utc::now(),
            resolved_via: ResolutionPath::DidKey,
        };

        if let Some(pin) = self.pins.as_ref().and_then(|p| p.get(identifier)) {
            identity.address = pin.address;
            identity.handle = pin.handle;
            identity.server = pin.server;
            identity.stable_id = pin.stable_id;
            identity.resolved_via = ResolutionPath::Pin;
        }

        Ok(identity)
    }
}

/// Address resolution through a registry.
#[derive(Clone)]
pub struct ServerResolver {
    client: Arc<dyn RegistryClient>,
}

impl ServerResolver {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityResolver for ServerResolver {
    async fn resolve(&self, identifier: &str) -> Result<AgentIdentity> {
        let record = self.client.lookup(identifier).await?;

        if record.address != identifier {
            return Err(Error::Resolution {
                identifier: identifier.to_string(),
                reason: format!("registry answered for {}", record.address),
            });
        }

        let public_key =
            did::decode(&record.did).map_err(|e| Error::ServerAssertedInvalidDid {
                address: identifier.to_string(),
                reason: e.to_string(),
            })?;

        Ok(AgentIdentity {
            did: record.did,
            address: record.address,
            handle: record.handle,
            public_key,
            server: record.server,
            custody: record.custody,
            lifetime: record.lifetime,
            stable_id: record.stable_id,
            resolved_at: Utc::now(),
            resolved_via: ResolutionPath::Server,
        })
    }
}

/// Shape-dispatching resolver over the offline, registry and alias paths.
#[derive(Clone, Default)]
pub struct ChainResolver {
    did_key: DidKeyResolver,
    server: Option<ServerResolver>,
    stable: Option<Arc<dyn StableIdResolver>>,
    pins: Option<Arc<PinStore>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pins(mut self, pins: Arc<PinStore>) -> Self {
        self.did_key = DidKeyResolver::with_pins(pins.clone());
        self.pins = Some(pins);
        self
    }

    pub fn with_registry(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.server = Some(ServerResolver::new(client));
        self
    }

    pub fn with_stable_ids(mut self, stable: Arc<dyn StableIdResolver>) -> Self {
        self.stable = Some(stable);
        self
    }

    async fn attach_stable_id(&self, identity: &mut AgentIdentity) {
        if identity.stable_id.is_some() {
            return;
        }
        let Some(stable) = &self.stable else {
            return;
        };
        match stable.stable_id(&identity.did).await {
            Ok(found) => identity.stable_id = found,
            Err(err) => {
                tracing::debug!(
                    did = %identity.did,
                    error = %err,
                    "stable id lookup failed; continuing without it"
                );
            }
        }
    }
}

#[async_trait]
impl IdentityResolver for ChainResolver {
    async fn resolve(&self, identifier: &str) -> Result<AgentIdentity> {
        let mut identity = if did::is_did_key(identifier) {
            tracing::debug!(identifier, "resolving offline via did:key");
            self.did_key.resolve(identifier).await?
        } else {
            let server = self
                .server
                .as_ref()
                .ok_or_else(|| Error::ResolverMissing(identifier.to_string()))?;
            tracing::debug!(identifier, "resolving address via registry");
            let identity = server.resolve(identifier).await?;

            if let Some(pinned) = self
                .pins
                .as_ref()
                .and_then(|p| p.did_for_address(identifier))
            {
                if pinned != identity.did {
                    tracing::warn!(
                        address = identifier,
                        pinned_did = %pinned,
                        registry_did = %identity.did,
                        "registry DID differs from pinned DID"
                    );
                }
            }
            identity
        };

        self.attach_stable_id(&mut identity).await;
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Keypair;
    use std::collections::HashMap;

    struct StaticRegistry {
        records: HashMap<String, RegistryRecord>,
    }

    #[async_trait]
    impl RegistryClient for StaticRegistry {
        async fn lookup(&self, address: &str) -> Result<RegistryRecord> {
            self.records
                .get(address)
                .cloned()
                .ok_or_else(|| Error::Resolution {
                    identifier: address.to_string(),
                    reason: "registry unreachable".into(),
                })
        }
    }

    struct FailingStableIds;

    #[async_trait]
    impl StableIdResolver for FailingStableIds {
        async fn stable_id(&self, _did: &str) -> Result<Option<String>> {
            Err(Error::Transport("alias service down".into()))
        }
    }

    struct FixedStableIds;

    #[async_trait]
    impl StableIdResolver for FixedStableIds {
        async fn stable_id(&self, did: &str) -> Result<Option<String>> {
            Ok(Some(format!("stable:{}", &did[did.len() - 4..])))
        }
    }

    fn record(address: &str, did: String) -> RegistryRecord {
        RegistryRecord {
            did,
            address: address.to_string(),
            handle: Some("@bob".into()),
            server: "https://relay.example".into(),
            custody: Custody::Custodial,
            lifetime: Lifetime::Persistent,
            stable_id: None,
        }
    }

    fn registry(records: Vec<RegistryRecord>) -> Arc<dyn RegistryClient> {
        Arc::new(StaticRegistry {
            records: records
                .into_iter()
                .map(|r| (r.address.clone(), r))
                .collect(),
        })
    }

    #[tokio::test]
    async fn did_key_resolves_offline() {
        let kp = Keypair::generate();
        let identity = ChainResolver::new().resolve(&kp.did()).await.unwrap();
        assert_eq!(identity.public_key, kp.public_key());
        assert_eq!(identity.resolved_via, ResolutionPath::DidKey);
        assert!(identity.address.is_empty());
    }

    #[tokio::test]
    async fn did_key_is_supplemented_from_pin() {
        let kp = Keypair::generate();
        let pins = Arc::new(PinStore::new());
        pins.store_pin(&kp.did(), "acme/bob", Some("@bob"), "https://relay.example");

        let identity = ChainResolver::new()
            .with_pins(pins)
            .resolve(&kp.did())
            .await
            .unwrap();
        assert_eq!(identity.address, "acme/bob");
        assert_eq!(identity.handle.as_deref(), Some("@bob"));
        assert_eq!(identity.resolved_via, ResolutionPath::Pin);
    }

    #[tokio::test]
    async fn malformed_did_key_is_an_error() {
        let err = ChainResolver::new()
            .resolve("did:key:z0OIl")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Core(_)));
    }

    #[tokio::test]
    async fn address_without_registry_is_a_config_error() {
        let err = ChainResolver::new().resolve("acme/bob").await.unwrap_err();
        assert!(matches!(err, Error::ResolverMissing(_)));
    }

    #[tokio::test]
    async fn address_resolves_via_registry() {
        let kp = Keypair::generate();
        let resolver =
            ChainResolver::new().with_registry(registry(vec![record("acme/bob", kp.did())]));
        let identity = resolver.resolve("acme/bob").await.unwrap();
        assert_eq!(identity.did, kp.did());
        assert_eq!(identity.custody, Custody::Custodial);
        assert_eq!(identity.resolved_via, ResolutionPath::Server);
    }

    #[tokio::test]
    async fn registry_failure_propagates() {
        let resolver = ChainResolver::new().with_registry(registry(vec![]));
        let err = resolver.resolve("acme/ghost").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[tokio::test]
    async fn server_asserted_invalid_did_is_hard_error() {
        let resolver = ChainResolver::new().with_registry(registry(vec![record(
            "acme/bob",
            "did:key:zBROKEN".into(),
        )]));
        let err = resolver.resolve("acme/bob").await.unwrap_err();
        assert!(matches!(err, Error::ServerAssertedInvalidDid { .. }));
    }

    #[tokio::test]
    async fn stable_id_layer_is_optional_and_non_blocking() {
        let kp = Keypair::generate();

        let failing = ChainResolver::new().with_stable_ids(Arc::new(FailingStableIds));
        let identity = failing.resolve(&kp.did()).await.unwrap();
        assert!(identity.stable_id.is_none());

        let fixed = ChainResolver::new().with_stable_ids(Arc::new(FixedStableIds));
        let identity = fixed.resolve(&kp.did()).await.unwrap();
        assert!(identity.stable_id.unwrap().starts_with("stable:"));
    }
}
