//! Verify-then-pin pipeline for inbound envelopes.
//!
//! Signature checking never consults pins; this module layers custody
//! reclassification and TOFU on top, holding the pin store lock across the
//! check and the store so concurrent verifications of one address serialize.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::envelope::{self, MessageEnvelope, VerificationStatus};
use crate::error::Error;
use crate::pinning::{PinResult, PinStore};
use crate::rotation::{RotationAnnouncement, RotationContext};
use crate::types::{Custody, Lifetime};

/// What the receiver knows about the sender beyond the envelope itself.
#[derive(Clone, Debug, Default)]
pub struct SenderContext {
    pub custody: Custody,
    pub lifetime: Lifetime,
    pub handle: Option<String>,
    pub server: String,
    pub rotation: Option<RotationAnnouncement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustOutcome {
    pub status: VerificationStatus,
    /// Pin check result; `None` when the signature did not verify.
    pub pin: Option<PinResult>,
    /// The pin moved to a new DID on the strength of a rotation announcement.
    pub rotated: bool,
}

impl TrustOutcome {
    fn unpinned(status: VerificationStatus) -> Self {
        Self {
            status,
            pin: None,
            rotated: false,
        }
    }

    /// Safe to act on without operator review.
    pub fn is_trusted(&self) -> bool {
        self.status.is_verified()
    }
}

pub struct TrustPipeline {
    pins: Arc<PinStore>,
    trust_file: Option<PathBuf>,
}

impl TrustPipeline {
    /// `trust_file` is written after every pin change; `None` keeps pins in memory only.
    pub fn new(pins: Arc<PinStore>, trust_file: Option<PathBuf>) -> Self {
        Self { pins, trust_file }
    }

    pub fn pins(&self) -> &Arc<PinStore> {
        &self.pins
    }

    /// Verify, pin, and persist synchronously.
    pub fn verify_inbound(&self, env: &MessageEnvelope, sender: &SenderContext) -> TrustOutcome {
        let (outcome, changed) = self.verify_and_pin(env, sender);
        if changed {
            if let Some(path) = &self.trust_file {
                if let Err(err) = self.pins.save(path) {
                    warn_save_failed(path, &err);
                }
            }
        }
        outcome
    }

    /// Like [`verify_inbound`](Self::verify_inbound), but the trust file is
    /// written on the blocking pool instead of the calling task's thread.
    pub async fn verify_inbound_async(
        &self,
        env: &MessageEnvelope,
        sender: &SenderContext,
    ) -> TrustOutcome {
        let (outcome, changed) = self.verify_and_pin(env, sender);
        if changed {
            if let Some(path) = self.trust_file.clone() {
                let pins = self.pins.clone();
                let saved = tokio::task::spawn_blocking(move || {
                    let result = pins.save(&path);
                    (path, result)
                })
                .await;
                match saved {
                    Ok((path, Err(err))) => warn_save_failed(&path, &err),
                    Ok((_, Ok(()))) => {}
                    Err(err) => tracing::warn!(
                        target: "parley::pinning",
                        error = %err,
                        "trust pin save task failed"
                    ),
                }
            }
        }
        outcome
    }

    /// Returns the outcome and whether the pin table changed.
    fn verify_and_pin(
        &self,
        env: &MessageEnvelope,
        sender: &SenderContext,
    ) -> (TrustOutcome, bool) {
        let status = envelope::verify(env);
        if status != VerificationStatus::Verified {
            return (TrustOutcome::unpinned(status), false);
        }

        let status = match sender.custody {
            Custody::SelfCustody => VerificationStatus::Verified,
            Custody::Custodial => VerificationStatus::VerifiedCustodial,
        };
        if env.from.is_empty() {
            return (TrustOutcome::unpinned(status), false);
        }

        let mut table = self.pins.lock();
        let pin = table.check_pin(&env.from, &env.from_did, sender.lifetime);
        match pin {
            PinResult::Skipped => (
                TrustOutcome {
                    status,
                    pin: Some(pin),
                    rotated: false,
                },
                false,
            ),
            PinResult::New | PinResult::Ok => {
                if pin == PinResult::New {
                    tracing::info!(
                        address = %env.from,
                        did = %env.from_did,
                        "pinned new agent identity"
                    );
                }
                table.store_pin(&env.from_did, &env.from, sender.handle.as_deref(), &sender.server);
                table.set_custody(&env.from_did, sender.custody);
                if let Some(stable_id) = env.from_stable_id.as_deref().filter(|s| !s.is_empty()) {
                    table.set_stable_id(&env.from_did, stable_id);
                }
                (
                    TrustOutcome {
                        status,
                        pin: Some(pin),
                        rotated: false,
                    },
                    true,
                )
            }
            PinResult::Mismatch => {
                let pinned_did = table
                    .did_for_address(&env.from)
                    .unwrap_or_default()
                    .to_string();
                let (pinned_server, pinned_custody) = table
                    .get(&pinned_did)
                    .map(|p| (p.server.clone(), p.custody))
                    .unwrap_or_default();

                let accepted = match &sender.rotation {
                    Some(ann) if ann.new_did() == env.from_did => {
                        let ctx = RotationContext {
                            pinned_did: &pinned_did,
                            pinned_server: &pinned_server,
                            pinned_custody,
                            presenting_custody: sender.custody,
                            presenting_server: &sender.server,
                        };
                        match ann.verify(&ctx) {
                            Ok(()) => true,
                            Err(err) => {
                                tracing::warn!(
                                    address = %env.from,
                                    error = %err,
                                    "rejected rotation announcement"
                                );
                                false
                            }
                        }
                    }
                    _ => false,
                };

                if !accepted {
                    tracing::warn!(
                        address = %env.from,
                        pinned_did = %pinned_did,
                        presented_did = %env.from_did,
                        "identity mismatch; holding message for review"
                    );
                    return (
                        TrustOutcome {
                            status: VerificationStatus::IdentityMismatch,
                            pin: Some(pin),
                            rotated: false,
                        },
                        false,
                    );
                }

                table.remove_pin(&pinned_did);
                table.store_pin(&env.from_did, &env.from, sender.handle.as_deref(), &sender.server);
                table.set_custody(&env.from_did, sender.custody);
                tracing::info!(
                    address = %env.from,
                    old_did = %pinned_did,
                    new_did = %env.from_did,
                    "accepted key rotation"
                );
                (
                    TrustOutcome {
                        status,
                        pin: Some(pin),
                        rotated: true,
                    },
                    true,
                )
            }
        }
    }
}

fn warn_save_failed(path: &Path, err: &Error) {
    tracing::warn!(
        target: "parley::pinning",
        path = %path.display(),
        error = %err,
        "failed to save trust pins; next load may re-pin"
    );
}
