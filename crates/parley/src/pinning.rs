//! Trust-on-first-use pin store.
//!
//! `pins` maps DID -> [`Pin`]; `addresses` maps address -> DID. The reverse
//! index only ever holds the current address of the DID it points at: moving
//! a DID to a new address drops the old entry in the same update.
//!
//! Every read and write goes through one mutex. Callers that check and then
//! store must do both on the same [`PinStore::lock`] guard.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Custody, Lifetime};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub address: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub server: String,
    /// Custody the pinned DID was last seen with. Older files default to self custody.
    #[serde(default)]
    pub custody: Custody,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinResult {
    /// Address is pinned to this DID.
    Ok,
    /// Address has never been seen.
    New,
    /// Address is pinned to a different DID.
    Mismatch,
    /// Ephemeral peer; pinning does not apply.
    Skipped,
}

/// On-disk layout of the trust file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinTable {
    #[serde(default)]
    pub pins: BTreeMap<String, Pin>,
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
}

impl PinTable {
    pub fn check_pin(&self, address: &str, did: &str, lifetime: Lifetime) -> PinResult {
        if lifetime == Lifetime::Ephemeral {
            return PinResult::Skipped;
        }
        match self.addresses.get(address) {
            None => PinResult::New,
            Some(pinned) if pinned == did => PinResult::Ok,
            Some(_) => PinResult::Mismatch,
        }
    }

    pub fn store_pin(&mut self, did: &str, address: &str, handle: Option<&str>, server: &str) {
        self.store_pin_at(did, address, handle, server, Utc::now());
    }

    fn store_pin_at(
        &mut self,
        did: &str,
        address: &str,
        handle: Option<&str>,
        server: &str,
        now: DateTime<Utc>,
    ) {
        match self.pins.get_mut(did) {
            Some(pin) => {
                pin.last_seen = now;
                pin.handle = handle.map(str::to_string);
                pin.server = server.to_string();
                if pin.address != address {
                    if self.addresses.get(&pin.address).map(String::as_str) == Some(did) {
                        self.addresses.remove(&pin.address);
                    }
                    pin.address = address.to_string();
                }
            }
            None => {
                self.pins.insert(
                    did.to_string(),
                    Pin {
                        address: address.to_string(),
                        handle: handle.map(str::to_string),
                        stable_id: None,
                        first_seen: now,
                        last_seen: now,
                        server: server.to_string(),
                        custody: Custody::default(),
                    },
                );
            }
        }
        self.addresses.insert(address.to_string(), did.to_string());
    }

    /// Record the stable-identity alias for a pinned DID. Returns false when the DID is not pinned.
    pub fn set_stable_id(&mut self, did: &str, stable_id: &str) -> bool {
        match self.pins.get_mut(did) {
            Some(pin) => {
                pin.stable_id = Some(stable_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Record how the pinned DID's key is held. Returns false when the DID is not pinned.
    pub fn set_custody(&mut self, did: &str, custody: Custody) -> bool {
        match self.pins.get_mut(did) {
            Some(pin) => {
                pin.custody = custody;
                true
            }
            None => false,
        }
    }

    /// Drop a pin and its reverse-index entry.
    pub fn remove_pin(&mut self, did: &str) -> Option<Pin> {
        let pin = self.pins.remove(did)?;
        if self.addresses.get(&pin.address).map(String::as_str) == Some(did) {
            self.addresses.remove(&pin.address);
        }
        Some(pin)
    }

    pub fn get(&self, did: &str) -> Option<&Pin> {
        self.pins.get(did)
    }

    pub fn did_for_address(&self, address: &str) -> Option<&str> {
        self.addresses.get(address).map(String::as_str)
    }

    /// Write the table to `path` atomically (unique temp file + rename), owner read/write only.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let json = serde_json::to_vec_pretty(self)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "known_agents.json".to_string());

        // Created 0o600 on unix; removed on drop if never persisted.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Read a table from `path`. A missing file is an empty table, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Shared, lock-guarded pin table.
#[derive(Debug, Default)]
pub struct PinStore {
    table: Mutex<PinTable>,
    /// Serializes saves so a newer snapshot is never overwritten by an older one.
    save_lock: Mutex<()>,
}

impl PinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: PinTable) -> Self {
        Self {
            table: Mutex::new(table),
            save_lock: Mutex::new(()),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_table(PinTable::load(path.as_ref())?))
    }

    /// Hold the store lock for a compound check-then-store sequence.
    pub fn lock(&self) -> MutexGuard<'_, PinTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn check_pin(&self, address: &str, did: &str, lifetime: Lifetime) -> PinResult {
        self.lock().check_pin(address, did, lifetime)
    }

    pub fn store_pin(&self, did: &str, address: &str, handle: Option<&str>, server: &str) {
        self.lock().store_pin(did, address, handle, server);
    }

    pub fn set_stable_id(&self, did: &str, stable_id: &str) -> bool {
        self.lock().set_stable_id(did, stable_id)
    }

    pub fn get(&self, did: &str) -> Option<Pin> {
        self.lock().get(did).cloned()
    }

    pub fn did_for_address(&self, address: &str) -> Option<String> {
        self.lock().did_for_address(address).map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.lock().pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> PinTable {
        self.lock().clone()
    }

    /// Persist the current table. The table lock is released before any file
    /// I/O; saves run one at a time and each snapshots inside its turn.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let _turn = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.snapshot().save(path.as_ref())
    }
}
