//! Durable persistence for the vault record
//!
//! The store holds one logical row, the [`EncryptedRecord`] with id `"root"`,
//! plus the artifacts older releases left behind and the optional biometric
//! escrow record. Callers serialize writers; the store itself does no locking.
//!
//! # File layout
//!
//! ```text
//! <data_dir>/
//!   vault.json        current record
//!   vault_blob.json   legacy encrypted blob (no id)
//!   vaultItems.json   legacy plaintext item array
//!   biometric.json    biometric escrow record
//! ```

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::biometric::EscrowRecord;
use crate::error::{Result, VaultError};
use crate::record::{EncryptedRecord, RECORD_ID};

const RECORD_FILE: &str = "vault.json";
const LEGACY_BLOB_FILE: &str = "vault_blob.json";
const LEGACY_ITEMS_FILE: &str = "vaultItems.json";
const ESCROW_FILE: &str = "biometric.json";

/// Storage locations used by older releases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacySlot {
    /// Encrypted `{salt, iv, ciphertext}` without an id
    EncryptedBlob,
    /// Plaintext JSON array of items
    PlaintextItems,
}

impl LegacySlot {
    /// All legacy slots, in probe priority order
    pub const ALL: [LegacySlot; 2] = [LegacySlot::EncryptedBlob, LegacySlot::PlaintextItems];
}

/// Persistence backend for the vault
pub trait VaultStore: Send + Sync {
    /// Read the record with the given id, if present
    fn get(&self, id: &str) -> Result<Option<EncryptedRecord>>;

    /// Insert or replace the record. Must be atomic: after a failed put the
    /// previous record is still intact.
    fn put(&self, record: &EncryptedRecord) -> Result<()>;

    /// Irreversibly delete the record and every legacy artifact
    fn wipe(&self) -> Result<()>;

    /// Raw contents of a legacy slot, if present
    fn read_legacy(&self, slot: LegacySlot) -> Result<Option<String>>;

    /// Delete a legacy slot (no-op when absent)
    fn remove_legacy(&self, slot: LegacySlot) -> Result<()>;

    /// Load the biometric escrow record, if enrolled
    fn load_escrow(&self) -> Result<Option<EscrowRecord>>;

    /// Persist the biometric escrow record
    fn save_escrow(&self, record: &EscrowRecord) -> Result<()>;

    /// Delete the biometric escrow record (no-op when absent)
    fn clear_escrow(&self) -> Result<()>;
}

/// Directory-backed vault store
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    base_path: PathBuf,
}

impl FileVaultStore {
    /// Open (and create if needed) a store rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Default storage location
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mvault")
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self) -> PathBuf {
        self.base_path.join(RECORD_FILE)
    }

    fn legacy_path(&self, slot: LegacySlot) -> PathBuf {
        match slot {
            LegacySlot::EncryptedBlob => self.base_path.join(LEGACY_BLOB_FILE),
            LegacySlot::PlaintextItems => self.base_path.join(LEGACY_ITEMS_FILE),
        }
    }

    fn escrow_path(&self) -> PathBuf {
        self.base_path.join(ESCROW_FILE)
    }

    /// Write a raw legacy slot. Only used to stage data from older releases.
    pub fn write_legacy(&self, slot: LegacySlot, contents: &str) -> Result<()> {
        write_atomic(&self.legacy_path(slot), contents.as_bytes())
    }
}

impl VaultStore for FileVaultStore {
    fn get(&self, id: &str) -> Result<Option<EncryptedRecord>> {
        if id != RECORD_ID {
            return Ok(None);
        }
        match read_optional(&self.record_path())? {
            Some(json) => EncryptedRecord::from_json(&json).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, record: &EncryptedRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| VaultError::Storage(format!("Serialization failed: {}", e)))?;
        write_atomic(&self.record_path(), &json)?;
        debug!("Vault record written");
        Ok(())
    }

    fn wipe(&self) -> Result<()> {
        remove_if_exists(&self.record_path())?;
        for slot in LegacySlot::ALL {
            remove_if_exists(&self.legacy_path(slot))?;
        }
        debug!("Vault record and legacy artifacts wiped");
        Ok(())
    }

    fn read_legacy(&self, slot: LegacySlot) -> Result<Option<String>> {
        read_optional(&self.legacy_path(slot))
    }

    fn remove_legacy(&self, slot: LegacySlot) -> Result<()> {
        remove_if_exists(&self.legacy_path(slot))
    }

    fn load_escrow(&self) -> Result<Option<EscrowRecord>> {
        match read_optional(&self.escrow_path())? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_escrow(&self, record: &EscrowRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| VaultError::Storage(format!("Serialization failed: {}", e)))?;
        write_atomic(&self.escrow_path(), &json)
    }

    fn clear_escrow(&self) -> Result<()> {
        remove_if_exists(&self.escrow_path())
    }
}

/// Write via temp file + rename so readers never see a partial file
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
