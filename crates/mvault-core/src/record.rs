//! Persisted vault record
//!
//! The vault is stored as exactly one record with the fixed id `"root"`:
//!
//! ```json
//! { "id": "root", "version": 1, "salt": "<b64>", "iv": "<b64>", "ciphertext": "<b64>" }
//! ```
//!
//! `version` names the crypto parameter set. Records written before the field
//! existed deserialize as version 1. Records that replaced legacy data also
//! carry `migrated_from`, naming the legacy slot that is safe to delete.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::cipher::{Sealed, NONCE_SIZE, TAG_SIZE};
use crate::error::{Result, VaultError};
use crate::kdf::SALT_SIZE;
use crate::store::LegacySlot;

/// Fixed id of the single vault record
pub const RECORD_ID: &str = "root";

/// Current record format: PBKDF2-HMAC-SHA256 @ 100,000, AES-256-GCM, 96-bit IV
pub const RECORD_VERSION: u32 = 1;

fn default_version() -> u32 {
    RECORD_VERSION
}

/// The sole persisted form of the vault
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Always [`RECORD_ID`]
    pub id: String,
    /// Crypto parameter set
    #[serde(default = "default_version")]
    pub version: u32,
    /// Base64 salt, immutable for the vault's lifetime
    pub salt: String,
    /// Base64 nonce of the latest encryption
    pub iv: String,
    /// Base64 ciphertext with GCM tag
    pub ciphertext: String,
    /// Legacy slot whose contents this record supersedes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<LegacySlot>,
}

impl EncryptedRecord {
    /// Build a record from a salt and a freshly sealed payload
    pub fn new(salt: &[u8; SALT_SIZE], sealed: Sealed) -> Self {
        Self {
            id: RECORD_ID.to_string(),
            version: RECORD_VERSION,
            salt: B64.encode(salt),
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
            migrated_from: None,
        }
    }

    /// Mark this record as the replacement for a legacy slot
    pub fn with_migrated_from(mut self, slot: LegacySlot) -> Self {
        self.migrated_from = Some(slot);
        self
    }

    /// Same salt and id, new nonce and ciphertext
    pub fn resealed(&self, sealed: Sealed) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version,
            salt: self.salt.clone(),
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
            migrated_from: self.migrated_from,
        }
    }

    /// Decode the salt for key derivation
    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        B64.decode(&self.salt)
            .map_err(|e| VaultError::Corruption(format!("Invalid salt encoding: {}", e)))
    }

    /// Check that every field is present and well-formed
    ///
    /// Tampering with the iv or ciphertext contents is caught by the AEAD tag,
    /// not here; this only rejects records that cannot be decrypted at all.
    pub fn validate(&self) -> Result<()> {
        if self.id != RECORD_ID {
            return Err(VaultError::Corruption(format!(
                "Unexpected record id '{}'",
                self.id
            )));
        }
        if self.version != RECORD_VERSION {
            return Err(VaultError::Corruption(format!(
                "Unsupported record version {}",
                self.version
            )));
        }

        let salt = self.salt_bytes()?;
        if salt.len() != SALT_SIZE {
            return Err(VaultError::Corruption(format!(
                "Salt must be {} bytes, found {}",
                SALT_SIZE,
                salt.len()
            )));
        }

        let iv = B64
            .decode(&self.iv)
            .map_err(|e| VaultError::Corruption(format!("Invalid iv encoding: {}", e)))?;
        if iv.len() != NONCE_SIZE {
            return Err(VaultError::Corruption(format!(
                "IV must be {} bytes, found {}",
                NONCE_SIZE,
                iv.len()
            )));
        }

        let ciphertext = B64
            .decode(&self.ciphertext)
            .map_err(|e| VaultError::Corruption(format!("Invalid ciphertext encoding: {}", e)))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(VaultError::Corruption("Ciphertext too short".to_string()));
        }

        Ok(())
    }

    /// Parse and validate a record from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let record: EncryptedRecord = serde_json::from_str(json)
            .map_err(|e| VaultError::Corruption(format!("Record parse failed: {}", e)))?;
        record.validate()?;
        Ok(record)
    }
}

/// Encrypted blob written by older releases under a separate storage key
///
/// Same crypto parameters as version 1, but without the `id` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEncryptedBlob {
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
}

impl LegacyEncryptedBlob {
    /// Normalize into the current record schema
    pub fn into_record(self) -> Result<EncryptedRecord> {
        let record = EncryptedRecord {
            id: RECORD_ID.to_string(),
            version: RECORD_VERSION,
            salt: self.salt,
            iv: self.iv,
            ciphertext: self.ciphertext,
            migrated_from: Some(LegacySlot::EncryptedBlob),
        };
        record.validate()?;
        Ok(record)
    }
}
