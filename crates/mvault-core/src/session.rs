//! Vault session state machine
//!
//! ```text
//! Uninitialized --probe--> Setup | Migration | Locked
//! Setup     --create-->  Unlocked
//! Migration --create-->  Unlocked   (legacy data removed after the write)
//! Locked    --unlock-->  Unlocked   (only after the AEAD tag verifies)
//! Unlocked  --save-->    Unlocked   (same salt and key, fresh iv)
//! Unlocked  --lock-->    Locked     (key and payload dropped and zeroized)
//! any probed state --reset--> Uninitialized
//! ```
//!
//! Any other call fails with [`VaultError::InvalidState`]. Every failed call
//! leaves the previous state untouched.

use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cipher;
use crate::error::{Result, VaultError};
use crate::kdf::{self, DerivedKey};
use crate::migration::{MigrationCoordinator, ProbeOutcome, ProbeWarning};
use crate::password::validate_password_strength;
use crate::record::EncryptedRecord;
use crate::store::{LegacySlot, VaultStore};

/// Decrypted vault contents and the key that sealed them
///
/// Only ever lives inside [`SessionState::Unlocked`].
pub struct UnlockedVault<P> {
    key: DerivedKey,
    payload: P,
    record: EncryptedRecord,
}

/// Current session state
pub enum SessionState<P> {
    /// Startup probe not run yet
    Uninitialized,
    /// No vault, a password must be chosen
    Setup,
    /// Unencrypted legacy items waiting to be encrypted
    Migration(P),
    /// Encrypted record present, key not in memory
    Locked(EncryptedRecord),
    /// Key and decrypted payload in memory
    Unlocked(UnlockedVault<P>),
}

impl<P> SessionState<P> {
    /// Short state name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Setup => "in setup",
            SessionState::Migration(_) => "migrating",
            SessionState::Locked(_) => "locked",
            SessionState::Unlocked(_) => "unlocked",
        }
    }
}

impl<P> fmt::Debug for SessionState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionState({})", self.name())
    }
}

/// Owns the session state and the only in-memory copy of the key
pub struct SessionManager<S: VaultStore, P> {
    store: Arc<S>,
    state: SessionState<P>,
    warnings: Vec<ProbeWarning>,
}

impl<S, P> SessionManager<S, P>
where
    S: VaultStore,
    P: Serialize + DeserializeOwned,
{
    /// Create a manager over an injected store. Call [`probe`](Self::probe) next.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: SessionState::Uninitialized,
            warnings: Vec::new(),
        }
    }

    /// Inspect storage and route to Setup, Migration or Locked
    pub fn probe(&mut self) -> Result<&SessionState<P>> {
        if let SessionState::Unlocked(_) = self.state {
            return Err(self.invalid("probe"));
        }

        let report = MigrationCoordinator::new(self.store.as_ref()).probe::<P>()?;
        self.warnings = report.warnings;
        self.state = match report.outcome {
            ProbeOutcome::Locked(record) => SessionState::Locked(record),
            ProbeOutcome::Migration(items) => SessionState::Migration(items),
            ProbeOutcome::Setup => SessionState::Setup,
        };
        info!("Vault probe complete: {}", self.state.name());
        Ok(&self.state)
    }

    /// Create the vault from Setup or Migration and unlock it
    ///
    /// From Migration, legacy artifacts are deleted only after the new
    /// record is durably written.
    pub fn create(&mut self, password: &str, items: P) -> Result<()> {
        let migrating = match self.state {
            SessionState::Setup => false,
            SessionState::Migration(_) => true,
            _ => return Err(self.invalid("create")),
        };
        validate_password_strength(password)?;

        let salt = kdf::generate_salt();
        let key = kdf::derive_key(password, &salt);
        let mut record = EncryptedRecord::new(&salt, cipher::encrypt(&items, &key)?);

        if migrating {
            record = record.with_migrated_from(LegacySlot::PlaintextItems);
            MigrationCoordinator::new(self.store.as_ref()).complete(&record)?;
        } else {
            self.store.put(&record)?;
        }

        self.state = SessionState::Unlocked(UnlockedVault {
            key,
            payload: items,
            record,
        });
        self.warnings.clear();
        info!(migrated = migrating, "Vault created and unlocked");
        Ok(())
    }

    /// Unlock a locked vault
    ///
    /// A wrong password leaves the session locked and touches no storage.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let record = match &self.state {
            SessionState::Locked(record) => record,
            _ => return Err(self.invalid("unlock")),
        };

        let salt = record.salt_bytes()?;
        let key = kdf::derive_key(password, &salt);
        let payload: P = match cipher::decrypt(&record.iv, &record.ciphertext, &key) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Unlock rejected");
                return Err(e);
            }
        };

        let record = record.clone();
        self.state = SessionState::Unlocked(UnlockedVault {
            key,
            payload,
            record,
        });
        info!("Vault unlocked");
        Ok(())
    }

    /// Re-encrypt and persist new contents under the existing salt and key
    pub fn save(&mut self, items: P) -> Result<()> {
        let vault = match &mut self.state {
            SessionState::Unlocked(vault) => vault,
            _ => return Err(self.invalid("save")),
        };

        let record = vault
            .record
            .resealed(cipher::encrypt(&items, &vault.key)?);
        self.store.put(&record)?;

        vault.record = record;
        vault.payload = items;
        debug!("Vault saved");
        Ok(())
    }

    /// Drop the key and payload, keeping only the encrypted record
    pub fn lock(&mut self) -> Result<()> {
        if !self.is_unlocked() {
            return Err(self.invalid("lock"));
        }

        let previous = std::mem::replace(&mut self.state, SessionState::Uninitialized);
        if let SessionState::Unlocked(vault) = previous {
            let UnlockedVault { key, payload, record } = vault;
            drop(key);
            drop(payload);
            self.state = SessionState::Locked(record);
        }
        info!("Vault locked");
        Ok(())
    }

    /// Wipe the biometric escrow, the record and legacy artifacts
    ///
    /// Allowed from every probed state so a forgotten password can still be
    /// recovered from by starting over. The caller must probe again afterwards.
    /// The escrow goes first, so a failed wipe leaves the record in place.
    pub fn reset(&mut self) -> Result<()> {
        if let SessionState::Uninitialized = self.state {
            return Err(self.invalid("reset"));
        }

        self.store.clear_escrow()?;
        self.store.wipe()?;
        self.state = SessionState::Uninitialized;
        self.warnings.clear();
        warn!("Vault reset: all data wiped");
        Ok(())
    }

    /// Check a password against the unlocked vault without changing state
    pub fn verify_password(&self, password: &str) -> Result<()> {
        let vault = match &self.state {
            SessionState::Unlocked(vault) => vault,
            _ => return Err(self.invalid("verify_password")),
        };

        let key = kdf::derive_key(password, &vault.record.salt_bytes()?);
        cipher::open(&vault.record.iv, &vault.record.ciphertext, &key)?;
        Ok(())
    }
}

impl<S: VaultStore, P> SessionManager<S, P> {
    /// Current state
    pub fn state(&self) -> &SessionState<P> {
        &self.state
    }

    /// Whether key and payload are in memory
    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, SessionState::Unlocked(_))
    }

    /// Decrypted payload, only while unlocked
    pub fn payload(&self) -> Option<&P> {
        match &self.state {
            SessionState::Unlocked(vault) => Some(&vault.payload),
            _ => None,
        }
    }

    /// The persisted record as last known to this session
    pub fn record(&self) -> Option<&EncryptedRecord> {
        match &self.state {
            SessionState::Locked(record) => Some(record),
            SessionState::Unlocked(vault) => Some(&vault.record),
            _ => None,
        }
    }

    /// Warnings raised by the last probe
    pub fn probe_warnings(&self) -> &[ProbeWarning] {
        &self.warnings
    }

    /// The injected store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn invalid(&self, operation: &'static str) -> VaultError {
        VaultError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }
}
