//! Startup probe and legacy format migration
//!
//! Storage locations are probed in strict priority order:
//!
//! 1. Current record present: `Locked`
//! 2. Legacy encrypted blob: copied into the current slot, legacy deleted, `Locked`
//! 3. Legacy plaintext items: `Migration(items)`, waiting for a password
//! 4. Nothing: `Setup`
//!
//! A corrupt current record is reported and skipped, so legacy data behind it
//! is still found. Legacy data is only deleted after the replacement record is
//! durably written, and only the slot the record names in `migrated_from`. If
//! deletion fails, the next probe finds the new record first and removes the
//! stale artifact.

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::error::{Result, VaultError};
use crate::record::{EncryptedRecord, LegacyEncryptedBlob, RECORD_ID};
use crate::store::{LegacySlot, VaultStore};

/// Where the probe routed the session
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<P> {
    /// A usable encrypted record exists
    Locked(EncryptedRecord),
    /// Unencrypted legacy items found, a password must be chosen
    Migration(P),
    /// No vault yet
    Setup,
}

/// Problems the probe worked around, to surface to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeWarning {
    /// The current record is unreadable and was ignored
    CorruptRecord(String),
    /// A legacy artifact could not be parsed and was left in place
    CorruptLegacy(LegacySlot, String),
}

/// Result of a startup probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport<P> {
    pub outcome: ProbeOutcome<P>,
    pub warnings: Vec<ProbeWarning>,
}

/// Probes storage and normalizes legacy formats
pub struct MigrationCoordinator<'a, S: VaultStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: VaultStore + ?Sized> MigrationCoordinator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Run the startup probe
    ///
    /// Only storage I/O failures are returned as errors; corrupt data is
    /// reported through [`ProbeReport::warnings`].
    pub fn probe<P: DeserializeOwned>(&self) -> Result<ProbeReport<P>> {
        let mut warnings = Vec::new();

        match self.store.get(RECORD_ID) {
            Ok(Some(record)) => {
                self.remove_stale_legacy(&record);
                return Ok(ProbeReport {
                    outcome: ProbeOutcome::Locked(record),
                    warnings,
                });
            }
            Ok(None) => {}
            Err(VaultError::Corruption(reason)) => {
                warn!("Vault record is corrupted, ignoring it: {}", reason);
                warnings.push(ProbeWarning::CorruptRecord(reason));
            }
            Err(e) => return Err(e),
        }

        if let Some(json) = self.store.read_legacy(LegacySlot::EncryptedBlob)? {
            match parse_legacy_blob(&json) {
                Ok(record) => {
                    self.store.put(&record)?;
                    if let Err(e) = self.store.remove_legacy(LegacySlot::EncryptedBlob) {
                        warn!("Legacy blob copied but not removed: {}", e);
                    }
                    info!("Migrated legacy encrypted blob to current record");
                    return Ok(ProbeReport {
                        outcome: ProbeOutcome::Locked(record),
                        warnings,
                    });
                }
                Err(reason) => {
                    warn!("Ignoring unreadable legacy blob: {}", reason);
                    warnings.push(ProbeWarning::CorruptLegacy(
                        LegacySlot::EncryptedBlob,
                        reason,
                    ));
                }
            }
        }

        if let Some(json) = self.store.read_legacy(LegacySlot::PlaintextItems)? {
            match serde_json::from_str::<P>(&json) {
                Ok(items) => {
                    info!("Unencrypted legacy items found, migration required");
                    return Ok(ProbeReport {
                        outcome: ProbeOutcome::Migration(items),
                        warnings,
                    });
                }
                Err(e) => {
                    warn!("Ignoring unreadable legacy items: {}", e);
                    warnings.push(ProbeWarning::CorruptLegacy(
                        LegacySlot::PlaintextItems,
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(ProbeReport {
            outcome: ProbeOutcome::Setup,
            warnings,
        })
    }

    /// Persist the record that replaces legacy data, then delete the legacy data
    ///
    /// If the write fails nothing is deleted.
    pub fn complete(&self, record: &EncryptedRecord) -> Result<()> {
        self.store.put(record)?;
        self.remove_stale_legacy(record);
        info!("Migration complete");
        Ok(())
    }

    fn remove_stale_legacy(&self, record: &EncryptedRecord) {
        for slot in LegacySlot::ALL {
            let present = match self.store.read_legacy(slot) {
                Ok(contents) => contents.is_some(),
                Err(e) => {
                    warn!("Failed to inspect legacy artifact {:?}: {}", slot, e);
                    continue;
                }
            };
            if !present {
                continue;
            }
            if record.migrated_from != Some(slot) {
                warn!("Legacy artifact {:?} was never migrated, leaving it in place", slot);
                continue;
            }
            match self.store.remove_legacy(slot) {
                Ok(()) => info!("Removed stale legacy artifact {:?}", slot),
                Err(e) => warn!("Failed to remove legacy artifact {:?}: {}", slot, e),
            }
        }
    }
}

fn parse_legacy_blob(json: &str) -> std::result::Result<EncryptedRecord, String> {
    let blob: LegacyEncryptedBlob = serde_json::from_str(json).map_err(|e| e.to_string())?;
    blob.into_record().map_err(|e| e.to_string())
}
