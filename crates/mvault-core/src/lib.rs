//! mVault Core - vault security subsystem
//!
//! This crate provides the pieces that protect a local-first data vault:
//! - Password-based key derivation and authenticated encryption of the payload
//! - The single-record vault store and migration from older storage formats
//! - The lock/unlock session state machine
//! - Idle auto-lock and debounced autosave
//! - Optional biometric fast unlock backed by a platform authenticator
//!
//! Payloads are any `serde` type; the store never sees plaintext.

pub mod autosave;
pub mod biometric;
pub mod cipher;
pub mod config;
pub mod error;
pub mod idle;
pub mod kdf;
pub mod migration;
pub mod password;
pub mod record;
pub mod session;
pub mod store;
pub mod vault;

pub use biometric::{
    AssertionOutcome, BiometricError, BiometricEscrow, EscrowRecord, PlatformAuthenticator,
    Support,
};
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use kdf::{DerivedKey, PBKDF2_ITERATIONS};
pub use migration::{MigrationCoordinator, ProbeOutcome, ProbeWarning};
pub use password::{generate_strong_password, validate_new_password};
pub use record::EncryptedRecord;
pub use session::{SessionManager, SessionState};
pub use store::{FileVaultStore, LegacySlot, VaultStore};
pub use vault::{BiometricUnlock, Vault, VaultStatus};
