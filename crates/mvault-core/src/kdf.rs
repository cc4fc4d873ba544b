//! Password-based key derivation
//!
//! PBKDF2-HMAC-SHA256 with a fixed iteration count turns the master password
//! and the vault salt into a 256-bit AES key. The salt is generated once per
//! vault and never rotated; rotating it orphans every existing ciphertext.

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the derived key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the per-vault salt in bytes
pub const SALT_SIZE: usize = 16;

/// PBKDF2 iteration count. Lowering this requires a record version bump.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Symmetric key derived from the master password
///
/// Lives only inside an unlocked session and is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    /// Wrap raw key bytes (e.g. a secret released by an authenticator)
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes for a cipher call
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Derive the vault key from a password and salt
///
/// Deterministic: identical inputs always give the identical key.
pub fn derive_key(password: &str, salt: &[u8]) -> DerivedKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    DerivedKey(key)
}

/// Generate a fresh random vault salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}
