//! Authenticated encryption of the vault payload
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call. The payload is
//! serialized to UTF-8 JSON before sealing; iv and ciphertext (tag appended)
//! are returned base64-encoded, ready for the persisted record.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::kdf::DerivedKey;

/// Size of the nonce in bytes (96 bits for AES-GCM)
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Output of a single encryption call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    /// Base64 nonce, unique per call
    pub iv: String,
    /// Base64 ciphertext with the tag appended
    pub ciphertext: String,
}

/// Serialize and encrypt a payload
pub fn encrypt<P: Serialize + ?Sized>(payload: &P, key: &DerivedKey) -> Result<Sealed> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload)
            .map_err(|e| VaultError::Storage(format!("Serialization failed: {}", e)))?,
    );
    seal(&plaintext, key)
}

/// Decrypt and deserialize a payload
///
/// Any tag mismatch, malformed nonce or malformed ciphertext yields
/// [`VaultError::Authentication`] and no plaintext.
pub fn decrypt<P: DeserializeOwned>(iv: &str, ciphertext: &str, key: &DerivedKey) -> Result<P> {
    let plaintext = open(iv, ciphertext, key)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Corruption(format!("Payload is not valid JSON: {}", e)))
}

/// Encrypt raw bytes under a fresh nonce
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> Result<Sealed> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Storage(format!("Encryption failed: {}", e)))?;

    Ok(Sealed {
        iv: B64.encode(nonce_bytes),
        ciphertext: B64.encode(ciphertext),
    })
}

/// Decrypt raw bytes
pub fn open(iv: &str, ciphertext: &str, key: &DerivedKey) -> Result<Zeroizing<Vec<u8>>> {
    let nonce_bytes = B64.decode(iv).map_err(|_| VaultError::Authentication)?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::Authentication);
    }
    let ciphertext = B64.decode(ciphertext).map_err(|_| VaultError::Authentication)?;
    if ciphertext.len() < TAG_SIZE {
        return Err(VaultError::Authentication);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Authentication)
}
