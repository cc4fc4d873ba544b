//! Error types for the vault subsystem
//!
//! Every platform, crypto and storage failure is normalized into one of the
//! variants below before it leaves the crate.

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur in vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// Weak or mismatched password. User-correctable, no state change.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// AEAD tag mismatch. Never says whether the key or the data was wrong.
    #[error("Decryption failed - wrong password or corrupted data")]
    Authentication,

    /// I/O failure reading or writing persisted data
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted record present but unusable
    #[error("Vault record is corrupted: {0}")]
    Corruption(String),

    /// Biometric path unavailable, denied or failed. Always non-fatal.
    #[error("Biometric error: {0}")]
    Hardware(String),

    /// Operation not legal in the current session state
    #[error("Operation '{operation}' is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

impl VaultError {
    /// Whether the user can fix this by retrying with different input
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, VaultError::Validation(_) | VaultError::Authentication)
    }
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            VaultError::Storage(e.to_string())
        } else {
            VaultError::Corruption(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(e: tokio::task::JoinError) -> Self {
        VaultError::Storage(format!("Background task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_message_is_uniform() {
        let msg = VaultError::Authentication.to_string();
        assert!(msg.contains("wrong password or corrupted data"));
    }

    #[test]
    fn test_json_syntax_error_is_corruption() {
        let err: VaultError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, VaultError::Corruption(_)));
    }

    #[test]
    fn test_user_correctable() {
        assert!(VaultError::Authentication.is_user_correctable());
        assert!(VaultError::Validation("short".into()).is_user_correctable());
        assert!(!VaultError::Storage("disk".into()).is_user_correctable());
    }
}
