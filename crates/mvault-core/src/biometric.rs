//! Biometric fast unlock
//!
//! A platform authenticator (Touch ID, Windows Hello, ...) gates release of a
//! copy of the master password, which the caller then feeds through the normal
//! password unlock. Biometrics are a convenience path, not the cryptographic
//! boundary: the vault key is still derived from the password.
//!
//! # Escrow format
//!
//! The password is never stored in a reversible encoding. Enrollment creates a
//! credential and immediately asserts it with a random PRF salt; the
//! authenticator answers with a 32-byte credential-bound secret that only it
//! can reproduce, and that secret wraps the password with AES-256-GCM.
//!
//! ```json
//! { "credentialId": "<b64>", "prfSalt": "<b64>", "iv": "<b64>", "wrappedSecret": "<b64>", "createdAt": "..." }
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::cipher;
use crate::error::VaultError;
use crate::kdf::{DerivedKey, KEY_SIZE};
use crate::store::VaultStore;

/// Size of ceremony challenges in bytes
pub const CHALLENGE_SIZE: usize = 32;

/// Size of the PRF salt sent with each assertion
pub const PRF_SALT_SIZE: usize = 32;

/// Default relying party id
pub const DEFAULT_RELYING_PARTY: &str = "localhost";

/// Persisted escrow: `{credentialId, escrowedSecret}` where the secret is wrapped
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    pub credential_id: String,
    pub prf_salt: String,
    pub iv: String,
    pub wrapped_secret: String,
    pub created_at: DateTime<Utc>,
}

/// What the runtime reports about biometric capability
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorEnvironment {
    /// Running in a secure (HTTPS / localhost / native) context
    pub secure_context: bool,
    /// The credential API exists at all
    pub api_available: bool,
    /// A user-verifying platform authenticator is present
    pub platform_authenticator: bool,
}

/// Result of [`BiometricEscrow::support`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Support {
    Supported,
    Unsupported(BiometricError),
}

/// Parameters of a credential creation ceremony
#[derive(Clone, Debug)]
pub struct CredentialRequest {
    pub challenge: [u8; CHALLENGE_SIZE],
    pub relying_party: String,
    pub user_id: [u8; 16],
    pub user_name: String,
}

/// A newly created credential
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub id: Vec<u8>,
}

/// Parameters of a user-verifying assertion
#[derive(Clone, Debug)]
pub struct AssertionRequest {
    pub challenge: [u8; CHALLENGE_SIZE],
    pub relying_party: String,
    pub credential_id: Vec<u8>,
    pub prf_salt: [u8; PRF_SALT_SIZE],
}

/// A successful assertion with the credential-bound PRF output
pub struct Assertion {
    pub credential_id: Vec<u8>,
    pub prf_output: Zeroizing<[u8; KEY_SIZE]>,
}

/// Ways a ceremony can fail on the platform side
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CeremonyError {
    /// User cancelled, denied, or timed out
    #[error("not allowed")]
    NotAllowed,
    /// Authenticator already holds a credential for this relying party
    #[error("invalid state")]
    InvalidState,
    /// Context or relying party rejected by the platform
    #[error("security error: {0}")]
    Security(String),
    /// Required capability (e.g. PRF) missing
    #[error("not supported")]
    NotSupported,
    /// Anything else reported by the device
    #[error("hardware failure: {0}")]
    Hardware(String),
}

/// Platform authenticator abstraction
///
/// Implementations bridge to the OS or browser credential API. Both
/// ceremonies require user verification.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Report runtime capability
    async fn environment(&self) -> AuthenticatorEnvironment;

    /// Enroll a new credential
    async fn create_credential(
        &self,
        request: CredentialRequest,
    ) -> std::result::Result<Credential, CeremonyError>;

    /// Request a user-verifying assertion and evaluate the PRF for `prf_salt`
    async fn get_assertion(
        &self,
        request: AssertionRequest,
    ) -> std::result::Result<Assertion, CeremonyError>;

    /// Authenticator name for logs
    fn authenticator_type(&self) -> &'static str;
}

/// Caller-visible biometric failure reasons
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BiometricError {
    #[error("Insecure context - biometrics require HTTPS or localhost")]
    InsecureContext,

    #[error("Biometric API not available on this platform")]
    UnsupportedHardware,

    #[error("No biometric authenticator detected or enabled")]
    NoAuthenticator,

    #[error("Biometrics cannot be bound to an IP address: {0}")]
    InvalidRelyingParty(String),

    #[error("Authenticator already enrolled")]
    AlreadyEnrolled,

    #[error("Biometric verification denied or cancelled")]
    Denied,

    #[error("Authenticator failure: {0}")]
    Hardware(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<BiometricError> for VaultError {
    fn from(e: BiometricError) -> Self {
        VaultError::Hardware(e.to_string())
    }
}

impl From<CeremonyError> for BiometricError {
    fn from(e: CeremonyError) -> Self {
        match e {
            CeremonyError::NotAllowed => BiometricError::Denied,
            CeremonyError::InvalidState => BiometricError::AlreadyEnrolled,
            CeremonyError::Security(_) => BiometricError::InsecureContext,
            CeremonyError::NotSupported => BiometricError::UnsupportedHardware,
            CeremonyError::Hardware(msg) => BiometricError::Hardware(msg),
        }
    }
}

/// Result of a biometric unlock attempt
pub enum AssertionOutcome {
    /// Escrowed password recovered; feed it to `unlock`
    Success(Zeroizing<String>),
    /// User denied or cancelled
    Denied,
    /// No enrollment or no capable hardware
    Unsupported,
    /// Device or escrow failure
    HardwareError(String),
}

impl AssertionOutcome {
    /// The recovered password, or `None` to fall back to manual entry
    pub fn into_secret(self) -> Option<Zeroizing<String>> {
        match self {
            AssertionOutcome::Success(secret) => Some(secret),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AssertionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssertionOutcome::Success(_) => f.write_str("Success(<redacted>)"),
            AssertionOutcome::Denied => f.write_str("Denied"),
            AssertionOutcome::Unsupported => f.write_str("Unsupported"),
            AssertionOutcome::HardwareError(msg) => write!(f, "HardwareError({})", msg),
        }
    }
}

/// Biometric escrow of the master password
pub struct BiometricEscrow<S: VaultStore, A: PlatformAuthenticator> {
    store: Arc<S>,
    authenticator: Arc<A>,
    relying_party: String,
}

impl<S: VaultStore, A: PlatformAuthenticator> BiometricEscrow<S, A> {
    pub fn new(store: Arc<S>, authenticator: Arc<A>, relying_party: impl Into<String>) -> Self {
        let relying_party = relying_party.into();
        Self {
            store,
            authenticator,
            relying_party: if relying_party.is_empty() {
                DEFAULT_RELYING_PARTY.to_string()
            } else {
                relying_party
            },
        }
    }

    /// Check whether biometric unlock can be offered here
    pub async fn support(&self) -> Support {
        let env = self.authenticator.environment().await;
        if !env.secure_context {
            return Support::Unsupported(BiometricError::InsecureContext);
        }
        if !env.api_available {
            return Support::Unsupported(BiometricError::UnsupportedHardware);
        }
        if !env.platform_authenticator {
            return Support::Unsupported(BiometricError::NoAuthenticator);
        }
        if self.relying_party.parse::<IpAddr>().is_ok() {
            return Support::Unsupported(BiometricError::InvalidRelyingParty(
                self.relying_party.clone(),
            ));
        }
        Support::Supported
    }

    /// Whether an escrow record exists
    pub fn is_enrolled(&self) -> crate::Result<bool> {
        Ok(self.store.load_escrow()?.is_some())
    }

    /// Enroll a credential and escrow `password` behind it
    ///
    /// The caller is responsible for verifying `password` against the vault
    /// first.
    pub async fn register(&self, password: &str) -> std::result::Result<(), BiometricError> {
        if let Support::Unsupported(reason) = self.support().await {
            return Err(reason);
        }
        match self.store.load_escrow() {
            Ok(Some(_)) => return Err(BiometricError::AlreadyEnrolled),
            Ok(None) => {}
            Err(e) => return Err(BiometricError::Storage(e.to_string())),
        }

        let mut user_id = [0u8; 16];
        OsRng.fill_bytes(&mut user_id);
        let credential = self
            .authenticator
            .create_credential(CredentialRequest {
                challenge: random_challenge(),
                relying_party: self.relying_party.clone(),
                user_id,
                user_name: "mvault-user".to_string(),
            })
            .await
            .map_err(|e| {
                warn!("Biometric enrollment failed: {}", e);
                BiometricError::from(e)
            })?;

        let mut prf_salt = [0u8; PRF_SALT_SIZE];
        OsRng.fill_bytes(&mut prf_salt);
        let assertion = self
            .authenticator
            .get_assertion(AssertionRequest {
                challenge: random_challenge(),
                relying_party: self.relying_party.clone(),
                credential_id: credential.id.clone(),
                prf_salt,
            })
            .await?;

        let wrapping_key = DerivedKey::from_bytes(*assertion.prf_output);
        let sealed = cipher::seal(password.as_bytes(), &wrapping_key)
            .map_err(|e| BiometricError::Hardware(e.to_string()))?;

        let record = EscrowRecord {
            credential_id: B64.encode(&credential.id),
            prf_salt: B64.encode(prf_salt),
            iv: sealed.iv,
            wrapped_secret: sealed.ciphertext,
            created_at: Utc::now(),
        };
        self.store
            .save_escrow(&record)
            .map_err(|e| BiometricError::Storage(e.to_string()))?;

        info!(
            "Biometric unlock enrolled via {}",
            self.authenticator.authenticator_type()
        );
        Ok(())
    }

    /// Ask the authenticator to release the escrowed password
    pub async fn authenticate(&self) -> AssertionOutcome {
        let record = match self.store.load_escrow() {
            Ok(Some(record)) => record,
            Ok(None) => return AssertionOutcome::Unsupported,
            Err(e) => return AssertionOutcome::HardwareError(e.to_string()),
        };
        if let Support::Unsupported(reason) = self.support().await {
            warn!("Biometric unlock unavailable: {}", reason);
            return AssertionOutcome::Unsupported;
        }

        let (credential_id, prf_salt) = match decode_record(&record) {
            Ok(decoded) => decoded,
            Err(msg) => return AssertionOutcome::HardwareError(msg),
        };

        let assertion = match self
            .authenticator
            .get_assertion(AssertionRequest {
                challenge: random_challenge(),
                relying_party: self.relying_party.clone(),
                credential_id: credential_id.clone(),
                prf_salt,
            })
            .await
        {
            Ok(assertion) => assertion,
            Err(CeremonyError::NotAllowed) => return AssertionOutcome::Denied,
            Err(CeremonyError::NotSupported) => return AssertionOutcome::Unsupported,
            Err(e) => return AssertionOutcome::HardwareError(e.to_string()),
        };

        if assertion.credential_id != credential_id {
            return AssertionOutcome::HardwareError("Assertion for unknown credential".to_string());
        }

        let wrapping_key = DerivedKey::from_bytes(*assertion.prf_output);
        let secret = match cipher::open(&record.iv, &record.wrapped_secret, &wrapping_key) {
            Ok(secret) => secret,
            Err(_) => {
                return AssertionOutcome::HardwareError(
                    "Escrowed secret failed verification".to_string(),
                )
            }
        };

        match String::from_utf8(secret.to_vec()) {
            Ok(password) => AssertionOutcome::Success(Zeroizing::new(password)),
            Err(_) => AssertionOutcome::HardwareError("Escrowed secret is not UTF-8".to_string()),
        }
    }

    /// Remove the escrow record. Never touches the vault record.
    pub fn disable(&self) -> crate::Result<()> {
        self.store.clear_escrow()?;
        info!("Biometric unlock disabled");
        Ok(())
    }
}

fn random_challenge() -> [u8; CHALLENGE_SIZE] {
    let mut challenge = [0u8; CHALLENGE_SIZE];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

fn decode_record(
    record: &EscrowRecord,
) -> std::result::Result<(Vec<u8>, [u8; PRF_SALT_SIZE]), String> {
    let credential_id = B64
        .decode(&record.credential_id)
        .map_err(|e| format!("Invalid credential id: {}", e))?;
    let prf_salt: [u8; PRF_SALT_SIZE] = B64
        .decode(&record.prf_salt)
        .map_err(|e| format!("Invalid PRF salt: {}", e))?
        .try_into()
        .map_err(|_| "Invalid PRF salt length".to_string())?;
    Ok((credential_id, prf_salt))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::RECORD_ID;
    use crate::store::FileVaultStore;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// In-process authenticator: PRF output is SHA-256(device secret || credential || salt)
    pub(crate) struct MockAuthenticator {
        pub env: AuthenticatorEnvironment,
        pub deny: AtomicBool,
        device_secret: [u8; 32],
        credentials: Mutex<Vec<Vec<u8>>>,
    }

    impl MockAuthenticator {
        pub(crate) fn new() -> Self {
            Self {
                env: AuthenticatorEnvironment {
                    secure_context: true,
                    api_available: true,
                    platform_authenticator: true,
                },
                deny: AtomicBool::new(false),
                device_secret: [0x5A; 32],
                credentials: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlatformAuthenticator for MockAuthenticator {
        async fn environment(&self) -> AuthenticatorEnvironment {
            self.env.clone()
        }

        async fn create_credential(
            &self,
            request: CredentialRequest,
        ) -> std::result::Result<Credential, CeremonyError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(CeremonyError::NotAllowed);
            }
            let id = Sha256::digest(request.user_id).to_vec();
            self.credentials.lock().unwrap().push(id.clone());
            Ok(Credential { id })
        }

        async fn get_assertion(
            &self,
            request: AssertionRequest,
        ) -> std::result::Result<Assertion, CeremonyError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(CeremonyError::NotAllowed);
            }
            if !self.credentials.lock().unwrap().contains(&request.credential_id) {
                return Err(CeremonyError::Hardware("unknown credential".to_string()));
            }
            let mut hasher = Sha256::new();
            hasher.update(self.device_secret);
            hasher.update(&request.credential_id);
            hasher.update(request.prf_salt);
            let mut prf_output = Zeroizing::new([0u8; KEY_SIZE]);
            prf_output.copy_from_slice(&hasher.finalize());
            Ok(Assertion {
                credential_id: request.credential_id,
                prf_output,
            })
        }

        fn authenticator_type(&self) -> &'static str {
            "mock"
        }
    }

    fn escrow_with(
        authenticator: MockAuthenticator,
        relying_party: &str,
    ) -> (tempfile::TempDir, BiometricEscrow<FileVaultStore, MockAuthenticator>) {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(FileVaultStore::new(temp_dir.path()).unwrap());
        let escrow = BiometricEscrow::new(store, Arc::new(authenticator), relying_party);
        (temp_dir, escrow)
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (_dir, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        escrow.register("Tr0ub4dor&3").await.unwrap();
        assert!(escrow.is_enrolled().unwrap());

        let secret = escrow.authenticate().await.into_secret().unwrap();
        assert_eq!(secret.as_str(), "Tr0ub4dor&3");
    }

    #[tokio::test]
    async fn test_escrow_does_not_store_password_encoding() {
        let (dir, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        escrow.register("Tr0ub4dor&3").await.unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("biometric.json")).unwrap();
        assert!(!on_disk.contains("Tr0ub4dor&3"));
        assert!(!on_disk.contains(&B64.encode("Tr0ub4dor&3")));
    }

    #[tokio::test]
    async fn test_register_reasons() {
        let mut insecure = MockAuthenticator::new();
        insecure.env.secure_context = false;
        let (_d1, escrow) = escrow_with(insecure, "localhost");
        assert_eq!(escrow.register("password1").await, Err(BiometricError::InsecureContext));

        let mut no_api = MockAuthenticator::new();
        no_api.env.api_available = false;
        let (_d2, escrow) = escrow_with(no_api, "localhost");
        assert_eq!(
            escrow.register("password1").await,
            Err(BiometricError::UnsupportedHardware)
        );

        let mut no_device = MockAuthenticator::new();
        no_device.env.platform_authenticator = false;
        let (_d3, escrow) = escrow_with(no_device, "localhost");
        assert_eq!(escrow.register("password1").await, Err(BiometricError::NoAuthenticator));

        let (_d4, escrow) = escrow_with(MockAuthenticator::new(), "192.168.1.10");
        assert!(matches!(
            escrow.register("password1").await,
            Err(BiometricError::InvalidRelyingParty(_))
        ));

        let (_d5, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        escrow.register("password1").await.unwrap();
        assert_eq!(escrow.register("password1").await, Err(BiometricError::AlreadyEnrolled));
    }

    #[tokio::test]
    async fn test_denied_assertion_falls_back() {
        let (_dir, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        escrow.register("password1").await.unwrap();

        escrow.authenticator.deny.store(true, Ordering::SeqCst);
        assert!(matches!(escrow.authenticate().await, AssertionOutcome::Denied));
    }

    #[tokio::test]
    async fn test_not_enrolled_is_unsupported() {
        let (_dir, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        assert!(matches!(escrow.authenticate().await, AssertionOutcome::Unsupported));
    }

    #[tokio::test]
    async fn test_tampered_escrow_is_hardware_error() {
        let (_dir, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        escrow.register("password1").await.unwrap();

        let mut record = escrow.store.load_escrow().unwrap().unwrap();
        record.prf_salt = B64.encode([0u8; PRF_SALT_SIZE]);
        escrow.store.save_escrow(&record).unwrap();

        assert!(matches!(
            escrow.authenticate().await,
            AssertionOutcome::HardwareError(_)
        ));
    }

    #[tokio::test]
    async fn test_disable_leaves_vault_record() {
        let (_dir, escrow) = escrow_with(MockAuthenticator::new(), "localhost");
        let key = DerivedKey::from_bytes([1u8; KEY_SIZE]);
        let record = crate::record::EncryptedRecord::new(
            &[1u8; crate::kdf::SALT_SIZE],
            cipher::seal(b"[]", &key).unwrap(),
        );
        escrow.store.put(&record).unwrap();
        escrow.register("password1").await.unwrap();

        escrow.disable().unwrap();
        assert!(!escrow.is_enrolled().unwrap());
        assert_eq!(escrow.store.get(RECORD_ID).unwrap(), Some(record));
    }
}
