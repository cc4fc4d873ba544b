//! Async vault handle
//!
//! [`Vault`] serializes every session operation behind one async mutex and
//! owns the two timers that act on an unlocked session: the idle auto-lock and
//! the autosave debouncer. Both are torn down on every exit from Unlocked, so
//! a pending save is never flushed with a discarded key and a stale countdown
//! never locks a later session.
//!
//! Key derivation and disk writes run on the blocking pool. The mutex guard
//! moves into the blocking task with them, so operations stay serialized.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::autosave::Autosave;
use crate::biometric::{AssertionOutcome, BiometricEscrow, PlatformAuthenticator};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::idle::IdleMonitor;
use crate::migration::ProbeWarning;
use crate::session::{SessionManager, SessionState};
use crate::store::VaultStore;

/// Coarse session status, safe to hand out of the lock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VaultStatus {
    Uninitialized,
    Setup,
    Migration,
    Locked,
    Unlocked,
}

impl<P> From<&SessionState<P>> for VaultStatus {
    fn from(state: &SessionState<P>) -> Self {
        match state {
            SessionState::Uninitialized => VaultStatus::Uninitialized,
            SessionState::Setup => VaultStatus::Setup,
            SessionState::Migration(_) => VaultStatus::Migration,
            SessionState::Locked(_) => VaultStatus::Locked,
            SessionState::Unlocked(_) => VaultStatus::Unlocked,
        }
    }
}

/// Outcome of a biometric unlock attempt that did not fail outright
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BiometricUnlock {
    Unlocked,
    /// Denied, cancelled, not enrolled or the authenticator failed; ask for
    /// the password instead
    Fallback,
}

struct Inner<S: VaultStore, P> {
    session: SessionManager<S, P>,
    idle: Option<IdleMonitor>,
    idle_generation: u64,
    autosave: Autosave<P>,
    autosave_error: Option<VaultError>,
}

impl<S: VaultStore, P> Inner<S, P> {
    fn stop_timers(&mut self) {
        if let Some(monitor) = self.idle.take() {
            monitor.stop();
        }
        if self.autosave.cancel() {
            info!("Pending autosave dropped");
        }
        self.autosave_error = None;
    }

    fn ensure_unlocked(&self, operation: &'static str) -> Result<()> {
        if self.session.is_unlocked() {
            Ok(())
        } else {
            Err(VaultError::InvalidState {
                operation,
                state: self.session.state().name(),
            })
        }
    }
}

type Shared<S, P> = Arc<Mutex<Inner<S, P>>>;

/// Result of writing a pending autosave; the payload comes back on failure
type FlushOutcome<P> = Option<std::result::Result<(), (VaultError, P)>>;

/// Shared, cloneable handle to one vault session
pub struct Vault<S: VaultStore, P> {
    inner: Shared<S, P>,
    idle_timeout: Option<Duration>,
}

impl<S: VaultStore, P> Clone for Vault<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            idle_timeout: self.idle_timeout,
        }
    }
}

impl<S, P> Vault<S, P>
where
    S: VaultStore + 'static,
    P: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Wrap a store using the timings from `config`
    pub fn new(store: Arc<S>, config: &VaultConfig) -> Self {
        Self::with_timings(store, config.idle_timeout(), config.autosave_debounce())
    }

    /// Wrap a store with explicit timings. `idle_timeout: None` disables auto-lock.
    pub fn with_timings(store: Arc<S>, idle_timeout: Option<Duration>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session: SessionManager::new(store),
                idle: None,
                idle_generation: 0,
                autosave: Autosave::new(debounce),
                autosave_error: None,
            })),
            idle_timeout,
        }
    }

    /// Run the startup probe
    pub async fn probe(&self) -> Result<VaultStatus> {
        let (_, status) = run_blocking(Arc::clone(&self.inner), |inner| {
            inner.session.probe().map(VaultStatus::from)
        })
        .await?;
        status
    }

    pub async fn status(&self) -> VaultStatus {
        VaultStatus::from(self.inner.lock().await.session.state())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.inner.lock().await.session.is_unlocked()
    }

    pub async fn probe_warnings(&self) -> Vec<ProbeWarning> {
        self.inner.lock().await.session.probe_warnings().to_vec()
    }

    /// Items waiting for migration, if the probe found legacy plaintext
    pub async fn migration_items(&self) -> Option<P> {
        match self.inner.lock().await.session.state() {
            SessionState::Migration(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Copy of the decrypted payload while unlocked
    pub async fn payload(&self) -> Option<P> {
        self.inner.lock().await.session.payload().cloned()
    }

    /// Create the vault from Setup or Migration and start the idle countdown
    pub async fn create(&self, password: &str, items: P) -> Result<()> {
        let password = Zeroizing::new(password.to_owned());
        let (mut inner, result) = run_blocking(Arc::clone(&self.inner), move |inner| {
            inner.session.create(&password, items)
        })
        .await?;
        result?;
        self.start_idle(&mut inner);
        Ok(())
    }

    /// Unlock with the master password and start the idle countdown
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let password = Zeroizing::new(password.to_owned());
        let (mut inner, result) = run_blocking(Arc::clone(&self.inner), move |inner| {
            inner.session.unlock(&password)
        })
        .await?;
        result?;
        self.start_idle(&mut inner);
        Ok(())
    }

    /// Unlock with a password released by the biometric escrow
    ///
    /// Denial, missing enrollment and authenticator failures all fall back to
    /// manual entry. An escrowed password that no longer opens the vault
    /// surfaces as `Authentication`.
    pub async fn unlock_with_biometrics<A: PlatformAuthenticator>(
        &self,
        escrow: &BiometricEscrow<S, A>,
    ) -> Result<BiometricUnlock> {
        match escrow.authenticate().await {
            AssertionOutcome::Success(password) => {
                self.unlock(&password).await?;
                info!("Vault unlocked with biometrics");
                Ok(BiometricUnlock::Unlocked)
            }
            AssertionOutcome::Denied => {
                info!("Biometric unlock denied, falling back to password");
                Ok(BiometricUnlock::Fallback)
            }
            AssertionOutcome::Unsupported => Ok(BiometricUnlock::Fallback),
            AssertionOutcome::HardwareError(msg) => {
                warn!("Biometric unlock failed, falling back to password: {}", msg);
                Ok(BiometricUnlock::Fallback)
            }
        }
    }

    /// Escrow the master password for biometric unlock after re-verifying it
    pub async fn enroll_biometrics<A: PlatformAuthenticator>(
        &self,
        escrow: &BiometricEscrow<S, A>,
        password: &str,
    ) -> Result<()> {
        self.verify_password(password).await?;
        escrow.register(password).await?;
        Ok(())
    }

    /// Check a password against the unlocked vault
    pub async fn verify_password(&self, password: &str) -> Result<()> {
        let password = Zeroizing::new(password.to_owned());
        let (_, result) = run_blocking(Arc::clone(&self.inner), move |inner| {
            inner.session.verify_password(&password)
        })
        .await?;
        result
    }

    /// Persist immediately, superseding any pending autosave
    ///
    /// A failed write leaves the session and any pending autosave as they were.
    pub async fn save(&self, items: P) -> Result<()> {
        let (_, result) = run_blocking(Arc::clone(&self.inner), move |inner| -> Result<()> {
            inner.ensure_unlocked("save")?;
            inner.session.save(items)?;
            inner.autosave.cancel();
            inner.autosave_error = None;
            Ok(())
        })
        .await?;
        result
    }

    /// Queue a save; edits inside the debounce window collapse into one write
    pub async fn schedule_save(&self, items: P) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_unlocked("schedule_save")?;
        arm_autosave(&mut inner, Arc::downgrade(&self.inner), items);
        Ok(())
    }

    /// Write the pending autosave now. Returns whether anything was written.
    ///
    /// On failure the edit stays pending and the debounce timer is re-armed.
    pub async fn flush(&self) -> Result<bool> {
        let (mut inner, outcome) = run_blocking(Arc::clone(&self.inner), |inner| {
            write_pending(inner, |autosave| autosave.take())
        })
        .await?;
        match outcome {
            None => Ok(false),
            Some(Ok(())) => {
                inner.autosave_error = None;
                debug!("Autosave flushed");
                Ok(true)
            }
            Some(Err((e, retry))) => {
                arm_autosave(&mut inner, Arc::downgrade(&self.inner), retry);
                Err(e)
            }
        }
    }

    pub async fn has_pending_save(&self) -> bool {
        self.inner.lock().await.autosave.is_pending()
    }

    /// Error from the most recent background autosave, if it failed
    ///
    /// Cleared by the next successful write and by leaving Unlocked.
    pub async fn take_autosave_error(&self) -> Option<VaultError> {
        self.inner.lock().await.autosave_error.take()
    }

    /// Reset the idle countdown
    pub async fn record_activity(&self) {
        if let Some(monitor) = self.inner.lock().await.idle.as_ref() {
            monitor.record_activity();
        }
    }

    /// Lock now. Any pending autosave is dropped, not written.
    pub async fn lock(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_unlocked("lock")?;
        inner.stop_timers();
        inner.session.lock()
    }

    /// Wipe everything and return to Uninitialized
    ///
    /// Timers are only torn down once the wipe succeeded; a failed reset
    /// leaves the session, its idle countdown and any pending save running.
    pub async fn reset(&self) -> Result<()> {
        let (mut inner, result) =
            run_blocking(Arc::clone(&self.inner), |inner| inner.session.reset()).await?;
        result?;
        inner.stop_timers();
        Ok(())
    }

    fn start_idle(&self, inner: &mut Inner<S, P>) {
        if let Some(previous) = inner.idle.take() {
            previous.stop();
        }
        let timeout = match self.idle_timeout {
            Some(timeout) => timeout,
            None => return,
        };

        inner.idle_generation += 1;
        let generation = inner.idle_generation;
        let weak = Arc::downgrade(&self.inner);
        inner.idle = Some(IdleMonitor::start(timeout, move || {
            lock_on_idle(weak, generation)
        }));
    }
}

/// Run `f` on the blocking pool while holding the session lock
///
/// The guard is handed back so the caller can adjust timers before anyone
/// else observes the new state.
async fn run_blocking<S, P, R, F>(
    shared: Shared<S, P>,
    f: F,
) -> Result<(OwnedMutexGuard<Inner<S, P>>, R)>
where
    S: VaultStore + 'static,
    P: Send + 'static,
    F: FnOnce(&mut Inner<S, P>) -> R + Send + 'static,
    R: Send + 'static,
{
    let mut guard = shared.lock_owned().await;
    let (guard, result) = tokio::task::spawn_blocking(move || {
        let result = f(&mut *guard);
        (guard, result)
    })
    .await?;
    Ok((guard, result))
}

/// Claim the pending payload with `claim` and write it
fn write_pending<S, P>(
    inner: &mut Inner<S, P>,
    claim: impl FnOnce(&mut Autosave<P>) -> Option<P>,
) -> FlushOutcome<P>
where
    S: VaultStore,
    P: Serialize + DeserializeOwned + Clone,
{
    let items = claim(&mut inner.autosave)?;
    let retry = items.clone();
    Some(inner.session.save(items).map_err(|e| (e, retry)))
}

fn arm_autosave<S, P>(inner: &mut Inner<S, P>, weak: Weak<Mutex<Inner<S, P>>>, items: P)
where
    S: VaultStore + 'static,
    P: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    inner
        .autosave
        .schedule(items, move |generation| flush_due(weak, generation));
}

async fn lock_on_idle<S, P>(weak: Weak<Mutex<Inner<S, P>>>, generation: u64)
where
    S: VaultStore,
    P: Serialize + DeserializeOwned,
{
    let shared = match weak.upgrade() {
        Some(shared) => shared,
        None => return,
    };
    let mut inner = shared.lock().await;
    if inner.idle_generation != generation || !inner.session.is_unlocked() {
        return;
    }

    if let Some(monitor) = inner.idle.take() {
        monitor.release();
    }
    if inner.autosave.cancel() {
        info!("Pending autosave dropped");
    }
    inner.autosave_error = None;
    match inner.session.lock() {
        Ok(()) => info!("Vault auto-locked after inactivity"),
        Err(e) => warn!("Idle lock failed: {}", e),
    }
}

async fn flush_due<S, P>(weak: Weak<Mutex<Inner<S, P>>>, generation: u64)
where
    S: VaultStore + 'static,
    P: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    let shared = match weak.upgrade() {
        Some(shared) => shared,
        None => return,
    };
    let outcome = run_blocking(shared, move |inner| {
        write_pending(inner, |autosave| autosave.take_due(generation))
    })
    .await;

    let (mut inner, outcome) = match outcome {
        Ok(done) => done,
        Err(e) => {
            warn!("Autosave task failed: {}", e);
            return;
        }
    };
    match outcome {
        None => {}
        Some(Ok(())) => {
            inner.autosave_error = None;
            debug!("Autosave flushed");
        }
        Some(Err((e, retry))) => {
            warn!(
                "Autosave failed, retrying in {:?}: {}",
                inner.autosave.window(),
                e
            );
            inner.autosave_error = Some(e);
            arm_autosave(&mut inner, weak, retry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::tests::MockAuthenticator;
    use crate::biometric::PRF_SALT_SIZE;
    use crate::record::RECORD_ID;
    use crate::store::tests::FlakyStore;
    use crate::store::FileVaultStore;
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use tempfile::{tempdir, TempDir};
    use tokio::time;

    const PASSWORD: &str = "Tr0ub4dor&3";

    async fn unlocked_vault(idle: Option<Duration>) -> (TempDir, Vault<FileVaultStore, Value>) {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(FileVaultStore::new(temp_dir.path()).unwrap());
        let vault = Vault::with_timings(store, idle, Duration::from_millis(500));
        assert_eq!(vault.probe().await.unwrap(), VaultStatus::Setup);
        vault.create(PASSWORD, json!([])).await.unwrap();
        (temp_dir, vault)
    }

    async fn flaky_vault(
        idle: Option<Duration>,
    ) -> (TempDir, Arc<FlakyStore>, Vault<FlakyStore, Value>) {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(FlakyStore::new(FileVaultStore::new(temp_dir.path()).unwrap()));
        let vault = Vault::with_timings(Arc::clone(&store), idle, Duration::from_millis(500));
        vault.probe().await.unwrap();
        vault.create(PASSWORD, json!([])).await.unwrap();
        (temp_dir, store, vault)
    }

    async fn stored_items<S: VaultStore + 'static>(vault: &Vault<S, Value>) -> Value {
        let inner = vault.inner.lock().await;
        let record = inner.session.store().get(RECORD_ID).unwrap().unwrap();
        let key = crate::kdf::derive_key(PASSWORD, &record.salt_bytes().unwrap());
        crate::cipher::decrypt(&record.iv, &record.ciphertext, &key).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_save_coalesces() {
        let (_dir, vault) = unlocked_vault(None).await;

        vault.schedule_save(json!([1])).await.unwrap();
        time::sleep(Duration::from_millis(200)).await;
        vault.schedule_save(json!([1, 2])).await.unwrap();
        assert!(vault.has_pending_save().await);

        time::sleep(Duration::from_millis(600)).await;
        assert!(!vault.has_pending_save().await);
        assert_eq!(vault.payload().await, Some(json!([1, 2])));
        assert_eq!(stored_items(&vault).await, json!([1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_drops_pending_save() {
        let (_dir, vault) = unlocked_vault(None).await;

        vault.schedule_save(json!(["unsaved"])).await.unwrap();
        vault.lock().await.unwrap();
        time::sleep(Duration::from_secs(2)).await;

        vault.unlock(PASSWORD).await.unwrap();
        assert_eq!(vault.payload().await, Some(json!([])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let (_dir, vault) = unlocked_vault(None).await;

        assert!(!vault.flush().await.unwrap());
        vault.schedule_save(json!(["now"])).await.unwrap();
        assert!(vault.flush().await.unwrap());
        assert_eq!(stored_items(&vault).await, json!(["now"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_lock_and_relock_cycle() {
        let (_dir, vault) = unlocked_vault(Some(Duration::from_secs(300))).await;

        time::sleep(Duration::from_secs(301)).await;
        assert_eq!(vault.status().await, VaultStatus::Locked);
        assert!(vault.inner.lock().await.idle.is_none());

        // A second session gets exactly one fresh countdown
        vault.unlock(PASSWORD).await.unwrap();
        time::sleep(Duration::from_secs(200)).await;
        vault.record_activity().await;
        time::sleep(Duration::from_secs(200)).await;
        assert_eq!(vault.status().await, VaultStatus::Unlocked);

        time::sleep(Duration::from_secs(101)).await;
        assert_eq!(vault.status().await, VaultStatus::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_lock_cancels_idle() {
        let (_dir, vault) = unlocked_vault(Some(Duration::from_secs(300))).await;

        time::sleep(Duration::from_secs(250)).await;
        vault.lock().await.unwrap();
        vault.unlock(PASSWORD).await.unwrap();

        // The first session's deadline passes without effect
        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(vault.status().await, VaultStatus::Unlocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_save_requires_unlock() {
        let (_dir, vault) = unlocked_vault(None).await;
        vault.lock().await.unwrap();
        assert!(matches!(
            vault.schedule_save(json!([])).await,
            Err(VaultError::InvalidState { operation: "schedule_save", .. })
        ));
    }

    #[tokio::test]
    async fn test_biometric_unlock() {
        let (_dir, vault) = unlocked_vault(None).await;
        let store = Arc::clone(vault.inner.lock().await.session.store());
        let escrow = BiometricEscrow::new(store, Arc::new(MockAuthenticator::new()), "localhost");

        assert!(vault.enroll_biometrics(&escrow, "wrong-password").await.is_err());
        vault.enroll_biometrics(&escrow, PASSWORD).await.unwrap();
        vault.lock().await.unwrap();

        assert_eq!(
            vault.unlock_with_biometrics(&escrow).await.unwrap(),
            BiometricUnlock::Unlocked
        );
        assert!(vault.is_unlocked().await);
    }

    #[tokio::test]
    async fn test_biometric_fallback_when_not_enrolled() {
        let (_dir, vault) = unlocked_vault(None).await;
        let store = Arc::clone(vault.inner.lock().await.session.store());
        let escrow = BiometricEscrow::new(store, Arc::new(MockAuthenticator::new()), "localhost");
        vault.lock().await.unwrap();

        assert_eq!(
            vault.unlock_with_biometrics(&escrow).await.unwrap(),
            BiometricUnlock::Fallback
        );
        assert_eq!(vault.status().await, VaultStatus::Locked);
    }

    #[tokio::test]
    async fn test_reset_clears_escrow() {
        let (dir, vault) = unlocked_vault(None).await;
        let store = Arc::clone(vault.inner.lock().await.session.store());
        let escrow = BiometricEscrow::new(store, Arc::new(MockAuthenticator::new()), "localhost");
        vault.enroll_biometrics(&escrow, PASSWORD).await.unwrap();

        vault.reset().await.unwrap();
        assert!(!escrow.is_enrolled().unwrap());
        assert!(!dir.path().join("vault.json").exists());
        assert_eq!(vault.probe().await.unwrap(), VaultStatus::Setup);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reset_keeps_session_and_timers() {
        let (_dir, store, vault) = flaky_vault(Some(Duration::from_secs(60))).await;
        vault.schedule_save(json!(["edit"])).await.unwrap();

        store.fail_wipe.store(true, Ordering::SeqCst);
        assert!(matches!(vault.reset().await, Err(VaultError::Storage(_))));
        assert_eq!(vault.status().await, VaultStatus::Unlocked);
        assert!(vault.has_pending_save().await);

        // The pending save still lands and the idle countdown still locks
        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(vault.status().await, VaultStatus::Locked);
        assert_eq!(stored_items(&vault).await, json!(["edit"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_uninitialized_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(FileVaultStore::new(temp_dir.path()).unwrap());
        let vault: Vault<_, Value> = Vault::with_timings(store, None, Duration::from_millis(500));
        assert!(matches!(
            vault.reset().await,
            Err(VaultError::InvalidState { operation: "reset", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_leaves_vault_intact() {
        let (_dir, store, vault) = flaky_vault(None).await;
        vault.save(json!(["first"])).await.unwrap();
        vault.schedule_save(json!(["pending"])).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            vault.save(json!(["second"])).await,
            Err(VaultError::Storage(_))
        ));
        assert_eq!(vault.payload().await, Some(json!(["first"])));
        assert_eq!(stored_items(&vault).await, json!(["first"]));
        assert!(vault.has_pending_save().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_autosave_is_retried_and_reported() {
        let (_dir, store, vault) = flaky_vault(None).await;

        store.fail_writes.store(true, Ordering::SeqCst);
        vault.schedule_save(json!(["edit"])).await.unwrap();
        time::sleep(Duration::from_millis(600)).await;

        assert!(vault.has_pending_save().await);
        assert_eq!(vault.payload().await, Some(json!([])));
        assert!(matches!(
            vault.take_autosave_error().await,
            Some(VaultError::Storage(_))
        ));

        // No further edit or flush needed once the disk recovers
        store.fail_writes.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_millis(600)).await;
        assert!(!vault.has_pending_save().await);
        assert!(vault.take_autosave_error().await.is_none());
        assert_eq!(stored_items(&vault).await, json!(["edit"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_keeps_edit_scheduled() {
        let (_dir, store, vault) = flaky_vault(None).await;
        vault.schedule_save(json!(["edit"])).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(vault.flush().await, Err(VaultError::Storage(_))));
        assert!(vault.has_pending_save().await);

        store.fail_writes.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_millis(600)).await;
        assert!(!vault.has_pending_save().await);
        assert_eq!(stored_items(&vault).await, json!(["edit"]));
    }

    #[tokio::test]
    async fn test_biometric_hardware_failure_falls_back() {
        let (_dir, vault) = unlocked_vault(None).await;
        let store = Arc::clone(vault.inner.lock().await.session.store());
        let escrow = BiometricEscrow::new(
            Arc::clone(&store),
            Arc::new(MockAuthenticator::new()),
            "localhost",
        );
        vault.enroll_biometrics(&escrow, PASSWORD).await.unwrap();
        vault.lock().await.unwrap();

        let mut record = store.load_escrow().unwrap().unwrap();
        record.prf_salt = B64.encode([0u8; PRF_SALT_SIZE]);
        store.save_escrow(&record).unwrap();

        assert_eq!(
            vault.unlock_with_biometrics(&escrow).await.unwrap(),
            BiometricUnlock::Fallback
        );
        assert_eq!(vault.status().await, VaultStatus::Locked);
        vault.unlock(PASSWORD).await.unwrap();
    }
}
