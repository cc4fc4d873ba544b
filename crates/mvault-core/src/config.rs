//! Vault configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::biometric::DEFAULT_RELYING_PARTY;
use crate::store::FileVaultStore;

/// Vault configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the vault record and escrow files
    pub data_dir: PathBuf,

    /// Quiet period before an unlocked vault locks itself (seconds, 0 disables)
    pub idle_timeout_secs: u64,

    /// Autosave debounce window (milliseconds)
    pub autosave_debounce_ms: u64,

    /// Relying party id for biometric credentials
    pub biometric_relying_party: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: FileVaultStore::default_path(),
            idle_timeout_secs: 300,
            autosave_debounce_ms: 500,
            biometric_relying_party: DEFAULT_RELYING_PARTY.to_string(),
        }
    }
}

impl VaultConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mvault")
            .join("config.json")
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Idle timeout, `None` when auto-lock is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
