//! mVault CLI - command-line access to a local data vault
//!
//! Items are treated as raw JSON. Passwords are prompted for on the terminal,
//! or taken from `MVAULT_PASSWORD` when scripting.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mvault_core::{
    password::DEFAULT_GENERATED_LENGTH, FileVaultStore, ProbeWarning, Vault, VaultConfig,
    VaultStatus, VaultStore,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "MVAULT_PASSWORD";
const CONFIG_ENV: &str = "MVAULT_CONFIG";

#[derive(Parser)]
#[command(name = "mvault")]
#[command(about = "Local-first encrypted data vault", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file path (default: $MVAULT_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show vault state
    Status,

    /// Create the vault, migrating legacy plaintext items if present
    Init,

    /// Print the decrypted items
    Show,

    /// Replace the vault contents with a JSON file
    Put {
        /// JSON file holding the new contents
        file: PathBuf,
    },

    /// Append one JSON item to the vault
    Add {
        /// Item as a JSON object
        item: String,
    },

    /// Generate a strong random password
    GeneratePassword {
        /// Password length
        #[arg(short, long, default_value_t = DEFAULT_GENERATED_LENGTH)]
        length: usize,
    },

    /// Irreversibly delete the vault and biometric enrollment
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvault=info,mvault_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::GeneratePassword { length } = cli.command {
        if length < mvault_core::password::MIN_PASSWORD_LENGTH {
            bail!(
                "Length must be at least {}",
                mvault_core::password::MIN_PASSWORD_LENGTH
            );
        }
        println!("{}", mvault_core::generate_strong_password(length));
        return Ok(());
    }

    let config = load_config(&cli)?;
    config.ensure_directories()?;
    let store = Arc::new(FileVaultStore::new(&config.data_dir)?);
    let vault: Vault<FileVaultStore, Value> = Vault::new(Arc::clone(&store), &config);

    let status = vault.probe().await?;
    for warning in vault.probe_warnings().await {
        report_warning(&warning);
    }

    match cli.command {
        Commands::Status => {
            println!("\n=== Vault Status ===\n");
            println!("Data directory: {}", config.data_dir.display());
            println!("State:          {}", describe(status));
            println!(
                "Biometrics:     {}",
                if store.load_escrow()?.is_some() {
                    "enrolled"
                } else {
                    "not enrolled"
                }
            );
        }

        Commands::Init => match status {
            VaultStatus::Setup => {
                let password = new_password()?;
                vault.create(&password, Value::Array(Vec::new())).await?;
                vault.lock().await?;
                println!("✓ Vault created at {}", config.data_dir.display());
            }
            VaultStatus::Migration => {
                let items = vault.migration_items().await.unwrap_or(Value::Null);
                let count = items.as_array().map_or(0, Vec::len);
                println!("Found {} unencrypted item(s) from an older version.", count);
                println!("Choose a master password to encrypt them.");
                let password = new_password()?;
                vault.create(&password, items).await?;
                vault.lock().await?;
                println!("✓ Items encrypted; plaintext copy removed");
            }
            VaultStatus::Locked => bail!("Vault already exists. Use `mvault reset --yes` to start over."),
            other => bail!("Unexpected vault state: {}", describe(other)),
        },

        Commands::Show => {
            unlock(&vault, status).await?;
            let items = vault.payload().await.unwrap_or(Value::Null);
            vault.lock().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }

        Commands::Put { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items: Value = serde_json::from_str(&content).context("File is not valid JSON")?;
            unlock(&vault, status).await?;
            vault.save(items).await?;
            vault.lock().await?;
            println!("✓ Vault contents replaced");
        }

        Commands::Add { item } => {
            let item: Value = serde_json::from_str(&item).context("Item is not valid JSON")?;
            unlock(&vault, status).await?;
            let mut items = vault.payload().await.unwrap_or(Value::Null);
            match items.as_array_mut() {
                Some(array) => array.push(item),
                None => {
                    vault.lock().await?;
                    bail!("Vault contents are not a JSON array");
                }
            }
            vault.save(items).await?;
            vault.lock().await?;
            println!("✓ Item added");
        }

        Commands::Reset { yes } => {
            if !yes {
                bail!("Refusing to delete the vault without --yes");
            }
            vault.reset().await?;
            warn!("Vault reset by user");
            println!("✓ Vault and biometric enrollment deleted");
        }

        Commands::GeneratePassword { .. } => {}
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<VaultConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(VaultConfig::default_path);
    let mut config = VaultConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    info!("Using data directory {}", config.data_dir.display());
    Ok(config)
}

async fn unlock(vault: &Vault<FileVaultStore, Value>, status: VaultStatus) -> Result<()> {
    match status {
        VaultStatus::Locked => {}
        VaultStatus::Setup | VaultStatus::Migration => {
            bail!("No vault yet. Run `mvault init` first.")
        }
        other => bail!("Unexpected vault state: {}", describe(other)),
    }
    let password = read_password("Master password: ")?;
    vault.unlock(&password).await?;
    Ok(())
}

fn new_password() -> Result<Zeroizing<String>> {
    let password = read_password("New master password: ")?;
    let confirmation = if std::env::var_os(PASSWORD_ENV).is_some() {
        password.clone()
    } else {
        read_password("Confirm master password: ")?
    };
    mvault_core::validate_new_password(&password, &confirmation)?;
    Ok(password)
}

fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .context("Failed to read password")
}

fn report_warning(warning: &ProbeWarning) {
    match warning {
        ProbeWarning::CorruptRecord(reason) => {
            warn!("Stored vault is unreadable and was ignored: {}", reason)
        }
        ProbeWarning::CorruptLegacy(slot, reason) => {
            warn!("Legacy data in {:?} is unreadable: {}", slot, reason)
        }
    }
}

fn describe(status: VaultStatus) -> &'static str {
    match status {
        VaultStatus::Uninitialized => "uninitialized",
        VaultStatus::Setup => "no vault (run `mvault init`)",
        VaultStatus::Migration => "legacy plaintext items waiting for migration (run `mvault init`)",
        VaultStatus::Locked => "locked",
        VaultStatus::Unlocked => "unlocked",
    }
}
