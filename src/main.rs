//! Decoy Vault - CLI
//!
//! Administration tool for a vault engine on local storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use decoy_vault::{
    constant_time_eq, AccessDecision, CredentialVerifier, EngineConfig, FileSecureStore,
    KeyKind, KeyStore, PanicAction, SecureStore, VaultEngine, VaultResult, VaultSelector,
};

/// Secure store entry holding the PBKDF2 verifier of the real password
const REAL_VERIFIER: &str = "real_password_verifier";
/// Salt label for the real password
const REAL_SALT_LABEL: &str = "real_password";

#[derive(Parser)]
#[command(name = "vault-engine")]
#[command(version = decoy_vault::VERSION)]
#[command(about = "Decoy Vault - encrypted file vault with a decoy mode")]
struct Cli {
    /// Engine configuration file
    #[arg(short, long, default_value = "./vault.json")]
    config: PathBuf,

    /// Credential opening the session (real password or decoy PIN/password)
    #[arg(short = 'k', long, global = true)]
    credential: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault and write its configuration
    Init {
        /// Vault root directory
        #[arg(short, long, default_value = "./vault")]
        root: PathBuf,

        /// Real vault password
        #[arg(short, long)]
        password: String,

        /// Overwrite passes for secure delete
        #[arg(long, default_value_t = 1)]
        passes: u8,
    },

    /// Show which vault a credential opens
    Unlock { credential: String },

    /// Encrypt a file into the session's vault
    Import { path: PathBuf },

    /// List the session's files
    List,

    /// Decrypt a file to disk
    Export { id: String, output: PathBuf },

    /// Check a file's integrity digest
    Verify { id: String },

    /// Securely delete a file
    Remove { id: String },

    /// Re-encrypt the real vault under a new master key
    Rotate {
        /// Finish an interrupted rotation instead
        #[arg(long)]
        resume: bool,
    },

    /// Securely delete every real-vault file
    Panic,

    /// Manage decoy mode (needs the real password)
    Decoy {
        #[command(subcommand)]
        action: DecoyCommand,
    },
}

#[derive(Subcommand)]
enum DecoyCommand {
    SetPin { pin: String },
    SetPassword { password: String },
    Enable,
    Disable,
    /// showDecoy, showEmpty, showCalculator, lockOut or clearRealVault
    PanicAction { action: String },
    Status,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REAL PASSWORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Checks the real password against a stored PBKDF2 verifier
struct PasswordVerifier {
    keys: Arc<KeyStore>,
    store: Arc<dyn SecureStore>,
}

impl PasswordVerifier {
    async fn enroll(&self, password: &str) -> VaultResult<()> {
        let derived = self.keys.derive_password_key(REAL_SALT_LABEL, password).await?;
        self.store
            .write(REAL_VERIFIER, &hex::encode(derived.key.expose()))
            .await
    }

    async fn is_enrolled(&self) -> VaultResult<bool> {
        Ok(self.store.read(REAL_VERIFIER).await?.is_some())
    }
}

#[async_trait]
impl CredentialVerifier for PasswordVerifier {
    async fn verify(&self, input: &str) -> VaultResult<bool> {
        let expected = match self.store.read(REAL_VERIFIER).await? {
            Some(stored) => stored,
            None => return Ok(false),
        };
        let derived = self.keys.derive_password_key(REAL_SALT_LABEL, input).await?;
        let actual = hex::encode(derived.key.expose());
        Ok(constant_time_eq(actual.as_bytes(), expected.as_bytes()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn open(config_path: &Path) -> Result<(VaultEngine, PasswordVerifier)> {
    let config = EngineConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let store: Arc<dyn SecureStore> = Arc::new(FileSecureStore::new(&config.secure_store_path));
    let engine = VaultEngine::open(config, store.clone()).await?;
    let verifier = PasswordVerifier {
        keys: engine.keys().clone(),
        store,
    };
    Ok((engine, verifier))
}

/// Open a session with `--credential`; decoy admin needs the real vault
async fn unlock(
    engine: &VaultEngine,
    verifier: &PasswordVerifier,
    credential: Option<&str>,
) -> Result<VaultSelector> {
    let Some(credential) = credential else {
        bail!("this command needs --credential");
    };
    match engine.submit_credential(credential, verifier).await? {
        AccessDecision::Real => Ok(VaultSelector::Real),
        AccessDecision::Decoy { .. } => Ok(VaultSelector::Decoy),
        AccessDecision::Denied => bail!("credential rejected"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init {
            root,
            password,
            passes,
        } => init(&cli.config, &root, &password, passes).await,
        command => session(&cli.config, cli.credential.as_deref(), command).await,
    }
}

async fn session(config_path: &Path, credential: Option<&str>, command: Commands) -> Result<()> {
    let (engine, verifier) = open(config_path).await?;

    match command {
        Commands::Init { .. } => bail!("init does not take a session"),

        Commands::Unlock { credential } => {
            match engine.submit_credential(&credential, &verifier).await? {
                AccessDecision::Real => println!("🔓 Real vault"),
                AccessDecision::Decoy { panic_action } => {
                    println!("🔓 Decoy vault (panic action: {})", panic_action)
                }
                AccessDecision::Denied => bail!("credential rejected"),
            }
        }

        Commands::Import { path } => {
            unlock(&engine, &verifier, credential).await?;
            let record = engine.import_file(&path, |_| {}).await?;
            println!("✅ Imported {} as {}", path.display(), record.id);
        }

        Commands::List => {
            unlock(&engine, &verifier, credential).await?;
            let files = engine.list_files().await?;
            if files.is_empty() {
                println!("📭 No files in vault");
            } else {
                println!("Files ({}):", files.len());
                println!("{:-<72}", "");
                for f in files {
                    println!(
                        "{}  {:<8} {} ({} bytes)",
                        f.id, f.kind.as_str(), f.original_name, f.plaintext_size
                    );
                }
            }
        }

        Commands::Export { id, output } => {
            unlock(&engine, &verifier, credential).await?;
            let written = engine.export_file(&id, &output, |_| {}).await?;
            println!("✅ Exported {} bytes to {}", written.size, written.output_path.display());
        }

        Commands::Verify { id } => {
            unlock(&engine, &verifier, credential).await?;
            if engine.verify_file(&id).await? {
                println!("💚 {} intact", id);
            } else {
                bail!("{} failed its integrity check", id);
            }
        }

        Commands::Remove { id } => {
            unlock(&engine, &verifier, credential).await?;
            let outcome = engine.remove_file(&id).await?;
            println!("🗑️ Removed {} ({:?})", id, outcome);
        }

        Commands::Rotate { resume } => {
            unlock(&engine, &verifier, credential).await?;
            let progress = |p: decoy_vault::RotationProgress| {
                log::info!("{:?} {}/{} {}", p.phase, p.done, p.total, p.file_id)
            };
            let outcome = if resume {
                engine.resume_rotation(progress).await?
            } else {
                engine.rotate_master_key(progress).await?
            };
            let total = outcome.total;
            outcome.into_result()?;
            println!("🔄 Master key rotated over {} files", total);
        }

        Commands::Panic => {
            unlock(&engine, &verifier, credential).await?;
            let report = engine.panic_clear().await?;
            println!(
                "Removed {} files ({} degraded, {} already missing)",
                report.removed(),
                report.degraded.len(),
                report.missing.len()
            );
            for (id, e) in &report.failed {
                println!("   ⚠️ {}: {}", id, e);
            }
        }

        Commands::Decoy { action } => {
            if unlock(&engine, &verifier, credential).await? != VaultSelector::Real {
                bail!("decoy settings need the real password");
            }
            decoy(&engine, action).await?;
        }
    }

    Ok(())
}

async fn init(config_path: &Path, root: &Path, password: &str, passes: u8) -> Result<()> {
    if password.is_empty() {
        bail!("password must not be empty");
    }

    let mut config = EngineConfig::for_root(root);
    config.secure_delete_passes = passes;
    config.save(config_path).await?;

    let (engine, verifier) = open(config_path).await?;
    if verifier.is_enrolled().await? {
        bail!("vault at {} is already initialised", root.display());
    }
    for kind in KeyKind::ALL {
        engine.keys().ensure_key(kind).await?;
    }
    verifier.enroll(password).await?;

    println!("🔐 Vault created at {}", root.display());
    println!("   config: {}", config_path.display());
    Ok(())
}

async fn decoy(engine: &VaultEngine, action: DecoyCommand) -> Result<()> {
    let decoy = engine.decoy();
    match action {
        DecoyCommand::SetPin { pin } => decoy.set_decoy_pin(&pin).await?,
        DecoyCommand::SetPassword { password } => decoy.set_decoy_password(&password).await?,
        DecoyCommand::Enable => decoy.set_enabled(true).await?,
        DecoyCommand::Disable => decoy.set_enabled(false).await?,
        DecoyCommand::PanicAction { action } => {
            decoy.set_panic_action(action.parse::<PanicAction>()?).await?
        }
        DecoyCommand::Status => {
            let s = decoy.settings().await?;
            println!("Decoy mode:    {}", if s.is_enabled { "enabled" } else { "disabled" });
            println!("PIN set:       {}", s.has_pin_set);
            println!("Password set:  {}", s.has_password_set);
            println!("Panic action:  {}", s.panic_action);
            println!("Last mode:     {}", decoy.last_access_mode().await?);
            return Ok(());
        }
    }
    println!("✅ Done");
    Ok(())
}
