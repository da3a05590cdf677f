//! Strongbox - lock selected programs behind a PIN

mod config;
mod launcher;
mod shell;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use strongbox_core::{AccessGate, FileStorage, GateStatus, NoBiometric, OpenOutcome, Startup};
use tokio::io::BufReader;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use crate::config::CliConfig;
use crate::launcher::CommandLauncher;

/// Strongbox - gate program launches behind a PIN
#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Restrict launching selected programs until you unlock with a PIN")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the secure storage location
    #[arg(long)]
    storage: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the initial PIN
    Init {
        /// New PIN (prompted when omitted)
        #[arg(long)]
        pin: Option<String>,

        /// PIN confirmation (prompted when omitted)
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Show lock and biometric status
    Status,

    /// List configured resources and their protection
    List,

    /// Require an unlock before launching a resource
    Protect {
        /// Resource identifier
        id: String,
    },

    /// Stop protecting a resource
    Unprotect {
        /// Resource identifier
        id: String,
    },

    /// Configure automatic biometric unlock
    Biometric {
        #[arg(value_enum)]
        mode: BiometricMode,
    },

    /// Launch a resource, unlocking first if it is protected
    Open {
        /// Resource identifier
        id: String,

        /// PIN to unlock with (prompted when needed and omitted)
        #[arg(long)]
        pin: Option<String>,
    },

    /// Interactive session
    Shell,
}

impl Commands {
    /// Commands that may run before a PIN exists; the shell forces setup itself
    fn allowed_during_setup(&self) -> bool {
        matches!(self, Commands::Init { .. } | Commands::Status | Commands::Shell)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BiometricMode {
    On,
    Off,
    Toggle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strongbox=info,strongbox_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => CliConfig::config_file_path().context("could not determine config directory")?,
    };
    let mut config = CliConfig::load_or_default(&config_path)?;
    if let Some(storage) = cli.storage {
        config.gate.storage_path = storage;
    }
    debug!(config = %config_path.display(), storage = %config.gate.storage_path.display(), "loaded configuration");

    let storage = FileStorage::open(&config.gate.storage_path)
        .with_context(|| format!("opening {}", config.gate.storage_path.display()))?;
    let gate = AccessGate::new(
        config.gate.clone(),
        Arc::new(storage),
        Arc::new(NoBiometric),
        Arc::new(CommandLauncher::new(config.resources.clone())),
    );
    let mut stdout = io::stdout();

    if gate.status()? == GateStatus::SetupRequired && !cli.command.allowed_during_setup() {
        anyhow::bail!("No PIN set. Run 'strongbox init' first.");
    }

    match cli.command {
        Commands::Init { pin, confirm } => {
            if gate.has_credential()? {
                println!("A PIN is already set. Use 'change-pin' in the shell to replace it.");
                return Ok(());
            }

            let pin = Zeroizing::new(match pin {
                Some(pin) => pin,
                None => prompt("PIN: ")?,
            });
            let confirm = Zeroizing::new(match confirm {
                Some(confirm) => confirm,
                None => prompt("Confirm PIN: ")?,
            });

            gate.set_credential(&pin, &confirm)?;
            info!("PIN saved to {:?}", config.gate.storage_path);
            println!("PIN set.");

            if !config_path.exists() {
                config.save(&config_path)?;
                println!("Add launchable programs to {}", config_path.display());
            }
        }

        Commands::Status => shell::print_status(&gate, &mut stdout)?,

        Commands::List => shell::print_resources(&gate, &mut stdout)?,

        Commands::Protect { id } => {
            gate.set_protected(&id, true)?;
            println!("{} protected", id);
        }

        Commands::Unprotect { id } => {
            unlock_interactively(&gate, None)?;
            gate.set_protected(&id, false)?;
            println!("{} unprotected", id);
        }

        Commands::Biometric { mode } => {
            let enabled = match mode {
                BiometricMode::On => {
                    gate.set_biometric_enabled(true)?;
                    true
                }
                BiometricMode::Off => {
                    gate.set_biometric_enabled(false)?;
                    false
                }
                BiometricMode::Toggle => gate.toggle_biometric()?,
            };
            println!("Biometric unlock {}", if enabled { "on" } else { "off" });
        }

        Commands::Open { id, pin } => {
            if !gate.can_launch(&id) {
                unlock_interactively(&gate, pin)?;
            }
            match gate.open(&id)? {
                OpenOutcome::Launched => println!("Opened {}", id),
                OpenOutcome::Denied => println!("{} is protected - unlock first", id),
                OpenOutcome::NotFound => println!("Could not open {}", id),
            }
        }

        Commands::Shell => {
            if let Startup::Locked { challenge: Some(challenge) } = gate.start()? {
                debug!(pending = challenge.is_pending(), "automatic biometric challenge started");
            }

            let mut session_changes = gate.subscribe();
            let watcher = tokio::spawn(async move {
                while session_changes.changed().await.is_ok() {
                    let state = *session_changes.borrow_and_update();
                    debug!(?state, "session state changed");
                }
            });

            let stdin = BufReader::new(tokio::io::stdin());
            shell::run(&gate, stdin, &mut stdout).await?;
            gate.lock();
            watcher.abort();
        }
    }

    Ok(())
}

/// Unlock with a PIN from `pin` or the terminal
fn unlock_interactively(gate: &AccessGate, pin: Option<String>) -> anyhow::Result<()> {
    if gate.session_state().is_unlocked() {
        return Ok(());
    }

    let pin = Zeroizing::new(match pin {
        Some(pin) => pin,
        None => prompt("PIN: ")?,
    });
    gate.unlock_with_pin(&pin)?;
    Ok(())
}

/// Read one line from stdin after printing `label`
fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
