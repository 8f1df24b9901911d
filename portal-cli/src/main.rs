//! # portal-cli
//!
//! Command-line client for the Clipboard Portal relay.
//!
//! ## Commands
//!
//! - `init`: Create the identity key and register with the relay
//! - `status`: Show user id, key fingerprint, receiver and friends
//! - `receiver`: Set who `send` delivers to
//! - `friends`: List or add trusted friends
//! - `send`: Send text or a file
//! - `listen`: Stay connected and receive
//!
//! ## Example
//!
//! ```bash
//! # Create identity and get a user id
//! portal-cli init
//!
//! # Send to a friend
//! portal-cli receiver 33334444
//! portal-cli send "Hello from the terminal"
//! portal-cli send --file report.pdf
//!
//! # On the friend's machine
//! portal-cli listen --output-dir ~/Downloads
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{friends, init, listen, receiver, send, status, App};

/// Command-line client for the Clipboard Portal relay.
#[derive(Parser, Debug)]
#[command(name = "portal-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the friend list and settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Client configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store the identity key in the data directory instead of the OS keychain
    #[arg(long, global = true)]
    file_keystore: bool,

    /// Log protocol details to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the identity key and register with the relay
    Init,

    /// Show identity, receiver and friends
    Status,

    /// Set the outgoing receiver
    Receiver {
        /// The receiver's 8-digit user id
        id: String,
    },

    /// Manage trusted friends
    Friends {
        #[command(subcommand)]
        command: FriendsCommand,
    },

    /// Send text or a file
    Send {
        /// Text to send (or use --file)
        text: Option<String>,

        /// File to send
        #[arg(long, short, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Send to this user id instead of the configured receiver
        #[arg(long)]
        to: Option<String>,
    },

    /// Stay connected and receive content
    Listen {
        /// Directory for received files (default: current directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Deny content from unknown senders without asking
        #[arg(long)]
        deny_unknown: bool,
    },
}

#[derive(Subcommand, Debug)]
enum FriendsCommand {
    /// List trusted friends
    List,

    /// Fetch a user's key from the relay and trust it
    Add {
        /// The friend's 8-digit user id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let app = App {
        config: config::load_client_config(cli.config.as_deref(), &data_dir)?,
        data_dir,
        file_keystore: cli.file_keystore,
    };

    match cli.command {
        Commands::Init => init::run(&app).await?,
        Commands::Status => status::run(&app).await?,
        Commands::Receiver { id } => receiver::run(&app, &id).await?,
        Commands::Friends { command } => match command {
            FriendsCommand::List => friends::list(&app).await?,
            FriendsCommand::Add { id } => friends::add(&app, &id).await?,
        },
        Commands::Send { text, file, to } => {
            let payload = if let Some(text) = text {
                send::Payload::Text(text)
            } else if let Some(path) = file {
                send::Payload::File(path)
            } else {
                anyhow::bail!("Must specify text or --file");
            };
            send::run(&app, payload, to.as_deref()).await?;
        }
        Commands::Listen {
            output_dir,
            deny_unknown,
        } => listen::run(&app, output_dir, deny_unknown).await?,
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,clipportal_client=debug,clipportal_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for portal-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("de", "pschwind", "ClipboardPortal")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
