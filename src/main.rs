//! sshpod entrypoint CLI.
//!
//! Runs an SSH-accessible development environment inside a disposable
//! container: provisions the login user, persists SSH host keys on the
//! mounted volume, and keeps sshd in the foreground.
//!
//! # Usage
//!
//! ```bash
//! # Full startup sequence (the container entrypoint)
//! sshpod up
//!
//! # Restore host keys from the volume, nothing else
//! sshpod restore
//!
//! # Back up host keys to the volume right now
//! sshpod backup
//!
//! # Show configuration, preflight results, and key locations
//! sshpod status
//! ```
//!
//! Configuration comes from the environment: `SSH_USER` / `SSH_PASSWORD`
//! (required), `SSH_PUBLIC_KEY`, `SSH_BANNER`, `TZ`, `SSH_UID`/`SSH_GID`,
//! `RAILWAY_VOLUME_MOUNT_PATH`, `LOG_LEVEL`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sshpod::config::Config;
use sshpod::identity::{BackupOutcome, IdentityManager, RestoreOutcome, StoreStatus};
use sshpod::{keys, preflight, provision, sshd, storage};

#[derive(Parser)]
#[command(name = "sshpod")]
#[command(author, version, about = "SSH dev-environment container entrypoint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the environment and run sshd in the foreground
    Up,

    /// Restore host keys from the volume (no sshd launch)
    Restore,

    /// Back up host keys to the volume immediately (no polling wait)
    Backup,

    /// Show configuration, preflight results, and host key locations
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level);

    let result = match cli.command {
        Commands::Up => cmd_up(config).await,
        Commands::Restore => cmd_restore(config),
        Commands::Backup => cmd_backup(config),
        Commands::Status => cmd_status(config),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Initialise the global tracing subscriber from the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Full startup sequence. This is what the container runs as PID 1.
///
/// Ordering matters in exactly one place: the restore half completes
/// before sshd is launched, and the deferred backup is spawned detached
/// so it can never delay the launch.
async fn cmd_up(config: Config) -> Result<i32> {
    let report = preflight::run(&config);
    for check in report.errors() {
        warn!(check = %check.name, "{}", check.message);
    }

    if let Err(e) = storage::setup(&config) {
        warn!(error = format!("{:#}", e), "storage layout failed; continuing");
    }

    provision::run(&config);

    let manager = IdentityManager::new(&config);
    let schedule_backup = match manager.restore() {
        RestoreOutcome::Degraded => false,
        RestoreOutcome::FirstRun => true,
        // A partial restore means sshd will mint replacements for the
        // missing pairs; capture those too
        RestoreOutcome::Restored { .. } => !keys::set_is_complete(&config.key_backup_dir()),
    };

    sshd::generate_missing_keys(&config);

    if schedule_backup {
        tokio::spawn(IdentityManager::new(&config).deferred_backup());
    }

    let status = sshd::launch().await?;
    Ok(status.code().unwrap_or(1))
}

fn cmd_restore(config: Config) -> Result<i32> {
    let manager = IdentityManager::new(&config);
    match manager.restore() {
        RestoreOutcome::Degraded => println!("Volume unreachable; nothing restored."),
        RestoreOutcome::FirstRun => println!("No host keys in the volume yet; nothing restored."),
        RestoreOutcome::Restored { copied, failed } => {
            println!("Restored {} host key file(s) ({} failed).", copied, failed)
        }
    }
    Ok(0)
}

fn cmd_backup(config: Config) -> Result<i32> {
    let manager = IdentityManager::new(&config);
    match manager.backup() {
        BackupOutcome::Degraded => println!("Volume unreachable; nothing backed up."),
        BackupOutcome::NoSentinel => {
            println!("No host keys in {} yet; nothing backed up.", config.ssh_dir.display())
        }
        BackupOutcome::BackedUp { copied, failed } => {
            println!("Backed up {} host key file(s) ({} failed).", copied, failed)
        }
    }
    Ok(0)
}

fn cmd_status(config: Config) -> Result<i32> {
    println!("sshpod Status");
    println!("=============");
    println!();
    println!("Configuration:");
    println!("  Login user:  {} (uid {}, gid {})", config.username, config.uid, config.gid);
    println!("  Volume root: {}", config.volume_root.display());
    println!("  Key dir:     {}", config.ssh_dir.display());
    println!("  Public key:  {}", set_or_not(config.public_key.is_some()));
    println!("  Banner:      {}", set_or_not(config.banner.is_some()));
    println!("  Timezone:    {}", opt(config.timezone.as_deref()));
    println!();

    preflight::run(&config).print_summary();
    println!();

    let manager = IdentityManager::new(&config);
    match manager.probe_store() {
        StoreStatus::Reachable => println!("Durable store:   REACHABLE at {}", config.key_backup_dir().display()),
        StoreStatus::Unreachable { reason } => println!("Durable store:   UNREACHABLE ({})", reason),
    }
    println!();

    println!("Host keys:");
    println!("  {:<28} {:^10} {:^10}", "file", "ephemeral", "durable");
    let durable = config.key_backup_dir();
    for key in keys::HOST_KEY_FILES {
        let in_ephemeral = config.ssh_dir.join(key.name).is_file();
        let in_durable = durable.join(key.name).is_file();
        println!(
            "  {:<28} {:^10} {:^10}",
            key.name,
            if in_ephemeral { "present" } else { "-" },
            if in_durable { "present" } else { "-" },
        );
    }
    println!();

    if keys::set_is_complete(&durable) {
        println!("Identity is persisted; the next deploy presents the same host keys.");
    } else if keys::set_is_complete(&config.ssh_dir) {
        println!("Host keys generated but not (fully) backed up yet.");
        println!("Next: sshpod backup");
    } else {
        println!("No complete host key set yet; sshd will generate one at startup.");
    }

    Ok(0)
}

fn opt(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

fn set_or_not(set: bool) -> &'static str {
    if set {
        "set"
    } else {
        "(not set)"
    }
}
