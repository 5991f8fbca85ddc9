//! Database Backup/Restore Tool
//!
//! Dumps one database to a timestamped `.sql` file, optionally copies it to an
//! S3-compatible bucket, and restores a chosen backup after health checks.

// dbbackup/src/main.rs
mod artifact;
mod backup;
mod config;
mod context;
mod errors;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use context::OperationContext;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "dbbackup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.json (optional when the environment supplies everything)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the database and upload the artifact when a bucket is configured
    Backup {
        /// Keep the artifact local only
        #[arg(long)]
        skip_upload: bool,
    },

    /// Restore a backup into the database
    Restore {
        /// Backup to restore: N for the N-th local backup, rN for the N-th remote one
        #[arg(short, long, conflicts_with_all = ["file", "latest"])]
        select: Option<String>,

        /// Restore this file directly
        #[arg(short, long, conflicts_with = "latest")]
        file: Option<PathBuf>,

        /// Restore the most recent local backup without prompting
        #[arg(long)]
        latest: bool,
    },

    /// List local and remote backups
    List,
}

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run_app(Cli::parse()).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<errors::BackupError>() {
                Some(failure) => error!(kind = %failure.kind(), "operation failed"),
                None => error!("operation failed"),
            }
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::load(&cli.config).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            cli.config.display()
        )
    })?;

    let command = match cli.command {
        Some(command) => command,
        None => prompt_choice()?,
    };

    let ctx = OperationContext::from_config(&app_config).await;

    match command {
        Commands::Backup { skip_upload } => {
            println!("🚀 Starting Backup Process...");
            let options = backup::BackupOptions { upload: !skip_upload };
            backup::run_backup_flow(&ctx, options)
                .await
                .context("Backup process failed")?;
        }
        Commands::Restore { select, file, latest } => {
            println!("🔄 Starting Restore Process...");
            let request = match (select, file) {
                (Some(token), _) => restore::RestoreRequest::Token(token),
                (None, Some(path)) => restore::RestoreRequest::File(path),
                (None, None) if latest => restore::RestoreRequest::Latest,
                (None, None) => restore::RestoreRequest::Interactive,
            };
            restore::run_restore_flow(&ctx, request)
                .await
                .context("Restore process failed")?;
        }
        Commands::List => {
            let catalog = ctx.catalog().load().await;
            if catalog.is_empty() {
                println!("❌ No backup files found!");
            } else {
                print!("{}", restore::selection::render_menu(&catalog));
            }
        }
    }
    Ok(())
}

/// Prompts user to select an operation when none was given on the command line
fn prompt_choice() -> Result<Commands> {
    use std::io::{stdin, stdout, Write};

    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    println!("3. List Backups (or type 'list')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;

    match input.trim() {
        "1" | "backup" => Ok(Commands::Backup { skip_upload: false }),
        "2" | "restore" => Ok(Commands::Restore {
            select: None,
            file: None,
            latest: false,
        }),
        "3" | "list" => Ok(Commands::List),
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup), '2' (restore), or '3' (list).");
            anyhow::bail!("Invalid operation choice");
        }
    }
}
