//! Command-line tools for sessionvault stores.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sessionvault_migrate::{MigrationReport, migrate_directory, migrate_file};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sessionvault")]
#[command(about = "Manage multi-tenant session stores")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// TOML file with pool settings
    #[arg(long, global = true, env = "SESSIONVAULT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import legacy .session files
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },
    /// Inspect or remove stored sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Migrate a single .session file
    One {
        /// Path to the legacy .session file
        legacy_path: PathBuf,
        /// Destination connection string (sqlite:<path> or postgres://...)
        db_url: String,
        /// Target session name (defaults to the file name)
        #[arg(long)]
        session_name: Option<String>,
    },
    /// Migrate every .session file in a directory
    Dir {
        /// Directory containing .session files
        dir_path: PathBuf,
        /// Destination connection string (sqlite:<path> or postgres://...)
        db_url: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List session names
    List {
        /// Store connection string
        db_url: String,
    },
    /// Delete a session and everything it owns
    Delete {
        /// Store connection string
        db_url: String,
        /// Session to delete
        session_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { global, command } = Cli::parse();
    let config = config::load(global.config.as_deref())?;

    match command {
        Commands::Migrate { command } => match command {
            MigrateCommands::One {
                legacy_path,
                db_url,
                session_name,
            } => {
                handle_migrate_one(&config, &legacy_path, &db_url, session_name.as_deref()).await
            }
            MigrateCommands::Dir { dir_path, db_url } => {
                handle_migrate_dir(&config, &dir_path, &db_url).await
            }
        },
        Commands::Sessions { command } => match command {
            SessionCommands::List { db_url } => handle_sessions_list(&config, &db_url).await,
            SessionCommands::Delete {
                db_url,
                session_name,
            } => handle_sessions_delete(&config, &db_url, &session_name).await,
        },
    }
}

fn print_report(path: &Path, report: &MigrationReport) {
    println!(
        "Migrated: {} -> {} ({} entities, {} update states, {} sent files)",
        path.display(),
        report.session_name,
        report.entities,
        report.update_states,
        report.sent_files
    );
    if report.skipped_sent_files > 0 {
        println!(
            "  skipped {} sent files of unknown kind",
            report.skipped_sent_files
        );
    }
    if !report.missing_tables.is_empty() {
        println!("  missing tables: {}", report.missing_tables.join(", "));
    }
}

async fn handle_migrate_one(
    config: &config::CliConfig,
    legacy_path: &Path,
    db_url: &str,
    session_name: Option<&str>,
) -> Result<()> {
    let store_config = config.store.store_config(db_url)?;
    let store = sessionvault_store::from_config(&store_config)
        .await
        .context("failed to open destination store")?;

    let result = migrate_file(store.as_ref(), legacy_path, session_name).await;
    store.close().await;

    let report =
        result.with_context(|| format!("failed to migrate {}", legacy_path.display()))?;
    print_report(legacy_path, &report);
    Ok(())
}

async fn handle_migrate_dir(config: &config::CliConfig, dir: &Path, db_url: &str) -> Result<()> {
    let store_config = config.store.store_config(db_url)?;
    let store = sessionvault_store::from_config(&store_config)
        .await
        .context("failed to open destination store")?;

    let result = migrate_directory(store.as_ref(), dir).await;
    store.close().await;
    let batch = result.with_context(|| format!("failed to scan {}", dir.display()))?;

    for outcome in &batch.outcomes {
        match &outcome.result {
            Ok(report) => print_report(&outcome.path, report),
            Err(err) => println!("Failed: {} -> {err}", outcome.path.display()),
        }
    }
    println!(
        "{} migrated, {} failed",
        batch.succeeded().count(),
        batch.failed().count()
    );
    Ok(())
}

async fn handle_sessions_list(config: &config::CliConfig, db_url: &str) -> Result<()> {
    let store_config = config.store.store_config(db_url)?;
    let names = sessionvault_store::list_sessions(&store_config)
        .await
        .context("failed to list sessions")?;

    for name in names {
        println!("{name}");
    }
    Ok(())
}

async fn handle_sessions_delete(
    config: &config::CliConfig,
    db_url: &str,
    session_name: &str,
) -> Result<()> {
    let store_config = config.store.store_config(db_url)?;
    let store = sessionvault_store::from_config(&store_config)
        .await
        .context("failed to open store")?;

    let result = store.delete_session(session_name).await;
    store.close().await;
    let stats = result.with_context(|| format!("failed to delete session '{session_name}'"))?;

    if stats.sessions == 0 {
        anyhow::bail!("session '{session_name}' not found");
    }
    println!(
        "Deleted session {session_name}: {} entities, {} update states, {} sent files",
        stats.entities, stats.update_states, stats.sent_files
    );
    Ok(())
}
