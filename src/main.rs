// ABOUTME: CLI entry point for entity-sync
// ABOUTME: Parses commands, loads configuration and routes to the command handlers

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use entity_sync::commands;
use entity_sync::config::{ConfigOverrides, SyncConfig};

#[derive(Parser)]
#[command(name = "entity-sync")]
#[command(about = "Incremental, cursor-driven sync of local entity changes to a remote admin API", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to config.toml (defaults to ~/.entity-sync/config.toml)
    #[arg(long, global = true, env = "ENTITY_SYNC_CONFIG")]
    config: Option<PathBuf>,
    #[command(flatten)]
    overrides: OverrideArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct OverrideArgs {
    /// Change ledger and cursor database
    #[arg(long = "database", global = true, env = "ENTITY_SYNC_DATABASE")]
    database_path: Option<PathBuf>,
    /// Local product catalog database
    #[arg(long = "catalog", global = true, env = "ENTITY_SYNC_CATALOG")]
    catalog_path: Option<PathBuf>,
    /// Remote admin GraphQL endpoint
    #[arg(long, global = true, env = "ENTITY_SYNC_ADMIN_API_URL")]
    admin_api_url: Option<String>,
    /// Bearer token for the admin API (overrides the token file)
    #[arg(long, global = true, env = "ENTITY_SYNC_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
    /// File holding the admin token
    #[arg(long, global = true, env = "ENTITY_SYNC_TOKEN_FILE")]
    token_file: Option<PathBuf>,
    /// HTTP timeout for admin API calls, in seconds
    #[arg(long, global = true)]
    request_timeout_secs: Option<u64>,
    /// Give up on a single change after this many seconds
    #[arg(long, global = true)]
    event_timeout_secs: Option<u64>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            database_path: args.database_path,
            catalog_path: args.catalog_path,
            admin_api_url: args.admin_api_url,
            auth_token: args.auth_token,
            token_file: args.token_file,
            request_timeout_secs: args.request_timeout_secs,
            event_timeout_secs: args.event_timeout_secs,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded changes through every registered syncer
    Sync {
        #[command(flatten)]
        args: commands::SyncArgs,
    },
    /// Append a change to the ledger by hand
    Record {
        #[command(flatten)]
        args: commands::RecordArgs,
    },
    /// List recorded changes
    Changes {
        #[command(flatten)]
        args: commands::ChangesArgs,
    },
    /// List per-entity sync cursors
    Cursors {
        #[command(flatten)]
        args: commands::CursorsArgs,
    },
    /// Forget an entity's cursor so its whole history is replayed
    CursorReset {
        #[arg(long)]
        entity: String,
    },
    /// Delete ledger rows recorded before a point in time
    Prune {
        /// RFC 3339 timestamp
        #[arg(long)]
        before: DateTime<Utc>,
    },
    /// Manage the admin API token
    Token {
        #[command(flatten)]
        args: commands::TokenArgs,
    },
    /// Edit the local product catalog
    Product {
        #[command(flatten)]
        args: commands::ProductArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut config = SyncConfig::load(cli.config.as_deref())?;
    config.apply(cli.overrides.into());

    match cli.command {
        Commands::Sync { args } => {
            if !commands::sync(&config, args).await? {
                anyhow::bail!("Incremental sync finished with failures; see the log for details");
            }
            Ok(())
        }
        Commands::Record { args } => commands::record(&config, args).await,
        Commands::Changes { args } => commands::changes(&config, args).await,
        Commands::Cursors { args } => commands::cursors(&config, args).await,
        Commands::CursorReset { entity } => commands::cursor_reset(&config, &entity).await,
        Commands::Prune { before } => commands::prune(&config, before).await,
        Commands::Token { args } => commands::token(&config, args).await,
        Commands::Product { args } => commands::product(&config, args).await,
    }
}
