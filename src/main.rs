//! memkv - An In-Memory Key-Value Store over TCP
//!
//! This is the main entry point. `memkv server` runs the TCP server,
//! `memkv cli` opens an interactive client against a running server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use memkv::commands::Database;
use memkv::config::Config;
use memkv::logging::{init_logging, LogTarget};
use memkv::protocol::{self, CommandTable};
use memkv::server::{shutdown_signal, TcpServer};
use memkv::storage::{InMemoryEngine, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "memkv", version, about = "An in-memory key-value store over TCP")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the key-value server.
    Server {
        /// Path to TOML configuration file (defaults to $CONFIG_FILE, then config.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Interactive client for a running server.
    Cli {
        /// Path to TOML configuration file (defaults to $CONFIG_FILE, then config.toml).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Server address, overriding the configuration.
        #[arg(long)]
        address: Option<String>,
    },
}

fn print_banner(config: &Config) {
    println!(
        r#"
memkv v{} - In-Memory Key-Value Store
──────────────────────────────────────
Listening on {} (max {} connections, {} byte messages)

Use Ctrl+C to shutdown gracefully.
"#,
        memkv::VERSION,
        config.network.address,
        config.network.max_connections,
        config.network.max_message_size,
    );
}

/// Cancels the returned token on Ctrl+C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    token
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    print_banner(&config);

    let parser = protocol::Parser::new(CommandTable::default());
    let storage = Storage::new(Arc::new(InMemoryEngine::new()));
    let database = Database::new(parser, storage);
    info!("database initialized");

    let server = TcpServer::bind(config.network.server_config(), database.clone())
        .await
        .context("failed to start tcp server")?;
    info!(address = %server.local_addr()?, "listening");

    server.run(shutdown_token()).await;

    let stats = database.stats();
    info!(
        keys = stats.keys,
        gets = stats.gets,
        sets = stats.sets,
        dels = stats.dels,
        "final storage statistics"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Server { config } => {
            let config = Config::load(config.as_deref()).context("failed to load configuration")?;
            init_logging(&config.logger, LogTarget::Stdout)?;
            run_server(config).await
        }
        Command::Cli { config, address } => {
            let config = Config::load(config.as_deref()).context("failed to load configuration")?;
            init_logging(&config.logger, LogTarget::Stderr)?;

            let address = address.unwrap_or_else(|| config.network.address.clone());
            memkv::cli::run_cli(&address, config.network.client_config(), shutdown_token()).await
        }
    }
}
