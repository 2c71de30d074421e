//! # Meridian Server
//!
//! Main binary. Loads configuration, provisions the federation key, wires the
//! peer directory and event router, and serves the HTTP API.
//!
//! ```text
//! meridian [--config meridian.toml] serve
//! meridian [--config meridian.toml] keygen [--out PATH] [--force]
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use meridian_api::{build_router, AppState, FederationSettings, FederationState};
use meridian_common::config::{self, AppConfig, DiscoveryMethod, FederationConfig};
use meridian_federation::{
    build_directory,
    directory::{HubDirectory, HubPeer},
    key_manager::write_key_file,
    EventHandler, EventRouter, FederationEvent, HandlerError, KeyManager, KeyStore,
};
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(name = "meridian", version, about = "Federated chat event exchange server")]
struct Cli {
    /// Path to a TOML config file (default: ./meridian.toml if present).
    #[arg(long, short, global = true, env = "MERIDIAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Generate a federation key file and print its public key.
    Keygen {
        /// Where to write the key (default: `federation.private_key_path`).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Overwrite an existing key file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Keygen { out, force } => keygen(&config, out, force).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    meridian_common::telemetry::init(&config.log);

    info!("Starting Meridian v{}", env!("CARGO_PKG_VERSION"));

    let federation = if config.federation.enabled {
        Some(start_federation(&config.federation).await?)
    } else {
        info!("Federation disabled; federation endpoints are not mounted");
        None
    };

    let app = build_router(AppState::new(federation));
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://{addr}");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Meridian stopped");
    Ok(())
}

async fn start_federation(fed: &FederationConfig) -> anyhow::Result<FederationState> {
    // === Federation key ===
    let keys = KeyManager::new(&fed.private_key_path).load_or_generate().await?;
    info!("Federation identity {} ready, key {}", fed.domain, keys.key_id());

    // === Peer directory ===
    let directory = build_directory(fed)?;
    info!(
        "Peer directory: {:?} discovery, {} pinned peer(s), cache TTL {}s",
        fed.discovery_method,
        fed.peers.len(),
        fed.peer_cache_ttl_secs
    );

    if fed.discovery_method == DiscoveryMethod::Hub {
        let hub = HubDirectory::new(Url::parse(&fed.hub_url)?, fed.lookup_timeout())?;
        let me = HubPeer {
            domain: fed.domain.clone(),
            url: fed.advertised_url(),
            public_key: keys.public_key_base64(),
        };
        // Peers that already know us keep working; retry happens on next start.
        if let Err(e) = hub.register(&me).await {
            warn!("Could not register with hub {}: {}", hub.hub_url(), e);
        }
    }

    // === Event router ===
    let router = EventRouter::builder().on_all(Arc::new(LoggingHandler)).build()?;

    Ok(FederationState::new(
        fed.domain.clone(),
        keys,
        directory,
        Arc::new(router),
        FederationSettings::from(fed),
    )?)
}

async fn keygen(config: &AppConfig, out: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = out.unwrap_or_else(|| PathBuf::from(&config.federation.private_key_path));
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }

    let keys = KeyStore::generate();
    write_key_file(&path, &keys).await?;

    println!("Wrote {} ({})", path.display(), keys.key_id());
    println!("Public key: {}", keys.public_key_base64());
    Ok(())
}

/// Domain state lives outside this server; accepted events are logged.
struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &FederationEvent) -> Result<(), HandlerError> {
        info!(
            event_id = %event.id,
            origin = %event.origin,
            event_type = event.kind().code(),
            "Federation event received"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
