//! Security gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────────┐
//!                      │                  SECURITY GATEWAY                     │
//!                      │                                                       │
//!   Client Request     │  ┌──────────┐   ┌──────────────────────────────────┐  │
//!   ───────────────────┼─▶│  http    │──▶│        security pipeline         │  │
//!                      │  │ server   │   │ precheck → replay → decrypt →    │  │
//!                      │  └──────────┘   │ encrypt/log (wraps response)     │  │
//!                      │                 └───────────────┬──────────────────┘  │
//!                      │                                 ▼                     │
//!   Client Response    │                          ┌──────────────┐             │
//!   ◀──────────────────┼──────────────────────────│   forward    │◀────────────┼── Upstream
//!                      │                          └──────────────┘             │
//!                      │  ┌─────────────────────────────────────────────────┐  │
//!                      │  │ config (TOML + watcher) │ services │ lifecycle  │  │
//!                      │  └─────────────────────────────────────────────────┘  │
//!                      └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use secure_gateway::config::loader::load_config;
use secure_gateway::config::validation::validate_config;
use secure_gateway::config::watcher::ConfigWatcher;
use secure_gateway::config::GatewayConfig;
use secure_gateway::filter::Collaborators;
use secure_gateway::http::GatewayServer;
use secure_gateway::lifecycle::{signals, Shutdown};
use secure_gateway::observability::{logging, metrics};
use secure_gateway::services::logging::{publisher_for, PublishingLogger, TracingLogPublisher};
use secure_gateway::services::replay::{MemoryReplayCache, NonceReplayProtection};
use secure_gateway::services::UnconfiguredCrypto;

#[derive(Parser, Debug)]
#[command(name = "secure-gateway", version, about = "HTTP security gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let config = if config_exists {
        load_config(&cli.config)?
    } else {
        let config = GatewayConfig::default();
        validate_config(&config).map_err(|errors| format!("{errors:?}"))?;
        config
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!("secure-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    if !config_exists {
        tracing::warn!(path = ?cli.config, "Config file not found, using defaults");
    }

    if cli.check {
        println!("Configuration OK: {}", cli.config.display());
        return Ok(());
    }

    if config.security.crypto.enabled {
        return Err("security.crypto.enabled requires a crypto engine; \
                    embed the library and supply a CryptoService"
            .into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    // Replay store and its sweeper
    let replay_config = &config.security.replay;
    if replay_config.strategy != "memory" {
        tracing::warn!(strategy = %replay_config.strategy, "Unknown replay strategy, using memory");
    }
    let replay_cache = Arc::new(MemoryReplayCache::new());
    spawn_replay_sweeper(
        Arc::clone(&replay_cache),
        Duration::from_secs(replay_config.ttl_secs.max(1)),
        shutdown.clone(),
    );

    let publisher = publisher_for(&config.security.logging.publisher)
        .unwrap_or_else(|| Arc::new(TracingLogPublisher));

    let collaborators = Collaborators {
        crypto: Arc::new(UnconfiguredCrypto),
        replay: Arc::new(NonceReplayProtection::new(replay_cache, replay_config)),
        logging: Arc::new(PublishingLogger::new(publisher)),
    };

    // Hot reload; the watcher must stay alive for the lifetime of the server.
    let (_watcher, config_updates) = if config_exists {
        let (watcher, updates) = ConfigWatcher::new(&cli.config, config.clone());
        (Some(watcher.run()?), updates)
    } else {
        let (_tx, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GatewayServer::new(config, collaborators)?;
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn spawn_replay_sweeper(cache: Arc<MemoryReplayCache>, every: Duration, shutdown: Shutdown) {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = cache.len(), "Purged expired nonces");
                    }
                }
                _ = stop.recv() => break,
            }
        }
    });
}
