//! wsline - WebSocket echo server
//!
//! Accepts `ws://` (or `wss://`) connections and sends every message back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wsline_server::{tls, Config, Server, ServerConfig, WebSocket};

async fn echo(mut socket: WebSocket, peer: SocketAddr) {
    while let Some(result) = socket.next_message().await {
        match result {
            Ok(message) => {
                tracing::debug!("[{}] echoing {} bytes", peer, message.payload().len());
                if let Err(e) = socket.send(message).await {
                    tracing::debug!("[{}] echo failed: {}", peer, e);
                    break;
                }
            }
            Err(e) => {
                tracing::info!("[{}] connection failed: {}", peer, e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if WSLINE_CONFIG is set, then env overrides)
    let config_path = std::env::var("WSLINE_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(ref path) = config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::from_env()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Configuration error: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting wsline echo server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!(
        "  Max message size: {} bytes",
        config.websocket.max_message_size
    );

    let mut server_config = ServerConfig::from_config(&config);
    if config.tls.enabled {
        let acceptor = tls::create_tls_acceptor(&config.tls)?;
        tracing::info!("  TLS: enabled");
        if config.tls.require_client_cert {
            tracing::info!("  mTLS: enabled (client certificate required)");
        }
        server_config = server_config.with_tls(acceptor);
    } else {
        tracing::info!("  TLS: disabled");
    }

    let server = Arc::new(Server::new(server_config, echo));

    let runner = server.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = handle => {
            // The accept loop only returns on its own if binding failed.
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            server.shutdown();
            if !server.wait_idle(Duration::from_secs(5)).await {
                tracing::warn!("Connections still open after shutdown timeout");
            }
        }
    }

    let stats = server.stats();
    tracing::info!(
        "Served {} connections ({} upgraded, {} rejected)",
        stats
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.upgrades_total.load(std::sync::atomic::Ordering::Relaxed),
        stats.rejected_total.load(std::sync::atomic::Ordering::Relaxed),
    );

    Ok(())
}
