//! wsline-cli - Command-line WebSocket client
//!
//! Provides both a REPL and one-shot commands.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wsline_client::{Client, ConnectionConfig, TlsClientConfig};

#[derive(Parser)]
#[command(name = "wsline-cli")]
#[command(about = "Command-line WebSocket client")]
#[command(version)]
struct Cli {
    /// Server URL (ws:// or wss://)
    #[arg(short, long, env = "WSLINE_URL", default_value = "ws://127.0.0.1:9001/")]
    url: String,

    /// Extra request header, as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    // ===== TLS Options =====
    /// Use TLS even for a ws:// URL
    #[arg(long, env = "WSLINE_TLS")]
    tls: bool,

    /// Path to CA certificate for server verification
    #[arg(long, env = "WSLINE_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (for mTLS)
    #[arg(long, env = "WSLINE_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to client private key (for mTLS)
    #[arg(long, env = "WSLINE_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Server name for TLS SNI (defaults to the URL host)
    #[arg(long)]
    server_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Send one message and print the first reply
    Send {
        /// Message text (or @file to send a file's contents)
        message: String,

        /// Send as a binary message
        #[arg(short, long)]
        binary: bool,

        /// Seconds to wait for a reply (0 = don't wait)
        #[arg(short, long, default_value = "5")]
        wait: u64,
    },

    /// Ping the server and report the round trip
    Ping {
        /// Ping payload (at most 125 bytes)
        #[arg(default_value = "")]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let tls_config =
        if cli.tls || cli.ca_cert.is_some() || cli.client_cert.is_some() || cli.insecure {
            let mut tls = TlsClientConfig::new();
            tls.enabled = true;

            if let Some(ref path) = cli.ca_cert {
                tls.ca_cert_path = Some(path.clone());
            }
            if let (Some(cert), Some(key)) = (&cli.client_cert, &cli.client_key) {
                tls.client_cert_path = Some(cert.clone());
                tls.client_key_path = Some(key.clone());
            } else if cli.client_cert.is_some() || cli.client_key.is_some() {
                eprintln!(
                    "{}: --client-cert and --client-key must be used together",
                    "Error".red()
                );
                std::process::exit(1);
            }
            tls.insecure = cli.insecure;
            tls.server_name = cli.server_name.clone();

            Some(tls)
        } else {
            None
        };

    let mut config =
        ConnectionConfig::new(&cli.url)?.with_connect_timeout(Duration::from_secs(cli.timeout));
    for header in &cli.headers {
        match commands::parse_header(header) {
            Some((name, value)) => config = config.with_header(name, value),
            None => {
                eprintln!("{}: invalid header {:?}", "Error".red(), header);
                std::process::exit(1);
            }
        }
    }
    if let Some(tls) = tls_config {
        config = config.with_tls(tls);
    }
    let client = Client::new(config);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client).await?;
        }
        Some(cmd) => {
            let socket = client.connect().await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            match commands::execute(socket, cmd).await {
                Ok(output) => {
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
