//! Room Relay Server
//!
//! WebSocket relay for room-scoped chat. Clients join a named room under a user
//! id, broadcast frames to everyone in that room, and send point-to-point
//! messages to any user by id. A TCP echo relay and an HTTP bridge into it can
//! run alongside.

mod config;
mod protocol;
mod registry;
mod relay;
mod server;

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{host_port, BridgeConfig, EchoConfig, RelayConfig, DEFAULT_BIND, DEFAULT_ECHO_PORT};
use server::{EchoRelay, HttpBridge, WebSocketServer};

/// Room Relay Server
///
/// WebSocket relay with room broadcast and user-to-user messaging
#[derive(Parser, Debug)]
#[command(name = "room-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port for the WebSocket relay [default: 8080]
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address [default: 127.0.0.1]
    #[arg(long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the TCP echo relay on this port
    #[arg(long)]
    echo_port: Option<u16>,

    /// Run the HTTP bridge on this port
    #[arg(long)]
    bridge_port: Option<u16>,

    /// Frames buffered per connection before delivery to it fails
    #[arg(long)]
    queue_capacity: Option<usize>,
}

impl Args {
    /// Load the config file, if any, and apply command line overrides on top
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.relay.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(capacity) = self.queue_capacity {
            config.relay.queue_capacity = capacity;
        }
        if let Some(port) = self.echo_port {
            let echo = config.echo.get_or_insert_with(|| EchoConfig {
                bind: config.relay.bind.clone(),
                ..EchoConfig::default()
            });
            echo.port = port;
        }
        if let Some(port) = self.bridge_port {
            let echo_addr = match &config.echo {
                Some(echo) => echo.connect_addr(),
                None => host_port(DEFAULT_BIND, DEFAULT_ECHO_PORT),
            };
            let bridge = config.bridge.get_or_insert_with(|| BridgeConfig {
                bind: config.relay.bind.clone(),
                echo_addr,
                ..BridgeConfig::default()
            });
            bridge.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Room Relay v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config()?;
    let (shutdown_tx, _) = broadcast::channel(1);

    if let Some(echo) = config.echo.clone() {
        let relay = EchoRelay::new(echo, shutdown_tx.clone());
        tokio::spawn(async move {
            if let Err(e) = relay.run().await {
                error!("Echo relay failed: {}", e);
            }
        });
    }

    if let Some(bridge) = config.bridge.clone() {
        let bridge = HttpBridge::new(bridge, shutdown_tx.clone());
        tokio::spawn(async move {
            if let Err(e) = bridge.run().await {
                error!("HTTP bridge failed: {}", e);
            }
        });
    }

    let server = WebSocketServer::new(config.relay, shutdown_tx.clone());

    // Spawn shutdown signal handler
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        let _ = signal_tx.send(());
    });

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("room-relay").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_flags_enable_echo_and_bridge() {
        let config = parse(&["--port", "9000", "--echo-port", "9191", "--bridge-port", "8181"])
            .into_config()
            .unwrap();

        assert_eq!(config.relay.port, 9000);
        assert_eq!(config.echo.as_ref().map(|e| e.port), Some(9191));
        let bridge = config.bridge.unwrap();
        assert_eq!(bridge.port, 8181);
        assert_eq!(bridge.echo_addr, "127.0.0.1:9191");
    }

    #[test]
    fn test_ipv6_bind_flag_reaches_bridge_upstream() {
        let config = parse(&["--bind", "::1", "--echo-port", "9191", "--bridge-port", "8181"])
            .into_config()
            .unwrap();

        assert_eq!(config.relay.listen_addr(), ("::1", 8080));
        assert_eq!(config.bridge.unwrap().echo_addr, "[::1]:9191");
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[relay]\nport = 7000\nqueue_capacity = 8\n").unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--port", "7100"])
            .into_config()
            .unwrap();

        assert_eq!(config.relay.port, 7100);
        assert_eq!(config.relay.queue_capacity, 8);
    }
}
