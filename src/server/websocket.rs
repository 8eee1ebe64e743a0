//! WebSocket server implementation
//!
//! Accepts WebSocket connections, feeds every inbound text frame to the
//! dispatcher, and drains each connection's outbound queue back onto its socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::{ConnectionId, Registry};
use crate::relay::{DispatchOutcome, Dispatcher, UnicastOutcome};

/// How long shutdown waits for open connections to send their close frames
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// WebSocket server for room relay clients
pub struct WebSocketServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketServer {
    /// Create a new WebSocket server with an empty registry
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(registry, config.queue_capacity));
        Self {
            config,
            dispatcher,
            shutdown_tx,
        }
    }

    /// Dispatcher shared by all connections
    #[allow(dead_code)]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Trigger server shutdown
    #[allow(dead_code)]
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    ///
    /// Each connection runs concurrently. The server stops accepting when a
    /// shutdown signal is received; open connections get a close frame and
    /// this returns once they finish or [`CLOSE_GRACE`] elapses.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        info!("WebSocket relay listening on ws://{}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            connections.spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, dispatcher, shutdown_rx).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping WebSocket relay");
                    break;
                }
            }
        }

        let registry = self.dispatcher.registry();
        let connection_count = registry.connection_count().await;
        if connection_count > 0 {
            info!(
                "Closing {} connections across {} rooms",
                connection_count,
                registry.room_names().await.len()
            );
        }

        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "Aborting {} connections still open after {:?}",
                connections.len(),
                CLOSE_GRACE
            );
            connections.abort_all();
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
///
/// The connection is removed from the registry however the session ends.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    debug!("New TCP connection from {}", peer_addr);

    let ws_stream = accept_async(stream).await?;
    let (conn, mut outbound_rx) = dispatcher.lifecycle().connect().await;
    info!("Client {} connected as {}", peer_addr, conn);

    let result = relay_frames(
        ws_stream,
        peer_addr,
        conn,
        &dispatcher,
        &mut outbound_rx,
        shutdown_rx,
    )
    .await;

    // Detach before the queue closes
    dispatcher.lifecycle().disconnect(conn).await;
    drop(outbound_rx);
    result
}

async fn relay_frames(
    ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    peer_addr: SocketAddr,
    conn: ConnectionId,
    dispatcher: &Dispatcher,
    outbound_rx: &mut mpsc::Receiver<String>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received frame from {}: {}", peer_addr, text);
                        let outcome = dispatcher.dispatch(conn, &text).await;
                        log_outcome(peer_addr, &outcome);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received binary message from {} ({} bytes), ignoring", peer_addr, data.len());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} requested close", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Connection closed by {}", peer_addr);
                        break;
                    }
                }
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => ws_sender.send(Message::Text(frame)).await?,
                    None => break,
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, closing connection to {}", peer_addr);
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    Ok(())
}

fn log_outcome(peer_addr: SocketAddr, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Joined { room, previous } => {
            debug!("Client {} seated in {} (was {:?})", peer_addr, room, previous);
        }
        DispatchOutcome::Broadcast(report) if !report.is_complete() => {
            warn!(
                "Broadcast from {} missed {} recipients",
                peer_addr,
                report.failed.len()
            );
        }
        DispatchOutcome::Broadcast(_) => {}
        DispatchOutcome::NotInRoom => {
            debug!("Client {} sent a message before joining a room", peer_addr);
        }
        DispatchOutcome::Unicast(UnicastOutcome::Delivered { target, report }) => {
            debug!(
                "Unicast from {} to {} ({} frames queued)",
                peer_addr,
                target,
                report.delivered.len()
            );
        }
        DispatchOutcome::Unicast(UnicastOutcome::TargetNotFound { report }) => {
            debug!(
                "Unicast from {} found no target ({} frames queued)",
                peer_addr,
                report.delivered.len()
            );
        }
        DispatchOutcome::Discarded(err) => {
            debug!("Frame from {} discarded: {}", peer_addr, err);
        }
        DispatchOutcome::Rejected(err) => {
            warn!("Frame from {} rejected: {}", peer_addr, err);
        }
    }
}
