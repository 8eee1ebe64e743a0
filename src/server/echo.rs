//! TCP echo relay
//!
//! Line-oriented broadcaster: every non-empty line a client sends is written to
//! every connected client, the sender included. No rooms, no parsing. A client
//! that sends a line longer than [`MAX_LINE_LENGTH`] is disconnected.

use std::net::SocketAddr;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::config::EchoConfig;

/// Lines buffered before a slow client starts lagging
const LINE_BUFFER: usize = 128;

/// Longest line accepted from a client, in bytes
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Broadcasts newline-terminated lines to all connected TCP clients
pub struct EchoRelay {
    config: EchoConfig,
    lines: broadcast::Sender<String>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EchoRelay {
    pub fn new(config: EchoConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        let (lines, _) = broadcast::channel(LINE_BUFFER);
        Self {
            config,
            lines,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Serve clients from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Echo relay listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let lines = self.lines.clone();
                            let shutdown_rx = self.shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, peer, lines, shutdown_rx).await {
                                    warn!("Echo client {} closed with error: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => error!("Failed to accept echo client: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping echo relay");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    lines: broadcast::Sender<String>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    // Subscribe before reading so the client sees its own first line
    let mut inbox = lines.subscribe();
    let (reader, mut writer) = stream.into_split();
    let mut reader = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    info!("Echo client connected: {}", peer);

    loop {
        tokio::select! {
            line = reader.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        warn!("Echo client {} exceeded {} bytes in one line, dropping", peer, MAX_LINE_LENGTH);
                        break;
                    }
                    Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                    None => break,
                };
                // The codec strips the trailing \r of a \r\n terminator
                if line.is_empty() {
                    continue;
                }
                debug!("Echo received from {}: {}", peer, line);
                let _ = lines.send(line);
            }
            message = inbox.recv() => {
                match message {
                    Ok(line) => {
                        writer.write_all(line.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Echo client {} lagged behind by {} lines", peer, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    info!("Echo client disconnected: {}", peer);
    Ok(())
}
