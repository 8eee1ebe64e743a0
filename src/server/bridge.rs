//! HTTP bridge to the echo relay
//!
//! `POST /send` formats a JSON request as a message frame, stamps it with the
//! server's local time, pushes it through a one-shot TCP connection to the
//! echo relay and returns the first line echoed back.

use std::io;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::protocol::{MessageFrame, ProtocolError};

/// Timestamp layout stamped on bridged frames
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors that can occur while bridging a request
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ProtocolError),

    #[error("Failed to connect to echo relay at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Echo relay I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Echo relay did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Echo relay closed the connection without a reply")]
    NoReply,
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    fn status(&self) -> StatusCode {
        match self {
            BridgeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (self.status(), format!("Error: {}", self)).into_response()
    }
}

/// Body of `POST /send`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub client_id: String,
    pub message_type: String,
    pub content: String,
}

/// State shared by the bridge handlers
#[derive(Debug, Clone)]
pub struct BridgeState {
    /// Echo relay as `host:port`
    pub echo_addr: String,
    pub timeout: Duration,
}

/// CORS policy admitting a single browser origin
pub fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]))
}

/// Build the bridge routes
pub fn router(state: BridgeState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/send", post(send_message))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Forward one message to the echo relay and return its reply
pub async fn send_message(
    State(state): State<BridgeState>,
    Json(request): Json<SendRequest>,
) -> BridgeResult<String> {
    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    let frame = MessageFrame::new(
        request.client_id,
        timestamp,
        request.message_type,
        request.content,
    );
    let line = frame
        .ensure_single_line()
        .and_then(|()| frame.encode())
        .inspect_err(|e| warn!("Rejecting bridge request: {}", e))?;

    debug!("Bridging frame to {}: {}", state.echo_addr, line);
    forward_line(&state.echo_addr, &line, state.timeout).await
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Write `line` to the echo relay and read the first line it sends back
pub async fn forward_line(addr: &str, line: &str, limit: Duration) -> BridgeResult<String> {
    let exchange = async {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| BridgeError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let (reader, mut writer) = stream.into_split();

        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let mut reply = String::new();
        if BufReader::new(reader).read_line(&mut reply).await? == 0 {
            return Err(BridgeError::NoReply);
        }
        Ok(reply.trim_end_matches(['\r', '\n']).to_string())
    };

    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| BridgeError::Timeout(limit))?
}

/// HTTP server wrapping [`router`]
pub struct HttpBridge {
    config: BridgeConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpBridge {
    pub fn new(config: BridgeConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            config,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let state = BridgeState {
            echo_addr: self.config.echo_addr.clone(),
            timeout: self.config.timeout(),
        };
        let cors = cors_layer(&self.config.cors_origin)?;
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        info!(
            "HTTP bridge listening on http://{} (echo relay {}, origin {})",
            listener.local_addr()?,
            state.echo_addr,
            self.config.cors_origin
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, router(state, cors))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received, stopping HTTP bridge");
            })
            .await?;

        Ok(())
    }
}
