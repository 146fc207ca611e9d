//! Single WebSocket connection driven by a background tokio task.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the producer endpoint.
//! 2. Reads text frames and forwards them to a callback.
//! 3. Reports every lifecycle transition to a status callback.
//! 4. On disconnect, either reconnects after a fixed delay or stops for good,
//!    depending on its [`ReconnectPolicy`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::TcError;
use crate::types::{ConnectionState, ConnectionStatus};

/// Callback invoked for each received text message.
///
/// Parameters: `(connection_label, message_text)`
pub type OnMessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Callback invoked on every connection state transition.
pub type OnStatusCallback = Arc<dyn Fn(&str, ConnectionState) + Send + Sync>;

/// What to do after the socket closes without a local stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect after the same delay, forever.
    FixedDelay(Duration),
    /// Stay closed; the owner decides when to open a new connection.
    Never,
}

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `ws://127.0.0.1:8000/ws/music`).
    pub url: String,
    /// Label used in log lines and callbacks.
    pub label: String,
    pub reconnect: ReconnectPolicy,
    /// Interval between standard WebSocket ping frames.
    pub ping_interval: Option<Duration>,
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task. Calling `start` on a running connection is a no-op.
    pub fn start(&mut self, on_text: OnMessageCallback, on_status: OnStatusCallback) {
        if self.is_running() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, on_status, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
    }

    /// The background task exists and has not finished.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the connection and wait for the task to finish.
    ///
    /// Safe to call any number of times, including before `start`.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

fn state(status: ConnectionStatus, reconnecting: bool) -> ConnectionState {
    ConnectionState {
        status,
        reconnecting,
    }
}

/// Main connection loop: connects, reads, pings, applies the reconnect policy.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    on_status: OnStatusCallback,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let label = config.label.as_str();

    loop {
        if *shutdown_rx.borrow() {
            info!("[{label}] shutdown requested");
            on_status(label, state(ConnectionStatus::Closed, false));
            return;
        }

        info!("[{label}] connecting to {}", config.url);
        on_status(label, state(ConnectionStatus::Connecting, false));

        let ws_stream = tokio::select! {
            res = connect_ws(&config) => res,
            _ = shutdown_rx.changed() => {
                on_status(label, state(ConnectionStatus::Closed, false));
                return;
            }
        };

        match ws_stream {
            Ok(ws_stream) => {
                info!("[{label}] connected");
                on_status(label, state(ConnectionStatus::Open, false));

                let (mut ws_write, mut ws_read) = ws_stream.split();

                tokio::pin! {
                    let ping_tick = async {
                        if let Some(d) = config.ping_interval {
                            let mut interval = tokio::time::interval(d);
                            interval.tick().await;
                            loop {
                                interval.tick().await;
                            }
                        } else {
                            std::future::pending::<()>().await
                        }
                    };
                }

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            info!("[{label}] shutdown signal received");
                            let _ = ws_write.close().await;
                            on_status(label, state(ConnectionStatus::Closed, false));
                            return;
                        }

                        msg = ws_read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    on_text(label, &text);
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    let _ = ws_write.send(Message::Pong(data)).await;
                                }
                                Some(Ok(Message::Close(_))) => {
                                    warn!("[{label}] received close frame");
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!("[{label}] read error: {e}");
                                    break;
                                }
                                None => {
                                    warn!("[{label}] stream ended");
                                    break;
                                }
                                Some(Ok(Message::Binary(data))) => {
                                    debug!("[{label}] ignoring {} byte binary frame", data.len());
                                }
                                _ => {} // Pong, Frame
                            }
                        }

                        _ = &mut ping_tick => {
                            if let Err(e) = ws_write.send(Message::Ping(vec![].into())).await {
                                error!("[{label}] ping send error: {e}");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!("[{label}] connection failed: {e}");
            }
        }

        match config.reconnect {
            ReconnectPolicy::Never => {
                warn!("[{label}] closed, not reconnecting");
                on_status(label, state(ConnectionStatus::Closed, false));
                return;
            }
            ReconnectPolicy::FixedDelay(delay) => {
                warn!("[{label}] disconnected, reconnecting in {delay:?}");
                on_status(label, state(ConnectionStatus::Closed, true));
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = shutdown_rx.changed() => {
                        on_status(label, state(ConnectionStatus::Closed, false));
                        return;
                    }
                }
            }
        }
    }
}

/// Establish a WebSocket connection (plain or TLS, depending on the scheme).
async fn connect_ws(
    config: &WsConnConfig,
) -> anyhow::Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    let (stream, _response) = tokio_tungstenite::connect_async(config.url.as_str())
        .await
        .map_err(|e| TcError::WebSocket(e.to_string()))?;
    Ok(stream)
}

/// Check that `url` parses and uses a WebSocket scheme.
pub fn validate_ws_url(url: &str) -> Result<(), TcError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TcError::Config(format!("bad url {url}: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" if parsed.host_str().is_some() => Ok(()),
        other => Err(TcError::Config(format!(
            "{url}: expected ws:// or wss:// with a host, got {other}"
        ))),
    }
}
