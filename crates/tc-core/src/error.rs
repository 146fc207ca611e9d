//! Typed error definitions for the tickchorale client.
//!
//! Provides [`TcError`] for failures a caller needs to branch on. All variants
//! implement `std::error::Error` via `thiserror`, so they compose with
//! `anyhow::Result` at the I/O seams.

use thiserror::Error;

/// Domain-specific errors for the tickchorale client.
#[derive(Debug, Error)]
pub enum TcError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Instrument (sample set) loading failed or timed out.
    #[error("timbre error: {0}")]
    Timbre(String),

    /// Control endpoint request failed.
    #[error("http error: {0}")]
    Http(String),
}
