//! WebSocket client with a per-connection reconnect policy.

pub mod client;

pub use client::{
    OnMessageCallback, OnStatusCallback, ReconnectPolicy, WsConnConfig, WsConnection,
    validate_ws_url,
};
