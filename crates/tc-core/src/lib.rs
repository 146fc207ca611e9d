//! # tc-core
//!
//! Core crate for the tickchorale client, providing:
//!
//! - **Types** (`types`): voices, notes, price anchors, bundles, connection and regime state
//! - **Configuration** (`config`): JSON config deserialization with defaults
//! - **Error types** (`error`): domain-specific `TcError` via thiserror
//! - **WebSocket** (`ws`): WS client with a per-connection reconnect policy
//! - **Time utilities** (`time_util`): monotonic millisecond clock
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
