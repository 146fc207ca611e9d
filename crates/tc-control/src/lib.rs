//! # tc-control
//!
//! Client for the producer's HTTP control surface.
//!
//! | Operation      | Method | Path      |
//! |----------------|--------|-----------|
//! | Build identity | GET    | `/build`  |
//! | Apply tuning   | POST   | `/config` |
//! | Reset session  | POST   | `/reset`  |
//!
//! The runner talks to the producer through the [`ControlApi`] trait so the
//! startup handshake can be exercised without a server.

pub mod client;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use client::ControlClient;
pub use types::{BuildInfo, ConfigRequest, ConfigResponse};

#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Identity of the running producer build.
    async fn build_info(&self) -> Result<BuildInfo>;

    /// Push tuning values; the producer echoes what it actually applied.
    async fn apply_config(&self, request: &ConfigRequest) -> Result<ConfigResponse>;

    /// Reset producer-side state before the first playback of a session.
    async fn reset(&self) -> Result<()>;
}
