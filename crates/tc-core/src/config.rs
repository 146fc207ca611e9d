//! Configuration parsing for the tickchorale client.
//!
//! The client reads a single JSON config file. Every field carries a serde
//! default, so `{}` is a complete configuration pointing at a producer on
//! `localhost:8000`.
//!
//! # Example config
//!
//! ```json
//! {
//!   "server": { "base_url": "http://127.0.0.1:8000", "legacy_combined": false },
//!   "transport": { "beat_ms": 1000, "sub_steps": 16 },
//!   "audio": { "instrument": "piano", "load_timeout_ms": 10000 },
//!   "tuning": { "sensitivity": 1.0, "soprano_rhythm": 16 }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::TcError;
use crate::types::Rhythm;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub history: HistoryConfig,
    pub render: RenderConfig,
    pub audio: AudioConfig,
    pub tuning: TuningConfig,
}

impl AppConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), TcError> {
        if self.transport.sub_steps == 0 {
            return Err(TcError::Config("transport.sub_steps must be > 0".into()));
        }
        if self.transport.beat_ms == 0 {
            return Err(TcError::Config("transport.beat_ms must be > 0".into()));
        }
        if self.transport.queue_capacity == 0 {
            return Err(TcError::Config(
                "transport.queue_capacity must be > 0".into(),
            ));
        }
        if self.history.note_capacity == 0 || self.history.anchor_capacity == 0 {
            return Err(TcError::Config("history capacities must be > 0".into()));
        }
        if !(self.history.window_ms > 0.0 && self.history.window_ms.is_finite()) {
            return Err(TcError::Config("history.window_ms must be > 0".into()));
        }
        if !(self.render.width > 0.0 && self.render.width.is_finite()) {
            return Err(TcError::Config("render.width must be > 0".into()));
        }
        if !(self.render.height > 0.0 && self.render.height.is_finite()) {
            return Err(TcError::Config("render.height must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.render.playhead_fraction) {
            return Err(TcError::Config(
                "render.playhead_fraction must be within 0..=1".into(),
            ));
        }
        if Rhythm::from_steps(self.tuning.soprano_rhythm).is_none() {
            return Err(TcError::Config(format!(
                "tuning.soprano_rhythm must be 4, 8 or 16 (got {})",
                self.tuning.soprano_rhythm
            )));
        }
        Ok(())
    }
}

/// Producer endpoints and socket policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP base URL for the control endpoints.
    pub base_url: String,
    /// WebSocket base URL (`ws://` or `wss://`).
    pub ws_base_url: String,
    /// Path of the continuous price feed.
    pub price_path: String,
    /// Path of the on-demand music feed.
    pub music_path: String,
    /// Path of the combined legacy feed.
    pub legacy_path: String,
    /// Use the single combined legacy socket instead of the two split feeds.
    pub legacy_combined: bool,
    /// Fixed delay before the price socket reconnects.
    pub price_reconnect_delay_ms: u64,
    /// Timeout applied to every control request.
    pub http_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            ws_base_url: "ws://127.0.0.1:8000".into(),
            price_path: "/ws/prices".into(),
            music_path: "/ws/music".into(),
            legacy_path: "/ws".into(),
            legacy_combined: false,
            price_reconnect_delay_ms: 3_000,
            http_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    pub fn price_url(&self) -> String {
        join_url(&self.ws_base_url, &self.price_path)
    }

    pub fn music_url(&self) -> String {
        join_url(&self.ws_base_url, &self.music_path)
    }

    pub fn legacy_url(&self) -> String {
        join_url(&self.ws_base_url, &self.legacy_path)
    }

    pub fn price_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.price_reconnect_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Beat clock and look-ahead queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Length of one beat (one transport period).
    pub beat_ms: u64,
    /// Sub-steps per beat.
    pub sub_steps: usize,
    /// Maximum number of unplayed bundles held for the scheduler.
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            beat_ms: 1_000,
            sub_steps: 16,
            queue_capacity: 4,
        }
    }
}

impl TransportConfig {
    /// Duration of one sub-step in milliseconds.
    pub fn sub_step_ms(&self) -> f64 {
        self.beat_ms as f64 / self.sub_steps.max(1) as f64
    }

    pub fn beat(&self) -> Duration {
        Duration::from_millis(self.beat_ms)
    }
}

/// Retention limits for the note and anchor buffers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub window_ms: f64,
    pub note_capacity: usize,
    pub anchor_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_ms: 15_000.0,
            note_capacity: 400,
            anchor_capacity: 120,
        }
    }
}

/// Piano-roll geometry and auto-range limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: f64,
    pub height: f64,
    /// Paint clock period.
    pub frame_ms: u64,
    /// Horizontal position of the playhead as a fraction of the width.
    pub playhead_fraction: f64,
    pub note_height: f64,
    /// Fraction of the data span added above and below each auto-range.
    pub range_padding: f64,
    pub pitch_floor: f64,
    pub pitch_ceiling: f64,
    pub price_floor: f64,
    pub price_ceiling: f64,
    /// Span used when all values in a lane are identical.
    pub default_pitch_span: f64,
    pub default_price_span: f64,
    /// Spacing of time-axis labels.
    pub label_interval_ms: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1_200.0,
            height: 600.0,
            frame_ms: 33,
            playhead_fraction: 0.8,
            note_height: 6.0,
            range_padding: 0.08,
            pitch_floor: 0.0,
            pitch_ceiling: 127.0,
            price_floor: 0.01,
            price_ceiling: 10_000_000.0,
            default_pitch_span: 12.0,
            default_price_span: 1.0,
            label_interval_ms: 5_000.0,
        }
    }
}

/// Instrument selection and per-voice mutes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub instrument: String,
    pub load_timeout_ms: u64,
    pub mute_lead: bool,
    pub mute_secondary: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            instrument: "piano".into(),
            load_timeout_ms: 10_000,
            mute_lead: false,
            mute_secondary: false,
        }
    }
}

impl AudioConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// Values pushed to the producer's config endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub sensitivity: f64,
    pub price_noise: f64,
    pub soprano_rhythm: u8,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            price_noise: 1.0,
            soprano_rhythm: 16,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
