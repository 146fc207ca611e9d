//! # tickchorale
//!
//! Headless client for a market-music producer.
//!
//! Connects the price feed, performs the control handshake, starts playback
//! and runs the session loop until Ctrl+C (or `--duration-secs`) elapses.
//!
//! # Usage
//!
//! ```bash
//! tickchorale config.json --log-level debug --instrument strings --rhythm 8
//! ```

mod headless;
mod startup;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tc_control::ControlClient;
use tc_core::config::AppConfig;
use tc_stream::Player;
use tc_stream::canvas::RecordingCanvas;
use tokio::sync::watch;
use tracing::{error, info};

use crate::headless::HeadlessLoader;

/// Market-music streaming client.
#[derive(Parser, Debug)]
#[command(name = "tickchorale", about = "Market-music streaming client")]
struct Cli {
    /// Configuration file path (JSON). Defaults apply when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Instrument to load on start.
    #[arg(long)]
    instrument: Option<String>,

    /// Use the combined single-socket feed of older producers.
    #[arg(long)]
    legacy: bool,

    /// Lead rhythm in sub-steps per beat (4, 8 or 16).
    #[arg(long)]
    rhythm: Option<u8>,

    /// Producer sensitivity multiplier.
    #[arg(long)]
    sensitivity: Option<f64>,

    /// Stop after this many seconds instead of waiting for Ctrl+C.
    #[arg(long)]
    duration_secs: Option<u64>,
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(name) = &self.instrument {
            cfg.audio.instrument = name.clone();
        }
        if self.legacy {
            cfg.server.legacy_combined = true;
        }
        if let Some(r) = self.rhythm {
            cfg.tuning.soprano_rhythm = r;
        }
        if let Some(s) = self.sensitivity {
            cfg.tuning.sensitivity = s;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    tc_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "tickchorale");

    // 2. Load configuration
    let mut cfg = match &cli.config {
        Some(path) => tc_core::config::load_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply_overrides(&mut cfg);
    cfg.validate()?;
    info!(
        "tickchorale starting: server={} legacy={} instrument={}",
        cfg.server.base_url, cfg.server.legacy_combined, cfg.audio.instrument
    );

    // 3. Control handshake
    let control = ControlClient::new(&cfg.server.base_url, cfg.server.http_timeout())?;
    let hs = startup::handshake(&control, &cfg.tuning).await;

    // 4. Player: price feed first, then playback
    let mut player = Player::new(cfg, Arc::new(HeadlessLoader::default()));
    player.set_expected_build(hs.build_id);
    player.set_rhythm(hs.rhythm);
    player.open_price_feed()?;
    if let Err(e) = player.start().await {
        error!("playback failed to start: {e:#}");
        player.shutdown().await;
        return Err(e);
    }

    // 5. Shutdown trigger
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let duration = cli.duration_secs.map(Duration::from_secs);
    tokio::spawn(async move {
        match duration {
            Some(d) => {
                tokio::select! {
                    _ = tokio::time::sleep(d) => info!("run duration elapsed"),
                    _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            }
        }
        let _ = shutdown_tx.send(true);
    });

    // 6. Session loop
    let mut canvas = RecordingCanvas::new();
    player.run(&mut canvas, shutdown_rx).await?;

    let stats = player.session().stats();
    info!(
        "session summary: bundles={} ticks={} notes={} triggers={} frames={}",
        stats.bundles,
        stats.ticks,
        stats.notes,
        stats.triggers,
        canvas.frames()
    );

    // 7. Teardown
    player.shutdown().await;
    info!("goodbye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "tickchorale",
            "--legacy",
            "--instrument",
            "strings",
            "--rhythm",
            "8",
            "--sensitivity",
            "2.5",
        ]);
        let mut cfg = AppConfig::default();
        cli.apply_overrides(&mut cfg);
        assert!(cfg.server.legacy_combined);
        assert_eq!(cfg.audio.instrument, "strings");
        assert_eq!(cfg.tuning.soprano_rhythm, 8);
        assert_eq!(cfg.tuning.sensitivity, 2.5);
        assert!(cli.config.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_rhythm_fails_validation() {
        let cli = Cli::parse_from(["tickchorale", "--rhythm", "6"]);
        let mut cfg = AppConfig::default();
        cli.apply_overrides(&mut cfg);
        assert!(cfg.validate().is_err());
    }
}
