//! Player: the single-task event loop tying sockets, clocks and the session together.
//!
//! ```text
//! price-ws / music-ws ──► SessionEvent ──┐
//! timbre load task   ──► SessionEvent ──┤
//!                                       ▼
//!                 Player::run  select! { events, beat clock, paint clock, shutdown }
//!                                       │
//!                                       ▼
//!                                    Session
//! ```
//!
//! Everything that mutates the session runs inside [`Player::run`] (or
//! [`Player::pump`] in tests), one callback at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tc_core::config::AppConfig;
use tc_core::time_util::monotonic_ms;
use tc_core::{Feed, Rhythm, Voice};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::canvas::Canvas;
use crate::connection::ConnectionManager;
use crate::event::{SessionEvent, SessionEventReceiver, SessionEventSender};
use crate::instrument::{LoadOutcome, TimbreLoader, load_with_timeout};
use crate::render::FrameStats;
use crate::session::Session;

/// Beats between two stats lines in the log.
const STATS_EVERY_BEATS: u64 = 30;

pub struct Player {
    cfg: AppConfig,
    session: Session,
    connections: ConnectionManager,
    loader: Arc<dyn TimbreLoader>,
    events_tx: SessionEventSender,
    events_rx: Option<SessionEventReceiver>,
    instrument: String,
    status_message: Option<String>,
    last_frame: Option<FrameStats>,
    beats: u64,
}

impl Player {
    pub fn new(cfg: AppConfig, loader: Arc<dyn TimbreLoader>) -> Self {
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let connections = ConnectionManager::new(&cfg.server, events_tx.clone());
        Self {
            session: Session::new(&cfg),
            instrument: cfg.audio.instrument.clone(),
            cfg,
            connections,
            loader,
            events_tx,
            events_rx: Some(events_rx),
            status_message: None,
            last_frame: None,
            beats: 0,
        }
    }

    /// Open the always-on price (or combined legacy) socket.
    pub fn open_price_feed(&mut self) -> Result<()> {
        self.connections.start_price_feed()
    }

    /// Start playback: fresh session, music socket, instrument load.
    ///
    /// Returns `false` if already playing.
    pub async fn start(&mut self) -> Result<bool> {
        if self.session.is_playing() {
            return Ok(false);
        }
        self.session.start(monotonic_ms());
        if let Err(e) = self.connections.connect_music().await {
            self.stop().await;
            return Err(e);
        }
        let instrument = self.instrument.clone();
        self.spawn_load(instrument);
        Ok(true)
    }

    /// Stop playback. Safe to call when already stopped or never started.
    pub async fn stop(&mut self) {
        self.session.stop();
        self.connections.close_music().await;
    }

    /// Stop playback and close every socket.
    pub async fn shutdown(&mut self) {
        self.stop().await;
        self.connections.shutdown().await;
    }

    /// Select a new instrument. While playing it is loaded immediately and
    /// supersedes any load still in flight.
    pub fn switch_instrument(&mut self, instrument: &str) {
        self.instrument = instrument.to_owned();
        if self.session.is_playing() {
            self.spawn_load(instrument.to_owned());
        }
    }

    fn spawn_load(&mut self, instrument: String) {
        let ticket = self.session.begin_instrument_load(&instrument);
        let loader = Arc::clone(&self.loader);
        let tx = self.events_tx.clone();
        let timeout = self.cfg.audio.load_timeout();
        let attempt = ticket.generation;
        info!("[player] loading '{instrument}' (attempt {attempt})");
        tokio::spawn(async move {
            let result = load_with_timeout(loader, &ticket.instrument, timeout).await;
            let _ = tx.send(SessionEvent::TimbreLoaded { ticket, result });
        });
    }

    pub fn set_mute(&mut self, voice: Voice, muted: bool) {
        self.session.set_mute(voice, muted);
    }

    pub fn set_rhythm(&mut self, rhythm: Rhythm) {
        self.session.set_rhythm(rhythm);
    }

    pub fn set_expected_build(&mut self, build_id: Option<String>) {
        self.session.set_expected_build(build_id);
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    /// Apply one event to the session.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let now = monotonic_ms();
        trace!("[player] {} event", event.kind());
        match event {
            SessionEvent::BundleReceived { feed, bundle } => {
                self.session.ingest_bundle(feed, bundle, now);
            }
            SessionEvent::TickReceived { feed, tick } => {
                self.session.ingest_tick(feed, tick, now);
            }
            SessionEvent::PricesReceived { feed, snapshot } => {
                self.session.ingest_prices(feed, snapshot, now);
            }
            SessionEvent::ConnectionStatusChanged { feed, state } => {
                self.connections.record_status(feed, state);
                let closed = !state.is_open() && !state.reconnecting;
                if feed == Feed::Music && closed && self.session.is_playing() {
                    warn!("[player] music feed closed; restart playback to reconnect");
                }
            }
            SessionEvent::TimbreLoaded { ticket, result } => {
                match self.session.finish_instrument_load(&ticket, result) {
                    LoadOutcome::Installed(_) => self.status_message = None,
                    LoadOutcome::Failed(msg) => self.status_message = Some(msg),
                    LoadOutcome::Stale(_) => {}
                }
            }
        }
    }

    /// Apply every event already waiting. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let Some(mut rx) = self.events_rx.take() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        self.events_rx = Some(rx);
        handled
    }

    /// Run the event loop until `shutdown` flips or its sender is dropped.
    pub async fn run(
        &mut self,
        canvas: &mut dyn Canvas,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut rx = self
            .events_rx
            .take()
            .ok_or_else(|| anyhow!("player loop already running"))?;

        let mut beat = tokio::time::interval(self.cfg.transport.beat());
        beat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let frame_ms = self.cfg.render.frame_ms.max(1);
        let mut paint = tokio::time::interval(Duration::from_millis(frame_ms));
        paint.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "[player] loop running (beat={}ms, frame={}ms)",
            self.cfg.transport.beat_ms, self.cfg.render.frame_ms
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[player] shutdown requested");
                    break;
                }
                ev = rx.recv() => match ev {
                    Some(ev) => self.handle_event(ev),
                    None => break,
                },
                _ = beat.tick() => self.on_beat(),
                _ = paint.tick() => {
                    self.last_frame = Some(self.session.on_paint(monotonic_ms(), canvas));
                }
            }
        }

        self.events_rx = Some(rx);
        Ok(())
    }

    fn on_beat(&mut self) {
        self.session.on_transport_beat(monotonic_ms());
        self.beats += 1;
        if self.beats % STATS_EVERY_BEATS == 0 {
            let s = self.session.stats();
            let frame = self.last_frame.as_ref();
            debug!(
                "[player] beats={} bundles={} notes={} triggers={} queued={} visible={:?}",
                self.beats,
                s.bundles,
                s.notes,
                s.triggers,
                self.session.queue().len(),
                frame.map(|f| [f.lanes[0].visible_notes, f.lanes[1].visible_notes]),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Sender for injecting events, e.g. from a host UI.
    pub fn event_sender(&self) -> SessionEventSender {
        self.events_tx.clone()
    }

    /// Last user-facing failure (instrument load), cleared by the next success.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn last_frame(&self) -> Option<&FrameStats> {
        self.last_frame.as_ref()
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }
}
