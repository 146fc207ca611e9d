//! Connection manager: owns the two producer sockets and their lifecycles.
//!
//! | Socket | Opened | On unexpected close |
//! |--------|--------|---------------------|
//! | price (or combined legacy) | once at startup | reconnect after a fixed delay, forever |
//! | music | on playback start, if not already running | stays closed until the next start |
//!
//! Frames are classified by the protocol adapter inside the socket callback
//! and forwarded as [`SessionEvent`]s. Malformed frames are logged and
//! dropped there, so the session never sees them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tc_core::config::ServerConfig;
use tc_core::ws::{
    OnMessageCallback, OnStatusCallback, ReconnectPolicy, WsConnConfig, WsConnection,
    validate_ws_url,
};
use tc_core::{ConnectionState, Feed};
use tracing::{debug, info, trace, warn};

use crate::event::{SessionEvent, SessionEventSender};
use crate::protocol::{InboundMessage, parse_message};

const PING_INTERVAL: Duration = Duration::from_secs(30);

fn feed_label(feed: Feed) -> &'static str {
    match feed {
        Feed::Price => "price-ws",
        Feed::Music => "music-ws",
        Feed::Legacy => "legacy-ws",
    }
}

fn feed_slot(feed: Feed) -> usize {
    match feed {
        Feed::Price => 0,
        Feed::Music => 1,
        Feed::Legacy => 2,
    }
}

/// Build the text and status callbacks for one feed.
fn callbacks(feed: Feed, tx: SessionEventSender) -> (OnMessageCallback, OnStatusCallback) {
    let text_tx = tx.clone();
    let on_text: OnMessageCallback = Arc::new(move |label, text| {
        let message = parse_message(text);
        trace!("[{label}] {} message", message.kind());
        let event = match message {
            InboundMessage::Bundle(bundle) => SessionEvent::BundleReceived { feed, bundle },
            InboundMessage::Tick(tick) => SessionEvent::TickReceived { feed, tick },
            InboundMessage::Prices(snapshot) => SessionEvent::PricesReceived { feed, snapshot },
            InboundMessage::Malformed(reason) => {
                warn!("[{label}] dropping malformed message: {reason}");
                return;
            }
        };
        if text_tx.send(event).is_err() {
            debug!("[{label}] session gone, message discarded");
        }
    });

    let on_status: OnStatusCallback = Arc::new(move |_label, state| {
        let _ = tx.send(SessionEvent::ConnectionStatusChanged { feed, state });
    });

    (on_text, on_status)
}

pub struct ConnectionManager {
    server: ServerConfig,
    events: SessionEventSender,
    persistent: Option<WsConnection>,
    music: Option<WsConnection>,
    states: [ConnectionState; 3],
}

impl ConnectionManager {
    pub fn new(server: &ServerConfig, events: SessionEventSender) -> Self {
        Self {
            server: server.clone(),
            events,
            persistent: None,
            music: None,
            states: [ConnectionState::default(); 3],
        }
    }

    /// The feed opened at startup: the combined socket in legacy mode, else the price socket.
    pub fn persistent_feed(&self) -> Feed {
        if self.server.legacy_combined {
            Feed::Legacy
        } else {
            Feed::Price
        }
    }

    /// Open the always-on socket. No-op if it is already running.
    pub fn start_price_feed(&mut self) -> Result<()> {
        if self.persistent.as_ref().is_some_and(|c| c.is_running()) {
            return Ok(());
        }
        let feed = self.persistent_feed();
        let url = match feed {
            Feed::Legacy => self.server.legacy_url(),
            _ => self.server.price_url(),
        };
        validate_ws_url(&url)?;

        let mut conn = WsConnection::new(WsConnConfig {
            url,
            label: feed_label(feed).to_owned(),
            reconnect: ReconnectPolicy::FixedDelay(self.server.price_reconnect_delay()),
            ping_interval: Some(PING_INTERVAL),
        });
        let (on_text, on_status) = callbacks(feed, self.events.clone());
        conn.start(on_text, on_status);
        info!("[{}] started ({})", feed_label(feed), conn.config.url);
        self.persistent = Some(conn);
        Ok(())
    }

    /// Open the music socket if it is not already running.
    ///
    /// Returns `false` when nothing was opened: either the socket is live or
    /// the combined legacy socket carries the music data.
    pub async fn connect_music(&mut self) -> Result<bool> {
        if self.server.legacy_combined {
            debug!("[music-ws] combined legacy feed in use, not opening");
            return Ok(false);
        }
        if self.music.as_ref().is_some_and(|c| c.is_running()) {
            return Ok(false);
        }
        if let Some(mut finished) = self.music.take() {
            finished.stop().await;
        }

        let url = self.server.music_url();
        validate_ws_url(&url)?;
        let mut conn = WsConnection::new(WsConnConfig {
            url,
            label: feed_label(Feed::Music).to_owned(),
            reconnect: ReconnectPolicy::Never,
            ping_interval: Some(PING_INTERVAL),
        });
        let (on_text, on_status) = callbacks(Feed::Music, self.events.clone());
        conn.start(on_text, on_status);
        self.music = Some(conn);
        Ok(true)
    }

    /// Close the music socket. Safe when it is already closed or never opened.
    pub async fn close_music(&mut self) {
        if let Some(mut conn) = self.music.take() {
            conn.stop().await;
            info!("[music-ws] closed");
        }
        self.states[feed_slot(Feed::Music)] = ConnectionState::default();
    }

    /// Close every socket. Idempotent.
    pub async fn shutdown(&mut self) {
        self.close_music().await;
        if let Some(mut conn) = self.persistent.take() {
            conn.stop().await;
            info!("[{}] closed", conn.config.label);
        }
        let feed = self.persistent_feed();
        self.states[feed_slot(feed)] = ConnectionState::default();
    }

    /// Record a lifecycle transition reported by a socket task.
    pub fn record_status(&mut self, feed: Feed, state: ConnectionState) {
        let slot = &mut self.states[feed_slot(feed)];
        if *slot != state {
            let label = feed_label(feed);
            info!(
                "[{label}] {:?} (reconnecting={})",
                state.status, state.reconnecting
            );
            *slot = state;
        }
    }

    pub fn state(&self, feed: Feed) -> ConnectionState {
        self.states[feed_slot(feed)]
    }

    pub fn is_music_running(&self) -> bool {
        self.music.as_ref().is_some_and(|c| c.is_running())
    }
}
