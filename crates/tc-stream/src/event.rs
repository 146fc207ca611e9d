//! Typed events flowing from the sockets and the timbre loader into the
//! session loop.
//!
//! Socket callbacks never touch session state directly. They classify the
//! frame, wrap the result in a [`SessionEvent`] and send it down an
//! unbounded channel; the [`Player`](crate::player::Player) loop applies the
//! events one at a time.

use tc_core::error::TcError;
use tc_core::{Bundle, ConnectionState, Feed, PriceSnapshot, TickMessage};

use crate::instrument::{Instrument, LoadTicket};

pub enum SessionEvent {
    /// A look-ahead bundle arrived.
    BundleReceived { feed: Feed, bundle: Bundle },

    /// A legacy single-tick message arrived.
    TickReceived { feed: Feed, tick: TickMessage },

    /// A price-only snapshot arrived.
    PricesReceived { feed: Feed, snapshot: PriceSnapshot },

    /// A socket changed lifecycle state.
    ConnectionStatusChanged { feed: Feed, state: ConnectionState },

    /// A timbre load finished, successfully or not.
    TimbreLoaded {
        ticket: LoadTicket,
        result: Result<Box<dyn Instrument>, TcError>,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BundleReceived { .. } => "bundle",
            Self::TickReceived { .. } => "tick",
            Self::PricesReceived { .. } => "prices",
            Self::ConnectionStatusChanged { .. } => "status",
            Self::TimbreLoaded { .. } => "timbre",
        }
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BundleReceived { feed, bundle } => {
                let start = bundle.start_tick;
                write!(f, "BundleReceived({feed}, start_tick={start})")
            }
            Self::TickReceived { feed, tick } => {
                write!(f, "TickReceived({feed}, tick={})", tick.tick)
            }
            Self::PricesReceived { feed, .. } => write!(f, "PricesReceived({feed})"),
            Self::ConnectionStatusChanged { feed, state } => {
                write!(f, "ConnectionStatusChanged({feed}, {state:?})")
            }
            Self::TimbreLoaded { ticket, result } => {
                let generation = ticket.generation;
                let instrument = &ticket.instrument;
                let ok = result.is_ok();
                write!(f, "TimbreLoaded(#{generation} {instrument}, ok={ok})")
            }
        }
    }
}

/// Sender half of the session event channel.
pub type SessionEventSender = tokio::sync::mpsc::UnboundedSender<SessionEvent>;

/// Receiver half of the session event channel.
pub type SessionEventReceiver = tokio::sync::mpsc::UnboundedReceiver<SessionEvent>;
