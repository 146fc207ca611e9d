//! Connection and regime state.

use serde::Serialize;

/// Which socket a connection event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    /// Continuous low-resolution price feed, open for the whole process.
    Price,
    /// On-demand bundle feed, open only while playing.
    Music,
    /// Combined single-socket feed for older producers.
    Legacy,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Price => write!(f, "price"),
            Self::Music => write!(f, "music"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    #[default]
    Closed,
}

/// Per-socket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// A reconnect is scheduled after the current close.
    pub reconnecting: bool,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Open
    }
}

/// Server-supplied regime label and divergence flag, displayed as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RegimeState {
    pub label: String,
    pub divergence_active: bool,
}
