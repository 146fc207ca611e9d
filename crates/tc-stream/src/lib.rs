//! # tc-stream
//!
//! Streaming engine of the tickchorale client:
//!
//! - **Protocol adapter** (`protocol`, `json_util`): classifies raw frames into bundles,
//!   legacy ticks and price snapshots
//! - **Duration inference** (`inference`): run-length encoding of per-sub-step pitch sequences
//! - **History** (`buffers`): capacity- and age-bounded note and anchor buffers
//! - **Transport** (`queue`, `scheduler`): bounded look-ahead queue drained once per beat
//! - **Instruments** (`instrument`): timbre loading with timeout and generation-based discard
//! - **Connections** (`connection`, `event`): price and music sockets feeding typed session events
//! - **Rendering** (`canvas`, `render`): piano-roll with auto-ranged price lanes
//! - **Session / player** (`session`, `player`): session state and the single-task event loop

pub mod buffers;
pub mod canvas;
pub mod connection;
pub mod event;
pub mod inference;
pub mod instrument;
pub mod json_util;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod render;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod test_util;

pub use player::Player;
pub use session::Session;
