//! Core data types shared by the stream engine, control client, and runner.

pub mod enums;
pub mod music;
pub mod state;

pub use enums::*;
pub use music::*;
pub use state::*;
