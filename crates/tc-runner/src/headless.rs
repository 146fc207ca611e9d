//! Audio engine stand-in for running without a sound device.
//!
//! Triggers are written to the log instead of being played, which keeps the
//! whole pipeline (sockets, scheduler, renderer) observable from a terminal.

use std::time::Duration;

use async_trait::async_trait;
use tc_core::error::TcError;
use tc_stream::instrument::{Instrument, TimbreLoader};
use tc_stream::scheduler::Trigger;
use tracing::{debug, info};

/// Sample sets the headless engine pretends to have.
pub const KNOWN_INSTRUMENTS: &[&str] = &["piano", "strings", "marimba", "synth"];

pub struct TracingInstrument {
    name: String,
    played: u64,
    disposed: bool,
}

impl TracingInstrument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            played: 0,
            disposed: false,
        }
    }
}

impl Instrument for TracingInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&mut self, t: &Trigger) {
        if self.disposed || t.muted {
            return;
        }
        self.played += 1;
        debug!(
            "[audio] {} {} pitch={} {} detune={}c at={:.1}",
            self.name,
            t.voice,
            t.pitch,
            t.value.as_str(),
            t.detune_cents,
            t.at_ms
        );
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            info!(
                "[audio] {} released after {} note(s)",
                self.name, self.played
            );
        }
    }
}

/// Loader that "loads" a known instrument after a fixed delay.
#[derive(Debug, Clone, Default)]
pub struct HeadlessLoader {
    pub delay: Duration,
}

#[async_trait]
impl TimbreLoader for HeadlessLoader {
    async fn load(&self, instrument: &str) -> Result<Box<dyn Instrument>, TcError> {
        if !KNOWN_INSTRUMENTS.contains(&instrument) {
            return Err(TcError::Timbre(format!(
                "no sample set named '{instrument}' (known: {})",
                KNOWN_INSTRUMENTS.join(", ")
            )));
        }
        tokio::time::sleep(self.delay).await;
        Ok(Box::new(TracingInstrument::new(instrument)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::{NoteValue, Voice};

    fn trigger(muted: bool) -> Trigger {
        Trigger {
            voice: Voice::Lead,
            pitch: 60,
            at_ms: 0.0,
            value: NoteValue::Sixteenth,
            detune_cents: 0.0,
            muted,
            tick_index: 0,
        }
    }

    #[test]
    fn muted_and_disposed_triggers_are_silent() {
        let mut inst = TracingInstrument::new("piano");
        inst.trigger(&trigger(false));
        inst.trigger(&trigger(true));
        assert_eq!(inst.played, 1);
        inst.dispose();
        inst.dispose();
        inst.trigger(&trigger(false));
        assert_eq!(inst.played, 1);
    }

    #[tokio::test]
    async fn unknown_instrument_fails() {
        let loader = HeadlessLoader::default();
        assert!(loader.load("piano").await.is_ok());
        match loader.load("theremin").await {
            Err(TcError::Timbre(msg)) => assert!(msg.contains("theremin")),
            _ => panic!("expected timbre error"),
        }
    }
}
