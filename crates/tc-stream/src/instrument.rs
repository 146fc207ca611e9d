//! Instrument (timbre) loading and ownership.
//!
//! Loading a sample set is the one long-latency operation in the client. It
//! cannot be preempted, so every load is tagged with a generation number from
//! [`InstrumentRack::begin_load`]. A result whose generation is not the
//! rack's current one is disposed on arrival instead of installed.
//!
//! Loads are raced against a timeout in [`load_with_timeout`]. When the
//! timeout wins, the loader future is dropped together with whatever it had
//! built so far.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tc_core::error::TcError;
use tracing::{debug, info, warn};

use crate::scheduler::Trigger;

/// A loaded, playable timbre.
pub trait Instrument: Send {
    fn name(&self) -> &str;

    /// Play one note. Muted triggers still reach the instrument.
    fn trigger(&mut self, trigger: &Trigger);

    /// Release audio resources. Must tolerate repeated calls.
    fn dispose(&mut self);
}

/// Produces instruments by name.
#[async_trait]
pub trait TimbreLoader: Send + Sync {
    async fn load(&self, instrument: &str) -> Result<Box<dyn Instrument>, TcError>;
}

/// Run `loader` for `instrument`, giving up after `timeout`.
///
/// The error string is suitable for showing to the user.
pub async fn load_with_timeout(
    loader: Arc<dyn TimbreLoader>,
    instrument: &str,
    timeout: Duration,
) -> Result<Box<dyn Instrument>, TcError> {
    match tokio::time::timeout(timeout, loader.load(instrument)).await {
        Ok(Ok(inst)) => Ok(inst),
        Ok(Err(e)) => Err(TcError::Timbre(format!("'{instrument}' did not load: {e}"))),
        Err(_) => Err(TcError::Timbre(format!(
            "instrument '{instrument}' did not load within {:.1}s, try again",
            timeout.as_secs_f64()
        ))),
    }
}

/// Identifies one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub instrument: String,
}

/// What happened to a finished load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The instrument is now active.
    Installed(String),
    /// A newer load started first; the result was disposed.
    Stale(String),
    /// The load failed; carries the user-facing message.
    Failed(String),
}

/// Owns the active instrument and the load generation counter.
#[derive(Default)]
pub struct InstrumentRack {
    generation: u64,
    pending: Option<LoadTicket>,
    active: Option<Box<dyn Instrument>>,
    stale_discarded: u64,
}

impl InstrumentRack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load attempt, superseding any in flight.
    ///
    /// The current instrument is released immediately.
    pub fn begin_load(&mut self, instrument: &str) -> LoadTicket {
        self.release_active();
        self.generation += 1;
        let ticket = LoadTicket {
            generation: self.generation,
            instrument: instrument.to_owned(),
        };
        debug!(
            "[rack] load #{} '{}' started",
            ticket.generation, ticket.instrument
        );
        self.pending = Some(ticket.clone());
        ticket
    }

    /// Deliver the result of a load attempt.
    pub fn finish_load(
        &mut self,
        ticket: &LoadTicket,
        result: Result<Box<dyn Instrument>, TcError>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation {
            if let Ok(mut late) = result {
                late.dispose();
            }
            self.stale_discarded += 1;
            debug!(
                "[rack] discarding stale load #{} '{}' (current #{})",
                ticket.generation, ticket.instrument, self.generation
            );
            return LoadOutcome::Stale(ticket.instrument.clone());
        }

        self.pending = None;
        match result {
            Ok(inst) => {
                info!("[rack] instrument '{}' ready", inst.name());
                self.release_active();
                self.active = Some(inst);
                LoadOutcome::Installed(ticket.instrument.clone())
            }
            Err(e) => {
                warn!("[rack] {e}");
                LoadOutcome::Failed(e.to_string())
            }
        }
    }

    /// Send a trigger to the active instrument. Returns `false` if none is loaded.
    pub fn trigger(&mut self, trigger: &Trigger) -> bool {
        match self.active.as_mut() {
            Some(inst) => {
                inst.trigger(trigger);
                true
            }
            None => false,
        }
    }

    /// Release the active instrument and invalidate any load in flight.
    ///
    /// Safe to call when nothing is loaded.
    pub fn dispose(&mut self) {
        self.release_active();
        if self.pending.take().is_some() {
            self.generation += 1;
        }
    }

    fn release_active(&mut self) {
        if let Some(mut inst) = self.active.take() {
            debug!("[rack] disposing '{}'", inst.name());
            inst.dispose();
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|i| i.name())
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Loads discarded because a newer attempt had started.
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test instrument that counts its triggers and disposals.
    pub(crate) struct CountingInstrument {
        pub name: String,
        pub triggers: Arc<AtomicUsize>,
        pub disposed: Arc<AtomicUsize>,
    }

    impl Instrument for CountingInstrument {
        fn name(&self) -> &str {
            &self.name
        }
        fn trigger(&mut self, _trigger: &Trigger) {
            self.triggers.fetch_add(1, Ordering::SeqCst);
        }
        fn dispose(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn counting(name: &str) -> (Box<dyn Instrument>, Arc<AtomicUsize>) {
        let disposed = Arc::new(AtomicUsize::new(0));
        let inst = CountingInstrument {
            name: name.into(),
            triggers: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::clone(&disposed),
        };
        (Box::new(inst), disposed)
    }

    /// Loader that resolves each instrument after its configured delay.
    pub(crate) struct DelayedLoader {
        pub delays: Vec<(String, Duration)>,
        pub disposed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TimbreLoader for DelayedLoader {
        async fn load(&self, instrument: &str) -> Result<Box<dyn Instrument>, TcError> {
            let unknown = || TcError::Timbre(format!("unknown instrument {instrument}"));
            let delay = self
                .delays
                .iter()
                .find(|(n, _)| n == instrument)
                .map(|(_, d)| *d)
                .ok_or_else(unknown)?;
            tokio::time::sleep(delay).await;
            Ok(Box::new(CountingInstrument {
                name: instrument.into(),
                triggers: Arc::new(AtomicUsize::new(0)),
                disposed: Arc::clone(&self.disposed),
            }))
        }
    }

    #[test]
    fn stale_load_is_disposed_not_installed() {
        let mut rack = InstrumentRack::new();
        let first = rack.begin_load("piano");
        let second = rack.begin_load("strings");

        let (strings, strings_disposed) = counting("strings");
        let installed = rack.finish_load(&second, Ok(strings));
        assert_eq!(installed, LoadOutcome::Installed("strings".into()));

        let (piano, piano_disposed) = counting("piano");
        let stale = rack.finish_load(&first, Ok(piano));
        assert_eq!(stale, LoadOutcome::Stale("piano".into()));

        assert_eq!(piano_disposed.load(Ordering::SeqCst), 1);
        assert_eq!(strings_disposed.load(Ordering::SeqCst), 0);
        assert_eq!(rack.active_name(), Some("strings"));
        assert_eq!(rack.stale_discarded(), 1);
    }

    #[test]
    fn switching_releases_current_instrument() {
        let mut rack = InstrumentRack::new();
        let t = rack.begin_load("piano");
        let (piano, piano_disposed) = counting("piano");
        rack.finish_load(&t, Ok(piano));
        rack.begin_load("organ");
        assert_eq!(piano_disposed.load(Ordering::SeqCst), 1);
        assert!(rack.active_name().is_none());
        assert!(rack.is_loading());
    }

    #[test]
    fn dispose_is_idempotent_and_invalidates_pending() {
        let mut rack = InstrumentRack::new();
        rack.dispose();
        let t = rack.begin_load("piano");
        rack.dispose();
        rack.dispose();
        let (piano, disposed) = counting("piano");
        let outcome = rack.finish_load(&t, Ok(piano));
        assert!(matches!(outcome, LoadOutcome::Stale(_)));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(rack.active_name().is_none());
    }

    #[test]
    fn failure_keeps_rack_retryable() {
        let mut rack = InstrumentRack::new();
        let t = rack.begin_load("piano");
        let outcome = rack.finish_load(&t, Err(TcError::Timbre("timed out".into())));
        let LoadOutcome::Failed(msg) = outcome else {
            panic!("expected a failure");
        };
        assert!(msg.contains("timed out"));
        assert!(!rack.is_loading());
        let retry = rack.begin_load("piano");
        assert_eq!(retry.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_user_message() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let loader: Arc<dyn TimbreLoader> = Arc::new(DelayedLoader {
            delays: vec![("piano".into(), Duration::from_secs(30))],
            disposed: Arc::clone(&disposed),
        });
        let short = Duration::from_secs(10);
        let res = load_with_timeout(Arc::clone(&loader), "piano", short).await;
        match res {
            Err(TcError::Timbre(msg)) => assert!(msg.contains("did not load within 10.0s")),
            _ => panic!("expected timeout"),
        }
        let ok = load_with_timeout(loader, "piano", Duration::from_secs(60)).await;
        let name = ok.map(|i| i.name().to_owned()).ok();
        assert_eq!(name.as_deref(), Some("piano"));
    }
}
