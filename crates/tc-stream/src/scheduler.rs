//! Transport scheduler: drains the bundle queue on the beat clock.
//!
//! Once per beat the scheduler takes at most one bundle and computes a
//! trigger for every sub-step whose pitch differs from the last pitch
//! actually triggered on that voice. Held notes are therefore attacked once.
//! This comparison is independent of the duration-inference pass.
//!
//! The scheduler never blocks and never catches up: a beat whose clock
//! callback was missed simply dequeues nothing, and the bounded queue caps
//! the backlog.

use tc_core::{Bundle, NoteValue, Rhythm, Voice};
use tracing::trace;

use crate::queue::BundleQueue;

/// Detune applied to every trigger while divergence is active.
pub const DIVERGENCE_DETUNE_CENTS: f64 = -100.0;

/// One note-on handed to the audio engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub voice: Voice,
    pub pitch: i32,
    /// Absolute trigger time on the monotonic clock.
    pub at_ms: f64,
    pub value: NoteValue,
    pub detune_cents: f64,
    pub muted: bool,
    pub tick_index: i64,
}

#[derive(Debug, Clone)]
pub struct TransportScheduler {
    sub_step_ms: f64,
    lead_value: NoteValue,
    last_triggered: [Option<i32>; 2],
    beats: u64,
}

impl TransportScheduler {
    pub fn new(sub_step_ms: f64, rhythm: Rhythm) -> Self {
        Self {
            sub_step_ms,
            lead_value: rhythm.note_value(),
            last_triggered: [None; 2],
            beats: 0,
        }
    }

    /// Change the lead duration category. The secondary voice always uses quarters.
    pub fn set_rhythm(&mut self, rhythm: Rhythm) {
        self.lead_value = rhythm.note_value();
    }

    fn value_for(&self, voice: Voice) -> NoteValue {
        match voice {
            Voice::Lead => self.lead_value,
            Voice::Secondary => NoteValue::Quarter,
        }
    }

    /// Run one beat: dequeue at most one bundle and return its triggers.
    pub fn on_beat(
        &mut self,
        clock_ms: f64,
        queue: &mut BundleQueue,
        mutes: [bool; 2],
    ) -> Vec<Trigger> {
        self.beats += 1;
        match queue.pop() {
            Some(bundle) => self.schedule_bundle(&bundle, clock_ms, mutes),
            None => {
                trace!("[scheduler] beat {} with empty queue", self.beats);
                Vec::new()
            }
        }
    }

    /// Compute the triggers of one bundle starting at `clock_ms`.
    pub fn schedule_bundle(
        &mut self,
        bundle: &Bundle,
        clock_ms: f64,
        mutes: [bool; 2],
    ) -> Vec<Trigger> {
        let detune_cents = if bundle.divergence {
            DIVERGENCE_DETUNE_CENTS
        } else {
            0.0
        };
        let mut triggers = Vec::new();

        for i in 0..bundle.len() {
            let at_ms = clock_ms + i as f64 * self.sub_step_ms;
            for voice in Voice::ALL {
                let Some(pitch) = bundle.pitches(voice).get(i).copied().flatten() else {
                    continue;
                };
                let last = &mut self.last_triggered[voice.index()];
                if *last == Some(pitch) {
                    continue;
                }
                *last = Some(pitch);
                triggers.push(Trigger {
                    voice,
                    pitch,
                    at_ms,
                    value: self.value_for(voice),
                    detune_cents,
                    muted: mutes[voice.index()],
                    tick_index: bundle.start_tick + i as i64,
                });
            }
        }

        trace!(
            "[scheduler] bundle start_tick={} -> {} trigger(s) at {clock_ms:.1}",
            bundle.start_tick,
            triggers.len()
        );
        triggers
    }

    /// Beats elapsed since construction or the last reset.
    pub fn beats(&self) -> u64 {
        self.beats
    }

    /// Forget the last triggered pitches (a new session starts with fresh attacks).
    pub fn reset(&mut self) {
        self.last_triggered = [None; 2];
        self.beats = 0;
    }
}
