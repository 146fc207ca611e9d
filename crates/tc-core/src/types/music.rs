//! Musical data structures: the payloads flowing from the protocol adapter
//! into the buffers and the transport scheduler.
//!
//! # Timestamp convention
//!
//! All times are **monotonic milliseconds** as returned by
//! [`crate::time_util::monotonic_ms`], stored as `f64` so sub-step offsets
//! (62.5 ms at the default tempo) stay exact.

use super::enums::Voice;

// ---------------------------------------------------------------------------
// NoteEvent
// ---------------------------------------------------------------------------

/// One inferred note in a voice's history.
///
/// Invariant: `duration_units >= 1` and
/// `end_ms == onset_ms + duration_units * sub_step_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Insertion sequence number, unique within a session.
    pub id: u64,
    pub pitch: i32,
    pub voice: Voice,
    /// Price the producer attached to this note, if any.
    pub source_price: Option<f64>,
    pub tick_index: i64,
    pub onset_ms: f64,
    pub end_ms: f64,
    pub duration_units: u32,
}

impl NoteEvent {
    /// Create a note with the provisional duration of one sub-step.
    pub fn provisional(
        voice: Voice,
        pitch: i32,
        source_price: Option<f64>,
        tick_index: i64,
        onset_ms: f64,
        sub_step_ms: f64,
    ) -> Self {
        Self {
            id: 0,
            pitch,
            voice,
            source_price,
            tick_index,
            onset_ms,
            end_ms: onset_ms + sub_step_ms,
            duration_units: 1,
        }
    }

    /// Set the final duration. Clamped to at least one sub-step.
    pub fn close(&mut self, duration_units: u32, sub_step_ms: f64) {
        self.duration_units = duration_units.max(1);
        self.end_ms = self.onset_ms + self.duration_units as f64 * sub_step_ms;
    }
}

// ---------------------------------------------------------------------------
// PriceAnchor
// ---------------------------------------------------------------------------

/// A once-per-beat price sample used to draw a voice's price line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAnchor {
    pub price: f64,
    pub tick_index: i64,
    pub sample_ms: f64,
}

// ---------------------------------------------------------------------------
// Market context
// ---------------------------------------------------------------------------

/// Scalar fields shared by bundle and legacy tick messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketContext {
    pub regime: Option<String>,
    pub divergence: bool,
    pub chord: Option<i64>,
    pub root_offset: Option<i64>,
    pub rvol: Option<f64>,
    pub build_id: Option<String>,
    pub payload_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// A look-ahead window of sub-step data for one beat.
///
/// All sequences are parallel and share one length; the protocol adapter
/// guarantees this before a `Bundle` is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub start_tick: i64,
    pub lead_pitches: Vec<Option<i32>>,
    pub secondary_pitches: Vec<Option<i32>>,
    pub lead_prices: Vec<Option<f64>>,
    pub secondary_prices: Vec<Option<f64>>,
    pub lead_note_prices: Vec<Option<f64>>,
    pub secondary_note_prices: Vec<Option<f64>>,
    pub divergence: bool,
    pub context: MarketContext,
}

impl Bundle {
    /// Number of sub-steps covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.lead_prices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lead_prices.is_empty()
    }

    pub fn pitches(&self, voice: Voice) -> &[Option<i32>] {
        match voice {
            Voice::Lead => &self.lead_pitches,
            Voice::Secondary => &self.secondary_pitches,
        }
    }

    pub fn prices(&self, voice: Voice) -> &[Option<f64>] {
        match voice {
            Voice::Lead => &self.lead_prices,
            Voice::Secondary => &self.secondary_prices,
        }
    }

    pub fn note_prices(&self, voice: Voice) -> &[Option<f64>] {
        match voice {
            Voice::Lead => &self.lead_note_prices,
            Voice::Secondary => &self.secondary_note_prices,
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy tick
// ---------------------------------------------------------------------------

/// One discrete instant from a producer that predates bundles.
#[derive(Debug, Clone, PartialEq)]
pub struct TickMessage {
    pub tick: i64,
    pub lead_pitch: Option<i32>,
    pub secondary_pitch: Option<i32>,
    pub lead_price: Option<f64>,
    pub secondary_price: Option<f64>,
    pub lead_note_offset: Option<f64>,
    pub secondary_note_offset: Option<f64>,
    pub context: MarketContext,
}

impl TickMessage {
    pub fn pitch(&self, voice: Voice) -> Option<i32> {
        match voice {
            Voice::Lead => self.lead_pitch,
            Voice::Secondary => self.secondary_pitch,
        }
    }

    pub fn price(&self, voice: Voice) -> Option<f64> {
        match voice {
            Voice::Lead => self.lead_price,
            Voice::Secondary => self.secondary_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Price-only snapshot
// ---------------------------------------------------------------------------

/// Periodic low-resolution prices from the price feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSnapshot {
    pub lead_prices: Vec<f64>,
    pub secondary_prices: Vec<f64>,
    pub lead_current: Option<f64>,
    pub secondary_current: Option<f64>,
}

impl PriceSnapshot {
    pub fn current(&self, voice: Voice) -> Option<f64> {
        match voice {
            Voice::Lead => self.lead_current,
            Voice::Secondary => self.secondary_current,
        }
    }
}
