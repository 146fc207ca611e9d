//! Playback session: every piece of mutable client state in one place.
//!
//! A `Session` owns the history buffers, the bundle queue, the transport
//! scheduler, the instrument rack and the renderer. It is driven entirely
//! by synchronous calls from the player loop (ingest, beat, paint), so it
//! needs no locking. Starting a session rebuilds every buffer from empty.
//!
//! Ingestion rules:
//! - bundles and legacy ticks carry music and are applied only while playing,
//!   and never from the price socket
//! - price snapshots drive the display only while *not* playing, so the
//!   coarse price feed never competes with the music data

use tc_core::config::{AppConfig, TransportConfig};
use tc_core::error::TcError;
use tc_core::{
    Bundle, Feed, MarketContext, NoteEvent, PriceAnchor, PriceSnapshot, RegimeState, Rhythm,
    TickMessage, Voice,
};
use tracing::{debug, info, trace, warn};

use crate::buffers::HistoryBuffers;
use crate::canvas::Canvas;
use crate::inference::infer_notes;
use crate::instrument::{Instrument, InstrumentRack, LoadOutcome, LoadTicket};
use crate::queue::BundleQueue;
use crate::render::{FrameStats, Renderer};
use crate::scheduler::{Trigger, TransportScheduler};

/// Counters kept for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bundles: u64,
    pub ticks: u64,
    pub snapshots: u64,
    pub notes: u64,
    pub anchors: u64,
    pub triggers: u64,
    /// Messages received while the current state does not accept them.
    pub ignored: u64,
}

/// The currently open legacy note of one voice.
#[derive(Debug, Clone, Copy)]
struct OpenNote {
    id: u64,
    tick: i64,
    pitch: i32,
}

pub struct Session {
    transport: TransportConfig,
    sub_step_ms: f64,
    history: HistoryBuffers,
    queue: BundleQueue,
    scheduler: TransportScheduler,
    rack: InstrumentRack,
    renderer: Renderer,
    regime: RegimeState,
    playing: bool,
    mutes: [bool; 2],
    rhythm: Rhythm,
    /// End of the last scheduled bundle on the monotonic clock.
    timeline_end_ms: Option<f64>,
    legacy_open: [Option<OpenNote>; 2],
    legacy_beat: Option<i64>,
    expected_build: Option<String>,
    build_mismatch: bool,
    stats: SessionStats,
}

impl Session {
    pub fn new(cfg: &AppConfig) -> Self {
        let sub_step_ms = cfg.transport.sub_step_ms();
        let rhythm = Rhythm::from_steps(cfg.tuning.soprano_rhythm).unwrap_or_default();
        Self {
            transport: cfg.transport.clone(),
            sub_step_ms,
            history: HistoryBuffers::new(&cfg.history),
            queue: BundleQueue::new(cfg.transport.queue_capacity),
            scheduler: TransportScheduler::new(sub_step_ms, rhythm),
            rack: InstrumentRack::new(),
            renderer: Renderer::new(&cfg.render, cfg.history.window_ms, sub_step_ms),
            regime: RegimeState::default(),
            playing: false,
            mutes: [cfg.audio.mute_lead, cfg.audio.mute_secondary],
            rhythm,
            timeline_end_ms: None,
            legacy_open: [None; 2],
            legacy_beat: None,
            expected_build: None,
            build_mismatch: false,
            stats: SessionStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin playback with empty buffers. Returns `false` if already playing.
    pub fn start(&mut self, now_ms: f64) -> bool {
        if self.playing {
            return false;
        }
        self.history.clear();
        self.queue.clear();
        self.scheduler.reset();
        self.timeline_end_ms = None;
        self.legacy_open = [None; 2];
        self.legacy_beat = None;
        self.regime = RegimeState::default();
        self.stats = SessionStats::default();
        self.renderer.set_origin(now_ms);
        self.playing = true;
        let (rhythm, mutes) = (self.rhythm, self.mutes);
        info!("[session] started (rhythm={rhythm:?}, mutes={mutes:?})");
        true
    }

    /// End playback and release audio. Safe to call any number of times.
    ///
    /// Returns `true` if the session was playing.
    pub fn stop(&mut self) -> bool {
        let was_playing = std::mem::replace(&mut self.playing, false);
        self.queue.clear();
        self.legacy_open = [None; 2];
        self.rack.dispose();
        if was_playing {
            info!(
                "[session] stopped: {} bundles, {} ticks, {} notes, {} triggers, {} dropped",
                self.stats.bundles,
                self.stats.ticks,
                self.stats.notes,
                self.stats.triggers,
                self.queue.dropped()
            );
        }
        was_playing
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Apply a bundle: infer notes, sample anchors and queue it for the transport.
    pub fn ingest_bundle(&mut self, feed: Feed, bundle: Bundle, now_ms: f64) -> bool {
        if !self.accepts_music(feed, "bundle") {
            return false;
        }
        self.stats.bundles += 1;
        self.apply_context(&bundle.context, bundle.divergence);

        let base_ms = self.timeline_end_ms.map_or(now_ms, |end| end.max(now_ms));
        self.timeline_end_ms = Some(base_ms + bundle.len() as f64 * self.sub_step_ms);

        let ctx = &bundle.context;
        debug!(
            "[session] {feed} bundle start={} len={} base={base_ms:.1} chord={:?} root={:?}",
            bundle.start_tick,
            bundle.len(),
            ctx.chord,
            ctx.root_offset,
        );
        trace!("[session] rvol={:?} version={:?}", ctx.rvol, ctx.payload_version);

        for voice in Voice::ALL {
            for note in infer_notes(&bundle, voice, base_ms, self.sub_step_ms) {
                self.history.push_note(note);
                self.stats.notes += 1;
            }
            let prices = bundle.prices(voice);
            for (i, price) in prices.iter().enumerate() {
                let tick_index = bundle.start_tick + i as i64;
                if let (Some(price), true) = (price, self.is_beat_tick(tick_index)) {
                    let sample_ms = base_ms + i as f64 * self.sub_step_ms;
                    let anchor = PriceAnchor {
                        price: *price,
                        tick_index,
                        sample_ms,
                    };
                    self.push_anchor(voice, anchor);
                }
            }
        }

        self.queue.push(bundle);
        true
    }

    /// Apply a legacy tick: close the previous note of each voice whose pitch
    /// changed, open a new one, and play it immediately.
    pub fn ingest_tick(&mut self, feed: Feed, tick: TickMessage, now_ms: f64) -> bool {
        if !self.accepts_music(feed, "tick") {
            return false;
        }
        self.stats.ticks += 1;
        self.apply_context(&tick.context, tick.context.divergence);

        for voice in Voice::ALL {
            let Some(pitch) = tick.pitch(voice) else {
                continue;
            };
            let slot = voice.index();
            let previous = self.legacy_open[slot];
            if previous.is_some_and(|open| open.pitch == pitch) {
                continue;
            }
            if let Some(open) = previous {
                let units = u32::try_from((tick.tick - open.tick).max(1)).unwrap_or(u32::MAX);
                let sub_step_ms = self.sub_step_ms;
                self.history.close_note(voice, open.id, units, sub_step_ms);
            }
            let note = NoteEvent::provisional(
                voice,
                pitch,
                legacy_note_price(&tick, voice),
                tick.tick,
                now_ms,
                self.sub_step_ms,
            );
            let id = self.history.push_note(note);
            self.stats.notes += 1;
            let open = OpenNote {
                id,
                tick: tick.tick,
                pitch,
            };
            self.legacy_open[slot] = Some(open);
        }

        let beat = tick.tick.div_euclid(self.transport.sub_steps as i64);
        if self.legacy_beat != Some(beat) {
            self.legacy_beat = Some(beat);
            for voice in Voice::ALL {
                if let Some(price) = tick.price(voice) {
                    let anchor = PriceAnchor {
                        price,
                        tick_index: tick.tick,
                        sample_ms: now_ms,
                    };
                    self.push_anchor(voice, anchor);
                }
            }
        }

        let step = single_step_bundle(&tick);
        let triggers = self.scheduler.schedule_bundle(&step, now_ms, self.mutes);
        self.play(&triggers);
        true
    }

    /// Apply a price-only snapshot. Accepted only while stopped.
    pub fn ingest_prices(&mut self, feed: Feed, snapshot: PriceSnapshot, now_ms: f64) -> bool {
        if self.playing {
            self.stats.ignored += 1;
            trace!("[session] {feed} prices ignored while playing");
            return false;
        }
        let tick_index = self.stats.snapshots as i64;
        self.stats.snapshots += 1;
        for voice in Voice::ALL {
            if let Some(price) = snapshot.current(voice) {
                let anchor = PriceAnchor {
                    price,
                    tick_index,
                    sample_ms: now_ms,
                };
                self.push_anchor(voice, anchor);
            }
        }
        true
    }

    /// Music is taken from the music or legacy socket, and only while playing.
    fn accepts_music(&mut self, feed: Feed, what: &str) -> bool {
        if feed == Feed::Price {
            self.stats.ignored += 1;
            trace!("[session] {what} on {feed} ignored");
            return false;
        }
        if !self.playing {
            self.stats.ignored += 1;
            trace!("[session] {feed} {what} ignored while stopped");
            return false;
        }
        true
    }

    fn is_beat_tick(&self, tick_index: i64) -> bool {
        tick_index.rem_euclid(self.transport.sub_steps as i64) == 0
    }

    fn push_anchor(&mut self, voice: Voice, anchor: PriceAnchor) {
        self.history.push_anchor(voice, anchor);
        self.stats.anchors += 1;
    }

    fn apply_context(&mut self, ctx: &MarketContext, divergence: bool) {
        if let Some(label) = &ctx.regime {
            if *label != self.regime.label {
                info!("[session] regime {} -> {label}", self.regime.label);
                self.regime.label = label.clone();
            }
        }
        if divergence != self.regime.divergence_active {
            let state = if divergence { "on" } else { "off" };
            info!("[session] divergence {state}");
            self.regime.divergence_active = divergence;
        }
        if let (Some(expected), Some(got)) = (&self.expected_build, &ctx.build_id) {
            if expected != got && !self.build_mismatch {
                warn!("[session] producer build {got} differs from {expected}");
                self.build_mismatch = true;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Clocks
    // -----------------------------------------------------------------------

    /// Transport clock callback. Returns the number of triggers sent.
    pub fn on_transport_beat(&mut self, clock_ms: f64) -> usize {
        if !self.playing {
            return 0;
        }
        let mutes = self.mutes;
        let triggers = self.scheduler.on_beat(clock_ms, &mut self.queue, mutes);
        self.play(&triggers);
        triggers.len()
    }

    fn play(&mut self, triggers: &[Trigger]) {
        for t in triggers {
            trace!(
                "[scheduler] {} pitch={} at={:.1} {} detune={} muted={} tick={}",
                t.voice,
                t.pitch,
                t.at_ms,
                t.value.as_str(),
                t.detune_cents,
                t.muted,
                t.tick_index
            );
            self.rack.trigger(t);
            self.stats.triggers += 1;
        }
    }

    /// Paint clock callback.
    pub fn on_paint(&mut self, now_ms: f64, canvas: &mut dyn Canvas) -> FrameStats {
        self.renderer
            .render(now_ms, &mut self.history, &self.regime, canvas)
    }

    // -----------------------------------------------------------------------
    // Controls
    // -----------------------------------------------------------------------

    pub fn begin_instrument_load(&mut self, instrument: &str) -> LoadTicket {
        self.rack.begin_load(instrument)
    }

    pub fn finish_instrument_load(
        &mut self,
        ticket: &LoadTicket,
        result: Result<Box<dyn Instrument>, TcError>,
    ) -> LoadOutcome {
        self.rack.finish_load(ticket, result)
    }

    pub fn set_mute(&mut self, voice: Voice, muted: bool) {
        self.mutes[voice.index()] = muted;
    }

    pub fn set_rhythm(&mut self, rhythm: Rhythm) {
        if rhythm != self.rhythm {
            info!("[session] lead rhythm {:?} -> {rhythm:?}", self.rhythm);
        }
        self.rhythm = rhythm;
        self.scheduler.set_rhythm(rhythm);
    }

    /// Build id reported by the control endpoint; bundles from another build are flagged.
    pub fn set_expected_build(&mut self, build_id: Option<String>) {
        self.expected_build = build_id;
        self.build_mismatch = false;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn history(&self) -> &HistoryBuffers {
        &self.history
    }

    pub fn queue(&self) -> &BundleQueue {
        &self.queue
    }

    pub fn rack(&self) -> &InstrumentRack {
        &self.rack
    }

    pub fn regime(&self) -> &RegimeState {
        &self.regime
    }

    pub fn rhythm(&self) -> Rhythm {
        self.rhythm
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn build_mismatch(&self) -> bool {
        self.build_mismatch
    }
}

/// Price a legacy note is drawn at: the voice price shifted by its note offset.
fn legacy_note_price(tick: &TickMessage, voice: Voice) -> Option<f64> {
    let offset = match voice {
        Voice::Lead => tick.lead_note_offset,
        Voice::Secondary => tick.secondary_note_offset,
    };
    tick.price(voice).map(|p| p + offset.unwrap_or(0.0))
}

/// View a legacy tick as a one-step bundle so it shares the scheduler's
/// re-attack rule.
fn single_step_bundle(tick: &TickMessage) -> Bundle {
    Bundle {
        start_tick: tick.tick,
        lead_pitches: vec![tick.lead_pitch],
        secondary_pitches: vec![tick.secondary_pitch],
        lead_prices: vec![tick.lead_price],
        secondary_prices: vec![tick.secondary_price],
        lead_note_prices: vec![legacy_note_price(tick, Voice::Lead)],
        secondary_note_prices: vec![legacy_note_price(tick, Voice::Secondary)],
        divergence: tick.context.divergence,
        context: MarketContext::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RecordingCanvas;
    use crate::instrument::tests::CountingInstrument;
    use crate::test_util::{bundle, two_voice_bundle};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> Session {
        Session::new(&AppConfig::default())
    }

    fn tick(t: i64, lead: Option<i32>, price: Option<f64>) -> TickMessage {
        TickMessage {
            tick: t,
            lead_pitch: lead,
            secondary_pitch: None,
            lead_price: price,
            secondary_price: None,
            lead_note_offset: None,
            secondary_note_offset: None,
            context: MarketContext::default(),
        }
    }

    fn install(s: &mut Session) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let triggers = Arc::new(AtomicUsize::new(0));
        let disposed = Arc::new(AtomicUsize::new(0));
        let ticket = s.begin_instrument_load("piano");
        let inst = CountingInstrument {
            name: "piano".into(),
            triggers: Arc::clone(&triggers),
            disposed: Arc::clone(&disposed),
        };
        let outcome = s.finish_instrument_load(&ticket, Ok(Box::new(inst)));
        assert_eq!(outcome, LoadOutcome::Installed("piano".into()));
        (triggers, disposed)
    }

    #[test]
    fn bundle_fills_history_and_queue() {
        let mut s = session();
        s.start(0.0);
        let mut pitches = vec![Some(60); 8];
        pitches.extend(vec![Some(64); 8]);
        assert!(s.ingest_bundle(Feed::Music, bundle(32, &pitches), 1_000.0));
        let lead = &s.history().voice(Voice::Lead);
        assert_eq!(lead.notes.len(), 2);
        assert_eq!(lead.anchors.len(), 1);
        assert_eq!(lead.anchors.last().map(|a| a.tick_index), Some(32));
        assert_eq!(s.history().voice(Voice::Secondary).anchors.len(), 0);
        assert_eq!(s.queue().len(), 1);
    }

    #[test]
    fn music_ignored_while_stopped() {
        let mut s = session();
        assert!(!s.ingest_bundle(Feed::Music, bundle(0, &[Some(60)]), 0.0));
        let t = tick(0, Some(60), Some(1.0));
        assert!(!s.ingest_tick(Feed::Legacy, t, 0.0));
        assert_eq!(s.history().note_count(), 0);
        assert_eq!(s.stats().ignored, 2);
    }

    #[test]
    fn price_socket_never_drives_music() {
        let mut s = session();
        s.start(0.0);
        let b = bundle(0, &[Some(60), Some(62)]);
        assert!(!s.ingest_bundle(Feed::Price, b, 0.0));
        let t = tick(5, Some(70), Some(430.0));
        assert!(!s.ingest_tick(Feed::Price, t, 0.0));
        assert_eq!(s.history().note_count(), 0);
        assert_eq!(s.history().anchor_count(), 0);
        assert_eq!(s.queue().len(), 0);
        assert_eq!(s.stats().ignored, 2);
        assert!(s.ingest_bundle(Feed::Legacy, bundle(0, &[Some(60)]), 0.0));
    }

    #[test]
    fn start_resets_regime_and_counters() {
        let mut s = session();
        s.start(0.0);
        let mut b = bundle(0, &[Some(60)]);
        b.divergence = true;
        b.context.regime = Some("MINOR".into());
        s.ingest_bundle(Feed::Music, b, 0.0);
        s.stop();
        s.start(5_000.0);
        assert_eq!(s.regime(), &RegimeState::default());
        assert_eq!(s.stats(), SessionStats::default());
    }

    #[test]
    fn huge_legacy_gap_saturates_duration() {
        let mut s = session();
        s.start(0.0);
        s.ingest_tick(Feed::Legacy, tick(0, Some(60), None), 0.0);
        let t = tick(i64::from(u32::MAX) + 10, Some(62), None);
        s.ingest_tick(Feed::Legacy, t, 10.0);
        let lead = s.history().voice(Voice::Lead);
        let first = lead.notes.iter().next().map(|n| n.duration_units);
        assert_eq!(first, Some(u32::MAX));
    }

    #[test]
    fn consecutive_bundles_tile_the_timeline() {
        let mut s = session();
        s.start(0.0);
        s.ingest_bundle(Feed::Music, bundle(0, &[Some(60); 16]), 1_000.0);
        s.ingest_bundle(Feed::Music, bundle(16, &[Some(62); 16]), 1_010.0);
        let lead = s.history().voice(Voice::Lead);
        let onsets: Vec<f64> = lead.notes.iter().map(|n| n.onset_ms).collect();
        assert_eq!(onsets, vec![1_000.0, 2_000.0]);
        // a late bundle starts at its arrival time
        s.ingest_bundle(Feed::Music, bundle(32, &[Some(64); 16]), 5_000.0);
        let lead = s.history().voice(Voice::Lead);
        assert_eq!(lead.notes.last().map(|n| n.onset_ms), Some(5_000.0));
    }

    #[test]
    fn legacy_ticks_close_notes_retroactively() {
        let mut s = session();
        s.start(0.0);
        s.ingest_tick(Feed::Legacy, tick(0, Some(60), Some(430.0)), 0.0);
        s.ingest_tick(Feed::Legacy, tick(1, Some(60), Some(430.1)), 62.5);
        s.ingest_tick(Feed::Legacy, tick(3, Some(62), Some(430.2)), 187.5);
        s.ingest_tick(Feed::Legacy, tick(16, None, Some(430.3)), 1_000.0);

        let lead = s.history().voice(Voice::Lead);
        let notes: Vec<(i32, u32)> = lead
            .notes
            .iter()
            .map(|n| (n.pitch, n.duration_units))
            .collect();
        assert_eq!(notes, vec![(60, 3), (62, 1)]);
        let anchors: Vec<i64> = lead.anchors.iter().map(|a| a.tick_index).collect();
        assert_eq!(anchors, vec![0, 16]);
    }

    #[test]
    fn legacy_note_price_includes_offset() {
        let mut t = tick(0, Some(60), Some(430.0));
        t.lead_note_offset = Some(0.25);
        assert_eq!(legacy_note_price(&t, Voice::Lead), Some(430.25));
        assert_eq!(legacy_note_price(&t, Voice::Secondary), None);
    }

    #[test]
    fn price_snapshots_only_while_stopped() {
        let mut s = session();
        let snap = PriceSnapshot {
            lead_current: Some(430.0),
            secondary_current: Some(510.0),
            ..Default::default()
        };
        assert!(s.ingest_prices(Feed::Price, snap.clone(), 0.0));
        assert_eq!(s.history().anchor_count(), 2);
        s.start(10.0);
        assert_eq!(s.history().anchor_count(), 0);
        assert!(!s.ingest_prices(Feed::Price, snap, 20.0));
        assert_eq!(s.history().anchor_count(), 0);
    }

    #[test]
    fn transport_beat_triggers_instrument() {
        let mut s = session();
        let (triggers, _) = install(&mut s);
        s.start(0.0);
        let b = two_voice_bundle(0, &[Some(60), Some(62)], &[Some(48), Some(48)]);
        s.ingest_bundle(Feed::Music, b, 0.0);
        assert_eq!(s.on_transport_beat(0.0), 3);
        assert_eq!(triggers.load(Ordering::SeqCst), 3);
        assert_eq!(s.on_transport_beat(1_000.0), 0);
    }

    #[test]
    fn stop_is_idempotent_and_releases_audio() {
        let mut s = session();
        assert!(!s.stop());
        let (_, disposed) = install(&mut s);
        s.start(0.0);
        s.ingest_bundle(Feed::Music, bundle(0, &[Some(60)]), 0.0);
        assert!(s.stop());
        assert!(!s.stop());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(s.rack().active_name().is_none());
        assert!(s.queue().is_empty());
        assert_eq!(s.on_transport_beat(1_000.0), 0);
    }

    #[test]
    fn regime_and_divergence_pass_through() {
        let mut s = session();
        s.start(0.0);
        let mut b = bundle(0, &[Some(60)]);
        b.divergence = true;
        b.context.regime = Some("MINOR".into());
        s.ingest_bundle(Feed::Music, b, 0.0);
        let expected = RegimeState {
            label: "MINOR".into(),
            divergence_active: true,
        };
        assert_eq!(s.regime(), &expected);
        s.ingest_bundle(Feed::Music, bundle(1, &[Some(60)]), 0.0);
        assert!(!s.regime().divergence_active);
        assert_eq!(s.regime().label, "MINOR");
    }

    #[test]
    fn build_mismatch_flagged() {
        let mut s = session();
        s.set_expected_build(Some("A".into()));
        s.start(0.0);
        let mut b = bundle(0, &[Some(60)]);
        b.context.build_id = Some("A".into());
        s.ingest_bundle(Feed::Music, b.clone(), 0.0);
        assert!(!s.build_mismatch());
        b.context.build_id = Some("B".into());
        s.ingest_bundle(Feed::Music, b, 0.0);
        assert!(s.build_mismatch());
    }

    #[test]
    fn paint_reports_visible_notes() {
        let mut s = session();
        s.start(0.0);
        s.ingest_bundle(Feed::Music, bundle(0, &[Some(60), Some(62)]), 100.0);
        let mut canvas = RecordingCanvas::new();
        let stats = s.on_paint(200.0, &mut canvas);
        assert_eq!(stats.lane(Voice::Lead).visible_notes, 2);
        assert_eq!(canvas.frames(), 1);
    }
}
