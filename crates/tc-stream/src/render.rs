//! Piano-roll renderer.
//!
//! Runs on the paint clock, independent of the transport clock. Every frame:
//!
//! 1. sweeps buffer entries older than the history window
//! 2. auto-ranges pitch and price separately for each voice lane
//! 3. draws price polylines, note rectangles and the fixed playhead
//! 4. labels the time axis from elapsed wall time since the session origin
//!
//! Time maps to x linearly: the playhead sits at `playhead_fraction` of the
//! width and the left edge is `window_ms` in the past. Look-ahead notes
//! land to the right of the playhead.

use tc_core::config::RenderConfig;
use tc_core::{NoteEvent, PriceAnchor, RegimeState, Voice};

use crate::buffers::{HistoryBuffers, VoiceHistory};
use crate::canvas::{Canvas, Color};

/// Smallest span treated as non-flat.
const MIN_SPAN: f64 = 1e-9;
/// Band reserved at the top for the regime label.
const HEADER_PX: f64 = 20.0;
/// Band reserved at the bottom for time labels.
const FOOTER_PX: f64 = 18.0;

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Theme {
    pub background: Color,
    pub background_divergence: Color,
    pub playhead: Color,
    pub playhead_divergence: Color,
    pub divider: Color,
    pub label: Color,
    pub notes: [Color; 2],
    pub price_lines: [Color; 2],
    pub regime_major: Color,
    pub regime_minor: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::rgb(16, 18, 26),
            background_divergence: Color::rgb(46, 14, 20),
            playhead: Color::rgb(225, 225, 235),
            playhead_divergence: Color::rgb(255, 72, 72),
            divider: Color::rgb(60, 64, 80),
            label: Color::rgb(150, 155, 170),
            notes: [Color::rgb(96, 190, 255), Color::rgb(255, 170, 80)],
            price_lines: [Color::rgb(60, 120, 170), Color::rgb(170, 110, 50)],
            regime_major: Color::rgb(120, 220, 140),
            regime_minor: Color::rgb(180, 140, 255),
        }
    }
}

impl Theme {
    pub fn regime_color(&self, label: &str) -> Color {
        if label.eq_ignore_ascii_case("major") {
            self.regime_major
        } else if label.eq_ignore_ascii_case("minor") {
            self.regime_minor
        } else {
            self.label
        }
    }
}

// ---------------------------------------------------------------------------
// Auto-range
// ---------------------------------------------------------------------------

/// Closed display interval. Always has a positive span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Position of `v` in the range, 0 at `min` and 1 at `max`, clamped.
    #[inline]
    pub fn normalize(&self, v: f64) -> f64 {
        ((v - self.min) / self.span()).clamp(0.0, 1.0)
    }
}

/// Min/max of `values` with proportional padding, clamped to `[floor, ceiling]`.
///
/// An empty or flat series gets `default_span` instead, so the result can
/// always be used as a divisor.
pub fn auto_range(
    values: impl IntoIterator<Item = f64>,
    padding: f64,
    floor: f64,
    ceiling: f64,
    default_span: f64,
) -> Range {
    let default_span = if default_span > MIN_SPAN {
        default_span
    } else {
        1.0
    };
    let empty = (f64::INFINITY, f64::NEG_INFINITY);
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(empty, |(lo, hi), v| (lo.min(v), hi.max(v)));

    let (mut min, mut max) = if !lo.is_finite() {
        (floor, floor + default_span)
    } else if hi - lo < MIN_SPAN {
        (lo - default_span / 2.0, lo + default_span / 2.0)
    } else {
        let pad = (hi - lo) * padding;
        (lo - pad, hi + pad)
    };

    min = min.max(floor);
    max = max.min(ceiling);
    if max - min < MIN_SPAN {
        if min + default_span <= ceiling {
            max = min + default_span;
        } else {
            min = max - default_span;
        }
    }
    Range { min, max }
}

// ---------------------------------------------------------------------------
// Frame statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneStats {
    pub visible_notes: usize,
    pub visible_anchors: usize,
    pub pitch: Range,
    pub price: Range,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub now_ms: f64,
    /// Wall time since the session origin, used for the axis labels.
    pub elapsed_ms: f64,
    /// Entries removed by this frame's sweep.
    pub evicted: usize,
    pub divergence: bool,
    pub lanes: [LaneStats; 2],
}

impl FrameStats {
    pub fn lane(&self, voice: Voice) -> &LaneStats {
        &self.lanes[voice.index()]
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

pub struct Renderer {
    cfg: RenderConfig,
    window_ms: f64,
    sub_step_ms: f64,
    theme: Theme,
    origin_ms: Option<f64>,
}

impl Renderer {
    pub fn new(cfg: &RenderConfig, window_ms: f64, sub_step_ms: f64) -> Self {
        Self {
            cfg: cfg.clone(),
            window_ms,
            sub_step_ms,
            theme: Theme::default(),
            origin_ms: None,
        }
    }

    /// Anchor the time axis. Without an origin the first frame becomes it.
    pub fn set_origin(&mut self, origin_ms: f64) {
        self.origin_ms = Some(origin_ms);
    }

    pub fn origin(&self) -> Option<f64> {
        self.origin_ms
    }

    #[inline]
    fn playhead_x(&self) -> f64 {
        self.cfg.width * self.cfg.playhead_fraction
    }

    #[inline]
    fn px_per_ms(&self) -> f64 {
        self.playhead_x() / self.window_ms
    }

    #[inline]
    fn x_at(&self, t_ms: f64, now_ms: f64) -> f64 {
        self.playhead_x() + (t_ms - now_ms) * self.px_per_ms()
    }

    /// Latest time that still maps inside the viewport.
    fn horizon_ms(&self, now_ms: f64) -> f64 {
        now_ms + (self.cfg.width - self.playhead_x()) / self.px_per_ms()
    }

    fn lane_height(&self) -> f64 {
        ((self.cfg.height - HEADER_PX - FOOTER_PX) / 2.0).max(1.0)
    }

    fn lane_top(&self, voice: Voice) -> f64 {
        HEADER_PX + voice.index() as f64 * self.lane_height()
    }

    fn lane_y(&self, voice: Voice, norm: f64) -> f64 {
        self.lane_top(voice) + (1.0 - norm) * self.lane_height()
    }

    /// Draw one frame and return what was visible.
    pub fn render(
        &mut self,
        now_ms: f64,
        history: &mut HistoryBuffers,
        regime: &RegimeState,
        canvas: &mut dyn Canvas,
    ) -> FrameStats {
        let evicted = history.sweep(now_ms);
        let origin = *self.origin_ms.get_or_insert(now_ms);
        let divergence = regime.divergence_active;
        let (w, h) = (self.cfg.width, self.cfg.height);

        canvas.begin_frame(w, h);
        let bg = if divergence {
            self.theme.background_divergence
        } else {
            self.theme.background
        };
        canvas.fill_rect(0.0, 0.0, w, h, bg);

        if !regime.label.is_empty() {
            let label_color = self.theme.regime_color(&regime.label);
            canvas.draw_text(8.0, 14.0, &regime.label, label_color);
        }
        if divergence {
            canvas.draw_text(w - 96.0, 14.0, "DIVERGENCE", self.theme.playhead_divergence);
        }

        let divider_y = self.lane_top(Voice::Secondary);
        canvas.stroke_line(0.0, divider_y, w, divider_y, self.theme.divider);

        let lanes = Voice::ALL.map(|voice| {
            let vh = history.voice(voice);
            self.draw_lane(voice, now_ms, vh, canvas)
        });

        let px = self.playhead_x();
        let playhead = if divergence {
            self.theme.playhead_divergence
        } else {
            self.theme.playhead
        };
        canvas.stroke_line(px, HEADER_PX, px, h - FOOTER_PX, playhead);

        self.draw_time_labels(now_ms, origin, canvas);

        FrameStats {
            now_ms,
            elapsed_ms: now_ms - origin,
            evicted,
            divergence,
            lanes,
        }
    }

    fn draw_lane(
        &self,
        voice: Voice,
        now_ms: f64,
        vh: &VoiceHistory,
        canvas: &mut dyn Canvas,
    ) -> LaneStats {
        let t_min = now_ms - self.window_ms;
        let t_max = self.horizon_ms(now_ms);
        let in_view = |t: f64| t >= t_min && t <= t_max;

        let notes: Vec<&NoteEvent> = vh.notes.iter().filter(|n| in_view(n.onset_ms)).collect();
        let anchors: Vec<&PriceAnchor> =
            vh.anchors.iter().filter(|a| in_view(a.sample_ms)).collect();

        let cfg = &self.cfg;
        let pitch = auto_range(
            notes.iter().map(|n| n.pitch as f64),
            cfg.range_padding,
            cfg.pitch_floor,
            cfg.pitch_ceiling,
            cfg.default_pitch_span,
        );
        let note_prices = notes.iter().filter_map(|n| n.source_price);
        let price = auto_range(
            anchors.iter().map(|a| a.price).chain(note_prices),
            cfg.range_padding,
            cfg.price_floor,
            cfg.price_ceiling,
            cfg.default_price_span,
        );

        if anchors.len() >= 2 {
            let points: Vec<(f64, f64)> = anchors
                .iter()
                .map(|a| {
                    let y = self.lane_y(voice, price.normalize(a.price));
                    (self.x_at(a.sample_ms, now_ms), y)
                })
                .collect();
            canvas.stroke_polyline(&points, self.theme.price_lines[voice.index()]);
        }

        let px_per_ms = self.px_per_ms();
        let color = self.theme.notes[voice.index()];
        for n in &notes {
            let norm = match n.source_price {
                Some(p) => price.normalize(p),
                None => pitch.normalize(n.pitch as f64),
            };
            let y = self.lane_y(voice, norm) - cfg.note_height / 2.0;
            let width = (n.duration_units as f64 * self.sub_step_ms * px_per_ms).max(1.0);
            let x = self.x_at(n.onset_ms, now_ms);
            canvas.fill_rect(x, y, width, cfg.note_height, color);
        }

        LaneStats {
            visible_notes: notes.len(),
            visible_anchors: anchors.len(),
            pitch,
            price,
        }
    }

    fn draw_time_labels(&self, now_ms: f64, origin_ms: f64, canvas: &mut dyn Canvas) {
        let interval = self.cfg.label_interval_ms;
        if interval <= 0.0 {
            return;
        }
        let t_min = now_ms - self.window_ms;
        let t_max = self.horizon_ms(now_ms);
        let mut k = ((t_min - origin_ms) / interval).ceil().max(0.0) as u64;
        let y = self.cfg.height - 4.0;
        loop {
            let elapsed = k as f64 * interval;
            let t = origin_ms + elapsed;
            if t > t_max {
                break;
            }
            let x = self.x_at(t, now_ms);
            let tick_top = self.cfg.height - FOOTER_PX;
            canvas.stroke_line(x, tick_top, x, tick_top + 4.0, self.theme.divider);
            canvas.draw_text(x, y, &format_elapsed(elapsed), self.theme.label);
            k += 1;
        }
    }
}

/// `m:ss` for an elapsed duration in milliseconds.
pub fn format_elapsed(elapsed_ms: f64) -> String {
    let secs = (elapsed_ms.max(0.0) / 1000.0).floor() as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{DrawOp, RecordingCanvas};
    use tc_core::config::HistoryConfig;

    fn renderer() -> Renderer {
        Renderer::new(&RenderConfig::default(), 15_000.0, 62.5)
    }

    fn note(voice: Voice, pitch: i32, price: Option<f64>, onset_ms: f64, units: u32) -> NoteEvent {
        let mut n = NoteEvent::provisional(voice, pitch, price, 0, onset_ms, 62.5);
        n.close(units, 62.5);
        n
    }

    fn anchor(price: f64, tick_index: i64, sample_ms: f64) -> PriceAnchor {
        PriceAnchor {
            price,
            tick_index,
            sample_ms,
        }
    }

    #[test]
    fn flat_series_gets_default_span() {
        let r = auto_range([430.0, 430.0, 430.0], 0.08, 0.01, 1e7, 1.0);
        assert!(r.span() > 0.0);
        assert!((r.min - 429.5).abs() < 1e-9);
        assert!((r.max - 430.5).abs() < 1e-9);
        assert!((r.normalize(430.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_and_clamped_ranges_stay_open() {
        let empty = auto_range(std::iter::empty(), 0.08, 0.0, 127.0, 12.0);
        assert_eq!((empty.min, empty.max), (0.0, 12.0));

        let at_floor = auto_range([0.01, 0.01], 0.08, 0.01, 1e7, 1.0);
        assert!(at_floor.span() > 0.0);
        assert_eq!(at_floor.min, 0.01);

        let at_ceiling = auto_range([127.0], 0.08, 0.0, 127.0, 12.0);
        assert_eq!((at_ceiling.min, at_ceiling.max), (115.0, 127.0));
    }

    #[test]
    fn padding_and_clamp() {
        let r = auto_range([60.0, 70.0, f64::NAN], 0.1, 0.0, 127.0, 12.0);
        assert!((r.min - 59.0).abs() < 1e-9);
        assert!((r.max - 71.0).abs() < 1e-9);
        let clamped = auto_range([1.0, 126.0], 0.5, 0.0, 127.0, 12.0);
        assert_eq!((clamped.min, clamped.max), (0.0, 127.0));
    }

    #[test]
    fn stale_notes_are_swept_before_drawing() {
        let mut h = HistoryBuffers::new(&HistoryConfig::default());
        let now = 20_000.0;
        h.push_note(note(Voice::Lead, 60, None, now - 16_000.0, 1));
        h.push_note(note(Voice::Lead, 62, None, now - 1_000.0, 1));
        let mut canvas = RecordingCanvas::new();
        let stats = renderer().render(now, &mut h, &RegimeState::default(), &mut canvas);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.lane(Voice::Lead).visible_notes, 1);
        assert_eq!(h.note_count(), 1);
        // background + one note
        assert_eq!(canvas.rects().count(), 2);
    }

    #[test]
    fn note_geometry_follows_playhead_and_duration() {
        let mut h = HistoryBuffers::new(&HistoryConfig::default());
        let now = 10_000.0;
        h.push_note(note(Voice::Lead, 60, Some(430.0), now, 2));
        h.push_anchor(Voice::Lead, anchor(429.0, 0, now - 2_000.0));
        h.push_anchor(Voice::Lead, anchor(431.0, 16, now - 1_000.0));
        let mut canvas = RecordingCanvas::new();
        let stats = renderer().render(now, &mut h, &RegimeState::default(), &mut canvas);

        let lane = stats.lane(Voice::Lead);
        assert_eq!(lane.visible_anchors, 2);
        assert!(lane.price.min < 429.0 && lane.price.max > 431.0);

        let note_color = Theme::default().notes[0];
        let note_rect = canvas
            .ops()
            .iter()
            .find_map(|op| match op {
                DrawOp::Rect { x, w, color, .. } if *color == note_color => Some((*x, *w)),
                _ => None,
            })
            .expect("note drawn");
        // playhead at 0.8 * 1200; 960 px cover 15 s
        assert!((note_rect.0 - 960.0).abs() < 1e-9);
        assert!((note_rect.1 - 125.0 * 960.0 / 15_000.0).abs() < 1e-9);
        let polyline = canvas.ops().iter().find_map(|op| match op {
            DrawOp::Polyline { points, .. } => Some(points.len()),
            _ => None,
        });
        assert_eq!(polyline, Some(2));
    }

    #[test]
    fn divergence_recolors_background_and_playhead() {
        let mut h = HistoryBuffers::new(&HistoryConfig::default());
        let regime = RegimeState {
            label: "MINOR".into(),
            divergence_active: true,
        };
        let mut canvas = RecordingCanvas::new();
        let stats = renderer().render(1_000.0, &mut h, &regime, &mut canvas);
        assert!(stats.divergence);
        let theme = Theme::default();
        match &canvas.ops()[0] {
            DrawOp::Rect { color, .. } => assert_eq!(*color, theme.background_divergence),
            other => panic!("unexpected {other:?}"),
        }
        let playhead = canvas.ops().iter().find_map(|op| match op {
            DrawOp::Line { x0, color, .. } if (*x0 - 960.0).abs() < 1e-9 => Some(*color),
            _ => None,
        });
        assert_eq!(playhead, Some(theme.playhead_divergence));
        assert!(canvas.texts().any(|t| t == "MINOR"));
    }

    #[test]
    fn time_labels_follow_wall_clock_not_data() {
        let mut h = HistoryBuffers::new(&HistoryConfig::default());
        let mut r = renderer();
        r.set_origin(0.0);
        let mut canvas = RecordingCanvas::new();
        let stats = r.render(65_000.0, &mut h, &RegimeState::default(), &mut canvas);
        assert_eq!(stats.elapsed_ms, 65_000.0);
        let labels: Vec<&str> = canvas.texts().collect();
        assert_eq!(labels, vec!["0:50", "0:55", "1:00", "1:05"]);
    }

    #[test]
    fn elapsed_format() {
        assert_eq!(format_elapsed(0.0), "0:00");
        assert_eq!(format_elapsed(59_999.0), "0:59");
        assert_eq!(format_elapsed(125_000.0), "2:05");
    }
}
