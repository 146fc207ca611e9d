//! Drawing surface used by the renderer.
//!
//! The renderer only issues primitive operations; a host adapts them to its
//! real surface. [`RecordingCanvas`] keeps the operations in memory for tests
//! and for the headless runner.

/// RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(r, g, b)
    }
}

pub trait Canvas {
    /// Called once before the first operation of each frame.
    fn begin_frame(&mut self, _width: f64, _height: f64) {}

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color);

    fn stroke_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color);

    /// Connected line through `points`. The default draws segment by segment.
    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color) {
        for w in points.windows(2) {
            self.stroke_line(w[0].0, w[0].1, w[1].0, w[1].1, color);
        }
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str, color: Color);
}

/// One recorded drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Color,
    },
    Line {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        color: Color,
    },
    Polyline {
        points: Vec<(f64, f64)>,
        color: Color,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        color: Color,
    },
}

/// Canvas that stores the operations of the most recent frame.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    ops: Vec<DrawOp>,
    frames: u64,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Frames begun since construction.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn rects(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Rect { .. }))
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl Canvas for RecordingCanvas {
    fn begin_frame(&mut self, _width: f64, _height: f64) {
        self.ops.clear();
        self.frames += 1;
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.ops.push(DrawOp::Rect { x, y, w, h, color });
    }

    fn stroke_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color) {
        self.ops.push(DrawOp::Line {
            x0,
            y0,
            x1,
            y1,
            color,
        });
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color) {
        self.ops.push(DrawOp::Polyline {
            points: points.to_vec(),
            color,
        });
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str, color: Color) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            text: text.to_owned(),
            color,
        });
    }
}
