//! Protocol adapter: turns one inbound JSON message into a closed set of
//! variants.
//!
//! Classification order:
//!
//! 1. `soprano_bundle` and `qqq_prices` are arrays of equal, non-zero length
//!    → [`InboundMessage::Bundle`]
//! 2. `soprano_midi` or `bass_midi` is present as a scalar
//!    → [`InboundMessage::Tick`]
//! 3. `qqq_prices` or `spy_prices` is an array and there is no
//!    `soprano_bundle` → [`InboundMessage::Prices`]
//! 4. anything else → [`InboundMessage::Malformed`]
//!
//! Bundle repair happens here so downstream code only ever sees sequences of
//! the bundle's length. A missing or mis-sized auxiliary sequence becomes an
//! all-absent filler; a mis-sized per-note price sequence falls back to the
//! raw price sequence of the same voice.

use serde_json::Value;
use tc_core::{Bundle, MarketContext, PriceSnapshot, TickMessage};

use crate::json_util::{
    bool_field, has_scalar, parse_f64_field, parse_pitch, parse_str_i64, pitch_array, price_array,
    str_field,
};

/// Result of classifying one wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Bundle(Bundle),
    Tick(TickMessage),
    Prices(PriceSnapshot),
    /// Not interpretable; carries the reason for the log line.
    Malformed(String),
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bundle(_) => "bundle",
            Self::Tick(_) => "tick",
            Self::Prices(_) => "prices",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Parse and classify a raw text frame.
pub fn parse_message(text: &str) -> InboundMessage {
    match serde_json::from_str::<Value>(text) {
        Ok(v) if v.is_object() => classify(&v),
        Ok(_) => InboundMessage::Malformed("top-level value is not an object".into()),
        Err(e) => InboundMessage::Malformed(format!("invalid json: {e}")),
    }
}

/// Classify an already-deserialized message object.
pub fn classify(v: &Value) -> InboundMessage {
    let lead_pitches = pitch_array(v, "soprano_bundle");
    let lead_prices = price_array(v, "qqq_prices");

    if let (Some(pitches), Some(prices)) = (&lead_pitches, &lead_prices) {
        if !pitches.is_empty() && pitches.len() == prices.len() {
            return InboundMessage::Bundle(build_bundle(v, pitches.clone(), prices.clone()));
        }
    }

    if has_scalar(v, "soprano_midi") || has_scalar(v, "bass_midi") {
        return InboundMessage::Tick(build_tick(v));
    }

    if lead_pitches.is_none() && (lead_prices.is_some() || price_array(v, "spy_prices").is_some()) {
        return InboundMessage::Prices(build_prices(v));
    }

    match (lead_pitches, lead_prices) {
        (Some(p), Some(q)) => InboundMessage::Malformed(format!(
            "bundle lead sequences disagree: soprano_bundle={} qqq_prices={}",
            p.len(),
            q.len()
        )),
        (Some(_), None) => InboundMessage::Malformed("bundle without qqq_prices".into()),
        _ => InboundMessage::Malformed("no recognised fields".into()),
    }
}

fn build_context(v: &Value) -> MarketContext {
    MarketContext {
        regime: str_field(v, "regime"),
        divergence: bool_field(v, "divergence"),
        chord: parse_str_i64(v.get("chord")),
        root_offset: parse_str_i64(v.get("root_offset")),
        rvol: parse_f64_field(v, "rvol"),
        build_id: str_field(v, "build_id"),
        payload_version: str_field(v, "payload_version"),
    }
}

/// Keep `seq` if it matches the length of `fallback`, otherwise use `fallback`.
///
/// The flag reports whether the fallback was taken.
fn fit_or<T>(seq: Option<Vec<T>>, fallback: Vec<T>) -> (Vec<T>, bool) {
    match seq {
        Some(s) if s.len() == fallback.len() => (s, false),
        _ => (fallback, true),
    }
}

fn build_bundle(
    v: &Value,
    lead_pitches: Vec<Option<i32>>,
    lead_prices: Vec<Option<f64>>,
) -> Bundle {
    let len = lead_prices.len();
    let mut repaired: Vec<&'static str> = Vec::new();

    let (secondary_pitches, r) = fit_or(pitch_array(v, "bass_bundle"), vec![None; len]);
    if r {
        repaired.push("bass_bundle");
    }
    let (secondary_prices, r) = fit_or(price_array(v, "spy_prices"), vec![None; len]);
    if r {
        repaired.push("spy_prices");
    }
    let (lead_note_prices, r) = fit_or(price_array(v, "qqq_note_prices"), lead_prices.clone());
    if r {
        repaired.push("qqq_note_prices");
    }
    let spy_fallback = secondary_prices.clone();
    let (secondary_note_prices, r) = fit_or(price_array(v, "spy_note_prices"), spy_fallback);
    if r {
        repaired.push("spy_note_prices");
    }

    if !repaired.is_empty() {
        tracing::debug!("[adapter] repaired {repaired:?} (len={len})");
    }

    let context = build_context(v);
    Bundle {
        start_tick: parse_str_i64(v.get("start_tick")).unwrap_or(0),
        lead_pitches,
        secondary_pitches,
        lead_prices,
        secondary_prices,
        lead_note_prices,
        secondary_note_prices,
        divergence: context.divergence,
        context,
    }
}

fn build_tick(v: &Value) -> TickMessage {
    TickMessage {
        tick: parse_str_i64(v.get("tick"))
            .or_else(|| parse_str_i64(v.get("tick_count")))
            .unwrap_or(0),
        lead_pitch: parse_pitch(v.get("soprano_midi")),
        secondary_pitch: parse_pitch(v.get("bass_midi")),
        lead_price: parse_f64_field(v, "qqq_price"),
        secondary_price: parse_f64_field(v, "spy_price"),
        lead_note_offset: parse_f64_field(v, "qqq_note_offset"),
        secondary_note_offset: parse_f64_field(v, "spy_note_offset"),
        context: build_context(v),
    }
}

fn build_prices(v: &Value) -> PriceSnapshot {
    let dense = |key: &str| -> Vec<f64> {
        price_array(v, key)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect()
    };
    let lead_prices = dense("qqq_prices");
    let secondary_prices = dense("spy_prices");
    PriceSnapshot {
        lead_current: parse_f64_field(v, "qqq_current")
            .or_else(|| lead_prices.last().copied()),
        secondary_current: parse_f64_field(v, "spy_current")
            .or_else(|| secondary_prices.last().copied()),
        lead_prices,
        secondary_prices,
    }
}
