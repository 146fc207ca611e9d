//! Builders shared by the unit tests of this crate.

use tc_core::{Bundle, MarketContext};

/// A bundle whose lead voice plays `lead`, with a matching price ramp and
/// an all-rest secondary voice.
pub fn bundle(start_tick: i64, lead: &[Option<i32>]) -> Bundle {
    let n = lead.len();
    let prices: Vec<Option<f64>> = (0..n).map(|i| Some(430.0 + i as f64 * 0.1)).collect();
    Bundle {
        start_tick,
        lead_pitches: lead.to_vec(),
        secondary_pitches: vec![None; n],
        lead_prices: prices.clone(),
        secondary_prices: vec![None; n],
        lead_note_prices: prices,
        secondary_note_prices: vec![None; n],
        divergence: false,
        context: MarketContext::default(),
    }
}

/// Like [`bundle`] but with both voices and prices set.
pub fn two_voice_bundle(
    start_tick: i64,
    lead: &[Option<i32>],
    secondary: &[Option<i32>],
) -> Bundle {
    let mut b = bundle(start_tick, lead);
    let n = lead.len();
    b.secondary_pitches = secondary.to_vec();
    b.secondary_prices = (0..n).map(|i| Some(510.0 + i as f64 * 0.1)).collect();
    b.secondary_note_prices = b.secondary_prices.clone();
    b
}
