//! Duration inference: run-length encoding of a per-sub-step pitch sequence.
//!
//! A note starts wherever a present pitch differs from the previous present
//! pitch. Absent slots (rests) neither start nor close a note, and a note
//! never extends past the last slot that actually carried its pitch, so the
//! inferred notes cover every present slot exactly once.

use tc_core::{Bundle, NoteEvent, Voice};

/// A run found in a pitch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchRun {
    /// Sub-step index where the run begins.
    pub start: usize,
    pub pitch: i32,
    pub duration_units: u32,
}

/// Run-length encode `pitches`.
pub fn run_lengths(pitches: &[Option<i32>]) -> Vec<PitchRun> {
    let mut runs: Vec<PitchRun> = Vec::new();
    let mut previous_pitch: Option<i32> = None;
    // (start index of the open run, last index that carried its pitch)
    let mut open: Option<(usize, usize)> = None;

    for (i, slot) in pitches.iter().enumerate() {
        let Some(pitch) = *slot else { continue };

        if previous_pitch == Some(pitch) {
            if let Some((_, last)) = open.as_mut() {
                *last = i;
            }
            continue;
        }

        if let (Some((start, last)), Some(run)) = (open, runs.last_mut()) {
            run.duration_units = (last - start + 1) as u32;
        }
        runs.push(PitchRun {
            start: i,
            pitch,
            duration_units: 1,
        });
        open = Some((i, i));
        previous_pitch = Some(pitch);
    }

    if let (Some((start, last)), Some(run)) = (open, runs.last_mut()) {
        run.duration_units = (last - start + 1) as u32;
    }
    runs
}

/// Infer the notes of one voice in a bundle.
///
/// Onset of sub-step `i` is `base_ms + i * sub_step_ms`; the attached price is
/// the bundle's per-note price at the onset slot.
pub fn infer_notes(
    bundle: &Bundle,
    voice: Voice,
    base_ms: f64,
    sub_step_ms: f64,
) -> Vec<NoteEvent> {
    let note_prices = bundle.note_prices(voice);
    run_lengths(bundle.pitches(voice))
        .into_iter()
        .map(|run| {
            let mut note = NoteEvent::provisional(
                voice,
                run.pitch,
                note_prices.get(run.start).copied().flatten(),
                bundle.start_tick + run.start as i64,
                base_ms + run.start as f64 * sub_step_ms,
                sub_step_ms,
            );
            note.close(run.duration_units, sub_step_ms);
            note
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::MarketContext;

    fn pairs(pitches: &[Option<i32>]) -> Vec<(usize, i32, u32)> {
        run_lengths(pitches)
            .into_iter()
            .map(|r| (r.start, r.pitch, r.duration_units))
            .collect()
    }

    #[test]
    fn runs_with_embedded_rest() {
        let seq = [
            Some(60), Some(60), None, Some(64), Some(64), Some(64), Some(67),
        ];
        assert_eq!(pairs(&seq), vec![(0, 60, 2), (3, 64, 3), (6, 67, 1)]);
    }

    #[test]
    fn rest_inside_same_pitch_does_not_split() {
        let seq = [Some(60), None, Some(60), Some(62)];
        assert_eq!(pairs(&seq), vec![(0, 60, 3), (3, 62, 1)]);
    }

    #[test]
    fn leading_and_trailing_rests() {
        let seq = [None, None, Some(50), Some(50), None, None];
        assert_eq!(pairs(&seq), vec![(2, 50, 2)]);
    }

    #[test]
    fn all_rests_and_empty() {
        assert!(run_lengths(&[None, None]).is_empty());
        assert!(run_lengths(&[]).is_empty());
    }

    #[test]
    fn runs_cover_every_present_slot_once() {
        let seq = [
            Some(1), None, Some(2), Some(2), None, Some(1), None, Some(1), Some(3), None,
        ];
        let runs = run_lengths(&seq);
        let mut covered = vec![0u32; seq.len()];
        for r in &runs {
            let span = r.start..r.start + r.duration_units as usize;
            for slot in &mut covered[span] {
                *slot += 1;
            }
        }
        for (i, slot) in seq.iter().enumerate() {
            if slot.is_some() {
                assert_eq!(covered[i], 1, "slot {i} covered {} times", covered[i]);
            }
            assert!(covered[i] <= 1);
        }
    }

    #[test]
    fn notes_get_onsets_ticks_and_prices() {
        let bundle = Bundle {
            start_tick: 100,
            lead_pitches: vec![Some(72), Some(72), Some(74), None],
            secondary_pitches: vec![None; 4],
            lead_prices: vec![Some(1.0); 4],
            secondary_prices: vec![None; 4],
            lead_note_prices: vec![Some(430.0), Some(430.0), Some(431.0), None],
            secondary_note_prices: vec![None; 4],
            divergence: false,
            context: MarketContext::default(),
        };
        let notes = infer_notes(&bundle, Voice::Lead, 1_000.0, 62.5);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].tick_index, 100);
        assert_eq!(notes[0].duration_units, 2);
        assert!((notes[0].end_ms - 1_125.0).abs() < 1e-9);
        assert_eq!(notes[1].tick_index, 102);
        assert!((notes[1].onset_ms - 1_125.0).abs() < 1e-9);
        assert_eq!(notes[1].source_price, Some(431.0));
        let secondary = infer_notes(&bundle, Voice::Secondary, 1_000.0, 62.5);
        assert!(secondary.is_empty());
    }
}
