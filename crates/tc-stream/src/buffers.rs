//! Note and anchor history: append-only, capacity-bounded, age-bounded.
//!
//! One [`VoiceHistory`] per voice holds the inferred notes and the
//! once-per-beat price anchors. Capacity eviction happens on insert (oldest
//! first); age eviction happens in [`HistoryBuffers::sweep`], which the
//! renderer calls once per frame.
//!
//! # Thread safety
//!
//! Not thread-safe. Socket handlers, the transport clock and the paint clock
//! all run on one task, so the buffers are only ever touched sequentially. A
//! multi-threaded host needs a single-writer discipline around
//! [`HistoryBuffers`].

use std::collections::VecDeque;

use tc_core::config::HistoryConfig;
use tc_core::{NoteEvent, PriceAnchor, Voice};

/// Anything stored in a [`BoundedHistory`].
pub trait Timestamped {
    fn timestamp_ms(&self) -> f64;
}

impl Timestamped for NoteEvent {
    #[inline]
    fn timestamp_ms(&self) -> f64 {
        self.onset_ms
    }
}

impl Timestamped for PriceAnchor {
    #[inline]
    fn timestamp_ms(&self) -> f64 {
        self.sample_ms
    }
}

/// Ordered store that keeps at most `capacity` entries no older than `max_age_ms`.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
    max_age_ms: f64,
}

impl<T: Timestamped> BoundedHistory<T> {
    pub fn new(capacity: usize, max_age_ms: f64) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
            max_age_ms,
        }
    }

    /// Append an entry, dropping the oldest ones beyond capacity.
    ///
    /// Returns the number of entries evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Drop every entry older than `max_age_ms` relative to `now_ms`.
    pub fn evict_older_than(&mut self, now_ms: f64) -> usize {
        let before = self.items.len();
        let cutoff = now_ms - self.max_age_ms;
        self.items.retain(|item| item.timestamp_ms() >= cutoff);
        before - self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl BoundedHistory<NoteEvent> {
    /// Mutable access to a note by id, searching newest first.
    pub fn find_mut(&mut self, id: u64) -> Option<&mut NoteEvent> {
        self.items.iter_mut().rev().find(|n| n.id == id)
    }
}

/// Notes and anchors for one voice.
#[derive(Debug, Clone)]
pub struct VoiceHistory {
    pub notes: BoundedHistory<NoteEvent>,
    pub anchors: BoundedHistory<PriceAnchor>,
}

/// Per-voice history plus the note id counter.
#[derive(Debug, Clone)]
pub struct HistoryBuffers {
    voices: [VoiceHistory; 2],
    next_note_id: u64,
}

impl HistoryBuffers {
    pub fn new(cfg: &HistoryConfig) -> Self {
        let make = || VoiceHistory {
            notes: BoundedHistory::new(cfg.note_capacity, cfg.window_ms),
            anchors: BoundedHistory::new(cfg.anchor_capacity, cfg.window_ms),
        };
        Self {
            voices: [make(), make()],
            next_note_id: 1,
        }
    }

    pub fn voice(&self, voice: Voice) -> &VoiceHistory {
        &self.voices[voice.index()]
    }

    /// Store a note, assigning its id. Returns the id.
    pub fn push_note(&mut self, mut note: NoteEvent) -> u64 {
        let id = self.next_note_id;
        self.next_note_id += 1;
        note.id = id;
        self.voices[note.voice.index()].notes.push(note);
        id
    }

    /// Set the final duration of a previously stored note.
    ///
    /// Returns `false` if the note has already been evicted.
    pub fn close_note(
        &mut self,
        voice: Voice,
        id: u64,
        duration_units: u32,
        sub_step_ms: f64,
    ) -> bool {
        match self.voices[voice.index()].notes.find_mut(id) {
            Some(note) => {
                note.close(duration_units, sub_step_ms);
                true
            }
            None => false,
        }
    }

    pub fn push_anchor(&mut self, voice: Voice, anchor: PriceAnchor) {
        self.voices[voice.index()].anchors.push(anchor);
    }

    /// Age-evict every buffer. Returns the number of entries dropped.
    pub fn sweep(&mut self, now_ms: f64) -> usize {
        let mut dropped = 0;
        for v in &mut self.voices {
            dropped += v.notes.evict_older_than(now_ms);
            dropped += v.anchors.evict_older_than(now_ms);
        }
        dropped
    }

    pub fn note_count(&self) -> usize {
        self.voices.iter().map(|v| v.notes.len()).sum()
    }

    pub fn anchor_count(&self) -> usize {
        self.voices.iter().map(|v| v.anchors.len()).sum()
    }

    pub fn clear(&mut self) {
        for v in &mut self.voices {
            v.notes.clear();
            v.anchors.clear();
        }
    }
}
