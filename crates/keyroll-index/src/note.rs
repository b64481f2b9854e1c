//! Note payload stored in the query index.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use keyroll_smf::Note;
use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;

static NOTE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an indexed note.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(pub u64);

impl NoteId {
    /// Creates a new process-unique ID.
    pub fn new() -> Self {
        Self(NOTE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Note({})", self.0)
    }
}

/// A note positioned in caller-defined time units.
///
/// Notes are not mutated in place once indexed; updates replace the whole
/// value under the same [`NoteId`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteData {
    pub start_time: f64,
    pub duration: f64,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    pub track_index: usize,
    pub id: NoteId,
}

impl NoteData {
    pub fn new(start_time: f64, duration: f64, pitch: u8, velocity: u8) -> Self {
        Self {
            start_time,
            duration,
            pitch,
            velocity,
            channel: 0,
            track_index: 0,
            id: NoteId::new(),
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_track(mut self, track_index: usize) -> Self {
        self.track_index = track_index;
        self
    }

    /// Convert an extracted note, multiplying ticks by `scale`.
    pub fn from_note(note: &Note, track_index: usize, scale: f64) -> Self {
        Self::new(
            note.start as f64 * scale,
            note.length as f64 * scale,
            note.key,
            note.velocity,
        )
        .with_channel(note.channel)
        .with_track(track_index)
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Index box: `[start, end] x [pitch, pitch + 1]`.
    pub fn bounds(&self) -> Bounds {
        let pitch = f64::from(self.pitch);
        Bounds::new(self.start_time, pitch, self.end_time(), pitch + 1.0)
    }

    /// Half-open overlap of `[start_time, end_time)` with `[start, end)`.
    #[inline]
    pub fn overlaps_time(&self, start: f64, end: f64) -> bool {
        self.start_time < end && start < self.end_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = NoteData::new(0.0, 1.0, 60, 100);
        let b = NoteData::new(0.0, 1.0, 60, 100);
        assert_ne!(a.id, b.id);
        assert_ne!(a, b);
    }

    #[test]
    fn test_raw_ids() {
        let id = NoteId::from_raw(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(id, NoteId(42));
        assert_eq!(id.to_string(), "Note(42)");
        assert!(NoteId::new().as_u64() > 0);
    }

    #[test]
    fn test_from_note_scales_ticks() {
        let note = Note {
            start: 960,
            length: 480,
            key: 64,
            velocity: 90,
            release_velocity: 0,
            channel: 9,
        };
        let data = NoteData::from_note(&note, 2, 1.0 / 480.0);
        assert_eq!(data.start_time, 2.0);
        assert_eq!(data.duration, 1.0);
        assert_eq!((data.pitch, data.velocity, data.channel, data.track_index), (64, 90, 9, 2));
    }

    #[test]
    fn test_half_open_overlap() {
        let note = NoteData::new(1.0, 1.0, 60, 100);
        assert!(note.overlaps_time(0.0, 1.5));
        assert!(!note.overlaps_time(2.0, 3.0));
        assert!(!note.overlaps_time(0.0, 1.0));
        assert!(note.overlaps_time(1.999, 3.0));
    }
}
