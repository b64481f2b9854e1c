//! Note query index: a BVH over notes plus exact-match maps by pitch and
//! velocity.
//!
//! Time ranges are half-open on both the note (`[start, start + duration)`)
//! and the query (`[start, end)`); pitch ranges are inclusive. The tree is
//! queried with its closed boxes and the results are filtered down to those
//! semantics.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::bounds::Bounds;
use crate::bvh::SpatialIndex;
use crate::note::{NoteData, NoteId};

/// Drop `id` from its bucket, removing the bucket once empty.
macro_rules! remove_from_bucket {
    ($map:expr, $key:expr, $id:expr) => {
        if let Some(bucket) = $map.get_mut(&$key) {
            bucket.retain(|n| n.id != $id);
            if bucket.is_empty() {
                $map.remove(&$key);
            }
        }
    };
}

/// Minimum time between throttled rebuilds, in the caller's clock units.
pub const DEFAULT_REBUILD_INTERVAL: f64 = 1.0;

pub struct NoteQueryIndex {
    spatial: SpatialIndex<NoteData>,
    by_pitch: BTreeMap<u8, Vec<NoteData>>,
    by_velocity: HashMap<u8, Vec<NoteData>>,
    rebuild_interval: f64,
    last_rebuild: f64,
}

impl NoteQueryIndex {
    pub fn new() -> Self {
        Self::with_rebuild_interval(DEFAULT_REBUILD_INTERVAL)
    }

    pub fn with_rebuild_interval(rebuild_interval: f64) -> Self {
        Self {
            spatial: SpatialIndex::new(NoteData::bounds as fn(&NoteData) -> Bounds),
            by_pitch: BTreeMap::new(),
            by_velocity: HashMap::new(),
            rebuild_interval,
            last_rebuild: 0.0,
        }
    }

    pub fn rebuild_interval(&self) -> f64 {
        self.rebuild_interval
    }

    pub fn add_note(&mut self, note: NoteData) {
        self.spatial.add(note);
        self.by_pitch.entry(note.pitch).or_default().push(note);
        self.by_velocity.entry(note.velocity).or_default().push(note);
    }

    pub fn add_notes(&mut self, notes: impl IntoIterator<Item = NoteData>) {
        for note in notes {
            self.add_note(note);
        }
    }

    /// Remove a note from all three structures.
    pub fn remove_note(&mut self, id: NoteId) -> Option<NoteData> {
        let note = *self.spatial.iter().find(|n| n.id == id)?;
        self.spatial.retain(|n| n.id != id);
        remove_from_bucket!(self.by_pitch, note.pitch, id);
        remove_from_bucket!(self.by_velocity, note.velocity, id);
        Some(note)
    }

    /// Replace the note stored under `note.id`, returning the old value.
    ///
    /// Unknown IDs leave the index unchanged.
    pub fn update_note(&mut self, note: NoteData) -> Option<NoteData> {
        let old = self.remove_note(note.id)?;
        self.add_note(note);
        Some(old)
    }

    /// Linear lookup by ID.
    pub fn get(&self, id: NoteId) -> Option<&NoteData> {
        self.spatial.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteData> + '_ {
        self.spatial.iter()
    }

    pub fn len(&self) -> usize {
        self.spatial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spatial.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.spatial.is_dirty()
    }

    pub fn node_count(&self) -> usize {
        self.spatial.node_count()
    }

    pub fn rebuild(&mut self) {
        self.spatial.rebuild();
    }

    pub fn clear(&mut self) {
        self.spatial.clear();
        self.by_pitch.clear();
        self.by_velocity.clear();
    }

    /// Notes sounding at any point in `[start, end)`.
    ///
    /// Both intervals are half-open, so an empty window (`start == end`)
    /// matches nothing, and neither does a zero-duration note. For a playhead
    /// lookup at a single instant, use [`SpatialIndex::query_point`] over
    /// [`NoteData::bounds`], whose boxes are closed.
    pub fn query_by_time_range(&mut self, start: f64, end: f64) -> Vec<NoteData> {
        let candidates = self.spatial.query_range(Bounds::time_span(start, end));
        filter_time(candidates, start, end)
    }

    /// Notes with `min <= pitch <= max`, served from the pitch map.
    pub fn query_by_pitch_range(&self, min: u8, max: u8) -> Vec<NoteData> {
        if min > max {
            return Vec::new();
        }
        self.by_pitch
            .range(min..=max)
            .flat_map(|(_, notes)| notes.iter().copied())
            .collect()
    }

    pub fn query_by_velocity(&self, velocity: u8) -> Vec<NoteData> {
        self.by_velocity
            .get(&velocity)
            .cloned()
            .unwrap_or_default()
    }

    /// Notes overlapping `[start, end)` with pitch in `[min_pitch, max_pitch]`.
    ///
    /// Same half-open time rule as
    /// [`query_by_time_range`](Self::query_by_time_range): `start == end`
    /// returns nothing.
    pub fn query_comprehensive(
        &mut self,
        start: f64,
        end: f64,
        min_pitch: u8,
        max_pitch: u8,
    ) -> Vec<NoteData> {
        let candidates = self.spatial.query_range(window(start, end, min_pitch, max_pitch));
        filter_window(candidates, start, end, min_pitch, max_pitch)
    }

    /// [`query_comprehensive`](Self::query_comprehensive) against the current
    /// tree; `None` when a rebuild is pending.
    pub fn query_comprehensive_built(
        &self,
        start: f64,
        end: f64,
        min_pitch: u8,
        max_pitch: u8,
    ) -> Option<Vec<NoteData>> {
        let candidates = self
            .spatial
            .query_range_built(window(start, end, min_pitch, max_pitch))?;
        Some(filter_window(candidates, start, end, min_pitch, max_pitch))
    }

    pub fn query_by_time_range_built(&self, start: f64, end: f64) -> Option<Vec<NoteData>> {
        let candidates = self
            .spatial
            .query_range_built(Bounds::time_span(start, end))?;
        Some(filter_time(candidates, start, end))
    }

    /// Rebuild if dirty and more than the rebuild interval has passed since
    /// the last throttled rebuild. Returns whether a rebuild happened.
    pub fn optimize_if_needed(&mut self, current_time: f64) -> bool {
        let elapsed = current_time - self.last_rebuild;
        if elapsed > self.rebuild_interval && self.spatial.is_dirty() {
            self.spatial.rebuild();
            self.last_rebuild = current_time;
            true
        } else {
            trace!(
                "Skipping rebuild: dirty={}, {:.3} since last rebuild",
                self.spatial.is_dirty(),
                elapsed
            );
            false
        }
    }
}

impl Default for NoteQueryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NoteQueryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteQueryIndex")
            .field("spatial", &self.spatial)
            .field("pitches", &self.by_pitch.len())
            .field("velocities", &self.by_velocity.len())
            .field("rebuild_interval", &self.rebuild_interval)
            .finish()
    }
}

fn window(start: f64, end: f64, min_pitch: u8, max_pitch: u8) -> Bounds {
    Bounds::new(start, f64::from(min_pitch), end, f64::from(max_pitch))
}

fn filter_time(candidates: Vec<&NoteData>, start: f64, end: f64) -> Vec<NoteData> {
    candidates
        .into_iter()
        .filter(|n| n.overlaps_time(start, end))
        .copied()
        .collect()
}

fn filter_window(
    candidates: Vec<&NoteData>,
    start: f64,
    end: f64,
    min_pitch: u8,
    max_pitch: u8,
) -> Vec<NoteData> {
    candidates
        .into_iter()
        .filter(|n| n.overlaps_time(start, end) && (min_pitch..=max_pitch).contains(&n.pitch))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (NoteQueryIndex, Vec<NoteData>) {
        let notes = vec![
            NoteData::new(0.0, 1.0, 60, 100),
            NoteData::new(0.5, 1.0, 64, 80),
            NoteData::new(2.0, 0.5, 67, 100),
            NoteData::new(3.0, 2.0, 72, 60),
        ];
        let mut index = NoteQueryIndex::new();
        index.add_notes(notes.iter().copied());
        (index, notes)
    }

    fn ids(notes: &[NoteData]) -> Vec<NoteId> {
        let mut ids: Vec<_> = notes.iter().map(|n| n.id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_time_range_is_half_open() {
        let (mut index, notes) = sample();
        // Note 0 ends exactly at 1.0 and is excluded from [1.0, 2.0)
        assert_eq!(ids(&index.query_by_time_range(1.0, 2.0)), ids(&notes[1..2]));
        // Note 2 starts exactly at 2.0 and is excluded from [1.0, 2.0), included in [2.0, 2.1)
        assert_eq!(ids(&index.query_by_time_range(2.0, 2.1)), ids(&notes[2..3]));
    }

    #[test]
    fn test_pitch_and_velocity_maps() {
        let (index, notes) = sample();
        assert_eq!(ids(&index.query_by_pitch_range(61, 70)), ids(&notes[1..3]));
        assert!(index.query_by_pitch_range(70, 61).is_empty());
        assert_eq!(
            ids(&index.query_by_velocity(100)),
            ids(&[notes[0], notes[2]])
        );
        assert!(index.query_by_velocity(1).is_empty());
    }

    #[test]
    fn test_comprehensive() {
        let (mut index, notes) = sample();
        assert_eq!(
            ids(&index.query_comprehensive(0.0, 4.0, 64, 72)),
            ids(&notes[1..4])
        );
        assert!(index.query_comprehensive(4.0, 0.0, 0, 127).is_empty());
    }

    #[test]
    fn test_remove_keeps_structures_in_sync() {
        let (mut index, notes) = sample();
        assert_eq!(index.remove_note(notes[2].id), Some(notes[2]));
        assert_eq!(index.remove_note(notes[2].id), None);
        assert_eq!(index.len(), 3);
        assert!(index.query_by_pitch_range(67, 67).is_empty());
        assert_eq!(ids(&index.query_by_velocity(100)), ids(&notes[0..1]));
        assert!(index.query_comprehensive(2.0, 2.5, 0, 127).is_empty());
    }

    #[test]
    fn test_update_moves_note() {
        let (mut index, notes) = sample();
        let moved = NoteData {
            start_time: 10.0,
            pitch: 48,
            ..notes[0]
        };
        assert_eq!(index.update_note(moved), Some(notes[0]));
        assert_eq!(index.get(notes[0].id), Some(&moved));
        assert_eq!(ids(&index.query_by_time_range(10.0, 10.5)), vec![moved.id]);
        assert_eq!(ids(&index.query_by_pitch_range(48, 48)), vec![moved.id]);
        assert!(index.query_by_pitch_range(60, 60).is_empty());

        let stranger = NoteData::new(0.0, 1.0, 1, 1);
        assert_eq!(index.update_note(stranger), None);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_empty_window_and_zero_duration() {
        let (mut index, notes) = sample();
        assert!(index.query_by_time_range(0.5, 0.5).is_empty());
        assert!(index.query_comprehensive(0.5, 0.5, 0, 127).is_empty());

        let blip = NoteData::new(6.0, 0.0, 50, 90);
        index.add_note(blip);
        assert!(index.query_by_time_range(6.0, 7.0).is_empty());
        assert!(index.query_by_time_range(5.0, 6.0).is_empty());

        // Closed boxes find both the playhead hit and the zero-duration note
        let mut playhead = SpatialIndex::new(NoteData::bounds as fn(&NoteData) -> Bounds);
        playhead.extend(notes.iter().copied().chain([blip]));
        let at = |index: &mut SpatialIndex<NoteData>, time, pitch: u8| -> Vec<NoteId> {
            index
                .query_point(time, f64::from(pitch) + 0.5)
                .into_iter()
                .map(|n| n.id)
                .collect()
        };
        assert_eq!(at(&mut playhead, 0.5, 64), vec![notes[1].id]);
        assert_eq!(at(&mut playhead, 6.0, 50), vec![blip.id]);
    }

    #[test]
    fn test_optimize_is_throttled() {
        let mut index = NoteQueryIndex::with_rebuild_interval(1.0);
        assert_eq!(index.rebuild_interval(), 1.0);
        assert_eq!(NoteQueryIndex::new().rebuild_interval(), DEFAULT_REBUILD_INTERVAL);
        index.add_note(NoteData::new(0.0, 1.0, 60, 100));
        assert!(!index.optimize_if_needed(0.5));
        assert!(index.is_dirty());
        assert!(index.optimize_if_needed(1.5));
        assert!(!index.is_dirty());

        index.add_note(NoteData::new(1.0, 1.0, 62, 100));
        assert!(!index.optimize_if_needed(2.0));
        assert!(index.optimize_if_needed(2.6));
        // Clean index never rebuilds
        assert!(!index.optimize_if_needed(100.0));
    }

    #[test]
    fn test_built_queries_wait_for_rebuild() {
        let (mut index, notes) = sample();
        assert!(index.query_comprehensive_built(0.0, 1.0, 0, 127).is_none());
        index.rebuild();
        let found = index.query_comprehensive_built(0.0, 1.0, 0, 127).unwrap();
        assert_eq!(ids(&found), ids(&notes[0..2]));
        assert_eq!(
            ids(&index.query_by_time_range_built(3.5, 4.0).unwrap()),
            ids(&notes[3..4])
        );
    }
}
