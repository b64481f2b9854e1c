//! Thread-shareable note index.
//!
//! One writer at a time; readers are excluded only while the tree is
//! rebuilt. Queries first try a plain read lock against the built tree and
//! upgrade to a write lock only when a rebuild is pending.

use std::sync::Arc;

use keyroll_index::{NoteData, NoteId, NoteQueryIndex};
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};

#[derive(Clone, Default)]
pub struct SharedNoteRoll {
    inner: Arc<RwLock<NoteQueryIndex>>,
}

impl SharedNoteRoll {
    pub fn new(index: NoteQueryIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn add_note(&self, note: NoteData) {
        self.inner.write().add_note(note);
    }

    pub fn add_notes(&self, notes: impl IntoIterator<Item = NoteData>) {
        self.inner.write().add_notes(notes);
    }

    pub fn remove_note(&self, id: NoteId) -> Option<NoteData> {
        self.inner.write().remove_note(id)
    }

    pub fn update_note(&self, note: NoteData) -> Option<NoteData> {
        self.inner.write().update_note(note)
    }

    pub fn query_comprehensive(
        &self,
        start: f64,
        end: f64,
        min_pitch: u8,
        max_pitch: u8,
    ) -> Vec<NoteData> {
        if let Some(found) = self
            .inner
            .read()
            .query_comprehensive_built(start, end, min_pitch, max_pitch)
        {
            return found;
        }

        let guard = self.inner.upgradable_read();
        // Another caller may have rebuilt while we waited
        if let Some(found) = guard.query_comprehensive_built(start, end, min_pitch, max_pitch) {
            return found;
        }
        RwLockUpgradableReadGuard::upgrade(guard).query_comprehensive(
            start, end, min_pitch, max_pitch,
        )
    }

    pub fn query_by_time_range(&self, start: f64, end: f64) -> Vec<NoteData> {
        if let Some(found) = self.inner.read().query_by_time_range_built(start, end) {
            return found;
        }

        let guard = self.inner.upgradable_read();
        if let Some(found) = guard.query_by_time_range_built(start, end) {
            return found;
        }
        RwLockUpgradableReadGuard::upgrade(guard).query_by_time_range(start, end)
    }

    pub fn query_by_pitch_range(&self, min: u8, max: u8) -> Vec<NoteData> {
        self.inner.read().query_by_pitch_range(min, max)
    }

    pub fn query_by_velocity(&self, velocity: u8) -> Vec<NoteData> {
        self.inner.read().query_by_velocity(velocity)
    }

    pub fn optimize_if_needed(&self, current_time: f64) -> bool {
        self.inner.write().optimize_if_needed(current_time)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Read access for bulk inspection; holds off writers until dropped.
    pub fn read(&self) -> RwLockReadGuard<'_, NoteQueryIndex> {
        self.inner.read()
    }
}

impl std::fmt::Debug for SharedNoteRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedNoteRoll")
            .field("notes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_concurrent_writers_and_readers() {
        let shared = SharedNoteRoll::default();
        let writers: Vec<_> = (0..4u8)
            .map(|w| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        shared.add_note(NoteData::new(i as f64, 1.0, 40 + w, 100));
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let found = shared.query_comprehensive(0.0, 1000.0, 0, 127);
                        assert!(found.len() <= 1000);
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
        assert_eq!(shared.len(), 1000);
        assert_eq!(shared.query_comprehensive(0.0, 1000.0, 0, 127).len(), 1000);
        assert_eq!(shared.query_by_pitch_range(41, 41).len(), 250);
        assert!(!shared.read().is_dirty());
    }
}
