//! End-to-end pipeline: file bytes to a queryable note index.

use std::path::Path;

use keyroll_index::{NoteData, NoteQueryIndex};
use keyroll_smf::{extract_notes_with, track_duration, Event, Header, Smf};
use tracing::debug;

use crate::{KeyrollConfig, Result};

/// A decoded file together with the index over its notes.
///
/// Index times are in the unit chosen by [`KeyrollConfig::time_unit`].
#[derive(Debug)]
pub struct NoteRoll {
    smf: Smf,
    config: KeyrollConfig,
    scale: f64,
    index: NoteQueryIndex,
}

impl NoteRoll {
    pub fn from_bytes(data: &[u8], config: &KeyrollConfig) -> Result<Self> {
        Self::from_smf(Smf::parse(data)?, config)
    }

    pub fn load(path: impl AsRef<Path>, config: &KeyrollConfig) -> Result<Self> {
        Self::from_smf(Smf::load(path)?, config)
    }

    /// Extract every track and build the index over the result.
    pub fn from_smf(smf: Smf, config: &KeyrollConfig) -> Result<Self> {
        config.validate()?;
        let scale = config.tick_scale(smf.header.timing)?;

        let mut index = NoteQueryIndex::with_rebuild_interval(config.rebuild_interval);
        for (track_index, track) in smf.tracks.iter().enumerate() {
            index.add_notes(
                extract_notes_with(track, config.extract)
                    .map(|note| NoteData::from_note(&note, track_index, scale)),
            );
        }
        index.rebuild();

        debug!(
            "Built note roll: {} tracks, {} notes, {} index nodes",
            smf.tracks.len(),
            index.len(),
            index.node_count()
        );

        Ok(Self {
            smf,
            config: *config,
            scale,
            index,
        })
    }

    pub fn header(&self) -> &Header {
        &self.smf.header
    }

    pub fn tracks(&self) -> &[Vec<Event>] {
        &self.smf.tracks
    }

    pub fn smf(&self) -> &Smf {
        &self.smf
    }

    pub fn config(&self) -> &KeyrollConfig {
        &self.config
    }

    pub fn index(&self) -> &NoteQueryIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut NoteQueryIndex {
        &mut self.index
    }

    pub fn into_index(self) -> NoteQueryIndex {
        self.index
    }

    /// Index time units per file tick.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn note_count(&self) -> usize {
        self.index.len()
    }

    /// Notes of one track ordered by start time, then pitch.
    pub fn notes_in_track(&self, track_index: usize) -> Vec<NoteData> {
        let mut notes: Vec<_> = self
            .index
            .iter()
            .filter(|n| n.track_index == track_index)
            .copied()
            .collect();
        notes.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.pitch.cmp(&b.pitch))
        });
        notes
    }

    /// Length of the longest track or latest note end, in index units.
    pub fn duration(&self) -> f64 {
        let events = self
            .smf
            .tracks
            .iter()
            .map(|track| track_duration(track))
            .max()
            .unwrap_or(0) as f64
            * self.scale;
        self.index
            .iter()
            .map(NoteData::end_time)
            .fold(events, f64::max)
    }

    pub fn query_by_time_range(&mut self, start: f64, end: f64) -> Vec<NoteData> {
        self.index.query_by_time_range(start, end)
    }

    pub fn query_by_pitch_range(&self, min: u8, max: u8) -> Vec<NoteData> {
        self.index.query_by_pitch_range(min, max)
    }

    pub fn query_by_velocity(&self, velocity: u8) -> Vec<NoteData> {
        self.index.query_by_velocity(velocity)
    }

    pub fn query_comprehensive(
        &mut self,
        start: f64,
        end: f64,
        min_pitch: u8,
        max_pitch: u8,
    ) -> Vec<NoteData> {
        self.index.query_comprehensive(start, end, min_pitch, max_pitch)
    }

    /// Move the index into a thread-shareable handle.
    #[cfg(feature = "shared")]
    pub fn into_shared(self) -> crate::SharedNoteRoll {
        crate::SharedNoteRoll::new(self.index)
    }
}
