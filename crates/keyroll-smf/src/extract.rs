//! Note extraction.
//!
//! Pairs Note On events with the Note Off (or velocity-0 Note On) that closes
//! them, turning one track's event list into closed note intervals.
//!
//! Pairing is per key within a track, regardless of channel. A Note On for a
//! key that is already sounding closes the open note first ("retrigger"); the
//! closed note takes the *new* Note On's velocity, and the new note opens with
//! it as well. Note Offs with nothing open are ignored. Notes still open when
//! the track ends are dropped unless [`UnclosedNotes::CloseAtTrackEnd`] is set,
//! in which case they close at the track's final tick (trailing time on an
//! [`EventKind::EndOfTrack`] counts).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{Event, EventKind};

const KEY_COUNT: usize = 128;

/// A closed note interval, in absolute ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub start: u64,
    /// Always greater than zero
    pub length: u64,
    pub key: u8,
    pub velocity: u8,
    /// Velocity of the event that closed the note
    pub release_velocity: u8,
    pub channel: u8,
}

impl Note {
    /// Tick of the closing event.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// What happens to notes still sounding when the track ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnclosedNotes {
    #[default]
    Drop,
    /// Close at the track's final tick, End-of-Track included
    CloseAtTrackEnd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub unclosed: UnclosedNotes,
}

impl ExtractConfig {
    /// Closes unclosed notes at the end of the track instead of dropping them.
    pub fn strict() -> Self {
        Self {
            unclosed: UnclosedNotes::CloseAtTrackEnd,
        }
    }
}

/// Extract notes from one track with the default configuration.
pub fn extract_notes(events: &[Event]) -> NoteExtractor<'_> {
    NoteExtractor::new(events, ExtractConfig::default())
}

pub fn extract_notes_with(events: &[Event], config: ExtractConfig) -> NoteExtractor<'_> {
    NoteExtractor::new(events, config)
}

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    start: u64,
    velocity: u8,
    channel: u8,
}

/// Lazy iterator over the notes of one track.
///
/// Owns its pairing state; to start over, create a new extractor over the
/// same events.
#[derive(Debug, Clone)]
pub struct NoteExtractor<'a> {
    events: std::slice::Iter<'a, Event>,
    config: ExtractConfig,
    now: u64,
    open: [Option<OpenNote>; KEY_COUNT],
    /// Next key to inspect once the events are exhausted
    flush_key: Option<usize>,
}

impl<'a> NoteExtractor<'a> {
    pub fn new(events: &'a [Event], config: ExtractConfig) -> Self {
        Self {
            events: events.iter(),
            config,
            now: 0,
            open: [None; KEY_COUNT],
            flush_key: None,
        }
    }

    /// Absolute tick of the last event consumed so far.
    pub fn current_tick(&self) -> u64 {
        self.now
    }

    fn process(&mut self, kind: &EventKind) -> Option<Note> {
        match *kind {
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            } if velocity > 0 => {
                let slot = &mut self.open[usize::from(key & 0x7F)];
                let retriggered = slot.replace(OpenNote {
                    start: self.now,
                    velocity,
                    channel,
                });
                retriggered.and_then(|open| close(open, self.now, key, velocity, velocity))
            }
            EventKind::NoteOn { key, velocity, .. } | EventKind::NoteOff { key, velocity, .. } => {
                let open = self.open[usize::from(key & 0x7F)].take()?;
                close(open, self.now, key, open.velocity, velocity)
            }
            _ => None,
        }
    }

    fn flush_unclosed(&mut self) -> Option<Note> {
        let start_key = match self.flush_key {
            Some(key) => key,
            None => {
                let remaining = self.open.iter().flatten().count();
                if remaining > 0 && self.config.unclosed == UnclosedNotes::Drop {
                    debug!("Dropping {} unclosed notes at tick {}", remaining, self.now);
                    self.open = [None; KEY_COUNT];
                }
                0
            }
        };

        for key in start_key..KEY_COUNT {
            if let Some(open) = self.open[key].take() {
                if let Some(note) = close(open, self.now, key as u8, open.velocity, 0) {
                    self.flush_key = Some(key + 1);
                    return Some(note);
                }
            }
        }
        self.flush_key = Some(KEY_COUNT);
        None
    }
}

impl Iterator for NoteExtractor<'_> {
    type Item = Note;

    fn next(&mut self) -> Option<Note> {
        if self.flush_key.is_none() {
            while let Some(event) = self.events.next() {
                self.now += u64::from(event.delta);
                if let Some(note) = self.process(&event.kind) {
                    return Some(note);
                }
            }
        }
        self.flush_unclosed()
    }
}

/// Close an open note at `now`; zero-length notes are dropped.
fn close(open: OpenNote, now: u64, key: u8, velocity: u8, release_velocity: u8) -> Option<Note> {
    let length = now.checked_sub(open.start).filter(|&len| len > 0)?;
    Some(Note {
        start: open.start,
        length,
        key: key & 0x7F,
        velocity,
        release_velocity,
        channel: open.channel,
    })
}
