//! Standard MIDI File codec and note extraction.
//!
//! Decodes the on-disk container (header plus track chunks) into per-track
//! event lists, encodes them back bit-exactly, and pairs Note On/Off events
//! into closed note intervals.
//!
//! ```
//! use keyroll_smf::{decode_track, encode_track, extract_notes, Event};
//!
//! let events = vec![Event::note_on(0, 0, 60, 100), Event::note_off(480, 0, 60, 0)];
//! let bytes = encode_track(&events).unwrap();
//! let decoded = decode_track(&bytes).unwrap();
//! assert_eq!(decoded, events);
//!
//! let notes: Vec<_> = extract_notes(&decoded).collect();
//! assert_eq!((notes[0].start, notes[0].length, notes[0].key), (0, 480, 60));
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod event;
pub use event::{meta, Event, EventKind, DEFAULT_MICROS_PER_QUARTER};

pub mod vlq;
pub use vlq::{decode_delta_time, encode_delta_time, MAX_DELTA_TIME};

mod reader;

pub mod track;
pub use track::{decode_track, decode_track_events, encode_track, TrackWriter, TRACK_MAGIC};

pub mod file;
pub use file::{
    track_duration, track_name, Format, Header, PartialSmf, Smf, SmfStats, Timing, HEADER_MAGIC,
};

pub mod extract;
pub use extract::{
    extract_notes, extract_notes_with, ExtractConfig, Note, NoteExtractor, UnclosedNotes,
};
