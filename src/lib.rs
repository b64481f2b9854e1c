//! # Keyroll - Piano-roll note engine
//!
//! Decodes Standard MIDI Files, reconstructs note intervals and indexes them
//! for fast "which notes are visible in this window?" queries.
//!
//! ## Architecture
//!
//! Keyroll is an umbrella crate over:
//! - **keyroll-smf** - Event model, SMF codec (VLQ, tracks, file container), note extraction
//! - **keyroll-index** - Bounding-volume hierarchy and note query index
//!
//! ## Quick Start
//!
//! ```
//! use keyroll::prelude::*;
//!
//! let mut smf = Smf::new(Format::SingleTrack, Timing::Metrical(480));
//! smf.push_track(vec![
//!     Event::note_on(0, 0, 60, 100),
//!     Event::note_off(480, 0, 60, 0),
//! ]);
//! let bytes = smf.to_bytes()?;
//!
//! let config = KeyrollConfig::builder().time_unit(TimeUnit::Beats).build()?;
//! let mut roll = NoteRoll::from_bytes(&bytes, &config)?;
//! let visible = roll.query_comprehensive(0.0, 4.0, 48, 72);
//! assert_eq!(visible.len(), 1);
//! assert_eq!(visible[0].duration, 1.0);
//! # Ok::<(), keyroll::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `shared` (default) - [`SharedNoteRoll`], a `parking_lot` lock around the index

/// Re-export of keyroll-smf for direct access
pub use keyroll_smf as smf;

/// Re-export of keyroll-index for direct access
pub use keyroll_index as index;

pub use keyroll_smf::{
    decode_delta_time, decode_track, encode_delta_time, encode_track, extract_notes,
    extract_notes_with, meta, Event, EventKind, ExtractConfig, Format, Header, Note,
    NoteExtractor, Smf, SmfStats, Timing, TrackWriter, UnclosedNotes,
};

pub use keyroll_index::{Bounds, NoteData, NoteId, NoteQueryIndex, SpatialIndex};

mod error;
pub use error::{Error, Result};

mod config;
pub use config::{KeyrollConfig, KeyrollConfigBuilder, TimeUnit};

mod roll;
pub use roll::NoteRoll;

#[cfg(feature = "shared")]
mod shared;
#[cfg(feature = "shared")]
pub use shared::SharedNoteRoll;

/// Common imports
pub mod prelude {
    pub use crate::{
        Event, EventKind, Format, KeyrollConfig, Note, NoteData, NoteQueryIndex, NoteRoll,
        Smf, Timing, TimeUnit,
    };

    #[cfg(feature = "shared")]
    pub use crate::SharedNoteRoll;
}
