//! Spatial index for piano-roll range queries.
//!
//! [`SpatialIndex`] is a bounding-volume hierarchy over (time, pitch) boxes
//! with cached node bounds and a dirty flag; [`NoteQueryIndex`] specializes
//! it for [`NoteData`] and adds exact-match maps by pitch and by velocity.
//!
//! ```
//! use keyroll_index::{NoteData, NoteQueryIndex};
//!
//! let mut index = NoteQueryIndex::new();
//! index.add_note(NoteData::new(0.0, 1.0, 60, 100));
//! index.add_note(NoteData::new(4.0, 1.0, 72, 100));
//!
//! let visible = index.query_comprehensive(0.0, 2.0, 48, 84);
//! assert_eq!(visible.len(), 1);
//! assert_eq!(visible[0].pitch, 60);
//! ```
//!
//! None of the types lock internally; share them behind a lock that excludes
//! readers while a rebuild runs.

pub mod bounds;
pub use bounds::{Axis, Bounds};

pub mod bvh;
pub use bvh::{SpatialIndex, LEAF_CAPACITY};

pub mod note;
pub use note::{NoteData, NoteId};

pub mod query;
pub use query::{NoteQueryIndex, DEFAULT_REBUILD_INTERVAL};
