//! Track event model.
//!
//! The set of event kinds is fixed by the wire format, so events are a closed
//! enum matched exhaustively by the codec and the note extractor.

use serde::{Deserialize, Serialize};

/// Meta event type bytes.
pub mod meta {
    pub const SEQUENCE_NUMBER: u8 = 0x00;
    pub const TEXT: u8 = 0x01;
    pub const COPYRIGHT: u8 = 0x02;
    pub const TRACK_NAME: u8 = 0x03;
    pub const INSTRUMENT_NAME: u8 = 0x04;
    pub const LYRIC: u8 = 0x05;
    pub const MARKER: u8 = 0x06;
    pub const CUE_POINT: u8 = 0x07;
    pub const CHANNEL_PREFIX: u8 = 0x20;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const SMPTE_OFFSET: u8 = 0x54;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
    pub const SEQUENCER_SPECIFIC: u8 = 0x7F;
}

/// Default tempo when a track carries no tempo event (120 BPM).
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// A track event: a delta time plus what happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Ticks elapsed since the previous event in the same track.
    pub delta: u32,

    pub kind: EventKind,
}

/// Event kinds carried by a track.
///
/// Channel values are 0-15 and data values 0-127; the encoder masks anything
/// wider. Meta events with a dedicated variant (`Tempo`, `SequencerSpecific`)
/// always decode to that variant, so build them with [`EventKind::meta`] to
/// keep round trips exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Note Off: key (0-127), release velocity (0-127)
    NoteOff { channel: u8, key: u8, velocity: u8 },

    /// Note On: key (0-127), velocity (0-127). Velocity 0 acts as Note Off.
    NoteOn { channel: u8, key: u8, velocity: u8 },

    /// Polyphonic key pressure (aftertouch)
    PolyPressure { channel: u8, key: u8, pressure: u8 },

    /// Control Change: controller (0-127), value (0-127)
    ControlChange { channel: u8, controller: u8, value: u8 },

    /// Program Change: program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel pressure (aftertouch)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: 14-bit value, 8192 is center
    PitchBend { channel: u8, value: u16 },

    /// Set Tempo meta event
    Tempo { micros_per_quarter: u32 },

    /// Vendor meta extension (`FF 7F`)
    SequencerSpecific(Vec<u8>),

    /// Any other meta event (text, markers, signatures, ...)
    Meta { kind: u8, data: Vec<u8> },

    /// System exclusive message, without the trailing `F7`
    SysEx(Vec<u8>),

    /// `F7` escape packet, written verbatim
    Escape(Vec<u8>),

    /// End-of-Track carrying trailing time after the last event.
    ///
    /// Only ever the final event of a track. The decoder returns it when its
    /// delta is non-zero; otherwise the encoder's implicit `00 FF 2F 00` is
    /// equivalent and it is omitted.
    EndOfTrack,
}

impl Event {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }

    pub fn note_on(delta: u32, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(
            delta,
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            },
        )
    }

    pub fn note_off(delta: u32, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(
            delta,
            EventKind::NoteOff {
                channel,
                key,
                velocity,
            },
        )
    }

    pub fn program_change(delta: u32, channel: u8, program: u8) -> Self {
        Self::new(delta, EventKind::ProgramChange { channel, program })
    }

    pub fn tempo(delta: u32, micros_per_quarter: u32) -> Self {
        Self::new(delta, EventKind::Tempo { micros_per_quarter })
    }

    pub fn text(delta: u32, kind: u8, text: &str) -> Self {
        Self::new(delta, EventKind::meta(kind, text.as_bytes().to_vec()))
    }

    pub fn end_of_track(delta: u32) -> Self {
        Self::new(delta, EventKind::EndOfTrack)
    }
}

impl EventKind {
    /// Build a meta event, normalizing kinds that have a dedicated variant.
    pub fn meta(kind: u8, data: Vec<u8>) -> Self {
        match kind {
            meta::TEMPO if data.len() == 3 => EventKind::Tempo {
                micros_per_quarter: u32::from_be_bytes([0, data[0], data[1], data[2]]),
            },
            meta::SEQUENCER_SPECIFIC => EventKind::SequencerSpecific(data),
            _ => EventKind::Meta { kind, data },
        }
    }

    pub fn channel(&self) -> Option<u8> {
        match *self {
            EventKind::NoteOff { channel, .. }
            | EventKind::NoteOn { channel, .. }
            | EventKind::PolyPressure { channel, .. }
            | EventKind::ControlChange { channel, .. }
            | EventKind::ProgramChange { channel, .. }
            | EventKind::ChannelPressure { channel, .. }
            | EventKind::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Key number for note and poly-pressure events.
    pub fn key(&self) -> Option<u8> {
        match *self {
            EventKind::NoteOff { key, .. }
            | EventKind::NoteOn { key, .. }
            | EventKind::PolyPressure { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Note On with a non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        matches!(self, EventKind::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// Note Off, or Note On with velocity 0.
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            EventKind::NoteOff { .. } | EventKind::NoteOn { velocity: 0, .. }
        )
    }

    /// Text payload of text-like meta events (0x01-0x07), lossily decoded.
    pub fn text(&self) -> Option<String> {
        match self {
            EventKind::Meta { kind, data } if (meta::TEXT..=meta::CUE_POINT).contains(kind) => {
                Some(String::from_utf8_lossy(data).into_owned())
            }
            _ => None,
        }
    }

    /// Tempo in beats per minute, for tempo events.
    pub fn bpm(&self) -> Option<f64> {
        match *self {
            EventKind::Tempo { micros_per_quarter } if micros_per_quarter > 0 => {
                Some(60_000_000.0 / micros_per_quarter as f64)
            }
            _ => None,
        }
    }
}
