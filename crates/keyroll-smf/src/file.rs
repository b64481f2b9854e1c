//! Standard MIDI File container.
//!
//! Parses a header chunk plus track chunks into per-track event lists, and
//! writes them back with backpatched chunk lengths.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::{meta, Event, EventKind, DEFAULT_MICROS_PER_QUARTER};
use crate::reader::Reader;
use crate::track::{decode_track_events, TrackWriter, TRACK_MAGIC};

pub const HEADER_MAGIC: [u8; 4] = *b"MThd";

const HEADER_LEN: usize = 6;

/// Track layout of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Format 0: one multi-channel track
    SingleTrack,
    /// Format 1: simultaneous tracks
    Parallel,
    /// Format 2: independent sequences
    Sequential,
}

impl Format {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Format::SingleTrack),
            1 => Ok(Format::Parallel),
            2 => Ok(Format::Sequential),
            other => Err(Error::UnsupportedFormat(other)),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }
}

/// Meaning of a delta-time tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timing {
    /// Ticks per quarter note
    Metrical(u16),
    /// SMPTE frames per second and ticks per frame
    Timecode { fps: u8, subframes: u8 },
}

impl Timing {
    pub fn from_division(division: u16) -> Self {
        if division & 0x8000 != 0 {
            // High byte is the negated frame rate in two's complement
            let fps = ((division >> 8) as u8 as i8).unsigned_abs();
            Timing::Timecode {
                fps,
                subframes: (division & 0xFF) as u8,
            }
        } else {
            Timing::Metrical(division)
        }
    }

    pub fn to_division(self) -> u16 {
        match self {
            Timing::Metrical(ticks) => ticks & 0x7FFF,
            Timing::Timecode { fps, subframes } => {
                let high = (fps as i8).wrapping_neg() as u8;
                (u16::from(high) << 8) | u16::from(subframes)
            }
        }
    }

    pub fn ticks_per_quarter(self) -> Option<u16> {
        match self {
            Timing::Metrical(ticks) => Some(ticks),
            Timing::Timecode { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    pub format: Format,
    /// Track count declared by the header chunk
    pub track_count: u16,
    pub timing: Timing,
}

/// A decoded Standard MIDI File.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Smf {
    pub header: Header,
    pub tracks: Vec<Vec<Event>>,
}

/// A file whose tracks were decoded independently.
///
/// A failing track does not discard the tracks around it. Once chunk framing
/// itself breaks, the failing entry is the last one.
#[derive(Debug)]
pub struct PartialSmf {
    pub header: Header,
    pub tracks: Vec<Result<Vec<Event>>>,
}

impl Smf {
    /// Create an empty file; the header track count follows `tracks` on write.
    pub fn new(format: Format, timing: Timing) -> Self {
        Self {
            header: Header {
                format,
                track_count: 0,
                timing,
            },
            tracks: Vec::new(),
        }
    }

    pub fn push_track(&mut self, events: Vec<Event>) {
        self.tracks.push(events);
        self.header.track_count = self.tracks.len().min(u16::MAX as usize) as u16;
    }

    /// Load and parse a file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse(&data)
    }

    /// Parse a file, failing on the first track that does not decode.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let partial = Self::parse_partial(data)?;
        let tracks = partial.tracks.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Self {
            header: partial.header,
            tracks,
        })
    }

    /// Parse a file, decoding each track on its own.
    ///
    /// Header errors are returned directly; track errors are reported per
    /// track.
    pub fn parse_partial(data: &[u8]) -> Result<PartialSmf> {
        let mut reader = Reader::new(data);
        let header = read_header(&mut reader)?;

        debug!(
            "Parsing SMF: format {:?}, {} tracks, timing {:?}",
            header.format, header.track_count, header.timing
        );
        if header.format == Format::SingleTrack && header.track_count > 1 {
            warn!(
                "Format 0 file declares {} tracks; decoding all of them",
                header.track_count
            );
        }

        let mut tracks = Vec::with_capacity(header.track_count as usize);
        for index in 0..header.track_count {
            match next_track_chunk(&mut reader) {
                Ok((body, offset)) => {
                    let track = decode_track_events(body).map_err(|e| e.at_offset(offset));
                    if let Err(ref e) = track {
                        warn!("Track {} failed to decode: {}", index, e);
                    }
                    tracks.push(track);
                }
                Err(e) => {
                    warn!("Track chunk {} unreadable: {}", index, e);
                    tracks.push(Err(e));
                    break;
                }
            }
        }

        debug!(
            "Parsed {} of {} tracks, {} events",
            tracks.iter().filter(|t| t.is_ok()).count(),
            header.track_count,
            tracks
                .iter()
                .filter_map(|t| t.as_ref().ok())
                .map(Vec::len)
                .sum::<usize>()
        );

        Ok(PartialSmf { header, tracks })
    }

    /// Write the file into a seekable sink and return the sink.
    pub fn write<W: Write + Seek>(&self, mut sink: W) -> Result<W> {
        let track_count = u16::try_from(self.tracks.len())
            .map_err(|_| Error::InvalidEvent("more than 65535 tracks"))?;

        sink.write_all(&HEADER_MAGIC)?;
        sink.write_all(&(HEADER_LEN as u32).to_be_bytes())?;
        sink.write_all(&self.header.format.as_u16().to_be_bytes())?;
        sink.write_all(&track_count.to_be_bytes())?;
        sink.write_all(&self.header.timing.to_division().to_be_bytes())?;

        for track in &self.tracks {
            let mut writer = TrackWriter::begin(sink)?;
            for event in track {
                writer.write_event(event)?;
            }
            sink = writer.finish()?;
        }
        Ok(sink)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write(Cursor::new(Vec::new()))?.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write(BufWriter::new(file))?.flush()?;
        Ok(())
    }

    pub fn ticks_per_quarter(&self) -> Option<u16> {
        self.header.timing.ticks_per_quarter()
    }

    /// First tempo in file order (microseconds per quarter note).
    pub fn first_tempo(&self) -> Option<u32> {
        self.tracks.iter().find_map(|track| {
            track.iter().find_map(|event| match event.kind {
                EventKind::Tempo { micros_per_quarter } => Some(micros_per_quarter),
                _ => None,
            })
        })
    }

    /// Initial tempo in BPM, or 120 when the file has no tempo event.
    pub fn tempo_bpm(&self) -> f64 {
        let micros = self
            .first_tempo()
            .filter(|&m| m > 0)
            .unwrap_or(DEFAULT_MICROS_PER_QUARTER);
        60_000_000.0 / micros as f64
    }

    pub fn stats(&self) -> SmfStats {
        let mut channels: u16 = 0;
        let mut note_count = 0;
        let mut event_count = 0;
        let mut max_ticks = 0;

        for track in &self.tracks {
            event_count += track
                .iter()
                .filter(|event| event.kind != EventKind::EndOfTrack)
                .count();
            max_ticks = max_ticks.max(track_duration(track));
            for event in track {
                if event.kind.is_note_on() {
                    note_count += 1;
                }
                if let Some(channel) = event.kind.channel() {
                    channels |= 1 << (channel & 0x0F);
                }
            }
        }

        SmfStats {
            timing: self.header.timing,
            track_count: self.tracks.len(),
            event_count,
            note_count,
            max_ticks,
            channels_used: channels.count_ones() as usize,
        }
    }
}

/// Summary counters over a whole file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmfStats {
    pub timing: Timing,
    pub track_count: usize,
    pub event_count: usize,
    /// Note On events with non-zero velocity
    pub note_count: usize,
    /// Longest track, in ticks
    pub max_ticks: u64,
    pub channels_used: usize,
}

impl SmfStats {
    /// Playback length assuming a constant tempo.
    pub fn estimated_duration_secs(&self, micros_per_quarter: u32) -> f64 {
        match self.timing {
            Timing::Metrical(0) => 0.0,
            Timing::Metrical(ticks) => {
                let secs_per_tick = micros_per_quarter as f64 / (ticks as f64 * 1_000_000.0);
                self.max_ticks as f64 * secs_per_tick
            }
            Timing::Timecode { fps, subframes } => {
                let fps = if fps == 29 { 29.97 } else { fps as f64 };
                let ticks_per_sec = fps * subframes as f64;
                if ticks_per_sec > 0.0 {
                    self.max_ticks as f64 / ticks_per_sec
                } else {
                    0.0
                }
            }
        }
    }
}

/// Sum of all delta times in a track, including trailing End-of-Track time.
pub fn track_duration(events: &[Event]) -> u64 {
    events.iter().map(|e| u64::from(e.delta)).sum()
}

/// Name from the first track-name meta event.
pub fn track_name(events: &[Event]) -> Option<String> {
    events.iter().find_map(|event| match &event.kind {
        EventKind::Meta { kind, data } if *kind == meta::TRACK_NAME => {
            Some(String::from_utf8_lossy(data).into_owned())
        }
        _ => None,
    })
}

fn read_header(reader: &mut Reader<'_>) -> Result<Header> {
    let found = reader.read_tag()?;
    if found != HEADER_MAGIC {
        return Err(Error::InvalidChunk {
            expected: HEADER_MAGIC,
            found,
        });
    }

    let len_offset = reader.position();
    let len = reader.read_u32_be()? as usize;
    if len < HEADER_LEN {
        return Err(Error::malformed(len_offset, "header chunk shorter than 6 bytes"));
    }

    let format = Format::from_u16(reader.read_u16_be()?)?;
    let track_count = reader.read_u16_be()?;
    let timing = Timing::from_division(reader.read_u16_be()?);
    reader.skip(len - HEADER_LEN)?;

    Ok(Header {
        format,
        track_count,
        timing,
    })
}

/// Next `MTrk` chunk, skipping chunks of other types.
fn next_track_chunk<'a>(reader: &mut Reader<'a>) -> Result<(&'a [u8], usize)> {
    loop {
        let tag = reader.read_tag()?;
        let len = reader.read_u32_be()? as usize;
        let offset = reader.position();
        let body = reader.read_bytes(len)?;
        if tag == TRACK_MAGIC {
            return Ok((body, offset));
        }
        debug!(
            "Skipping unknown chunk {:?} ({} bytes)",
            String::from_utf8_lossy(&tag),
            len
        );
    }
}
