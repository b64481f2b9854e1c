//! Track chunk codec.
//!
//! A track chunk is `MTrk`, a big-endian byte length, then events each
//! preceded by a variable-length delta time, ending with `FF 2F 00`.

use std::io::{Cursor, Seek, SeekFrom, Write};

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::event::{meta, Event, EventKind};
use crate::reader::Reader;
use crate::vlq::{push_delta_time, MAX_DELTA_TIME};

pub const TRACK_MAGIC: [u8; 4] = *b"MTrk";

const END_OF_TRACK: [u8; 3] = [0xFF, meta::END_OF_TRACK, 0x00];

/// Decode a complete track chunk (magic, length and events).
///
/// A zero-delta End-of-Track is consumed; one with trailing time comes back
/// as a final [`EventKind::EndOfTrack`] so that time survives a re-encode.
pub fn decode_track(bytes: &[u8]) -> Result<Vec<Event>> {
    let mut reader = Reader::new(bytes);
    let (body, offset) = read_track_chunk(&mut reader)?;
    decode_track_events(body).map_err(|e| e.at_offset(offset))
}

/// Decode the event stream of a track body (the bytes after the chunk header).
pub fn decode_track_events(body: &[u8]) -> Result<Vec<Event>> {
    let mut decoder = EventDecoder::new(body);
    let mut events = Vec::new();
    while let Some(event) = decoder.next_event()? {
        events.push(event);
    }
    Ok(events)
}

/// Read a track chunk header and return its body and the body's offset.
pub(crate) fn read_track_chunk<'a>(reader: &mut Reader<'a>) -> Result<(&'a [u8], usize)> {
    let found = reader.read_tag()?;
    if found != TRACK_MAGIC {
        return Err(Error::InvalidChunk {
            expected: TRACK_MAGIC,
            found,
        });
    }
    let len = reader.read_u32_be()? as usize;
    let offset = reader.position();
    let body = reader.read_bytes(len)?;
    Ok((body, offset))
}

/// Encode events into a complete track chunk, appending End-of-Track unless
/// the events already end with one.
pub fn encode_track(events: &[Event]) -> Result<Vec<u8>> {
    let mut writer = TrackWriter::begin(Cursor::new(Vec::new()))?;
    for event in events {
        writer.write_event(event)?;
    }
    Ok(writer.finish()?.into_inner())
}

struct EventDecoder<'a> {
    reader: Reader<'a>,
    running_status: Option<u8>,
    finished: bool,
}

impl<'a> EventDecoder<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(body),
            running_status: None,
            finished: false,
        }
    }

    fn next_event(&mut self) -> Result<Option<Event>> {
        if self.finished {
            return Ok(None);
        }

        // Delta time of skipped system messages carries over to the next event
        let mut carried: u32 = 0;

        loop {
            if self.reader.is_at_end() {
                return Err(Error::TruncatedTrack {
                    offset: self.reader.position(),
                });
            }

            let delta = carried
                .checked_add(self.reader.read_vlq()?)
                .filter(|&delta| delta <= MAX_DELTA_TIME)
                .ok_or_else(|| {
                    Error::malformed(
                        self.reader.position(),
                        "delta time of skipped system messages exceeds 28 bits",
                    )
                })?;
            let status_offset = self.reader.position();
            let first = self.reader.read_u8()?;

            let (status, first_data) = if first < 0x80 {
                match self.running_status {
                    Some(status) => (status, Some(first)),
                    None => {
                        return Err(Error::malformed(
                            status_offset,
                            "data byte without running status",
                        ))
                    }
                }
            } else {
                (first, None)
            };

            let kind = match status {
                0x80..=0xEF => {
                    self.running_status = Some(status);
                    self.read_channel_message(status, first_data)?
                }
                0xFF => {
                    let kind = self.reader.read_u8()?;
                    let data = self.reader.read_vlq_bytes()?;
                    if kind == meta::END_OF_TRACK {
                        self.finished = true;
                        if !self.reader.is_at_end() {
                            trace!(
                                "Ignoring {} bytes after End-of-Track",
                                self.reader.remaining()
                            );
                        }
                        if delta == 0 {
                            return Ok(None);
                        }
                        EventKind::EndOfTrack
                    } else {
                        EventKind::meta(kind, data.to_vec())
                    }
                }
                0xF0 => {
                    let data = self.reader.read_vlq_bytes()?;
                    let data = match data.split_last() {
                        Some((0xF7, rest)) => rest,
                        _ => data,
                    };
                    EventKind::SysEx(data.to_vec())
                }
                0xF7 => EventKind::Escape(self.reader.read_vlq_bytes()?.to_vec()),
                _ => {
                    let len = system_message_len(status).ok_or(Error::UnsupportedEventType {
                        status,
                        offset: status_offset,
                    })?;
                    self.reader.skip(len)?;
                    warn!(
                        "Skipping system message 0x{:02X} at byte {} inside track",
                        status, status_offset
                    );
                    carried = delta;
                    continue;
                }
            };

            return Ok(Some(Event::new(delta, kind)));
        }
    }

    fn read_data_byte(&mut self) -> Result<u8> {
        let offset = self.reader.position();
        let byte = self.reader.read_u8()?;
        if byte & 0x80 != 0 {
            return Err(Error::malformed(offset, "status byte where data byte expected"));
        }
        Ok(byte)
    }

    fn read_channel_message(&mut self, status: u8, first: Option<u8>) -> Result<EventKind> {
        let channel = status & 0x0F;
        let data1 = match first {
            Some(byte) => byte,
            None => self.read_data_byte()?,
        };

        let kind = match status >> 4 {
            0x8 => EventKind::NoteOff {
                channel,
                key: data1,
                velocity: self.read_data_byte()?,
            },
            0x9 => EventKind::NoteOn {
                channel,
                key: data1,
                velocity: self.read_data_byte()?,
            },
            0xA => EventKind::PolyPressure {
                channel,
                key: data1,
                pressure: self.read_data_byte()?,
            },
            0xB => EventKind::ControlChange {
                channel,
                controller: data1,
                value: self.read_data_byte()?,
            },
            0xC => EventKind::ProgramChange {
                channel,
                program: data1,
            },
            0xD => EventKind::ChannelPressure {
                channel,
                pressure: data1,
            },
            _ => {
                let msb = self.read_data_byte()?;
                EventKind::PitchBend {
                    channel,
                    value: (u16::from(msb) << 7) | u16::from(data1),
                }
            }
        };
        Ok(kind)
    }
}

/// Data length of system common / real-time messages that have one.
fn system_message_len(status: u8) -> Option<usize> {
    match status {
        0xF1 | 0xF3 => Some(1),
        0xF2 => Some(2),
        0xF6 | 0xF8 | 0xFA | 0xFB | 0xFC | 0xFE => Some(0),
        _ => None,
    }
}

/// Streams events into a seekable sink and backpatches the chunk length.
///
/// # Example
///
/// ```
/// use keyroll_smf::{Event, TrackWriter};
/// use std::io::Cursor;
///
/// let mut writer = TrackWriter::begin(Cursor::new(Vec::new())).unwrap();
/// writer.write_event(&Event::note_on(0, 0, 60, 100)).unwrap();
/// writer.write_event(&Event::note_off(480, 0, 60, 0)).unwrap();
/// let bytes = writer.finish().unwrap().into_inner();
/// assert_eq!(&bytes[..4], b"MTrk");
/// ```
pub struct TrackWriter<W: Write + Seek> {
    sink: W,
    length_pos: u64,
    body_start: u64,
    scratch: Vec<u8>,
    ended: bool,
}

impl<W: Write + Seek> TrackWriter<W> {
    /// Write the chunk magic and a placeholder length.
    pub fn begin(mut sink: W) -> Result<Self> {
        sink.write_all(&TRACK_MAGIC)?;
        let length_pos = sink.stream_position()?;
        sink.write_all(&[0; 4])?;
        let body_start = sink.stream_position()?;
        Ok(Self {
            sink,
            length_pos,
            body_start,
            scratch: Vec::with_capacity(16),
            ended: false,
        })
    }

    /// Append one event. Nothing may follow an [`EventKind::EndOfTrack`].
    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        if self.ended {
            return Err(Error::InvalidEvent("event after End-of-Track"));
        }
        self.scratch.clear();
        encode_event(&mut self.scratch, event)?;
        self.sink.write_all(&self.scratch)?;
        self.ended = event.kind == EventKind::EndOfTrack;
        Ok(())
    }

    /// Write End-of-Track if not already written, patch the length field and
    /// hand the sink back.
    pub fn finish(mut self) -> Result<W> {
        if !self.ended {
            self.sink.write_all(&[0x00])?;
            self.sink.write_all(&END_OF_TRACK)?;
        }

        let end = self.sink.stream_position()?;
        let len = u32::try_from(end - self.body_start)
            .map_err(|_| Error::InvalidEvent("track longer than 4 GiB"))?;

        self.sink.seek(SeekFrom::Start(self.length_pos))?;
        self.sink.write_all(&len.to_be_bytes())?;
        self.sink.seek(SeekFrom::Start(end))?;
        Ok(self.sink)
    }
}

pub(crate) fn encode_event(out: &mut Vec<u8>, event: &Event) -> Result<()> {
    push_delta_time(out, event.delta)?;

    match &event.kind {
        EventKind::NoteOff {
            channel,
            key,
            velocity,
        } => push_channel(out, 0x80, *channel, &[*key, *velocity]),
        EventKind::NoteOn {
            channel,
            key,
            velocity,
        } => push_channel(out, 0x90, *channel, &[*key, *velocity]),
        EventKind::PolyPressure {
            channel,
            key,
            pressure,
        } => push_channel(out, 0xA0, *channel, &[*key, *pressure]),
        EventKind::ControlChange {
            channel,
            controller,
            value,
        } => push_channel(out, 0xB0, *channel, &[*controller, *value]),
        EventKind::ProgramChange { channel, program } => {
            push_channel(out, 0xC0, *channel, &[*program])
        }
        EventKind::ChannelPressure { channel, pressure } => {
            push_channel(out, 0xD0, *channel, &[*pressure])
        }
        EventKind::PitchBend { channel, value } => push_channel(
            out,
            0xE0,
            *channel,
            &[(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8],
        ),
        EventKind::Tempo { micros_per_quarter } => {
            if *micros_per_quarter > 0x00FF_FFFF {
                return Err(Error::InvalidEvent("tempo does not fit in 24 bits"));
            }
            let bytes = micros_per_quarter.to_be_bytes();
            push_meta(out, meta::TEMPO, &bytes[1..])?;
        }
        EventKind::SequencerSpecific(data) => push_meta(out, meta::SEQUENCER_SPECIFIC, data)?,
        EventKind::Meta { kind, data } => {
            if *kind == meta::END_OF_TRACK {
                return Err(Error::InvalidEvent(
                    "End-of-Track is written as EventKind::EndOfTrack",
                ));
            }
            push_meta(out, *kind, data)?;
        }
        EventKind::SysEx(data) => {
            out.push(0xF0);
            push_length(out, data.len() + 1)?;
            out.extend_from_slice(data);
            out.push(0xF7);
        }
        EventKind::Escape(data) => {
            out.push(0xF7);
            push_length(out, data.len())?;
            out.extend_from_slice(data);
        }
        EventKind::EndOfTrack => out.extend_from_slice(&END_OF_TRACK),
    }
    Ok(())
}

fn push_channel(out: &mut Vec<u8>, status: u8, channel: u8, data: &[u8]) {
    out.push(status | (channel & 0x0F));
    out.extend(data.iter().map(|b| b & 0x7F));
}

fn push_meta(out: &mut Vec<u8>, kind: u8, data: &[u8]) -> Result<()> {
    out.push(0xFF);
    out.push(kind);
    push_length(out, data.len())?;
    out.extend_from_slice(data);
    Ok(())
}

fn push_length(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .ok()
        .filter(|&len| len <= MAX_DELTA_TIME)
        .ok_or(Error::InvalidEvent("payload longer than a 28-bit length"))?;
    push_delta_time(out, len)
}
