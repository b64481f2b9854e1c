//! Error types for the SMF codec.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A variable-length quantity or length field is truncated or inconsistent.
    #[error("Malformed stream at byte {offset}: {reason}")]
    MalformedStream { offset: usize, reason: &'static str },

    /// The track ended without an End-of-Track meta event.
    #[error("Track truncated at byte {offset}: missing End-of-Track")]
    TruncatedTrack { offset: usize },

    #[error("Unsupported event status 0x{status:02X} at byte {offset}")]
    UnsupportedEventType { status: u8, offset: usize },

    #[error("Invalid chunk: expected {expected:?}, found {found:?}")]
    InvalidChunk { expected: [u8; 4], found: [u8; 4] },

    #[error("Unsupported SMF format: {0}")]
    UnsupportedFormat(u16),

    #[error("Delta time {0} exceeds the 28-bit variable-length limit")]
    DeltaTimeOverflow(u32),

    #[error("Event cannot be encoded: {0}")]
    InvalidEvent(&'static str),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        Error::MalformedStream { offset, reason }
    }

    /// Byte offset the error was detected at, when decoding.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::MalformedStream { offset, .. }
            | Error::TruncatedTrack { offset }
            | Error::UnsupportedEventType { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub(crate) fn at_offset(self, base: usize) -> Self {
        match self {
            Error::MalformedStream { offset, reason } => Error::MalformedStream {
                offset: offset + base,
                reason,
            },
            Error::TruncatedTrack { offset } => Error::TruncatedTrack {
                offset: offset + base,
            },
            Error::UnsupportedEventType { status, offset } => Error::UnsupportedEventType {
                status,
                offset: offset + base,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
