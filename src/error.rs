//! Error type for the keyroll umbrella crate.
//!
//! Wraps the codec errors so `?` propagates across crate boundaries.

use keyroll_smf::Timing;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SMF: {0}")]
    Smf(#[from] keyroll_smf::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Beat-based time units need a metrical division.
    #[error("Timing {0:?} cannot be converted to beats")]
    UnsupportedTiming(Timing),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Smf(keyroll_smf::Error::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
