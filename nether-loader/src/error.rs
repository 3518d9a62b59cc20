//! Loader error types
//!
//! Three outcomes stay distinct: a stream no parser accepts
//! ([`LoadError::FormatUnrecognized`]), a recognized stream with invalid
//! structure ([`LoadError::MalformedData`]), and a recognized stream using
//! features the engine leaves inert, which is a successful load carrying
//! [`nether_tracker::UnsupportedFeature`] notes.

use nether_tracker::{FormatId, ModelError};

/// Out-of-bounds or overflowing read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("unexpected end of data at offset {offset} (wanted {wanted} bytes, {available} left)")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("offset {offset} lies outside {len} bytes of data")]
    OffsetOutOfRange { offset: u64, len: usize },

    #[error("chunk '{tag}' declares {declared} bytes but only {available} remain")]
    ChunkOverrun {
        tag: String,
        declared: u64,
        available: usize,
    },
}

/// Why a recognized stream was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0}")]
    Structure(String),
}

/// Result of one candidate parser
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The stream is not in this format; the next candidate is tried
    #[error("not this format")]
    NotThisFormat,

    /// The stream is in this format but invalid; the load aborts
    #[error(transparent)]
    Malformed(#[from] Malformed),
}

impl From<ReadError> for FormatError {
    fn from(e: ReadError) -> Self {
        FormatError::Malformed(Malformed::Read(e))
    }
}

impl From<ModelError> for FormatError {
    fn from(e: ModelError) -> Self {
        FormatError::Malformed(Malformed::Model(e))
    }
}

/// Shorthand for a structural violation
pub(crate) fn structure(message: impl Into<String>) -> FormatError {
    FormatError::Malformed(Malformed::Structure(message.into()))
}

/// Module load error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// No candidate parser accepted the stream
    #[error("module format not recognized")]
    FormatUnrecognized,

    /// A parser accepted the stream and found it invalid
    #[error("malformed {} data: {source}", format.name())]
    MalformedData { format: FormatId, source: Malformed },
}
