//! Error types for the MIDI facade and its host backends.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The host refused (or failed) to grant MIDI capability.
    #[error("Error getting MIDI access: {0}")]
    AccessDenied(String),

    /// A registry resync ran before access was granted.
    #[error("Cannot reset input/output without MIDI access")]
    AccessNotEstablished,

    #[error("MIDI access has already been requested")]
    AlreadyInitialized,

    #[error("MIDI port '{0}' is no longer available")]
    PortUnavailable(String),

    #[error("MIDI port '{id}' error: {reason}")]
    Port { id: String, reason: String },

    #[error("MIDI backend error: {0}")]
    Backend(String),
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
