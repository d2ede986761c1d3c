//! Error types for the detection engine.
//!
//! Only configuration and programming mistakes surface as errors. Input from
//! a network peer is never an error: malformed or unexpected packets are
//! either ignored or turned into a detection.

use protocol::{PlayerId, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// A check descriptor failed validation at start-up.
    #[error("check descriptor `{name}` is invalid: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("check `{0}` is registered more than once")]
    DuplicateCheck(String),

    /// A factory built a check that reports a different descriptor than the
    /// one it was registered under.
    #[error("check registered as `{declared}` reports itself as `{built}`")]
    DescriptorMismatch { declared: String, built: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("no session for player {0}")]
    UnknownSession(PlayerId),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<bincode::Error> for GuardError {
    fn from(err: bincode::Error) -> Self {
        GuardError::Capture(err.to_string())
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::Capture(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
