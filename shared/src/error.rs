//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("record has {actual} bytes, expected {expected}")]
    ShortRecord { expected: usize, actual: usize },

    #[error("failed to encode record: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode record: {0}")]
    Decode(#[source] bincode::Error),
}
