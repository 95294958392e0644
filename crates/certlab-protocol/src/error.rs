//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Every outbound envelope must carry the id of the session that sent it.
    #[error("cannot encode envelope with empty session id")]
    EmptySessionId,

    /// The frame is not a valid envelope (bad JSON or unknown type tag).
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}
