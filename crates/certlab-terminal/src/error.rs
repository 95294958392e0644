//! Terminal bridge error types.

use thiserror::Error;

use certlab_protocol::ProtocolError;

/// Result type for terminal bridge operations.
pub type TerminalResult<T> = Result<T, TerminalError>;

/// Caller-visible faults.
///
/// Transport failures are handled inside the connection manager (they drive
/// reconnection) and reach the caller only as connection-state changes, so
/// they are absent here on purpose.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// Automatic reconnection gave up. The session needs caller/user
    /// intervention (e.g. a fresh session or a page reload); nothing retries
    /// past this point.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    /// Operation attempted on a session that was already closed.
    #[error("session {0} is closed")]
    SessionClosed(String),

    /// An envelope could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration file or environment overrides could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),
}
