//! Wire protocol for CertLab terminal sessions.
//!
//! One JSON text frame per message, exchanged between the browser-side
//! bridge and the remote command executor. Encoding and decoding are pure;
//! a malformed inbound frame must be dropped by the caller, never treated
//! as fatal to the session.

mod envelope;
mod error;

pub use envelope::{Envelope, Payload};
pub use error::ProtocolError;
