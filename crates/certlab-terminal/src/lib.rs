//! Terminal session bridge for the CertLab practice platform.
//!
//! Multiplexes logical terminal sessions over an unreliable WebSocket
//! transport to a remote command executor. Each session gets a
//! [`TerminalBridge`] façade whose sends never block: envelopes are
//! transmitted immediately or queued FIFO until the connection reopens.
//! Reconnection uses exponential backoff with a cap and a hard attempt
//! limit; a heartbeat ping runs while connected. [`TerminalManager`] is the
//! registry that owns the bridges and tracks which session has UI focus.
//!
//! ```no_run
//! use certlab_terminal::{TerminalConfig, TerminalManager};
//!
//! # fn demo() -> certlab_terminal::TerminalResult<()> {
//! let manager = TerminalManager::new(TerminalConfig::default());
//! let bridge = manager.create_or_get("exam-42");
//! bridge.on_message(|envelope| println!("{:?}", envelope.payload));
//! bridge.send_command("kubectl get nodes")?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod connection;
mod manager;

pub mod config;
pub mod error;
pub mod store;
pub mod transport;

pub use bridge::TerminalBridge;
pub use config::{ReconnectConfig, TerminalConfig};
pub use error::{TerminalError, TerminalResult};
pub use manager::TerminalManager;
pub use store::{SessionMeta, SessionStatus, SessionStore};

pub use certlab_protocol::{Envelope, Payload, ProtocolError};
