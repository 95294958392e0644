//! Per-session façade exposed to callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use certlab_protocol::Envelope;

use crate::config::TerminalConfig;
use crate::connection::{Command, Connection, StatusHook};
use crate::error::{TerminalError, TerminalResult};
use crate::transport::Transport;

type MessageFn = Box<dyn Fn(Envelope) + Send + Sync>;
type ConnectionFn = Box<dyn Fn(bool) + Send + Sync>;
type ErrorFn = Box<dyn Fn(TerminalError) + Send + Sync>;

/// Caller-registered observers, invoked from the session's connection task
/// in arrival order. Observers must return quickly; anything slow should be
/// handed off to its own task.
#[derive(Default)]
pub(crate) struct Callbacks {
    on_message: Mutex<Option<MessageFn>>,
    on_connection_change: Mutex<Option<ConnectionFn>>,
    on_error: Mutex<Option<ErrorFn>>,
}

impl Callbacks {
    pub(crate) fn message(&self, envelope: Envelope) {
        if let Ok(guard) = self.on_message.lock() {
            if let Some(callback) = guard.as_ref() {
                callback(envelope);
            }
        }
    }

    pub(crate) fn connection_change(&self, connected: bool) {
        if let Ok(guard) = self.on_connection_change.lock() {
            if let Some(callback) = guard.as_ref() {
                callback(connected);
            }
        }
    }

    pub(crate) fn error(&self, error: TerminalError) {
        if let Ok(guard) = self.on_error.lock() {
            if let Some(callback) = guard.as_ref() {
                callback(error);
            }
        }
    }
}

/// One logical terminal session, independent of how many physical transport
/// connections it consumes over its lifetime.
///
/// All sends are non-blocking: the envelope is handed to the session's
/// connection task, which transmits it immediately or queues it until the
/// transport reopens. Results arrive asynchronously through [`on_message`].
///
/// After [`disconnect`] (and after reconnection gives up) the bridge is
/// inert: every further `connect`/`send*` returns
/// [`TerminalError::SessionClosed`].
///
/// [`on_message`]: TerminalBridge::on_message
/// [`disconnect`]: TerminalBridge::disconnect
pub struct TerminalBridge {
    session_id: String,
    commands: mpsc::UnboundedSender<Command>,
    callbacks: Arc<Callbacks>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl TerminalBridge {
    /// Spawn the session's connection task and return its façade.
    pub(crate) fn spawn(
        session_id: String,
        config: Arc<TerminalConfig>,
        transport: Arc<dyn Transport>,
        status_hook: StatusHook,
    ) -> Arc<Self> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let callbacks = Arc::new(Callbacks::default());
        let connected = Arc::new(AtomicBool::new(false));

        let connection = Connection::new(
            session_id.clone(),
            config,
            transport,
            command_rx,
            callbacks.clone(),
            status_hook,
            connected.clone(),
        );
        tokio::spawn(connection.run());

        Arc::new(Self {
            session_id,
            commands,
            callbacks,
            connected,
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open the connection eagerly. Idempotent: a session that is already
    /// connecting or connected ignores this. (Connection also happens lazily
    /// on the first send.)
    pub fn connect(&self) -> TerminalResult<()> {
        self.command(Command::Connect)
    }

    /// Send a discrete line command, e.g. `kubectl get nodes`.
    pub fn send_command(&self, command: impl Into<String>) -> TerminalResult<()> {
        self.command(Command::Send(Envelope::command(
            self.session_id.clone(),
            command.into(),
        )))
    }

    /// Forward a raw keystroke or byte sequence to a PTY-backed executor.
    ///
    /// Callers building a line-editing front end can instead assemble full
    /// lines locally and use [`send_command`]; both interaction models are
    /// supported.
    ///
    /// [`send_command`]: TerminalBridge::send_command
    pub fn send_key(&self, key: impl Into<String>) -> TerminalResult<()> {
        self.command(Command::Send(Envelope::key(
            self.session_id.clone(),
            key.into(),
        )))
    }

    /// Report new terminal dimensions to the executor.
    pub fn resize(&self, cols: u16, rows: u16) -> TerminalResult<()> {
        self.command(Command::Send(Envelope::resize(
            self.session_id.clone(),
            cols,
            rows,
        )))
    }

    /// Clean shutdown: close the transport with a normal-closure code and
    /// stop all reconnection. Safe to call more than once.
    pub fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Close);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register the inbound-envelope observer.
    pub fn on_message(&self, callback: impl Fn(Envelope) + Send + Sync + 'static) {
        if let Ok(mut guard) = self.callbacks.on_message.lock() {
            *guard = Some(Box::new(callback));
        }
    }

    /// Register the connectivity observer (fires once per transition).
    pub fn on_connection_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        if let Ok(mut guard) = self.callbacks.on_connection_change.lock() {
            *guard = Some(Box::new(callback));
        }
    }

    /// Register the fatal-error observer.
    pub fn on_error(&self, callback: impl Fn(TerminalError) + Send + Sync + 'static) {
        if let Ok(mut guard) = self.callbacks.on_error.lock() {
            *guard = Some(Box::new(callback));
        }
    }

    fn command(&self, command: Command) -> TerminalResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TerminalError::SessionClosed(self.session_id.clone()));
        }
        // A dropped receiver means the connection task already terminated
        // (clean close or reconnect exhaustion).
        self.commands
            .send(command)
            .map_err(|_| TerminalError::SessionClosed(self.session_id.clone()))
    }
}
