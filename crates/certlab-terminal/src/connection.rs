//! Per-session connection manager.
//!
//! One actor task owns exactly one transport connection and provides a
//! reliable-feeling command channel over an unreliable one: messages sent
//! while offline are queued and replayed FIFO after the next successful
//! open, abnormal closes trigger exponentially backed-off reconnects, and a
//! heartbeat ping keeps intermediaries from idling the connection out.
//!
//! Everything for a session runs on this single task, so no two threads
//! ever touch the same transport handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use certlab_protocol::Envelope;

use crate::bridge::Callbacks;
use crate::config::TerminalConfig;
use crate::error::TerminalError;
use crate::store::SessionStatus;
use crate::transport::{Frame, Transport, TransportConn, TransportError, CLOSE_NORMAL};

/// Commands accepted by the connection task.
pub(crate) enum Command {
    Connect,
    Send(Envelope),
    Close,
}

/// Hook invoked on every session status change (feeds the session store).
pub(crate) type StatusHook = Box<dyn Fn(SessionStatus) + Send + Sync>;

#[derive(Clone, Copy)]
enum State {
    Idle,
    Connecting,
    Open,
    Reconnecting { deadline: Instant },
    Closed,
    Failed,
}

pub(crate) struct Connection {
    session_id: String,
    config: Arc<TerminalConfig>,
    transport: Arc<dyn Transport>,
    commands: mpsc::UnboundedReceiver<Command>,
    callbacks: Arc<Callbacks>,
    status_hook: StatusHook,
    connected: Arc<AtomicBool>,
    state: State,
    queue: VecDeque<Envelope>,
    attempts: u32,
    conn: Option<Box<dyn TransportConn>>,
    last_pong: Option<Instant>,
}

impl Connection {
    pub(crate) fn new(
        session_id: String,
        config: Arc<TerminalConfig>,
        transport: Arc<dyn Transport>,
        commands: mpsc::UnboundedReceiver<Command>,
        callbacks: Arc<Callbacks>,
        status_hook: StatusHook,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session_id,
            config,
            transport,
            commands,
            callbacks,
            status_hook,
            connected,
            state: State::Idle,
            queue: VecDeque::new(),
            attempts: 0,
            conn: None,
            last_pong: None,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            match self.state {
                State::Idle => self.wait_idle().await,
                State::Connecting => self.connect_once().await,
                State::Open => self.drive_open().await,
                State::Reconnecting { deadline } => self.wait_backoff(deadline).await,
                State::Closed => {
                    self.finish(SessionStatus::Disconnected).await;
                    return;
                }
                State::Failed => {
                    self.finish(SessionStatus::Error).await;
                    return;
                }
            }
        }
    }

    /// Connection is lazy: nothing happens until the first command.
    async fn wait_idle(&mut self) {
        match self.commands.recv().await {
            Some(Command::Connect) => self.state = State::Connecting,
            Some(Command::Send(envelope)) => {
                self.queue.push_back(envelope);
                self.state = State::Connecting;
            }
            Some(Command::Close) | None => self.state = State::Closed,
        }
    }

    async fn connect_once(&mut self) {
        self.set_status(SessionStatus::Connecting);
        debug!(
            "session {}: connecting to {}",
            self.session_id, self.config.endpoint
        );

        let connect = self.transport.connect(&self.config.endpoint);
        let mut conn = match time::timeout(self.config.connect_timeout(), connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => {
                warn!("session {}: transport open failed: {}", self.session_id, err);
                self.schedule_reconnect();
                return;
            }
            Err(_) => {
                warn!("session {}: {}", self.session_id, TransportError::Timeout);
                self.schedule_reconnect();
                return;
            }
        };

        self.attempts = 0;

        // Handshake first, then replay anything queued while offline, in
        // issuance order. A mid-flush failure keeps the unsent remainder at
        // the front of the queue.
        let init = Envelope::init(self.session_id.clone(), true);
        if self.transmit(&mut conn, init).await.is_err() {
            self.schedule_reconnect();
            return;
        }
        while let Some(envelope) = self.queue.pop_front() {
            if let Err(envelope) = self.transmit(&mut conn, envelope).await {
                self.queue.push_front(envelope);
                self.schedule_reconnect();
                return;
            }
        }

        info!("session {}: connected", self.session_id);
        self.conn = Some(conn);
        self.state = State::Open;
        self.set_status(SessionStatus::Connected);
        self.notify_connected(true);
    }

    async fn drive_open(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            self.schedule_reconnect();
            return;
        };

        let period = self.config.heartbeat_interval();
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => {}
                    Some(Command::Send(envelope)) => {
                        if let Err(envelope) = self.transmit(&mut conn, envelope).await {
                            self.queue.push_back(envelope);
                            self.schedule_reconnect();
                            return;
                        }
                    }
                    Some(Command::Close) | None => {
                        debug!("session {}: closing", self.session_id);
                        let _ = conn.close().await;
                        self.state = State::Closed;
                        return;
                    }
                },
                frame = conn.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(Frame::Closed { code, reason })) => {
                        if code == CLOSE_NORMAL {
                            info!("session {}: closed by peer", self.session_id);
                            self.state = State::Closed;
                        } else {
                            warn!(
                                "session {}: abnormal close (code {}, reason {:?})",
                                self.session_id, code, reason
                            );
                            self.schedule_reconnect();
                        }
                        return;
                    }
                    Some(Err(err)) => {
                        warn!("session {}: transport error: {}", self.session_id, err);
                        self.schedule_reconnect();
                        return;
                    }
                    None => {
                        warn!("session {}: transport stream ended", self.session_id);
                        self.schedule_reconnect();
                        return;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Some(at) = self.last_pong {
                        debug!(
                            "session {}: last pong {:?} ago",
                            self.session_id,
                            at.elapsed()
                        );
                    }
                    let ping = Envelope::ping(self.session_id.clone());
                    if self.transmit(&mut conn, ping).await.is_err() {
                        self.schedule_reconnect();
                        return;
                    }
                }
            }
        }
    }

    /// Park until the backoff deadline. The deadline survives commands that
    /// arrive mid-wait, so repeated sends never restart or stack the timer.
    async fn wait_backoff(&mut self, deadline: Instant) {
        tokio::select! {
            _ = time::sleep_until(deadline) => self.state = State::Connecting,
            command = self.commands.recv() => match command {
                Some(Command::Connect) => {}
                Some(Command::Send(envelope)) => self.queue.push_back(envelope),
                Some(Command::Close) | None => self.state = State::Closed,
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if matches!(self.state, State::Closed | State::Failed) {
            return;
        }
        self.conn = None;
        self.set_status(SessionStatus::Disconnected);
        self.notify_connected(false);

        self.attempts += 1;
        let policy = &self.config.reconnect;
        if self.attempts > policy.max_attempts {
            warn!(
                "session {}: giving up after {} reconnect attempts",
                self.session_id, policy.max_attempts
            );
            self.state = State::Failed;
            return;
        }

        let delay = policy.delay(self.attempts);
        info!(
            "session {}: reconnect attempt {} of {} in {:?}",
            self.session_id, self.attempts, policy.max_attempts, delay
        );
        self.state = State::Reconnecting {
            deadline: Instant::now() + delay,
        };
    }

    async fn finish(&mut self, status: SessionStatus) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.close().await;
        }
        self.queue.clear();
        self.set_status(status);
        self.notify_connected(false);
        if matches!(self.state, State::Failed) {
            self.callbacks.error(TerminalError::ReconnectExhausted {
                attempts: self.config.reconnect.max_attempts,
            });
        }
        debug!(
            "session {}: connection task finished ({})",
            self.session_id, status
        );
    }

    /// Encode and write one envelope. An encoding failure drops the frame
    /// (non-fatal); a transport failure hands the envelope back.
    async fn transmit(
        &self,
        conn: &mut Box<dyn TransportConn>,
        envelope: Envelope,
    ) -> Result<(), Envelope> {
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(
                    "session {}: dropping unencodable {} envelope: {}",
                    self.session_id,
                    envelope.payload.tag(),
                    err
                );
                return Ok(());
            }
        };
        match conn.send_text(frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("session {}: send failed: {}", self.session_id, err);
                Err(envelope)
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                // A single malformed frame must not kill the session.
                debug!(
                    "session {}: dropping malformed frame: {}",
                    self.session_id, err
                );
                return;
            }
        };
        if !envelope.session_id.is_empty() && envelope.session_id != self.session_id {
            warn!(
                "session {}: dropping frame addressed to session {}",
                self.session_id, envelope.session_id
            );
            return;
        }
        if envelope.is_pong() {
            // Liveness signal only; a missing pong never drives reconnection.
            self.last_pong = Some(Instant::now());
            debug!("session {}: heartbeat acknowledged", self.session_id);
        }
        self.callbacks.message(envelope);
    }

    fn set_status(&self, status: SessionStatus) {
        (self.status_hook)(status);
    }

    /// Edge-triggered: the connectivity callback fires once per transition.
    fn notify_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            self.callbacks.connection_change(connected);
        }
    }
}
