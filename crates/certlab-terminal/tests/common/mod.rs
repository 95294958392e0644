//! Test utilities: a scripted in-memory transport and a fake-clock waiter.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use certlab_terminal::transport::{Frame, Transport, TransportConn, TransportError};

/// Marker for "every connect attempt fails".
const ALWAYS_FAIL: u32 = u32::MAX;

/// Scripted transport. Each successful connect produces a connection whose
/// outbound frames are recorded and whose inbound frames the test injects.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

struct MockState {
    fail_connects: AtomicU32,
    connects: AtomicU32,
    conns: Mutex<Vec<ConnHandle>>,
}

/// Test-side handle to one spawned mock connection.
#[derive(Clone)]
pub struct ConnHandle {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Every connect attempt succeeds.
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// The first `failures` connect attempts fail, the rest succeed.
    pub fn failing(failures: u32) -> Self {
        Self {
            state: Arc::new(MockState {
                fail_connects: AtomicU32::new(failures),
                connects: AtomicU32::new(0),
                conns: Mutex::new(Vec::new()),
            }),
        }
    }

    /// No connect attempt ever succeeds.
    pub fn always_failing() -> Self {
        Self::failing(ALWAYS_FAIL)
    }

    /// Total connect attempts observed (successful or not).
    pub fn connects(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Handle to the n-th successfully opened connection.
    pub fn conn(&self, index: usize) -> Option<ConnHandle> {
        self.state.conns.lock().unwrap().get(index).cloned()
    }

    pub fn open_conns(&self) -> usize {
        self.state.conns.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn TransportConn>, TransportError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != ALWAYS_FAIL {
                self.state.fail_connects.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(TransportError::Open("scripted connect failure".to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        self.state.conns.lock().unwrap().push(ConnHandle {
            sent: sent.clone(),
            inbound: inbound_tx,
            closed: closed.clone(),
        });

        Ok(Box::new(MockConn {
            sent,
            inbound: inbound_rx,
            closed,
        }))
    }
}

impl ConnHandle {
    /// Raw outbound frames in transmission order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Wire tags of outbound frames, in transmission order.
    pub fn sent_tags(&self) -> Vec<String> {
        self.sent_frames()
            .iter()
            .map(|frame| {
                let json: Value = serde_json::from_str(frame).expect("outbound frame is JSON");
                json["type"].as_str().expect("frame has a type tag").to_string()
            })
            .collect()
    }

    /// `command` payloads of outbound frames, in transmission order.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| {
                let json: Value = serde_json::from_str(frame).ok()?;
                Some(json["command"].as_str()?.to_string())
            })
            .collect()
    }

    /// Inject one inbound text frame.
    pub fn push_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Frame::Text(text.to_string())));
    }

    /// Close the connection from the peer side with the given code.
    pub fn close_with_code(&self, code: u16) {
        let _ = self.inbound.send(Ok(Frame::Closed {
            code,
            reason: String::new(),
        }));
    }

    /// Whether the client closed this connection cleanly.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockConn {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportConn for MockConn {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Send("connection closed".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll a condition while letting the paused clock auto-advance. Panics if
/// the condition does not hold within a generous virtual-time budget.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
