//! Transport seam between the connection manager and the wire.
//!
//! Production code talks WebSocket via [`WsTransport`]; tests substitute a
//! scripted implementation of the same traits.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// WebSocket close code for a normal, caller-initiated closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Errors raised by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open transport: {0}")]
    Open(String),

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("failed to receive frame: {0}")]
    Recv(String),

    #[error("connect attempt timed out")]
    Timeout,
}

/// One message-sized unit delivered by a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying one encoded envelope.
    Text(String),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
}

/// Factory for transport connections to the remote executor.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportConn>, TransportError>;
}

/// A single established, message-framed, bidirectional connection.
///
/// Exclusively owned by one connection manager; no two managers ever share
/// a connection.
#[async_trait]
pub trait TransportConn: Send + Sync {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame. `None` means the stream ended without a close
    /// frame, which callers treat as an abnormal close.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close with a normal-closure code.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// WebSocket transport over `tokio-tungstenite` (TLS-capable).
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportConn>, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|err| TransportError::Open(err.to_string()))?;
        Ok(Box::new(WsConn { stream }))
    }
}

struct WsConn {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportConn for WsConn {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(TransportError::Recv(err.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text.to_string()))),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                        None => (CLOSE_NORMAL, String::new()),
                    };
                    return Some(Ok(Frame::Closed { code, reason }));
                }
                // Protocol-level pings are answered by tungstenite itself;
                // binary frames are not part of this protocol.
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {
                    continue;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnect".into(),
            }))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }
}
